// 该文件是 Tingche （停车） 项目的一部分。
// src/pixel.rs - 平台像素缓冲区到规范化帧的转换
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use image::RgbaImage;
use thiserror::Error;
use tracing::{debug, error};

use crate::frame::{RGB_CHANNELS, RgbNhwcFrame};

/// 源缓冲区每像素字节数 (RGBA8888)
pub const RGBA_CHANNELS: usize = 4;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PixelError {
  #[error("图像为空: {width}x{height}")]
  EmptyImage { width: u32, height: u32 },
  #[error("行跨度过小: {stride} < {min}")]
  StrideTooSmall { stride: usize, min: usize },
  #[error("像素缓冲区过短: 期望至少 {expected} 字节, 实际 {actual} 字节")]
  BufferTooShort { expected: usize, actual: usize },
  #[error("锁定像素缓冲区失败: {0}")]
  LockFailed(String),
}

/// 已锁定缓冲区的几何信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitmapInfo {
  pub width: u32,
  pub height: u32,
  /// 每行字节数
  pub stride: usize,
}

/// 锁定期间可读的 RGBA8888 像素；释放 (Drop) 即解锁
pub trait LockedPixels {
  fn info(&self) -> BitmapInfo;
  fn pixels(&self) -> &[u8];
}

/// 平台图像句柄
pub trait PixelBuffer {
  type Locked<'a>: LockedPixels
  where
    Self: 'a;

  fn lock_pixels(&self) -> Result<Self::Locked<'_>, PixelError>;
}

/// 锁定平台缓冲区，转换为 RGB NHWC 帧。无论转换成败，返回前都会解锁。
pub fn normalize<P: PixelBuffer>(source: &P) -> Result<RgbNhwcFrame, PixelError> {
  let locked = source.lock_pixels()?;
  let frame = rgba_to_rgb(&locked);
  drop(locked);

  if let Err(e) = &frame {
    error!("像素转换失败: {}", e);
  }
  frame
}

fn rgba_to_rgb<L: LockedPixels>(locked: &L) -> Result<RgbNhwcFrame, PixelError> {
  let BitmapInfo {
    width,
    height,
    stride,
  } = locked.info();
  if width == 0 || height == 0 {
    return Err(PixelError::EmptyImage { width, height });
  }

  let (width, height) = (width as usize, height as usize);
  let row_bytes = width * RGBA_CHANNELS;
  if stride < row_bytes {
    return Err(PixelError::StrideTooSmall {
      stride,
      min: row_bytes,
    });
  }

  let pixels = locked.pixels();
  // 行跨度来自平台缓冲区，溢出按缓冲区过短处理
  let expected = stride
    .checked_mul(height - 1)
    .and_then(|n| n.checked_add(row_bytes))
    .unwrap_or(usize::MAX);
  if pixels.len() < expected {
    return Err(PixelError::BufferTooShort {
      expected,
      actual: pixels.len(),
    });
  }

  debug!("转换 RGBA 缓冲区 {}x{}, 行跨度 {}", width, height, stride);
  let mut frame = RgbNhwcFrame::with_shape(height, width);
  let out = frame.as_mut();
  for y in 0..height {
    let src = &pixels[y * stride..y * stride + row_bytes];
    let dst = &mut out[y * width * RGB_CHANNELS..(y + 1) * width * RGB_CHANNELS];
    for (rgb, rgba) in dst
      .chunks_exact_mut(RGB_CHANNELS)
      .zip(src.chunks_exact(RGBA_CHANNELS))
    {
      rgb.copy_from_slice(&rgba[..RGB_CHANNELS]);
    }
  }

  Ok(frame)
}

pub struct RgbaImageLock<'a> {
  image: &'a RgbaImage,
}

impl LockedPixels for RgbaImageLock<'_> {
  fn info(&self) -> BitmapInfo {
    BitmapInfo {
      width: self.image.width(),
      height: self.image.height(),
      stride: self.image.width() as usize * RGBA_CHANNELS,
    }
  }

  fn pixels(&self) -> &[u8] {
    self.image.as_raw()
  }
}

impl PixelBuffer for RgbaImage {
  type Locked<'a> = RgbaImageLock<'a>;

  fn lock_pixels(&self) -> Result<Self::Locked<'_>, PixelError> {
    Ok(RgbaImageLock { image: self })
  }
}

#[cfg(test)]
mod tests {
  use std::cell::Cell;

  use super::*;

  struct PaddedBitmap {
    info: BitmapInfo,
    data: Vec<u8>,
    locks: Cell<usize>,
    unlocks: Cell<usize>,
  }

  struct PaddedLock<'a> {
    bitmap: &'a PaddedBitmap,
  }

  impl LockedPixels for PaddedLock<'_> {
    fn info(&self) -> BitmapInfo {
      self.bitmap.info
    }

    fn pixels(&self) -> &[u8] {
      &self.bitmap.data
    }
  }

  impl Drop for PaddedLock<'_> {
    fn drop(&mut self) {
      self.bitmap.unlocks.set(self.bitmap.unlocks.get() + 1);
    }
  }

  impl PixelBuffer for PaddedBitmap {
    type Locked<'a> = PaddedLock<'a>;

    fn lock_pixels(&self) -> Result<Self::Locked<'_>, PixelError> {
      self.locks.set(self.locks.get() + 1);
      Ok(PaddedLock { bitmap: self })
    }
  }

  fn padded(width: u32, height: u32, stride: usize, data: Vec<u8>) -> PaddedBitmap {
    PaddedBitmap {
      info: BitmapInfo {
        width,
        height,
        stride,
      },
      data,
      locks: Cell::new(0),
      unlocks: Cell::new(0),
    }
  }

  #[test]
  fn strided_rows_drop_alpha_and_padding() {
    // 2x2, 每行 8 字节像素 + 4 字节填充
    let data = vec![
      1, 2, 3, 255, 4, 5, 6, 255, 0, 0, 0, 0, //
      7, 8, 9, 255, 10, 11, 12, 255, 0, 0, 0, 0,
    ];
    let bitmap = padded(2, 2, 12, data);
    let frame = normalize(&bitmap).unwrap();

    assert_eq!(frame.as_nhwc(), &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
    assert_eq!(bitmap.locks.get(), 1);
    assert_eq!(bitmap.unlocks.get(), 1);
  }

  #[test]
  fn failures_still_release_the_buffer() {
    let bitmap = padded(2, 2, 4, vec![0; 16]);
    assert_eq!(
      normalize(&bitmap),
      Err(PixelError::StrideTooSmall { stride: 4, min: 8 })
    );
    assert_eq!(bitmap.unlocks.get(), 1);

    let bitmap = padded(2, 2, 8, vec![0; 10]);
    assert!(matches!(
      normalize(&bitmap),
      Err(PixelError::BufferTooShort { expected: 16, .. })
    ));
    assert_eq!(bitmap.unlocks.get(), 1);

    let bitmap = padded(0, 3, 0, Vec::new());
    assert!(matches!(
      normalize(&bitmap),
      Err(PixelError::EmptyImage { .. })
    ));
    assert_eq!(bitmap.unlocks.get(), 1);
  }

  #[test]
  fn oversized_stride_is_rejected() {
    let bitmap = padded(2, 3, usize::MAX / 2 + 1, vec![0; 64]);
    assert_eq!(
      normalize(&bitmap),
      Err(PixelError::BufferTooShort {
        expected: usize::MAX,
        actual: 64,
      })
    );
    assert_eq!(bitmap.unlocks.get(), 1);
  }

  #[test]
  fn rgba_image_is_a_pixel_buffer() {
    let image = RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 40]));
    let frame = normalize(&image).unwrap();
    assert_eq!((frame.width(), frame.height()), (3, 2));
    assert_eq!(frame.pixel(2, 1), [10, 20, 30]);
  }
}

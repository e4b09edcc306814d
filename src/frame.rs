// 该文件是 Tingche （停车） 项目的一部分。
// src/frame.rs - NHWC 帧定义
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

use image::{ImageBuffer, Rgb, RgbImage};
use thiserror::Error;

pub const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
}

/// 规范化后的图像：高 × 宽 × 3 通道交织存储，通道顺序固定为 RGB
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbNhwcFrame {
  height: usize,
  width: usize,
  data: Box<[u8]>,
}

impl RgbNhwcFrame {
  pub fn with_shape(height: usize, width: usize) -> Self {
    let data = vec![0u8; RGB_CHANNELS * width * height].into_boxed_slice();
    Self {
      height,
      width,
      data,
    }
  }

  pub fn from_raw(height: usize, width: usize, data: Vec<u8>) -> Result<Self, FrameError> {
    let expected = RGB_CHANNELS * width * height;
    if data.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      height,
      width,
      data: data.into_boxed_slice(),
    })
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn is_empty(&self) -> bool {
    self.height == 0 || self.width == 0
  }

  pub fn as_nhwc(&self) -> &[u8] {
    &self.data
  }

  pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
    let idx = (y * self.width + x) * RGB_CHANNELS;
    [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
  }

  pub fn to_rgb_image(&self) -> RgbImage {
    ImageBuffer::from_fn(self.width as u32, self.height as u32, |x, y| {
      Rgb(self.pixel(x as usize, y as usize))
    })
  }
}

impl AsMut<[u8]> for RgbNhwcFrame {
  fn as_mut(&mut self) -> &mut [u8] {
    &mut self.data
  }
}

impl From<&RgbImage> for RgbNhwcFrame {
  fn from(image: &RgbImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      height: height as usize,
      width: width as usize,
      data: image.as_raw().clone().into_boxed_slice(),
    }
  }
}

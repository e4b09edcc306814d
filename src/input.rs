// 该文件是 Tingche （停车） 项目的一部分。
// src/input.rs - 图像文件输入
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

use image::{ImageReader, RgbaImage};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像解码错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

/// `image:///path/to/picture.jpg`，解码成 RGBA 位图后只产出一次
pub struct ImageFileInput {
  image: Option<RgbaImage>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(InputError::SchemeMismatch(url.scheme().to_string()));
    }

    let path = url.path();
    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    debug!("读取图像 {} ({}x{})", path, image.width(), image.height());

    Ok(Self::from(image.into_rgba8()))
  }
}

impl From<RgbaImage> for ImageFileInput {
  fn from(image: RgbaImage) -> Self {
    Self { image: Some(image) }
  }
}

impl Iterator for ImageFileInput {
  type Item = RgbaImage;

  fn next(&mut self) -> Option<Self::Item> {
    self.image.take()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn yields_decoded_image_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("in.png");
    RgbaImage::from_pixel(8, 4, image::Rgba([1, 2, 3, 255]))
      .save(&path)
      .unwrap();

    let url = Url::parse(&format!("image://{}", path.display())).unwrap();
    let mut input = ImageFileInput::from_url(&url).unwrap();

    let image = input.next().unwrap();
    assert_eq!(image.dimensions(), (8, 4));
    assert_eq!(image.get_pixel(0, 0).0, [1, 2, 3, 255]);
    assert!(input.next().is_none());
  }

  #[test]
  fn missing_file_is_io_error() {
    let url = Url::parse("image:///nonexistent/tingche/in.png").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(InputError::IoError(_))
    ));
  }
}

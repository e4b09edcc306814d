// 该文件是 Tingche （停车） 项目的一部分。
// src/output/save_image_file.rs - 保存标注后的图像文件
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

use std::path::{Path, PathBuf};

use ab_glyph::FontVec;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbNhwcFrame,
  marshal::DetectionRecord,
  output::{Render, draw::Draw},
};

/// `image:///path/to/out.png?font=/path/to/font.ttf`
pub struct SaveImageFileOutput {
  path: PathBuf,
  draw: Draw,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(image::ImageError),
  #[error("字体 {0} 无效")]
  InvalidFont(String),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let mut draw = Draw::default();
    for (key, value) in uri.query_pairs() {
      match key.as_ref() {
        "font" => {
          let data = std::fs::read(&*value).map_err(SaveImageFileError::IoError)?;
          let font = FontVec::try_from_vec(data)
            .map_err(|_| SaveImageFileError::InvalidFont(value.to_string()))?;
          draw = draw.with_font(font);
        }
        "thickness" => match value.parse() {
          Ok(thickness) => draw = draw.with_thickness(thickness),
          Err(_) => warn!("忽略无效的线宽参数: {}", value),
        },
        other => warn!("忽略未知参数: {}", other),
      }
    }

    Ok(SaveImageFileOutput {
      path: PathBuf::from(uri.path()),
      draw,
    })
  }
}

impl SaveImageFileOutput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      draw: Draw::default(),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn save_image(&self, image: image::RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent).map_err(SaveImageFileError::IoError)?;
    }

    image
      .save(&self.path)
      .map_err(SaveImageFileError::ImageError)?;

    info!("保存图像到文件: {}", self.path.display());

    Ok(())
  }
}

impl Render<RgbNhwcFrame, [DetectionRecord]> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(
    &self,
    frame: &RgbNhwcFrame,
    result: &[DetectionRecord],
  ) -> Result<(), Self::Error> {
    let image = self.draw.draw_detection(frame, result);
    self.save_image(image)
  }
}

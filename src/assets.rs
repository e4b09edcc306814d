// 该文件是 Tingche （停车） 项目的一部分。
// src/assets.rs - 模型资源加载
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

use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

#[derive(Error, Debug)]
pub enum AssetError {
  #[error("资源名称无效: {0}")]
  InvalidName(String),
  #[error("资源不存在: {0}")]
  NotFound(String),
  #[error("读取资源 {name} 失败: {source}")]
  Io {
    name: String,
    #[source]
    source: std::io::Error,
  },
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 按名称提供模型资源的能力
pub trait AssetSource: Send + Sync {
  fn read(&self, name: &str) -> Result<Vec<u8>, AssetError>;
}

impl<A: AssetSource + ?Sized> AssetSource for &A {
  fn read(&self, name: &str) -> Result<Vec<u8>, AssetError> {
    (**self).read(name)
  }
}

/// 以目录为根的资源，形如 `assets:///opt/tingche/models`
#[derive(Debug, Clone)]
pub struct DirectoryAssets {
  root: PathBuf,
}

impl DirectoryAssets {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }
}

impl FromUrlWithScheme for DirectoryAssets {
  const SCHEME: &'static str = "assets";
}

impl FromUrl for DirectoryAssets {
  type Error = AssetError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(AssetError::SchemeMismatch(format!(
        "期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }
    Ok(Self::new(url.path()))
  }
}

impl AssetSource for DirectoryAssets {
  fn read(&self, name: &str) -> Result<Vec<u8>, AssetError> {
    // 资源名只能是根目录下的单个文件名
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
      error!("拒绝资源名称: {:?}", name);
      return Err(AssetError::InvalidName(name.to_string()));
    }

    let path = self.root.join(name);
    debug!("读取资源文件: {}", path.display());
    std::fs::read(&path).map_err(|source| {
      if source.kind() == std::io::ErrorKind::NotFound {
        AssetError::NotFound(name.to_string())
      } else {
        AssetError::Io {
          name: name.to_string(),
          source,
        }
      }
    })
  }
}

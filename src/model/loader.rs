// 该文件是 Tingche （停车） 项目的一部分。
// src/model/loader.rs - 按计算方式选择 YOLO 推理后端
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

#[cfg(feature = "npu")]
use std::path::PathBuf;

use tracing::info;

use crate::{
  assets::AssetSource,
  config::Thresholds,
  frame::RgbNhwcFrame,
  model::{ComputeMode, Detection, Model, ModelError, ModelLoader},
};

#[cfg(feature = "npu")]
const NPU_PROBE_PATHS: &[&str] = &["/dev/rknpu", "/sys/kernel/debug/rknpu", "/proc/rknpu"];

/// 通用计算走 rten (`<name>.rten`)，加速计算走 RKNPU (`<name>.rknn`)
#[derive(Debug, Clone)]
pub struct YoloLoader {
  #[cfg(feature = "npu")]
  npu_probe_paths: Vec<PathBuf>,
}

impl Default for YoloLoader {
  fn default() -> Self {
    Self {
      #[cfg(feature = "npu")]
      npu_probe_paths: NPU_PROBE_PATHS.iter().map(PathBuf::from).collect(),
    }
  }
}

impl YoloLoader {
  #[cfg(feature = "npu")]
  pub fn with_npu_probe_paths(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
    self.npu_probe_paths = paths.into_iter().collect();
    self
  }
}

pub enum YoloModel {
  #[cfg(feature = "cpu")]
  Cpu(super::RtenYolo),
  #[cfg(feature = "npu")]
  Npu(super::RknnYolo),
}

impl Model for YoloModel {
  fn infer(
    &self,
    frame: &RgbNhwcFrame,
    thresholds: &Thresholds,
  ) -> Result<Vec<Detection>, ModelError> {
    match *self {
      #[cfg(feature = "cpu")]
      YoloModel::Cpu(ref model) => model.infer(frame, thresholds),
      #[cfg(feature = "npu")]
      YoloModel::Npu(ref model) => model.infer(frame, thresholds),
    }
  }
}

#[cfg(feature = "cpu")]
fn load_generic(assets: &dyn AssetSource, asset_name: &str) -> Result<YoloModel, ModelError> {
  let data = assets.read(&format!("{}.rten", asset_name))?;
  Ok(YoloModel::Cpu(super::RtenYolo::load(data)?))
}

#[cfg(not(feature = "cpu"))]
fn load_generic(_assets: &dyn AssetSource, _asset_name: &str) -> Result<YoloModel, ModelError> {
  Err(ModelError::Unsupported(ComputeMode::Generic))
}

#[cfg(feature = "npu")]
fn load_accelerated(assets: &dyn AssetSource, asset_name: &str) -> Result<YoloModel, ModelError> {
  let data = assets.read(&format!("{}.rknn", asset_name))?;
  Ok(YoloModel::Npu(super::RknnYolo::load(&data)?))
}

#[cfg(not(feature = "npu"))]
fn load_accelerated(
  _assets: &dyn AssetSource,
  _asset_name: &str,
) -> Result<YoloModel, ModelError> {
  Err(ModelError::Unsupported(ComputeMode::Accelerated))
}

impl ModelLoader for YoloLoader {
  type Model = YoloModel;

  #[cfg(feature = "npu")]
  fn accelerator_count(&self) -> usize {
    self
      .npu_probe_paths
      .iter()
      .any(|path| path.exists())
      .into()
  }

  #[cfg(not(feature = "npu"))]
  fn accelerator_count(&self) -> usize {
    0
  }

  fn load_model(
    &self,
    assets: &dyn AssetSource,
    asset_name: &str,
    mode: ComputeMode,
  ) -> Result<Self::Model, ModelError> {
    info!("加载模型 {} ({})", asset_name, mode);
    match mode {
      ComputeMode::Generic => load_generic(assets, asset_name),
      ComputeMode::Accelerated => load_accelerated(assets, asset_name),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::assets::AssetError;

  struct NoAssets;

  impl AssetSource for NoAssets {
    fn read(&self, name: &str) -> Result<Vec<u8>, AssetError> {
      Err(AssetError::NotFound(name.to_string()))
    }
  }

  #[cfg(not(feature = "npu"))]
  #[test]
  fn no_accelerator_without_npu_backend() {
    let loader = YoloLoader::default();
    assert_eq!(loader.accelerator_count(), 0);
    assert!(matches!(
      loader.load_model(&NoAssets, "plate", ComputeMode::Accelerated),
      Err(ModelError::Unsupported(ComputeMode::Accelerated))
    ));
  }

  #[cfg(feature = "cpu")]
  #[test]
  fn generic_mode_reads_rten_asset() {
    let loader = YoloLoader::default();
    match loader.load_model(&NoAssets, "plate", ComputeMode::Generic) {
      Err(ModelError::Asset(AssetError::NotFound(name))) => assert_eq!(name, "plate.rten"),
      Err(e) => panic!("unexpected error: {e}"),
      Ok(_) => panic!("loading from empty assets must fail"),
    }
  }
}

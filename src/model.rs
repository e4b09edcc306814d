// 该文件是 Tingche （停车） 项目的一部分。
// src/model.rs - 模型
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

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{assets::AssetError, assets::AssetSource, config::Thresholds, frame::RgbNhwcFrame};

/// 单个检测框，坐标为原图像素坐标，原点在左上角
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
  /// 边界框左上角 x 坐标
  pub x: f32,
  /// 边界框左上角 y 坐标
  pub y: f32,
  /// 边界框宽度
  pub width: f32,
  /// 边界框高度
  pub height: f32,
  /// 类别索引
  pub class_id: u32,
  /// 置信度
  pub confidence: f32,
}

impl Detection {
  pub fn area(&self) -> f32 {
    self.width.max(0.0) * self.height.max(0.0)
  }

  /// 计算两个边界框的 IoU
  pub fn iou(&self, other: &Detection) -> f32 {
    let x1 = self.x.max(other.x);
    let y1 = self.y.max(other.y);
    let x2 = (self.x + self.width).min(other.x + other.width);
    let y2 = (self.y + self.height).min(other.y + other.height);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = self.area() + other.area() - intersection;

    if union > 0.0 {
      intersection / union
    } else {
      0.0
    }
  }
}

/// 推理计算方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeMode {
  /// 通用计算 (CPU)
  Generic,
  /// 加速器 (NPU)
  Accelerated,
}

impl ComputeMode {
  pub fn use_accelerator(self) -> bool {
    matches!(self, ComputeMode::Accelerated)
  }
}

impl TryFrom<i32> for ComputeMode {
  type Error = i32;

  fn try_from(value: i32) -> Result<Self, Self::Error> {
    match value {
      0 => Ok(ComputeMode::Generic),
      1 => Ok(ComputeMode::Accelerated),
      other => Err(other),
    }
  }
}

impl fmt::Display for ComputeMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ComputeMode::Generic => f.write_str("generic"),
      ComputeMode::Accelerated => f.write_str("accelerated"),
    }
  }
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("模型资源错误: {0}")]
  Asset(#[from] AssetError),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("当前构建不支持 {0} 计算方式")]
  Unsupported(ComputeMode),
  #[error("推理错误: {0}")]
  Inference(String),
  #[cfg(feature = "npu")]
  #[error("RKNN 错误: {0}")]
  RknnError(rknpu::Error),
}

#[cfg(feature = "npu")]
impl From<rknpu::Error> for ModelError {
  fn from(err: rknpu::Error) -> Self {
    ModelError::RknnError(err)
  }
}

/// 已加载的检测模型，内部推理逻辑（含 NMS）视为黑盒
pub trait Model: Send {
  fn infer(&self, frame: &RgbNhwcFrame, thresholds: &Thresholds)
  -> Result<Vec<Detection>, ModelError>;
}

/// 按资源名和计算方式构造模型
pub trait ModelLoader: Send + Sync {
  type Model: Model;

  /// 设备上可用的加速器数量
  fn accelerator_count(&self) -> usize;

  fn load_model(
    &self,
    assets: &dyn AssetSource,
    asset_name: &str,
    mode: ComputeMode,
  ) -> Result<Self::Model, ModelError>;
}

pub mod yolo;

mod loader;
pub use self::loader::{YoloLoader, YoloModel};

#[cfg(feature = "cpu")]
mod cpu;
#[cfg(feature = "cpu")]
pub use self::cpu::RtenYolo;

#[cfg(feature = "npu")]
mod npu;
#[cfg(feature = "npu")]
pub use self::npu::RknnYolo;

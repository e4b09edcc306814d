// 该文件是 Tingche （停车） 项目的一部分。
// src/config.rs - 编排配置
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

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::task::Task;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.4;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.5;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("配置解析错误: {0}")]
  ParseError(#[from] serde_json::Error),
  #[error("{task} 的 {name} 阈值超出范围 [0, 1]: {value}")]
  ThresholdOutOfRange {
    task: Task,
    name: &'static str,
    value: f32,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
  /// 置信度阈值
  pub confidence: f32,
  /// NMS IOU 阈值
  pub iou: f32,
}

impl Default for Thresholds {
  fn default() -> Self {
    Self {
      confidence: DEFAULT_CONFIDENCE_THRESHOLD,
      iou: DEFAULT_IOU_THRESHOLD,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
  pub thresholds: Thresholds,
  /// 关闭后编排时跳过该任务
  pub enabled: bool,
}

impl Default for TaskConfig {
  fn default() -> Self {
    Self {
      thresholds: Thresholds::default(),
      enabled: true,
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
  pub license_plate: TaskConfig,
  pub parking_slot: TaskConfig,
}

impl OrchestratorConfig {
  pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    info!("读取配置文件: {}", path.display());
    let text = std::fs::read_to_string(path)?;
    let config: Self = serde_json::from_str(&text)?;
    config.validate()?;
    Ok(config)
  }

  pub fn task(&self, task: Task) -> &TaskConfig {
    match task {
      Task::LicensePlate => &self.license_plate,
      Task::ParkingSlot => &self.parking_slot,
    }
  }

  pub fn task_mut(&mut self, task: Task) -> &mut TaskConfig {
    match task {
      Task::LicensePlate => &mut self.license_plate,
      Task::ParkingSlot => &mut self.parking_slot,
    }
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    for task in Task::ALL {
      let Thresholds { confidence, iou } = self.task(task).thresholds;
      for (name, value) in [("confidence", confidence), ("iou", iou)] {
        if !(0.0..=1.0).contains(&value) {
          return Err(ConfigError::ThresholdOutOfRange { task, name, value });
        }
      }
    }
    Ok(())
  }
}

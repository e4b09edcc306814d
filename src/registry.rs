// 该文件是 Tingche （停车） 项目的一部分。
// src/registry.rs - 模型变体注册表
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

use thiserror::Error;
use tracing::warn;

use crate::task::Task;

/// 车牌检测模型变体，下标即变体编号
pub const LICENSE_PLATE_VARIANTS: &[&str] = &["rttmas_license_plates_20250120"];
/// 车位检测模型变体，下标即变体编号
pub const PARKING_SLOT_VARIANTS: &[&str] = &["rttmas_parking_slot_v3"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
  #[error("{task} 没有编号为 {variant_id} 的模型变体 (共 {available} 个)")]
  InvalidVariant {
    task: Task,
    variant_id: i32,
    available: usize,
  },
}

/// 每个任务一份有序的资源名列表，构造后只读
#[derive(Debug, Clone)]
pub struct ModelRegistry {
  variants: [Vec<String>; 2],
}

impl Default for ModelRegistry {
  fn default() -> Self {
    let owned = |names: &[&str]| -> Vec<String> {
      names.iter().map(|name| name.to_string()).collect()
    };
    Self {
      variants: [owned(LICENSE_PLATE_VARIANTS), owned(PARKING_SLOT_VARIANTS)],
    }
  }
}

impl ModelRegistry {
  pub fn with_variants<I, S>(mut self, task: Task, variants: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.variants[task.index()] = variants.into_iter().map(Into::into).collect();
    self
  }

  pub fn variants(&self, task: Task) -> &[String] {
    &self.variants[task.index()]
  }

  pub fn resolve(&self, task: Task, variant_id: i32) -> Result<&str, RegistryError> {
    let variants = self.variants(task);
    usize::try_from(variant_id)
      .ok()
      .and_then(|idx| variants.get(idx))
      .map(String::as_str)
      .ok_or_else(|| {
        warn!("{} 的模型变体编号无效: {}", task, variant_id);
        RegistryError::InvalidVariant {
          task,
          variant_id,
          available: variants.len(),
        }
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builtin_variants_resolve_by_index() {
    let registry = ModelRegistry::default();
    assert_eq!(
      registry.resolve(Task::LicensePlate, 0),
      Ok("rttmas_license_plates_20250120")
    );
    assert_eq!(registry.resolve(Task::ParkingSlot, 0), Ok("rttmas_parking_slot_v3"));
  }

  #[test]
  fn out_of_range_ids_are_rejected() {
    let registry = ModelRegistry::default();
    for id in [-1, 1, i32::MIN, i32::MAX] {
      assert_eq!(
        registry.resolve(Task::ParkingSlot, id),
        Err(RegistryError::InvalidVariant {
          task: Task::ParkingSlot,
          variant_id: id,
          available: 1,
        })
      );
    }
  }

  #[test]
  fn variants_are_per_task() {
    let registry = ModelRegistry::default().with_variants(Task::LicensePlate, ["a", "b"]);
    assert_eq!(registry.resolve(Task::LicensePlate, 1), Ok("b"));
    assert!(registry.resolve(Task::ParkingSlot, 1).is_err());
  }
}

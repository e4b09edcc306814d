// 该文件是 Tingche （停车） 项目的一部分。
// src/task.rs - 检测任务与统一标签空间
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

/// 车牌模型可输出的类别数
pub const LICENSE_PLATE_CLASS_COUNT: u32 = 1;
/// 车位模型可输出的类别数
pub const PARKING_SLOT_CLASS_COUNT: u32 = 6;
/// 统一标签空间的类别总数
pub const TOTAL_CLASS_COUNT: u32 = LICENSE_PLATE_CLASS_COUNT + PARKING_SLOT_CLASS_COUNT;

/// 检测任务，声明顺序即合并顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
  LicensePlate,
  ParkingSlot,
}

impl Task {
  pub const ALL: [Task; 2] = [Task::LicensePlate, Task::ParkingSlot];

  pub const fn index(self) -> usize {
    match self {
      Task::LicensePlate => 0,
      Task::ParkingSlot => 1,
    }
  }

  pub const fn class_count(self) -> u32 {
    match self {
      Task::LicensePlate => LICENSE_PLATE_CLASS_COUNT,
      Task::ParkingSlot => PARKING_SLOT_CLASS_COUNT,
    }
  }

  pub const fn name(self) -> &'static str {
    match self {
      Task::LicensePlate => "license_plate",
      Task::ParkingSlot => "parking_slot",
    }
  }

  /// 该任务原始标签加到统一标签空间时的偏移量，等于排在它之前所有任务的类别数之和
  pub fn label_offset(self) -> u32 {
    Task::ALL[..self.index()]
      .iter()
      .map(|task| task.class_count())
      .sum()
  }

  /// 将统一标签拆回 (任务, 原始标签)
  pub fn split_label(label: u32) -> Option<(Task, u32)> {
    Task::ALL.into_iter().find_map(|task| {
      let offset = task.label_offset();
      (label >= offset && label < offset + task.class_count()).then(|| (task, label - offset))
    })
  }
}

impl fmt::Display for Task {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

pub trait WithLabel: Sized + fmt::Debug {
  fn to_label_str(&self) -> String;
  fn to_label_id(&self) -> u32;
  fn from_label_id(id: u32) -> Option<Self>;
}

/// 统一标签空间中的类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneLabel {
  LicensePlate,
  Available,
  Bus,
  Negative,
  Occupied,
  RedLine,
  YellowLine,
}

impl SceneLabel {
  const ALL: [SceneLabel; TOTAL_CLASS_COUNT as usize] = [
    SceneLabel::LicensePlate,
    SceneLabel::Available,
    SceneLabel::Bus,
    SceneLabel::Negative,
    SceneLabel::Occupied,
    SceneLabel::RedLine,
    SceneLabel::YellowLine,
  ];

  pub fn task(&self) -> Task {
    match self {
      SceneLabel::LicensePlate => Task::LicensePlate,
      _ => Task::ParkingSlot,
    }
  }

  /// 标注颜色 (RGB)
  pub fn color(&self) -> [u8; 3] {
    match self {
      SceneLabel::LicensePlate => [255, 0, 255],
      SceneLabel::Available => [0, 255, 0],
      SceneLabel::Bus => [0, 0, 255],
      SceneLabel::Negative => [68, 68, 68],
      SceneLabel::Occupied => [0, 255, 255],
      SceneLabel::RedLine => [255, 0, 0],
      SceneLabel::YellowLine => [255, 255, 0],
    }
  }
}

impl WithLabel for SceneLabel {
  fn to_label_str(&self) -> String {
    match self {
      SceneLabel::LicensePlate => "license_plate",
      SceneLabel::Available => "available",
      SceneLabel::Bus => "bus",
      SceneLabel::Negative => "negative",
      SceneLabel::Occupied => "occupied",
      SceneLabel::RedLine => "red_line",
      SceneLabel::YellowLine => "yellow_line",
    }
    .to_string()
  }

  fn to_label_id(&self) -> u32 {
    *self as u32
  }

  fn from_label_id(id: u32) -> Option<Self> {
    Self::ALL.get(id as usize).copied()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn offsets_accumulate_previous_class_counts() {
    assert_eq!(Task::LicensePlate.label_offset(), 0);
    assert_eq!(Task::ParkingSlot.label_offset(), LICENSE_PLATE_CLASS_COUNT);
  }

  #[test]
  fn split_label_recovers_task_and_raw_label() {
    assert_eq!(Task::split_label(0), Some((Task::LicensePlate, 0)));
    assert_eq!(Task::split_label(1), Some((Task::ParkingSlot, 0)));
    assert_eq!(Task::split_label(3), Some((Task::ParkingSlot, 2)));
    assert_eq!(Task::split_label(6), Some((Task::ParkingSlot, 5)));
    assert_eq!(Task::split_label(TOTAL_CLASS_COUNT), None);
  }

  #[test]
  fn scene_labels_follow_the_merged_label_space() {
    for id in 0..TOTAL_CLASS_COUNT {
      let label = SceneLabel::from_label_id(id).unwrap();
      assert_eq!(label.to_label_id(), id);
      let (task, _) = Task::split_label(id).unwrap();
      assert_eq!(label.task(), task);
    }
    assert_eq!(
      SceneLabel::from_label_id(3).map(|l| l.to_label_str()),
      Some("negative".to_string())
    );
    assert!(SceneLabel::from_label_id(TOTAL_CLASS_COUNT).is_none());
  }
}

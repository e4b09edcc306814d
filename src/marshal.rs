// 该文件是 Tingche （停车） 项目的一部分。
// src/marshal.rs - 检测结果对外记录格式
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
use tracing::debug;

use crate::{
  model::Detection,
  task::{SceneLabel, Task, WithLabel},
};

/// 车牌框宽度下限，低于此宽度的裁剪图不适合 OCR
pub const MIN_PLATE_CROP_WIDTH: f32 = 200.0;

/// 对外记录，字段顺序固定: x, y, w, h, label, prob
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
  pub x: f32,
  pub y: f32,
  pub w: f32,
  pub h: f32,
  /// 统一标签空间中的类别
  pub label: i32,
  pub prob: f32,
}

impl From<&Detection> for DetectionRecord {
  fn from(det: &Detection) -> Self {
    Self {
      x: det.x,
      y: det.y,
      w: det.width,
      h: det.height,
      label: det.class_id as i32,
      prob: det.confidence,
    }
  }
}

impl DetectionRecord {
  pub fn scene_label(&self) -> Option<SceneLabel> {
    u32::try_from(self.label)
      .ok()
      .and_then(SceneLabel::from_label_id)
  }

  pub fn task(&self) -> Option<Task> {
    self.scene_label().map(|label| label.task())
  }

  /// 车牌框是否值得裁剪送 OCR：宽不小于高，且足够宽
  pub fn is_plate_crop_candidate(&self) -> bool {
    self.task() == Some(Task::LicensePlate) && self.w >= self.h && self.w >= MIN_PLATE_CROP_WIDTH
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
  Float(f32),
  Int(i32),
}

impl fmt::Display for FieldValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FieldValue::Float(v) => write!(f, "{:.4}", v),
      FieldValue::Int(v) => write!(f, "{}", v),
    }
  }
}

#[derive(Clone, Copy)]
pub struct FieldBinding {
  pub name: &'static str,
  read: fn(&DetectionRecord) -> FieldValue,
}

impl FieldBinding {
  pub fn read(&self, record: &DetectionRecord) -> FieldValue {
    (self.read)(record)
  }
}

impl fmt::Debug for FieldBinding {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FieldBinding")
      .field("name", &self.name)
      .finish()
  }
}

/// 对外记录的字段绑定。只能通过 [`RecordBindings::establish`] 获得，
/// 持有它即表示绑定已建立，之后只读。
#[derive(Debug, Clone)]
pub struct RecordBindings {
  fields: [FieldBinding; 6],
}

impl RecordBindings {
  pub fn establish() -> Self {
    debug!("建立检测记录字段绑定");
    Self {
      fields: [
        FieldBinding {
          name: "x",
          read: |r| FieldValue::Float(r.x),
        },
        FieldBinding {
          name: "y",
          read: |r| FieldValue::Float(r.y),
        },
        FieldBinding {
          name: "w",
          read: |r| FieldValue::Float(r.w),
        },
        FieldBinding {
          name: "h",
          read: |r| FieldValue::Float(r.h),
        },
        FieldBinding {
          name: "label",
          read: |r| FieldValue::Int(r.label),
        },
        FieldBinding {
          name: "prob",
          read: |r| FieldValue::Float(r.prob),
        },
      ],
    }
  }

  pub fn fields(&self) -> &[FieldBinding] {
    &self.fields
  }

  pub fn field_names(&self) -> Vec<&'static str> {
    self.fields.iter().map(|field| field.name).collect()
  }

  /// 按绑定顺序输出一行逗号分隔的字段值
  pub fn format_row(&self, record: &DetectionRecord) -> String {
    self
      .fields
      .iter()
      .map(|field| field.read(record).to_string())
      .collect::<Vec<_>>()
      .join(", ")
  }

  /// 容器按合并后的总数一次分配，按合并顺序填充
  pub fn marshal(&self, merged: &[Detection]) -> Box<[DetectionRecord]> {
    let mut records = Vec::with_capacity(merged.len());
    records.extend(merged.iter().map(DetectionRecord::from));
    debug!("输出 {} 条检测记录", records.len());
    records.into_boxed_slice()
  }
}

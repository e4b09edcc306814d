// 该文件是 Tingche （停车） 项目的一部分。
// src/output/record_file.rs - 检测记录写入文件
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

use std::{
  fs::File,
  io::{BufWriter, Write},
  path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbNhwcFrame,
  marshal::{DetectionRecord, RecordBindings},
  output::Render,
  task::WithLabel,
};

#[derive(Error, Debug)]
pub enum RecordFileError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct RecordEntry<'a> {
  #[serde(flatten)]
  record: &'a DetectionRecord,
  name: Option<String>,
}

#[derive(Serialize)]
struct RecordDocument<'a> {
  generated_at: DateTime<Utc>,
  width: usize,
  height: usize,
  fields: Vec<&'static str>,
  records: Vec<RecordEntry<'a>>,
}

/// `record:///path/to/out.json` 写 JSON，其他扩展名按行写文本
pub struct RecordFileOutput {
  path: PathBuf,
  bindings: RecordBindings,
}

impl FromUrlWithScheme for RecordFileOutput {
  const SCHEME: &'static str = "record";
}

impl FromUrl for RecordFileOutput {
  type Error = RecordFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(RecordFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(Self::new(uri.path()))
  }
}

impl RecordFileOutput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      bindings: RecordBindings::establish(),
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn is_json(&self) -> bool {
    self
      .path
      .extension()
      .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
  }

  fn write_json(
    &self,
    writer: impl Write,
    frame: &RgbNhwcFrame,
    records: &[DetectionRecord],
  ) -> Result<(), RecordFileError> {
    let document = RecordDocument {
      generated_at: Utc::now(),
      width: frame.width(),
      height: frame.height(),
      fields: self.bindings.field_names(),
      records: records
        .iter()
        .map(|record| RecordEntry {
          record,
          name: record.scene_label().map(|label| label.to_label_str()),
        })
        .collect(),
    };
    serde_json::to_writer_pretty(writer, &document)?;
    Ok(())
  }

  fn write_rows(
    &self,
    mut writer: impl Write,
    records: &[DetectionRecord],
  ) -> Result<(), RecordFileError> {
    writeln!(writer, "# {}", self.bindings.field_names().join(", "))?;
    for record in records {
      let name = record
        .scene_label()
        .map_or_else(|| "unknown".to_string(), |label| label.to_label_str());
      writeln!(writer, "{}: {}", name, self.bindings.format_row(record))?;
    }
    Ok(())
  }
}

impl Render<RgbNhwcFrame, [DetectionRecord]> for RecordFileOutput {
  type Error = RecordFileError;

  fn render_result(
    &self,
    frame: &RgbNhwcFrame,
    result: &[DetectionRecord],
  ) -> Result<(), Self::Error> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(File::create(&self.path)?);
    if self.is_json() {
      self.write_json(&mut writer, frame, result)?;
    } else {
      self.write_rows(&mut writer, result)?;
    }
    writer.flush()?;

    info!("写入 {} 条检测记录到 {}", result.len(), self.path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn records() -> [DetectionRecord; 2] {
    [
      DetectionRecord {
        x: 10.0,
        y: 20.0,
        w: 240.0,
        h: 60.0,
        label: 0,
        prob: 0.875,
      },
      DetectionRecord {
        x: 5.0,
        y: 6.0,
        w: 7.0,
        h: 8.0,
        label: 4,
        prob: 0.5,
      },
    ]
  }

  #[test]
  fn writes_json_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.json");
    let output = RecordFileOutput::new(&path);
    let frame = RgbNhwcFrame::with_shape(480, 640);

    output.render_result(&frame, &records()).unwrap();

    let value: serde_json::Value =
      serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(value["width"], 640);
    assert_eq!(value["height"], 480);
    assert_eq!(value["fields"][4], "label");
    assert_eq!(value["records"][0]["name"], "license_plate");
    assert_eq!(value["records"][1]["label"], 4);
    assert_eq!(value["records"][1]["name"], "occupied");
  }

  #[test]
  fn writes_text_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sub").join("out.txt");
    let url = Url::parse(&format!("record://{}", path.display())).unwrap();
    let output = RecordFileOutput::from_url(&url).unwrap();

    output
      .render_result(&RgbNhwcFrame::with_shape(4, 4), &records())
      .unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines[0], "# x, y, w, h, label, prob");
    assert_eq!(
      lines[1],
      "license_plate: 10.0000, 20.0000, 240.0000, 60.0000, 0, 0.8750"
    );
    assert!(lines[2].starts_with("occupied: "));
  }
}

// 该文件是 Tingche （停车） 项目的一部分。
// src/output/draw.rs - 检测结果可视化
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

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};

use crate::{frame::RgbNhwcFrame, marshal::DetectionRecord, task::WithLabel};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const BOX_THICKNESS: u32 = 3;
const UNKNOWN_LABEL_COLOR: [u8; 3] = [255, 255, 255];
const TEXT_COLOR: [u8; 3] = [255, 255, 255];

pub struct Draw {
  font_size: f32,
  thickness: u32,
  font: Option<FontVec>,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      font_size: LABEL_FONT_SIZE,
      thickness: BOX_THICKNESS,
      font: None,
    }
  }
}

impl Draw {
  /// 提供字体后才绘制 `名称 = 置信度%` 标签
  pub fn with_font(mut self, font: FontVec) -> Self {
    self.font = Some(font);
    self
  }

  pub fn with_thickness(mut self, thickness: u32) -> Self {
    self.thickness = thickness.max(1);
    self
  }

  pub fn draw_detection(&self, frame: &RgbNhwcFrame, records: &[DetectionRecord]) -> RgbImage {
    let mut image = frame.to_rgb_image();
    for record in records {
      self.draw_record(&mut image, record);
    }
    image
  }

  fn draw_record(&self, image: &mut RgbImage, record: &DetectionRecord) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }
    let label = record.scene_label();
    let color = Rgb(label.map_or(UNKNOWN_LABEL_COLOR, |l| l.color()));

    let x_min = (record.x.floor() as i32).clamp(0, w - 1);
    let y_min = (record.y.floor() as i32).clamp(0, h - 1);
    let x_max = ((record.x + record.w).ceil() as i32).clamp(0, w - 1);
    let y_max = ((record.y + record.h).ceil() as i32).clamp(0, h - 1);
    if x_min >= x_max || y_min >= y_max {
      return;
    }

    // 向内加粗边框
    for t in 0..self.thickness as i32 {
      let (rw, rh) = (x_max - x_min - 2 * t, y_max - y_min - 2 * t);
      if rw <= 0 || rh <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(rw as u32, rh as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    let Some(font) = &self.font else {
      return;
    };
    let name = label.map_or_else(|| record.label.to_string(), |l| l.to_label_str());
    let text = format!("{} = {:.1}%", name, record.prob * 100.0);
    let scale = PxScale::from(self.font_size);
    let (text_w, text_h) = text_size(scale, font, &text);
    if text_w == 0 || text_h == 0 {
      return;
    }

    // 标签放在框上方，超出图像时收回到图像内
    let text_x = x_min.min(w - text_w as i32).max(0);
    let text_y = (y_min - text_h as i32).max(0);
    let rect = Rect::at(text_x, text_y).of_size(text_w, text_h);
    draw_filled_rect_mut(image, rect, color);
    draw_text_mut(image, Rgb(TEXT_COLOR), text_x, text_y, scale, font, &text);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::task::SceneLabel;

  #[test]
  fn boxes_use_label_colors() {
    let frame = RgbNhwcFrame::with_shape(50, 50);
    let record = DetectionRecord {
      x: 10.0,
      y: 10.0,
      w: 20.0,
      h: 20.0,
      label: 0,
      prob: 0.9,
    };
    let image = Draw::default().draw_detection(&frame, &[record]);

    assert_eq!(image.get_pixel(10, 10).0, SceneLabel::LicensePlate.color());
    assert_eq!(image.get_pixel(20, 20).0, [0, 0, 0]);
  }

  #[test]
  fn empty_frame_is_returned_unchanged() {
    let frame = RgbNhwcFrame::with_shape(0, 0);
    let record = DetectionRecord {
      x: 1.0,
      y: 1.0,
      w: 5.0,
      h: 5.0,
      label: 0,
      prob: 0.9,
    };
    let image = Draw::default().draw_detection(&frame, &[record]);
    assert_eq!(image.dimensions(), (0, 0));
  }

  #[test]
  fn degenerate_boxes_are_skipped() {
    let frame = RgbNhwcFrame::with_shape(10, 10);
    let record = DetectionRecord {
      x: 5.0,
      y: 5.0,
      w: 0.0,
      h: 0.0,
      label: 3,
      prob: 0.5,
    };
    let image = Draw::default().draw_detection(&frame, &[record]);
    assert!(image.pixels().all(|p| p.0 == [0, 0, 0]));
  }
}

// 该文件是 Tingche （停车） 项目的一部分。
// src/model/yolo.rs - YOLO 通用前后处理
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

use image::{Rgb, RgbImage, imageops};

use crate::{frame::RgbNhwcFrame, model::Detection};

pub const YOLO_INPUT_W: u32 = 640;
pub const YOLO_INPUT_H: u32 = 640;
const LETTERBOX_FILL: u8 = 114;

/// 原图到网络输入的等比缩放与居中填充
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  pub scale: f32,
  pub pad_x: u32,
  pub pad_y: u32,
  pub resized_w: u32,
  pub resized_h: u32,
  src_w: f32,
  src_h: f32,
}

impl Letterbox {
  pub fn fit(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Self {
    let scale = (dst_w as f32 / src_w as f32).min(dst_h as f32 / src_h as f32);
    let resized_w = ((src_w as f32 * scale).round() as u32).clamp(1, dst_w);
    let resized_h = ((src_h as f32 * scale).round() as u32).clamp(1, dst_h);

    Self {
      scale,
      pad_x: (dst_w - resized_w) / 2,
      pad_y: (dst_h - resized_h) / 2,
      resized_w,
      resized_h,
      src_w: src_w as f32,
      src_h: src_h as f32,
    }
  }

  /// 生成 dst_w × dst_h 的网络输入图像
  pub fn apply(&self, frame: &RgbNhwcFrame, dst_w: u32, dst_h: u32) -> RgbImage {
    let resized = imageops::resize(
      &frame.to_rgb_image(),
      self.resized_w,
      self.resized_h,
      imageops::FilterType::Triangle,
    );

    let mut canvas = RgbImage::from_pixel(dst_w, dst_h, Rgb([LETTERBOX_FILL; 3]));
    imageops::replace(
      &mut canvas,
      &resized,
      i64::from(self.pad_x),
      i64::from(self.pad_y),
    );
    canvas
  }

  /// 网络输入坐标 [x_min, y_min, x_max, y_max] 映射回原图，并裁剪到图像范围
  pub fn unmap(&self, bbox: [f32; 4], class_id: u32, confidence: f32) -> Detection {
    let to_src_x = |v: f32| ((v - self.pad_x as f32) / self.scale).clamp(0.0, self.src_w);
    let to_src_y = |v: f32| ((v - self.pad_y as f32) / self.scale).clamp(0.0, self.src_h);

    let x_min = to_src_x(bbox[0]);
    let y_min = to_src_y(bbox[1]);
    let x_max = to_src_x(bbox[2]);
    let y_max = to_src_y(bbox[3]);

    Detection {
      x: x_min,
      y: y_min,
      width: (x_max - x_min).max(0.0),
      height: (y_max - y_min).max(0.0),
      class_id,
      confidence,
    }
  }
}

/// 按类别做非极大值抑制，输出按置信度降序
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
  detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

  let mut result: Vec<Detection> = Vec::new();
  for det in detections {
    let suppressed = result
      .iter()
      .any(|kept| kept.class_id == det.class_id && kept.iou(&det) > iou_threshold);
    if !suppressed {
      result.push(det);
    }
  }

  result
}

pub fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

/// 返回 (最大分数, 类别) ；classes 为空时返回 None
pub fn best_class(scores: impl Iterator<Item = f32>) -> Option<(f32, u32)> {
  scores
    .enumerate()
    .fold(None, |best, (idx, score)| match best {
      Some((best_score, _)) if best_score >= score => best,
      _ => Some((score, idx as u32)),
    })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn det(x: f32, class_id: u32, confidence: f32) -> Detection {
    Detection {
      x,
      y: 0.0,
      width: 10.0,
      height: 10.0,
      class_id,
      confidence,
    }
  }

  #[test]
  fn nms_suppresses_overlaps_within_a_class() {
    let kept = non_max_suppression(
      vec![
        det(0.0, 0, 0.6),
        det(1.0, 0, 0.9),
        det(1.0, 1, 0.5),
        det(30.0, 0, 0.4),
      ],
      0.5,
    );

    assert_eq!(kept.len(), 3);
    assert_eq!(kept[0], det(1.0, 0, 0.9));
    assert_eq!(kept[1], det(1.0, 1, 0.5));
    assert_eq!(kept[2], det(30.0, 0, 0.4));
  }

  #[test]
  fn letterbox_round_trips_box_coordinates() {
    // 1280x640 缩放到 640x640: scale 0.5, 上下各填充 160
    let letterbox = Letterbox::fit(1280, 640, YOLO_INPUT_W, YOLO_INPUT_H);
    assert_eq!(letterbox.scale, 0.5);
    assert_eq!((letterbox.pad_x, letterbox.pad_y), (0, 160));

    let d = letterbox.unmap([50.0, 170.0, 150.0, 220.0], 2, 0.8);
    assert_eq!((d.x, d.y, d.width, d.height), (100.0, 20.0, 200.0, 100.0));
    assert_eq!((d.class_id, d.confidence), (2, 0.8));

    // 超出原图的部分被裁剪
    let d = letterbox.unmap([-10.0, 100.0, 700.0, 700.0], 0, 0.5);
    assert_eq!((d.x, d.y, d.width, d.height), (0.0, 0.0, 1280.0, 640.0));
  }

  #[test]
  fn letterbox_canvas_is_padded() {
    let frame = RgbNhwcFrame::from_raw(2, 4, vec![200; 24]).unwrap();
    let letterbox = Letterbox::fit(4, 2, 8, 8);
    let canvas = letterbox.apply(&frame, 8, 8);
    assert_eq!(canvas.dimensions(), (8, 8));
    assert_eq!(canvas.get_pixel(0, 0).0, [114; 3]);
    assert_eq!(canvas.get_pixel(4, 4).0, [200; 3]);
  }

  #[test]
  fn best_class_picks_first_maximum() {
    assert_eq!(best_class([0.1, 0.7, 0.7, 0.2].into_iter()), Some((0.7, 1)));
    assert_eq!(best_class(std::iter::empty()), None);
  }
}

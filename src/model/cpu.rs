// 该文件是 Tingche （停车） 项目的一部分。
// src/model/cpu.rs - 基于 rten 的 CPU 推理
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

use rten_tensor::NdTensor;
use rten_tensor::prelude::*;
use tracing::{debug, info};

use crate::{
  config::Thresholds,
  frame::{RGB_CHANNELS, RgbNhwcFrame},
  model::{
    Detection, Model, ModelError,
    yolo::{Letterbox, YOLO_INPUT_H, YOLO_INPUT_W, best_class, non_max_suppression},
  },
};

/// 输出张量 [1, 4 + 类别数, 锚点数] 中的框坐标行数 (cx, cy, w, h)
const BOX_ROWS: usize = 4;

/// ONNX 导出并转换为 .rten 的 YOLO11 检测模型
pub struct RtenYolo {
  model: rten::Model,
}

impl RtenYolo {
  pub fn load(data: Vec<u8>) -> Result<Self, ModelError> {
    debug!(
      "模型文件大小: {:.2} MB",
      data.len() as f64 / (1024.0 * 1024.0)
    );
    let model = rten::Model::load(data).map_err(|e| ModelError::ModelInvalid(e.to_string()))?;

    if model.input_ids().len() != 1 {
      return Err(ModelError::ModelInvalid(format!(
        "预期模型输入数量为 1, 实际为 {}",
        model.input_ids().len()
      )));
    }
    info!("rten 模型加载完成");

    Ok(Self { model })
  }

  fn to_input_tensor(canvas: &image::RgbImage) -> NdTensor<f32, 4> {
    let (w, h) = (canvas.width() as usize, canvas.height() as usize);
    let plane = w * h;
    let mut data = vec![0f32; RGB_CHANNELS * plane];
    for (x, y, pixel) in canvas.enumerate_pixels() {
      let idx = y as usize * w + x as usize;
      for c in 0..RGB_CHANNELS {
        data[c * plane + idx] = pixel[c] as f32 / 255.0;
      }
    }
    NdTensor::from_data([1, RGB_CHANNELS, h, w], data)
  }
}

impl Model for RtenYolo {
  fn infer(
    &self,
    frame: &RgbNhwcFrame,
    thresholds: &Thresholds,
  ) -> Result<Vec<Detection>, ModelError> {
    let letterbox = Letterbox::fit(
      frame.width() as u32,
      frame.height() as u32,
      YOLO_INPUT_W,
      YOLO_INPUT_H,
    );
    let input = Self::to_input_tensor(&letterbox.apply(frame, YOLO_INPUT_W, YOLO_INPUT_H));

    debug!("执行模型推理");
    let output = self
      .model
      .run_one(input.view().into(), None)
      .map_err(|e| ModelError::Inference(e.to_string()))?;
    let output =
      NdTensor::<f32, 3>::try_from(output).map_err(|e| ModelError::Inference(e.to_string()))?;

    let [_, rows, anchors] = output.shape();
    if rows <= BOX_ROWS {
      return Err(ModelError::Inference(format!("输出形状无效: {:?}", output.shape())));
    }
    let class_count = rows - BOX_ROWS;

    let mut candidates = Vec::new();
    for a in 0..anchors {
      let Some((score, class_id)) =
        best_class((0..class_count).map(|c| output[[0, BOX_ROWS + c, a]]))
      else {
        continue;
      };
      if score < thresholds.confidence {
        continue;
      }

      let cx = output[[0, 0, a]];
      let cy = output[[0, 1, a]];
      let w = output[[0, 2, a]];
      let h = output[[0, 3, a]];
      candidates.push(letterbox.unmap(
        [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
        class_id,
        score,
      ));
    }

    debug!("NMS 前候选框数量: {}", candidates.len());
    Ok(non_max_suppression(candidates, thresholds.iou))
  }
}

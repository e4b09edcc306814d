// 该文件是 Tingche （停车） 项目的一部分。
// src/model/npu.rs - 基于 RKNPU 的加速推理
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

use rknpu::{Context, InitFlags, TensorFormat, TensorType};
use tracing::{debug, error, info};

use crate::{
  config::Thresholds,
  frame::RgbNhwcFrame,
  model::{
    Detection, Model, ModelError,
    yolo::{Letterbox, YOLO_INPUT_H, YOLO_INPUT_W, best_class, non_max_suppression, sigmoid},
  },
};

const YOLO26_NUM_INPUTS: u32 = 1;
const YOLO26_NUM_OUTPUTS: u32 = 6;
const YOLO26_HEAD_SIZES: [(usize, usize); 3] = [(80, 80), (40, 40), (20, 20)];
const YOLO26_STRIDES: [f32; 3] = [8.0, 16.0, 32.0];

/// 转换为 .rknn 的 YOLO26 检测模型，三个检测头各输出一对回归/分类张量
pub struct RknnYolo {
  context: Context,
}

impl RknnYolo {
  pub fn load(data: &[u8]) -> Result<Self, ModelError> {
    debug!(
      "模型文件大小: {:.2} MB",
      data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 RKNN 推理上下文");
    let context = Context::new(data, InitFlags::default())?;

    match context.sdk_version() {
      Ok(version) => {
        if let Ok(api_ver) = version.api_version() {
          debug!("模型 API 版本: {}", api_ver);
        }
        if let Ok(drv_ver) = version.driver_version() {
          debug!("模型驱动版本: {}", drv_ver);
        }
      }
      Err(e) => {
        error!("查询 SDK 版本失败: {}", e);
        return Err(ModelError::ModelInvalid(format!("无法查询 SDK 版本: {}", e)));
      }
    }

    let num_inputs = context.num_inputs()?;
    let num_outputs = context.num_outputs()?;
    if num_inputs != YOLO26_NUM_INPUTS || num_outputs != YOLO26_NUM_OUTPUTS {
      error!(
        "预期模型输入/输出数量为 {}/{}, 实际为 {}/{}",
        YOLO26_NUM_INPUTS, YOLO26_NUM_OUTPUTS, num_inputs, num_outputs
      );
      return Err(ModelError::ModelInvalid(format!(
        "预期模型输入/输出数量为 {}/{}, 实际为 {}/{}",
        YOLO26_NUM_INPUTS, YOLO26_NUM_OUTPUTS, num_inputs, num_outputs
      )));
    }
    info!("RKNN 模型加载完成");

    Ok(Self { context })
  }
}

/// 根据张量大小区分回归和分类输出，返回 (reg, cls, 类别数)
fn match_reg_cls_tensors<'a>(
  tensor1: &'a [f32],
  tensor2: &'a [f32],
  spatial: usize,
) -> Option<(&'a [f32], &'a [f32], usize)> {
  let reg_expected = 4 * spatial;
  let class_count = |cls: &[f32]| {
    (!cls.is_empty() && cls.len() % spatial == 0).then(|| cls.len() / spatial)
  };

  if tensor1.len() == reg_expected {
    class_count(tensor2).map(|n| (tensor1, tensor2, n))
  } else if tensor2.len() == reg_expected {
    class_count(tensor1).map(|n| (tensor2, tensor1, n))
  } else {
    None
  }
}

impl Model for RknnYolo {
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
    let canvas = letterbox.apply(frame, YOLO_INPUT_W, YOLO_INPUT_H);

    debug!("设置模型输入");
    self
      .context
      .set_input(0, canvas.as_raw(), TensorFormat::NHWC, TensorType::UInt8)?;

    debug!("执行模型推理");
    self.context.run()?;
    let output = self.context.get_outputs()?;

    let mut candidates = Vec::new();
    for (head_idx, (&(map_h, map_w), stride)) in
      YOLO26_HEAD_SIZES.iter().zip(YOLO26_STRIDES).enumerate()
    {
      let spatial = map_h * map_w;
      let tensor1 = output.get_f32(head_idx * 2)?;
      let tensor2 = output.get_f32(head_idx * 2 + 1)?;

      let Some((reg, cls, class_count)) = match_reg_cls_tensors(tensor1, tensor2, spatial) else {
        error!(
          "检测头 {}: 输出大小不匹配 - 张量1: {}, 张量2: {}",
          head_idx,
          tensor1.len(),
          tensor2.len()
        );
        return Err(ModelError::Inference(format!("检测头 {} 输出大小不匹配", head_idx)));
      };

      for h in 0..map_h {
        for w in 0..map_w {
          let idx = h * map_w + w;
          let Some((logit, class_id)) =
            best_class((0..class_count).map(|c| cls[c * spatial + idx]))
          else {
            continue;
          };
          let score = sigmoid(logit);
          if score < thresholds.confidence {
            continue;
          }

          let grid_x = (w as f32) + 0.5;
          let grid_y = (h as f32) + 0.5;
          candidates.push(letterbox.unmap(
            [
              (grid_x - reg[idx]) * stride,
              (grid_y - reg[spatial + idx]) * stride,
              (grid_x + reg[2 * spatial + idx]) * stride,
              (grid_y + reg[3 * spatial + idx]) * stride,
            ],
            class_id,
            score,
          ));
        }
      }
    }

    debug!("NMS 前候选框数量: {}", candidates.len());
    Ok(non_max_suppression(candidates, thresholds.iou))
  }
}

// 该文件是 Tingche （停车） 项目的一部分。
// src/args.rs - 命令行参数
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

use std::path::PathBuf;

use anyhow::bail;
use clap::Args;
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl,
  assets::DirectoryAssets,
  config::{ConfigError, OrchestratorConfig},
  handle::LoadOutcome,
  model::YoloLoader,
  orchestrator::Orchestrator,
  task::Task,
};

/// 各个可执行程序共用的检测参数
#[derive(Args, Debug, Clone)]
pub struct DetectArgs {
  /// 模型资源目录，例如 assets:///opt/tingche/models
  #[arg(long, value_name = "ASSETS")]
  pub assets: Url,
  /// 输入图像，例如 image:///tmp/parking.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出位置
  /// - image:///tmp/out.png?font=/path/to/font.ttf 保存标注后的图像
  /// - record:///tmp/out.json 保存检测记录
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// JSON 配置文件
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,
  /// 车牌模型变体编号
  #[arg(long, default_value_t = 0, value_name = "ID")]
  pub plate_variant: i32,
  /// 车位模型变体编号
  #[arg(long, default_value_t = 0, value_name = "ID")]
  pub slot_variant: i32,
  /// 计算方式: 0 = 通用, 1 = 加速
  #[arg(long, default_value_t = 0, value_name = "MODE")]
  pub compute_mode: i32,
  /// 覆盖两个任务的置信度阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub confidence: Option<f32>,
  /// 覆盖两个任务的 NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub iou: Option<f32>,
  /// 只检测车牌
  #[arg(long)]
  pub no_parking_slot: bool,
}

impl DetectArgs {
  /// 读取配置文件并叠加命令行覆盖项
  pub fn load_config(&self) -> Result<OrchestratorConfig, ConfigError> {
    let mut config = match &self.config {
      Some(path) => OrchestratorConfig::from_json_file(path)?,
      None => OrchestratorConfig::default(),
    };

    for task in Task::ALL {
      let thresholds = &mut config.task_mut(task).thresholds;
      if let Some(confidence) = self.confidence {
        thresholds.confidence = confidence;
      }
      if let Some(iou) = self.iou {
        thresholds.iou = iou;
      }
    }
    if self.no_parking_slot {
      config.parking_slot.enabled = false;
    }

    config.validate()?;
    Ok(config)
  }

  pub fn variant(&self, task: Task) -> i32 {
    match task {
      Task::LicensePlate => self.plate_variant,
      Task::ParkingSlot => self.slot_variant,
    }
  }

  /// 构建编排器并加载所有启用的任务
  pub fn prepare(&self) -> anyhow::Result<Orchestrator<YoloLoader, DirectoryAssets>> {
    info!("模型资源目录: {}", self.assets);
    info!("输入来源: {}", self.input);
    info!("输出路径: {}", self.output);

    let config = self.load_config()?;
    let assets = DirectoryAssets::from_url(&self.assets)?;
    let orchestrator = Orchestrator::builder(YoloLoader::default(), assets)
      .config(config)
      .build();

    for task in Task::ALL {
      if !orchestrator.config().task(task).enabled {
        warn!("{} 已关闭，不加载模型", task);
        continue;
      }
      match orchestrator.try_load(task, self.variant(task), self.compute_mode)? {
        LoadOutcome::Loaded(mode) => info!("{} 使用 {} 计算", task, mode),
        LoadOutcome::AcceleratorUnavailable => {
          bail!("{} 请求加速计算，但设备上没有加速器", task)
        }
      }
    }

    Ok(orchestrator)
  }
}

// 该文件是 Tingche （停车） 项目的一部分。
// src/runner.rs - 运行方式
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

use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::{
  assets::AssetSource,
  frame::RgbNhwcFrame,
  marshal::DetectionRecord,
  model::ModelLoader,
  orchestrator::Orchestrator,
  output::Render,
  pixel::{self, PixelBuffer},
};

/// 计算平均耗时时跳过的预热轮数
const WARMUP_ROUNDS: usize = 2;

pub trait Runner<I, O>: Sized {
  type Error;
  fn run<L: ModelLoader, A: AssetSource>(
    self,
    input: I,
    orchestrator: &Orchestrator<L, A>,
    output: O,
  ) -> Result<(), Self::Error>;
}

pub struct OneShotRunner;

impl<P, RE, I, O> Runner<I, O> for OneShotRunner
where
  P: PixelBuffer,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = P>,
  O: Render<RgbNhwcFrame, [DetectionRecord], Error = RE>,
{
  type Error = anyhow::Error;

  fn run<L: ModelLoader, A: AssetSource>(
    self,
    mut input: I,
    orchestrator: &Orchestrator<L, A>,
    output: O,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let image = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    let frame = pixel::normalize(&image)?;
    info!("输入帧获取成功，开始推理...");
    let now = Instant::now();
    let records = orchestrator.detect_records(&frame)?;
    info!("推理完成，得到 {} 条记录，耗时: {:.2?}", records.len(), now.elapsed());
    output.render_result(&frame, &records)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

pub struct RepeatShotRunner {
  repeat: usize,
}

impl Default for RepeatShotRunner {
  fn default() -> Self {
    Self { repeat: 1000 }
  }
}

impl RepeatShotRunner {
  pub fn with_repeat(mut self, repeat: usize) -> Self {
    self.repeat = repeat;
    self
  }
}

/// 去掉预热轮后的平均值；轮数不够时用全部轮数
pub fn average_after_warmup(times: &[Duration]) -> Option<Duration> {
  let measured = if times.len() > WARMUP_ROUNDS {
    &times[WARMUP_ROUNDS..]
  } else {
    times
  };
  let count = u32::try_from(measured.len()).ok().filter(|&n| n > 0)?;
  Some(measured.iter().sum::<Duration>() / count)
}

impl<P, RE, I, O> Runner<I, O> for RepeatShotRunner
where
  P: PixelBuffer,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = P>,
  O: Render<RgbNhwcFrame, [DetectionRecord], Error = RE>,
{
  type Error = anyhow::Error;

  fn run<L: ModelLoader, A: AssetSource>(
    self,
    mut input: I,
    orchestrator: &Orchestrator<L, A>,
    output: O,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let image = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let mut times = Vec::with_capacity(self.repeat);
    for i in 0..self.repeat {
      let now = Instant::now();
      let frame = pixel::normalize(&image)?;
      let records = orchestrator.detect_records(&frame)?;
      let elapsed = now.elapsed();
      info!("({})推理完成，耗时: {:.2?}", i, elapsed);
      output.render_result(&frame, &records)?;
      info!("({})渲染完成，耗时: {:.2?}", i, now.elapsed());
      times.push(elapsed);
    }

    match average_after_warmup(&times) {
      Some(average) => warn!("平均推理时间: {:.2?}", average),
      None => warn!("没有执行任何推理"),
    }

    Ok(())
  }
}

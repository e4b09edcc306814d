// 该文件是 Tingche （停车） 项目的一部分。
// src/handle.rs - 单任务检测器句柄
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

use std::sync::{Mutex, MutexGuard, PoisonError};
#[cfg(test)]
use std::sync::TryLockError;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  assets::AssetSource,
  config::Thresholds,
  frame::RgbNhwcFrame,
  model::{ComputeMode, Detection, Model, ModelError, ModelLoader},
  task::Task,
};

#[derive(Error, Debug)]
pub enum HandleError {
  #[error("{0} 检测器尚未加载")]
  NotLoaded(Task),
  #[error("{task} 加载模型 {asset} 失败: {source}")]
  Load {
    task: Task,
    asset: String,
    #[source]
    source: ModelError,
  },
  #[error("{task} 推理失败: {source}")]
  Inference {
    task: Task,
    #[source]
    source: ModelError,
  },
  #[error("{0} 检测器锁已中毒")]
  Poisoned(Task),
}

/// load 正常完成后的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
  Loaded(ComputeMode),
  /// 请求了加速器但设备上没有，句柄已卸载
  AcceleratorUnavailable,
}

pub(crate) enum ModelState<M> {
  Unloaded,
  Loaded { model: M, mode: ComputeMode },
}

/// 独占一个任务的模型。load 与 detect 在同一把锁下互斥，不同句柄之间互不阻塞。
pub struct DetectorHandle<M> {
  task: Task,
  state: Mutex<ModelState<M>>,
}

impl<M: Model> DetectorHandle<M> {
  pub fn new(task: Task) -> Self {
    Self {
      task,
      state: Mutex::new(ModelState::Unloaded),
    }
  }

  pub fn task(&self) -> Task {
    self.task
  }

  /// 整个调用期间持有句柄锁。
  ///
  /// 请求加速器但设备上没有时，卸载现有模型并返回
  /// [`LoadOutcome::AcceleratorUnavailable`]，不会降级到通用计算。
  /// 加载失败时保留原有状态。
  pub fn load<L>(
    &self,
    loader: &L,
    assets: &dyn AssetSource,
    asset_name: &str,
    mode: ComputeMode,
  ) -> Result<LoadOutcome, HandleError>
  where
    L: ModelLoader<Model = M>,
  {
    let mut state = self.replace_guard();

    if mode.use_accelerator() && loader.accelerator_count() == 0 {
      warn!("{} 请求加速器但设备上没有可用的加速器，卸载检测器", self.task);
      *state = ModelState::Unloaded;
      return Ok(LoadOutcome::AcceleratorUnavailable);
    }

    info!("{} 加载模型 {} ({})", self.task, asset_name, mode);
    let model = loader
      .load_model(assets, asset_name, mode)
      .map_err(|source| {
        error!("{} 加载模型 {} 失败: {}", self.task, asset_name, source);
        HandleError::Load {
          task: self.task,
          asset: asset_name.to_string(),
          source,
        }
      })?;

    *state = ModelState::Loaded { model, mode };
    info!("{} 模型加载完成", self.task);
    Ok(LoadOutcome::Loaded(mode))
  }

  /// 在句柄锁下转发推理，结果原样返回
  pub fn detect(
    &self,
    frame: &RgbNhwcFrame,
    thresholds: &Thresholds,
  ) -> Result<Vec<Detection>, HandleError> {
    let state = self
      .state
      .lock()
      .map_err(|_| HandleError::Poisoned(self.task))?;

    match &*state {
      ModelState::Unloaded => Err(HandleError::NotLoaded(self.task)),
      ModelState::Loaded { model, .. } => {
        let detections = model
          .infer(frame, thresholds)
          .map_err(|source| HandleError::Inference {
            task: self.task,
            source,
          })?;
        debug!("{} 检测到 {} 个对象", self.task, detections.len());
        Ok(detections)
      }
    }
  }

  pub fn is_loaded(&self) -> bool {
    self.compute_mode().is_some()
  }

  pub fn compute_mode(&self) -> Option<ComputeMode> {
    let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
    match &*state {
      ModelState::Unloaded => None,
      ModelState::Loaded { mode, .. } => Some(*mode),
    }
  }

  pub fn unload(&self) {
    *self.replace_guard() = ModelState::Unloaded;
  }

  /// 句柄锁当前是否被其他调用持有
  #[cfg(test)]
  pub(crate) fn is_busy(&self) -> bool {
    matches!(self.state.try_lock(), Err(TryLockError::WouldBlock))
  }

  /// 整体替换状态时不关心中毒：旧状态会被丢弃
  pub(crate) fn replace_guard(&self) -> MutexGuard<'_, ModelState<M>> {
    let guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
    self.state.clear_poison();
    guard
  }
}

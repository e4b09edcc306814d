// 该文件是 Tingche （停车） 项目的一部分。
// src/orchestrator.rs - 双模型检测编排
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

use std::sync::OnceLock;

use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
  assets::AssetSource,
  config::OrchestratorConfig,
  frame::RgbNhwcFrame,
  handle::{DetectorHandle, HandleError, LoadOutcome, ModelState},
  marshal::{DetectionRecord, RecordBindings},
  model::{ComputeMode, Detection, ModelLoader},
  pixel::{self, PixelBuffer, PixelError},
  registry::{ModelRegistry, RegistryError},
  task::Task,
};

#[derive(Error, Debug)]
pub enum OrchestratorError {
  #[error("模型变体无效: {0}")]
  InvalidVariant(#[from] RegistryError),
  #[error("计算方式编号无效: {0}")]
  InvalidComputeMode(i32),
  #[error("{0} 检测器尚未加载")]
  DetectorNotLoaded(Task),
  #[error("检测器错误: {0}")]
  Handle(HandleError),
  #[error("像素转换错误: {0}")]
  Pixel(#[from] PixelError),
  #[error("检测记录字段绑定尚未建立")]
  BindingsNotEstablished,
  #[error("{task} 检测器输出的类别 {class_id} 超出范围 (共 {class_count} 类)")]
  LabelOutOfRange {
    task: Task,
    class_id: u32,
    class_count: u32,
  },
}

impl From<HandleError> for OrchestratorError {
  fn from(err: HandleError) -> Self {
    match err {
      HandleError::NotLoaded(task) => OrchestratorError::DetectorNotLoaded(task),
      other => OrchestratorError::Handle(other),
    }
  }
}

/// 合并后的检测结果：先是车牌块，再是车位块，车位标签已加偏移
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedDetections {
  items: Vec<Detection>,
  counts: [usize; 2],
}

impl MergedDetections {
  /// outputs 按 [`Task::ALL`] 顺序给出各任务检测器的原始输出。
  /// 类别超出该任务类别数时拒绝合并。
  pub fn merge(outputs: [Vec<Detection>; 2]) -> Result<Self, OrchestratorError> {
    let counts = [outputs[0].len(), outputs[1].len()];
    let mut items = Vec::with_capacity(counts.iter().sum());

    for (task, detections) in Task::ALL.into_iter().zip(outputs) {
      let offset = task.label_offset();
      let class_count = task.class_count();
      for mut det in detections {
        if det.class_id >= class_count {
          error!("{} 检测器输出了超出范围的类别 {}", task, det.class_id);
          return Err(OrchestratorError::LabelOutOfRange {
            task,
            class_id: det.class_id,
            class_count,
          });
        }
        det.class_id += offset;
        items.push(det);
      }
    }

    Ok(Self { items, counts })
  }

  pub fn items(&self) -> &[Detection] {
    &self.items
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn count(&self, task: Task) -> usize {
    self.counts[task.index()]
  }

  /// 某个任务在合并结果中的连续区间
  pub fn block(&self, task: Task) -> &[Detection] {
    let start: usize = self.counts[..task.index()].iter().sum();
    &self.items[start..start + self.count(task)]
  }

  pub fn into_items(self) -> Vec<Detection> {
    self.items
  }
}

pub struct OrchestratorBuilder<L, A> {
  loader: L,
  assets: A,
  registry: ModelRegistry,
  config: OrchestratorConfig,
}

impl<L: ModelLoader, A: AssetSource> OrchestratorBuilder<L, A> {
  pub fn registry(mut self, registry: ModelRegistry) -> Self {
    self.registry = registry;
    self
  }

  pub fn config(mut self, config: OrchestratorConfig) -> Self {
    self.config = config;
    self
  }

  pub fn build(self) -> Orchestrator<L, A> {
    Orchestrator {
      loader: self.loader,
      assets: self.assets,
      registry: self.registry,
      config: self.config,
      license_plate: DetectorHandle::new(Task::LicensePlate),
      parking_slot: DetectorHandle::new(Task::ParkingSlot),
      bindings: OnceLock::new(),
    }
  }
}

/// 持有两个任务的检测器句柄，对同一张图依次执行两个任务并合并结果
pub struct Orchestrator<L: ModelLoader, A> {
  loader: L,
  assets: A,
  registry: ModelRegistry,
  config: OrchestratorConfig,
  license_plate: DetectorHandle<L::Model>,
  parking_slot: DetectorHandle<L::Model>,
  bindings: OnceLock<RecordBindings>,
}

impl<L: ModelLoader, A: AssetSource> Orchestrator<L, A> {
  pub fn builder(loader: L, assets: A) -> OrchestratorBuilder<L, A> {
    OrchestratorBuilder {
      loader,
      assets,
      registry: ModelRegistry::default(),
      config: OrchestratorConfig::default(),
    }
  }

  pub fn new(loader: L, assets: A) -> Self {
    Self::builder(loader, assets).build()
  }

  pub fn config(&self) -> &OrchestratorConfig {
    &self.config
  }

  pub fn registry(&self) -> &ModelRegistry {
    &self.registry
  }

  pub fn handle(&self, task: Task) -> &DetectorHandle<L::Model> {
    match task {
      Task::LicensePlate => &self.license_plate,
      Task::ParkingSlot => &self.parking_slot,
    }
  }

  /// 首次成功加载之后才有值
  pub fn bindings(&self) -> Option<&RecordBindings> {
    self.bindings.get()
  }

  /// 参数校验在触碰句柄之前完成；compute_mode: 0 = 通用, 1 = 加速
  pub fn try_load(
    &self,
    task: Task,
    variant_id: i32,
    compute_mode: i32,
  ) -> Result<LoadOutcome, OrchestratorError> {
    let asset_name = self.registry.resolve(task, variant_id)?;
    let mode =
      ComputeMode::try_from(compute_mode).map_err(OrchestratorError::InvalidComputeMode)?;

    let outcome = self
      .handle(task)
      .load(&self.loader, &self.assets, asset_name, mode)?;
    self.bindings.get_or_init(RecordBindings::establish);

    Ok(outcome)
  }

  /// 加载入口，失败原因记录到日志
  pub fn load(&self, task: Task, variant_id: i32, compute_mode: i32) -> bool {
    match self.try_load(task, variant_id, compute_mode) {
      Ok(_) => true,
      Err(e) => {
        error!("{} 加载失败: {}", task, e);
        false
      }
    }
  }

  /// 检测入口：规范化图像，执行两个任务，输出合并后的记录
  pub fn detect<P: PixelBuffer>(
    &self,
    image: &P,
  ) -> Result<Box<[DetectionRecord]>, OrchestratorError> {
    let frame = pixel::normalize(image)?;
    self.detect_records(&frame)
  }

  /// 对已规范化的帧检测并按字段绑定输出记录
  pub fn detect_records(
    &self,
    frame: &RgbNhwcFrame,
  ) -> Result<Box<[DetectionRecord]>, OrchestratorError> {
    let merged = self.detect_frame(frame)?;
    let bindings = self
      .bindings
      .get()
      .ok_or(OrchestratorError::BindingsNotEstablished)?;
    Ok(bindings.marshal(merged.items()))
  }

  pub fn detect_frame(
    &self,
    frame: &RgbNhwcFrame,
  ) -> Result<MergedDetections, OrchestratorError> {
    let mut outputs: [Vec<Detection>; 2] = Default::default();

    for task in Task::ALL {
      let task_config = self.config.task(task);
      if !task_config.enabled {
        debug!("{} 已关闭，跳过", task);
        continue;
      }
      debug!("运行 {} 检测", task);
      outputs[task.index()] = self.handle(task).detect(frame, &task_config.thresholds)?;
    }

    debug!("合并检测结果");
    let merged = MergedDetections::merge(outputs)?;
    debug!(
      "检测完成: 车牌 {} 个, 车位 {} 个",
      merged.count(Task::LicensePlate),
      merged.count(Task::ParkingSlot)
    );
    Ok(merged)
  }
}

impl<L: ModelLoader, A> Orchestrator<L, A> {
  /// 按任务顺序依次锁住两个句柄并卸载模型
  pub fn shutdown(&self) {
    let mut plate = self.license_plate.replace_guard();
    let mut slot = self.parking_slot.replace_guard();
    *plate = ModelState::Unloaded;
    *slot = ModelState::Unloaded;
    info!("检测器已全部卸载");
  }
}

impl<L: ModelLoader, A> Drop for Orchestrator<L, A> {
  fn drop(&mut self) {
    self.shutdown();
  }
}

#[cfg(test)]
mod tests {
  use std::{
    sync::mpsc,
    thread,
    time::{Duration, Instant},
  };

  use super::*;
  use crate::{
    assets::AssetError,
    config::Thresholds,
    model::{ModelError, Model},
  };

  const WAIT: Duration = Duration::from_secs(5);

  struct FixedModel(Vec<Detection>);

  impl Model for FixedModel {
    fn infer(
      &self,
      _frame: &RgbNhwcFrame,
      _thresholds: &Thresholds,
    ) -> Result<Vec<Detection>, ModelError> {
      Ok(self.0.clone())
    }
  }

  struct FixedLoader;

  impl ModelLoader for FixedLoader {
    type Model = FixedModel;

    fn accelerator_count(&self) -> usize {
      0
    }

    fn load_model(
      &self,
      _assets: &dyn AssetSource,
      asset_name: &str,
      _mode: ComputeMode,
    ) -> Result<Self::Model, ModelError> {
      let class_id = if asset_name.contains("slot") { 2 } else { 0 };
      Ok(FixedModel(vec![det(class_id)]))
    }
  }

  struct NoAssets;

  impl AssetSource for NoAssets {
    fn read(&self, name: &str) -> Result<Vec<u8>, AssetError> {
      Err(AssetError::NotFound(name.to_string()))
    }
  }

  fn det(class_id: u32) -> Detection {
    Detection {
      x: 1.0,
      y: 2.0,
      width: 3.0,
      height: 4.0,
      class_id,
      confidence: 0.9,
    }
  }

  fn loaded() -> Orchestrator<FixedLoader, NoAssets> {
    let orchestrator = Orchestrator::new(FixedLoader, NoAssets);
    for task in Task::ALL {
      assert!(orchestrator.load(task, 0, 0));
    }
    orchestrator
  }

  #[test]
  fn merge_offsets_slot_labels_once() {
    let merged = MergedDetections::merge([vec![det(0)], vec![det(2), det(5)]]).unwrap();
    let labels: Vec<_> = merged.items().iter().map(|d| d.class_id).collect();
    assert_eq!(labels, [0, 3, 6]);
    assert_eq!(merged.block(Task::ParkingSlot).len(), 2);
  }

  #[test]
  fn merge_rejects_labels_outside_the_task_range() {
    assert!(matches!(
      MergedDetections::merge([vec![det(1)], Vec::new()]),
      Err(OrchestratorError::LabelOutOfRange {
        task: Task::LicensePlate,
        class_id: 1,
        class_count: 1,
      })
    ));
    assert!(matches!(
      MergedDetections::merge([Vec::new(), vec![det(u32::MAX)]]),
      Err(OrchestratorError::LabelOutOfRange {
        task: Task::ParkingSlot,
        ..
      })
    ));
  }

  #[test]
  fn busy_plate_handle_does_not_block_parking_slot() {
    let orchestrator = loaded();
    let frame = RgbNhwcFrame::with_shape(8, 8);
    let thresholds = Thresholds::default();

    let plate_guard = orchestrator.license_plate.replace_guard();
    let (tx, rx) = mpsc::channel();
    thread::scope(|s| {
      s.spawn(|| {
        let detected = orchestrator.parking_slot.detect(&frame, &thresholds);
        let reloaded = orchestrator.try_load(Task::ParkingSlot, 0, 0);
        let _ = tx.send((detected.is_ok(), reloaded.is_ok()));
      });

      let finished = rx.recv_timeout(WAIT);
      drop(plate_guard);
      assert_eq!(finished, Ok((true, true)));
    });
  }

  #[test]
  fn shutdown_locks_plate_before_slot() {
    let orchestrator = loaded();

    let slot_guard = orchestrator.parking_slot.replace_guard();
    thread::scope(|s| {
      s.spawn(|| orchestrator.shutdown());

      // shutdown 拿到车牌锁后停在车位锁上
      let deadline = Instant::now() + WAIT;
      while !orchestrator.license_plate.is_busy() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
      }
      let plate_taken_first = orchestrator.license_plate.is_busy();
      drop(slot_guard);
      assert!(plate_taken_first);
    });

    assert!(Task::ALL.iter().all(|&task| !orchestrator.handle(task).is_loaded()));
  }
}

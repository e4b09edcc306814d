use std::{
  collections::HashMap,
  sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  },
};

use image::{Rgba, RgbaImage};
use tingche::{
  assets::{AssetError, AssetSource},
  config::Thresholds,
  frame::RgbNhwcFrame,
  model::{ComputeMode, Detection, Model, ModelError, ModelLoader},
  registry::{LICENSE_PLATE_VARIANTS, PARKING_SLOT_VARIANTS},
};

pub const PLATE_ASSET: &str = LICENSE_PLATE_VARIANTS[0];
pub const SLOT_ASSET: &str = PARKING_SLOT_VARIANTS[0];

pub fn detection(x: f32, y: f32, w: f32, h: f32, class_id: u32, confidence: f32) -> Detection {
  Detection {
    x,
    y,
    width: w,
    height: h,
    class_id,
    confidence,
  }
}

/// 内存中的模型资源，内容即资源名
#[derive(Default)]
pub struct MemoryAssets {
  files: HashMap<String, Vec<u8>>,
}

impl MemoryAssets {
  pub fn with(mut self, name: &str) -> Self {
    self.files.insert(name.to_string(), name.as_bytes().to_vec());
    self
  }

  /// 默认注册表中两个任务的资源
  pub fn scene() -> Self {
    Self::default().with(PLATE_ASSET).with(SLOT_ASSET)
  }
}

impl AssetSource for MemoryAssets {
  fn read(&self, name: &str) -> Result<Vec<u8>, AssetError> {
    self
      .files
      .get(name)
      .cloned()
      .ok_or_else(|| AssetError::NotFound(name.to_string()))
  }
}

#[derive(Clone)]
pub enum Behavior {
  Detect(Vec<Detection>),
  Panic,
}

/// 按资源名返回预设输出的模型
pub struct ScriptedModel {
  pub asset: String,
  pub mode: ComputeMode,
  behavior: Behavior,
}

impl Model for ScriptedModel {
  fn infer(
    &self,
    _frame: &RgbNhwcFrame,
    thresholds: &Thresholds,
  ) -> Result<Vec<Detection>, ModelError> {
    match &self.behavior {
      Behavior::Detect(detections) => Ok(
        detections
          .iter()
          .filter(|det| det.confidence >= thresholds.confidence)
          .copied()
          .collect(),
      ),
      Behavior::Panic => panic!("scripted model {} panicked", self.asset),
    }
  }
}

#[derive(Default)]
pub struct ScriptedLoader {
  accelerators: usize,
  scripts: HashMap<String, Behavior>,
  loads: Arc<AtomicUsize>,
}

impl ScriptedLoader {
  pub fn script(mut self, asset: &str, detections: Vec<Detection>) -> Self {
    self
      .scripts
      .insert(asset.to_string(), Behavior::Detect(detections));
    self
  }

  pub fn panicking(mut self, asset: &str) -> Self {
    self.scripts.insert(asset.to_string(), Behavior::Panic);
    self
  }

  pub fn with_accelerators(mut self, count: usize) -> Self {
    self.accelerators = count;
    self
  }

  /// load_model 被调用的次数
  pub fn load_counter(&self) -> Arc<AtomicUsize> {
    Arc::clone(&self.loads)
  }

  /// 车牌检测一个框，车位检测一个框
  pub fn scene() -> Self {
    Self::default()
      .script(PLATE_ASSET, vec![detection(10.0, 20.0, 30.0, 40.0, 0, 0.9)])
      .script(SLOT_ASSET, vec![detection(1.0, 2.0, 3.0, 4.0, 2, 0.7)])
  }
}

impl ModelLoader for ScriptedLoader {
  type Model = ScriptedModel;

  fn accelerator_count(&self) -> usize {
    self.accelerators
  }

  fn load_model(
    &self,
    assets: &dyn AssetSource,
    asset_name: &str,
    mode: ComputeMode,
  ) -> Result<Self::Model, ModelError> {
    self.loads.fetch_add(1, Ordering::SeqCst);
    assets.read(asset_name)?;
    let behavior = self
      .scripts
      .get(asset_name)
      .cloned()
      .unwrap_or(Behavior::Detect(Vec::new()));
    Ok(ScriptedModel {
      asset: asset_name.to_string(),
      mode,
      behavior,
    })
  }
}

pub fn loads(counter: &AtomicUsize) -> usize {
  counter.load(Ordering::SeqCst)
}

/// 64x48 的纯色 RGBA 图像
pub fn sample_image() -> RgbaImage {
  RgbaImage::from_pixel(64, 48, Rgba([40, 80, 120, 255]))
}

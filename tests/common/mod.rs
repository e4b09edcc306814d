mod fixtures;
pub use fixtures::*;

// 测试中常用的类型
pub use tingche::{
  DetectionRecord, LoadOutcome, Orchestrator, OrchestratorError, Task,
  assets::{AssetError, AssetSource},
  config::{OrchestratorConfig, Thresholds},
  frame::RgbNhwcFrame,
  model::{ComputeMode, Detection, Model, ModelError, ModelLoader},
  registry::ModelRegistry,
};

pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod labels;
pub mod model;
pub mod pipeline;
pub mod validation;
pub mod walkforward;

// Re-export commonly used types
pub use config::{LabelConfig, PipelineConfig, TrainerConfig};
pub use data::{DataLoader, FeaturePanel, LabelPanel, PanelKey, PredictionPanel, PricePanel, ScalarPanel};
pub use error::{PipelineError, PipelineResult};
pub use features::{FeatureEngine, FeatureKind, FeatureSpec};
pub use labels::LabelEngine;
pub use model::{ModelError, RidgeRegression, StandardScaler};
pub use pipeline::{Pipeline, PipelineOutput, PipelineReport};
pub use validation::{IntegrityReport, PanelIntegrityValidator};
pub use walkforward::{StepSummary, WalkForwardRun, WalkForwardTrainer};

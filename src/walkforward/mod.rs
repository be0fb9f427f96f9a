//! Walk-forward training module.
//!
//! Implements the sliding-window train-then-predict loop:
//! - Train: the trailing `train_window` distinct label dates, all assets pooled
//! - Test: the single next date
//! - Roll: one date per step, refitting scaler and model from scratch

pub mod steps;
pub mod trainer;

pub use steps::{WalkForwardStep, WalkForwardSteps};
pub use trainer::{StepBatch, StepSummary, WalkForwardDataset, WalkForwardRun, WalkForwardTrainer};

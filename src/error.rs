//! Error taxonomy for the feature, label and walk-forward stages.

use thiserror::Error;

use crate::model::ModelError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// A panel had no rows where rows are required.
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// Not enough distinct label dates to run a single walk-forward step.
    #[error(
        "Insufficient history: {label_dates} distinct label dates, training window needs more than {train_window}"
    )]
    InsufficientHistory {
        label_dates: usize,
        train_window: usize,
    },

    /// A key expected in one panel is absent from another.
    #[error("Alignment error: {0}")]
    Alignment(String),

    /// A price panel violated one of its structural invariants.
    #[error("Invalid panel: {0}")]
    InvalidPanel(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Model error: {0}")]
    Model(String),
}

impl From<ModelError> for PipelineError {
    fn from(err: ModelError) -> Self {
        PipelineError::Model(err.to_string())
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

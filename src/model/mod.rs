//! Regression model and feature scaling used inside each walk-forward step.

pub mod ridge;
pub mod scaler;

use thiserror::Error;

pub use ridge::RidgeRegression;
pub use scaler::StandardScaler;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Model has not been fitted yet")]
    NotFitted,

    #[error("Training set is empty")]
    EmptyTrainingSet,

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Invalid alpha value: {0}")]
    InvalidAlpha(f64),

    #[error("Computation error: {0}")]
    Computation(String),
}

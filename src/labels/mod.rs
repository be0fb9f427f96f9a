//! Forward-return labels aligned to the feature key set.

pub mod engine;

pub use engine::{forward_returns, LabelEngine};

//! Feature engineering over the price panel.
//!
//! Produces leakage-free trailing features:
//! - Momentum: simple return over a trailing window
//! - Volatility: sample standard deviation of daily returns over a trailing window

pub mod engine;

pub use engine::{daily_returns, momentum, validate_specs, volatility, FeatureEngine, FeatureKind, FeatureSpec};

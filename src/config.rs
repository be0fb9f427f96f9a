//! Pipeline configuration.
//!
//! Every tunable of the pipeline lives here and is handed to each stage
//! explicitly; there is no process-wide state. Defaults reproduce the research
//! setup: 20 large caps, 1m/3m momentum and 20-day volatility, a 21-day label
//! horizon and a three-year (756 trading day) ridge training window.

use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use crate::features::{validate_specs, FeatureSpec};

/// Trading days per year used to size the default training window.
pub const TRADING_DAYS_PER_YEAR: usize = 252;

/// Default asset universe.
pub const DEFAULT_UNIVERSE: &[&str] = &[
    "AAPL", "MSFT", "AMZN", "GOOGL", "META", "NVDA", "TSLA", "JPM", "JNJ", "V", "PG", "UNH", "HD",
    "MA", "BAC", "XOM", "CVX", "KO", "PEP", "DIS",
];

/// Label construction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelConfig {
    /// Forward-return horizon in trading days.
    pub horizon: usize,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self { horizon: 21 }
    }
}

/// Walk-forward trainer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Number of distinct label dates in each sliding training window.
    pub train_window: usize,

    /// L2 penalty strength of the ridge regression.
    pub ridge_alpha: f64,

    /// Run walk-forward steps on the rayon thread pool.
    #[serde(default = "default_true")]
    pub parallel: bool,
}

fn default_true() -> bool {
    true
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            train_window: 3 * TRADING_DAYS_PER_YEAR,
            ridge_alpha: 1.0,
            parallel: true,
        }
    }
}

impl TrainerConfig {
    pub fn validate(&self) -> PipelineResult<()> {
        if self.train_window == 0 {
            return Err(PipelineError::InvalidConfig(
                "train_window must be at least 1".to_string(),
            ));
        }
        if !self.ridge_alpha.is_finite() || self.ridge_alpha <= 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "ridge_alpha must be finite and positive, got {}",
                self.ridge_alpha
            )));
        }
        Ok(())
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Assets to keep from the price file. Empty keeps every asset.
    #[serde(default)]
    pub universe: Vec<String>,

    /// First date (inclusive) of the price history to use.
    #[serde(default)]
    pub start_date: Option<NaiveDate>,

    /// Last date (inclusive) of the price history to use.
    #[serde(default)]
    pub end_date: Option<NaiveDate>,

    /// Forward-fill and drop incomplete dates when loading prices.
    #[serde(default)]
    pub clean_prices: bool,

    /// Engineered features, in output column order.
    pub features: Vec<FeatureSpec>,

    #[serde(default)]
    pub labels: LabelConfig,

    #[serde(default)]
    pub trainer: TrainerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            universe: DEFAULT_UNIVERSE.iter().map(|s| s.to_string()).collect(),
            start_date: NaiveDate::from_ymd_opt(2018, 1, 1),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            clean_prices: false,
            features: vec![
                FeatureSpec::momentum("mom_1m", 21),
                FeatureSpec::momentum("mom_3m", 63),
                FeatureSpec::volatility("vol_20d", 20),
            ],
            labels: LabelConfig::default(),
            trainer: TrainerConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> PipelineResult<Self> {
        toml::from_str(content).map_err(|e| PipelineError::InvalidConfig(e.to_string()))
    }

    /// Load from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> PipelineResult<String> {
        toml::to_string_pretty(self).map_err(|e| PipelineError::InvalidConfig(e.to_string()))
    }

    /// Check every parameter before any stage runs.
    pub fn validate(&self) -> PipelineResult<()> {
        validate_specs(&self.features)?;

        if self.labels.horizon == 0 {
            return Err(PipelineError::InvalidConfig(
                "label horizon must be at least 1".to_string(),
            ));
        }

        self.trainer.validate()?;

        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(PipelineError::InvalidConfig(format!(
                    "start_date {} is after end_date {}",
                    start, end
                )));
            }
        }

        Ok(())
    }
}

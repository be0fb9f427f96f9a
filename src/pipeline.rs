//! End-to-end pipeline: prices → features → labels → walk-forward predictions.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::PipelineConfig;
use crate::data::{FeaturePanel, LabelPanel, PricePanel};
use crate::error::PipelineResult;
use crate::features::FeatureEngine;
use crate::labels::LabelEngine;
use crate::validation::{IntegrityReport, PanelIntegrityValidator};
use crate::walkforward::{WalkForwardRun, WalkForwardTrainer};

/// All panels derived from one price panel.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub features: FeaturePanel,
    pub labels: LabelPanel,
    pub run: WalkForwardRun,
}

/// Row count and date span of one panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelSummary {
    pub rows: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
}

impl PanelSummary {
    fn new(rows: usize, range: Option<(NaiveDate, NaiveDate)>) -> Self {
        Self {
            rows,
            first_date: range.map(|r| r.0),
            last_date: range.map(|r| r.1),
        }
    }
}

/// Serializable summary of a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub assets: usize,
    pub price_dates: usize,
    pub feature_names: Vec<String>,
    pub features: PanelSummary,
    pub labels: PanelSummary,
    pub predictions: PanelSummary,
    pub steps: usize,
    /// Training rows summed over every step.
    pub train_rows: usize,
    pub train_window: usize,
    pub ridge_alpha: f64,
    /// Steps where at least one feature column had zero variance.
    pub degenerate_steps: usize,
    pub integrity_passed: bool,
}

impl PipelineOutput {
    /// Check the containment chain and every step window against `prices`.
    pub fn validate(&self, prices: &PricePanel, train_window: usize) -> IntegrityReport {
        PanelIntegrityValidator::new()
            .check_prices(prices)
            .check_features(&self.features, prices)
            .check_labels(&self.labels, &self.features)
            .check_predictions(&self.run.predictions, &self.labels)
            .check_steps(&self.run.steps, &self.run.predictions, train_window)
            .finish()
    }

    pub fn report(&self, prices: &PricePanel, config: &PipelineConfig) -> PipelineReport {
        let integrity = self.validate(prices, config.trainer.train_window);
        PipelineReport {
            assets: prices.assets().len(),
            price_dates: prices.len(),
            feature_names: self.features.names().to_vec(),
            features: PanelSummary::new(self.features.len(), self.features.date_range()),
            labels: PanelSummary::new(self.labels.len(), self.labels.date_range()),
            predictions: PanelSummary::new(
                self.run.predictions.len(),
                self.run.predictions.date_range(),
            ),
            steps: self.run.steps.len(),
            train_rows: self.run.total_train_rows(),
            train_window: config.trainer.train_window,
            ridge_alpha: config.trainer.ridge_alpha,
            degenerate_steps: self.run.degenerate_steps(),
            integrity_passed: integrity.all_passed(),
        }
    }
}

/// Runs the three stages with one configuration.
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn feature_engine(&self) -> FeatureEngine {
        FeatureEngine::new(self.config.features.clone())
    }

    pub fn label_engine(&self) -> LabelEngine {
        LabelEngine::new(self.config.labels.horizon)
    }

    pub fn trainer(&self) -> WalkForwardTrainer {
        WalkForwardTrainer::new(self.config.trainer.clone())
    }

    /// Validate the configuration, then build features, labels and predictions.
    pub fn run(&self, prices: &PricePanel) -> PipelineResult<PipelineOutput> {
        self.config.validate()?;

        info!(
            "Running pipeline on {} assets x {} dates",
            prices.assets().len(),
            prices.len()
        );

        let features = self.feature_engine().compute(prices)?;
        let labels = self.label_engine().compute(prices, &features)?;
        let run = self.trainer().run(&features, &labels)?;

        Ok(PipelineOutput {
            features,
            labels,
            run,
        })
    }
}

//! Forward-return label construction.

use tracing::{debug, info};

use crate::data::{FeaturePanel, LabelPanel, PanelKey, PricePanel, ScalarPanel, LABEL_COLUMN};
use crate::error::{PipelineError, PipelineResult};

/// `price[t + horizon] / price[t] - 1`; missing for the last `horizon` dates.
pub fn forward_returns(prices: &[Option<f64>], horizon: usize) -> Vec<Option<f64>> {
    (0..prices.len())
        .map(|t| {
            let ahead = t
                .checked_add(horizon)
                .and_then(|i| prices.get(i))
                .copied()
                .flatten();
            match (prices[t], ahead) {
                (Some(now), Some(later)) if horizon > 0 => Some(later / now - 1.0),
                _ => None,
            }
        })
        .collect()
}

/// Builds a [`LabelPanel`] restricted to the keys of a [`FeaturePanel`].
#[derive(Debug, Clone, Copy)]
pub struct LabelEngine {
    horizon: usize,
}

impl LabelEngine {
    pub fn new(horizon: usize) -> Self {
        Self { horizon }
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// Compute labels for every feature key whose forward return is defined.
    ///
    /// The join is by (date, asset): a feature key outside the price panel's
    /// domain is an alignment error, and a label that could be computed for a
    /// key without features is never emitted.
    pub fn compute(
        &self,
        prices: &PricePanel,
        features: &FeaturePanel,
    ) -> PipelineResult<LabelPanel> {
        if self.horizon == 0 {
            return Err(PipelineError::InvalidConfig(
                "label horizon must be at least 1 trading day".to_string(),
            ));
        }
        if prices.is_empty() {
            return Err(PipelineError::EmptyInput(
                "price panel has no rows".to_string(),
            ));
        }
        if features.is_empty() {
            return Err(PipelineError::EmptyInput(
                "feature panel is empty; no keys to label".to_string(),
            ));
        }

        let returns: Vec<Vec<Option<f64>>> = (0..prices.assets().len())
            .map(|idx| forward_returns(prices.series_at(idx), self.horizon))
            .collect();

        let mut labels = ScalarPanel::new(LABEL_COLUMN);
        let mut undefined = 0usize;

        for key in features.keys() {
            let (date_idx, asset_idx) = locate(prices, key)?;
            match returns[asset_idx][date_idx] {
                Some(value) if value.is_finite() => labels.insert(key.clone(), value)?,
                _ => undefined += 1,
            }
        }

        debug!(
            "Dropped {} feature keys whose {}-day forward return is undefined",
            undefined, self.horizon
        );

        match labels.date_range() {
            Some((first, last)) => info!(
                "Built {} labels with horizon {} ({} to {})",
                labels.len(),
                self.horizon,
                first,
                last
            ),
            None => info!("Label panel is empty with horizon {}", self.horizon),
        }

        Ok(labels)
    }
}

fn locate(prices: &PricePanel, key: &PanelKey) -> PipelineResult<(usize, usize)> {
    let date_idx = prices.date_index(key.date).ok_or_else(|| {
        PipelineError::Alignment(format!("feature key {} has a date outside the price panel", key))
    })?;
    let asset_idx = prices.asset_index(&key.asset).ok_or_else(|| {
        PipelineError::Alignment(format!("feature key {} has an asset outside the price panel", key))
    })?;
    Ok((date_idx, asset_idx))
}

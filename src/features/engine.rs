//! Momentum and volatility features over a price panel.
//!
//! Each feature is computed per asset along the panel's date axis, reshaped to
//! long (date, asset) form and inner-joined across feature names: a row is
//! emitted only when every configured feature has a value. Warm-up gaps and
//! missing prices are never imputed.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::info;

use crate::data::{FeaturePanel, PanelKey, PricePanel};
use crate::error::{PipelineError, PipelineResult};

/// Kind of engineered feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    /// Trailing simple return over the window.
    Momentum,
    /// Sample standard deviation of daily simple returns over the window.
    Volatility,
}

impl FeatureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Momentum => "momentum",
            Self::Volatility => "volatility",
        }
    }

    /// Smallest window for which the feature is ever defined.
    pub fn min_window(&self) -> usize {
        match self {
            Self::Momentum => 1,
            Self::Volatility => 2,
        }
    }
}

/// A named feature with its trailing window in trading days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    pub kind: FeatureKind,
    pub window: usize,
}

impl FeatureSpec {
    pub fn momentum(name: impl Into<String>, window: usize) -> Self {
        Self {
            name: name.into(),
            kind: FeatureKind::Momentum,
            window,
        }
    }

    pub fn volatility(name: impl Into<String>, window: usize) -> Self {
        Self {
            name: name.into(),
            kind: FeatureKind::Volatility,
            window,
        }
    }

    /// Evaluate the feature for one asset's price series.
    pub fn evaluate(&self, prices: &[Option<f64>]) -> Vec<Option<f64>> {
        match self.kind {
            FeatureKind::Momentum => momentum(prices, self.window),
            FeatureKind::Volatility => volatility(prices, self.window),
        }
    }
}

/// Validate a feature list: non-empty, unique names, usable windows.
pub fn validate_specs(specs: &[FeatureSpec]) -> PipelineResult<()> {
    if specs.is_empty() {
        return Err(PipelineError::InvalidConfig(
            "at least one feature must be configured".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for spec in specs {
        if spec.name.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "feature names must not be empty".to_string(),
            ));
        }
        if !seen.insert(spec.name.as_str()) {
            return Err(PipelineError::InvalidConfig(format!(
                "duplicate feature name {}",
                spec.name
            )));
        }
        if spec.window < spec.kind.min_window() {
            return Err(PipelineError::InvalidConfig(format!(
                "{} feature {} needs a window of at least {}, got {}",
                spec.kind.as_str(),
                spec.name,
                spec.kind.min_window(),
                spec.window
            )));
        }
    }
    Ok(())
}

/// Builds a [`FeaturePanel`] from a [`PricePanel`].
#[derive(Debug, Clone)]
pub struct FeatureEngine {
    specs: Vec<FeatureSpec>,
}

impl FeatureEngine {
    pub fn new(specs: Vec<FeatureSpec>) -> Self {
        Self { specs }
    }

    pub fn specs(&self) -> &[FeatureSpec] {
        &self.specs
    }

    /// Largest configured window.
    pub fn max_window(&self) -> usize {
        self.specs.iter().map(|s| s.window).max().unwrap_or(0)
    }

    pub fn compute(&self, prices: &PricePanel) -> PipelineResult<FeaturePanel> {
        validate_specs(&self.specs)?;

        if prices.is_empty() {
            return Err(PipelineError::EmptyInput(
                "price panel has no rows".to_string(),
            ));
        }

        let names = self.specs.iter().map(|s| s.name.clone()).collect();
        let mut panel = FeaturePanel::new(names);

        for (asset_idx, asset) in prices.assets().iter().enumerate() {
            let series = prices.series_at(asset_idx);
            let columns: Vec<Vec<Option<f64>>> =
                self.specs.iter().map(|spec| spec.evaluate(series)).collect();

            for (date_idx, date) in prices.dates().iter().enumerate() {
                let row: Option<Vec<f64>> = columns
                    .iter()
                    .map(|column| column[date_idx].filter(|v| v.is_finite()))
                    .collect();

                if let Some(values) = row {
                    panel.insert(PanelKey::new(*date, asset.clone()), values)?;
                }
            }
        }

        match panel.date_range() {
            Some((first, last)) => info!(
                "Built {} feature rows x {} features ({} to {})",
                panel.len(),
                panel.names().len(),
                first,
                last
            ),
            None => info!(
                "Feature panel is empty: {} dates, largest window {}",
                prices.len(),
                self.max_window()
            ),
        }

        Ok(panel)
    }
}

/// `price[t] / price[t - window] - 1`; missing for the first `window` dates.
pub fn momentum(prices: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    (0..prices.len())
        .map(|t| {
            if window == 0 || t < window {
                return None;
            }
            match (prices[t], prices[t - window]) {
                (Some(now), Some(then)) => Some(now / then - 1.0),
                _ => None,
            }
        })
        .collect()
}

/// Daily simple returns; the first entry is always missing.
pub fn daily_returns(prices: &[Option<f64>]) -> Vec<Option<f64>> {
    momentum(prices, 1)
}

/// Sample standard deviation of the trailing `window` daily returns.
///
/// Needs `window + 1` trailing prices and every return in the window present.
pub fn volatility(prices: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let returns = daily_returns(prices);

    (0..prices.len())
        .map(|t| {
            if window < 2 || t < window {
                return None;
            }
            let trailing: Option<Vec<f64>> = returns[t + 1 - window..=t].iter().copied().collect();
            trailing.map(|r| r.std_dev()).filter(|v| v.is_finite())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dates(n: usize) -> Vec<NaiveDate> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..n)
            .map(|i| start + chrono::Duration::days(i as i64))
            .collect()
    }

    fn series(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().map(|v| Some(*v)).collect()
    }

    #[test]
    fn test_momentum_values_and_warmup() {
        let prices = series(&[100.0, 110.0, 121.0, 133.1]);
        let mom = momentum(&prices, 2);

        assert_eq!(mom[0], None);
        assert_eq!(mom[1], None);
        assert!((mom[2].unwrap() - 0.21).abs() < 1e-12);
        assert!((mom[3].unwrap() - 0.21).abs() < 1e-12);
    }

    #[test]
    fn test_momentum_missing_price_propagates() {
        let prices = vec![Some(100.0), None, Some(120.0), Some(130.0)];
        let mom = momentum(&prices, 1);
        assert_eq!(mom[1], None);
        assert_eq!(mom[2], None);
        assert!((mom[3].unwrap() - (130.0 / 120.0 - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_volatility_needs_window_plus_one_prices() {
        let prices = series(&[100.0, 101.0, 99.0, 102.0, 103.0]);
        let vol = volatility(&prices, 3);

        assert_eq!(vol[0], None);
        assert_eq!(vol[1], None);
        assert_eq!(vol[2], None);
        assert!(vol[3].is_some());
        assert!(vol[4].is_some());
    }

    #[test]
    fn test_volatility_matches_sample_std() {
        let prices = series(&[100.0, 110.0, 99.0, 108.9]);
        let vol = volatility(&prices, 3);

        let r = [0.1, 99.0 / 110.0 - 1.0, 108.9 / 99.0 - 1.0];
        let mean = r.iter().sum::<f64>() / 3.0;
        let var = r.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / 2.0;
        assert!((vol[3].unwrap() - var.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_volatility_of_constant_prices_is_zero() {
        let prices = series(&[50.0; 6]);
        let vol = volatility(&prices, 3);
        assert_eq!(vol[5], Some(0.0));
    }

    #[test]
    fn test_inner_join_drops_partial_rows() {
        let n = 8;
        let prices = PricePanel::new(
            dates(n),
            vec!["AAA".to_string()],
            vec![series(&[10.0, 11.0, 10.5, 11.5, 12.0, 11.8, 12.4, 12.9])],
        )
        .unwrap();

        let engine = FeatureEngine::new(vec![
            FeatureSpec::momentum("mom_2", 2),
            FeatureSpec::volatility("vol_4", 4),
        ]);
        let panel = engine.compute(&prices).unwrap();

        // momentum defined from index 2, volatility from index 4
        assert_eq!(panel.len(), n - 4);
        let first = panel.keys().next().unwrap();
        assert_eq!(first.date, prices.dates()[4]);
        assert_eq!(panel.names(), &["mom_2".to_string(), "vol_4".to_string()]);
    }

    #[test]
    fn test_warmup_truncation_per_asset() {
        let d = dates(10);
        let late_start = vec![
            None,
            None,
            None,
            Some(20.0),
            Some(21.0),
            Some(22.0),
            Some(21.5),
            Some(23.0),
            Some(24.0),
            Some(23.5),
        ];
        let prices = PricePanel::new(
            d.clone(),
            vec!["EARLY".to_string(), "LATE".to_string()],
            vec![series(&[10.0; 10]), late_start],
        )
        .unwrap();

        let engine = FeatureEngine::new(vec![FeatureSpec::momentum("mom_3", 3)]);
        let panel = engine.compute(&prices).unwrap();

        let late_dates: Vec<_> = panel
            .keys()
            .filter(|k| k.asset == "LATE")
            .map(|k| k.date)
            .collect();
        // LATE starts at index 3, so its first 3 dates (3, 4, 5) carry no feature
        assert_eq!(late_dates.first(), Some(&d[6]));

        let early_dates: Vec<_> = panel
            .keys()
            .filter(|k| k.asset == "EARLY")
            .map(|k| k.date)
            .collect();
        assert_eq!(early_dates.first(), Some(&d[3]));
    }

    #[test]
    fn test_short_history_gives_empty_panel() {
        let prices = PricePanel::new(
            dates(3),
            vec!["AAA".to_string()],
            vec![series(&[1.0, 2.0, 3.0])],
        )
        .unwrap();
        let engine = FeatureEngine::new(vec![FeatureSpec::momentum("mom_5", 5)]);
        let panel = engine.compute(&prices).unwrap();
        assert!(panel.is_empty());
    }

    #[test]
    fn test_empty_price_panel_is_error() {
        let prices = PricePanel::new(vec![], vec!["AAA".to_string()], vec![vec![]]).unwrap();
        let engine = FeatureEngine::new(vec![FeatureSpec::momentum("mom_5", 5)]);
        assert!(matches!(
            engine.compute(&prices),
            Err(PipelineError::EmptyInput(_))
        ));
    }

    #[test]
    fn test_validate_specs() {
        assert!(validate_specs(&[]).is_err());
        assert!(validate_specs(&[
            FeatureSpec::momentum("x", 3),
            FeatureSpec::volatility("x", 3)
        ])
        .is_err());
        assert!(validate_specs(&[FeatureSpec::volatility("vol", 1)]).is_err());
        assert!(validate_specs(&[FeatureSpec::momentum("mom", 1)]).is_ok());
    }
}

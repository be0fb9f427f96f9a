//! Core panel types for the walk-forward pipeline.
//!
//! Every panel is keyed by the same composite [`PanelKey`] (date, asset), so
//! joins between panels are always by key and never by row position.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// Composite (date, asset) key shared by all panels.
///
/// Ordering is by date first, then asset, so a `BTreeMap<PanelKey, _>` iterates
/// in temporal order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PanelKey {
    /// Trading date.
    pub date: NaiveDate,
    /// Asset identifier (e.g., "AAPL").
    pub asset: String,
}

impl PanelKey {
    pub fn new(date: NaiveDate, asset: impl Into<String>) -> Self {
        Self {
            date,
            asset: asset.into(),
        }
    }
}

impl std::fmt::Display for PanelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.date, self.asset)
    }
}

/// Wide price table: trading dates × assets → price.
///
/// Prices are stored column-major (one series per asset). A missing price is
/// `None`; present prices are finite and strictly positive.
#[derive(Debug, Clone, PartialEq)]
pub struct PricePanel {
    dates: Vec<NaiveDate>,
    assets: Vec<String>,
    /// `columns[asset_idx][date_idx]`
    columns: Vec<Vec<Option<f64>>>,
    date_lookup: HashMap<NaiveDate, usize>,
    asset_lookup: HashMap<String, usize>,
}

impl PricePanel {
    /// Build a price panel, validating its structural invariants.
    ///
    /// Violations are reported as [`PipelineError::InvalidPanel`]; nothing is
    /// repaired.
    pub fn new(
        dates: Vec<NaiveDate>,
        assets: Vec<String>,
        columns: Vec<Vec<Option<f64>>>,
    ) -> PipelineResult<Self> {
        for window in dates.windows(2) {
            if window[1] <= window[0] {
                return Err(PipelineError::InvalidPanel(format!(
                    "dates must be strictly increasing: {} followed by {}",
                    window[0], window[1]
                )));
            }
        }

        if columns.len() != assets.len() {
            return Err(PipelineError::InvalidPanel(format!(
                "{} assets but {} price columns",
                assets.len(),
                columns.len()
            )));
        }

        let mut asset_lookup = HashMap::with_capacity(assets.len());
        for (idx, asset) in assets.iter().enumerate() {
            if asset_lookup.insert(asset.clone(), idx).is_some() {
                return Err(PipelineError::InvalidPanel(format!(
                    "duplicate asset identifier {}",
                    asset
                )));
            }
        }

        for (asset, column) in assets.iter().zip(&columns) {
            if column.len() != dates.len() {
                return Err(PipelineError::InvalidPanel(format!(
                    "asset {} has {} prices for {} dates",
                    asset,
                    column.len(),
                    dates.len()
                )));
            }
            for (date, price) in dates.iter().zip(column) {
                if let Some(p) = price {
                    if !p.is_finite() || *p <= 0.0 {
                        return Err(PipelineError::InvalidPanel(format!(
                            "non-positive or non-finite price {} for {} on {}",
                            p, asset, date
                        )));
                    }
                }
            }
        }

        for (idx, date) in dates.iter().enumerate() {
            if !columns.iter().any(|c| c[idx].is_some()) {
                return Err(PipelineError::InvalidPanel(format!(
                    "no asset has a price on {}",
                    date
                )));
            }
        }

        let date_lookup = dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();

        Ok(Self {
            dates,
            assets,
            columns,
            date_lookup,
            asset_lookup,
        })
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    /// Number of trading dates.
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Price series for an asset by column index, one entry per date.
    pub fn series_at(&self, asset_idx: usize) -> &[Option<f64>] {
        &self.columns[asset_idx]
    }

    /// Price series for an asset by identifier.
    pub fn series(&self, asset: &str) -> Option<&[Option<f64>]> {
        self.asset_index(asset).map(|idx| self.series_at(idx))
    }

    pub fn price(&self, date_idx: usize, asset_idx: usize) -> Option<f64> {
        self.columns
            .get(asset_idx)
            .and_then(|c| c.get(date_idx))
            .copied()
            .flatten()
    }

    pub fn date_index(&self, date: NaiveDate) -> Option<usize> {
        self.date_lookup.get(&date).copied()
    }

    pub fn asset_index(&self, asset: &str) -> Option<usize> {
        self.asset_lookup.get(asset).copied()
    }

    /// Whether the key lies in the panel's (date, asset) domain.
    pub fn contains_key(&self, key: &PanelKey) -> bool {
        self.date_lookup.contains_key(&key.date) && self.asset_lookup.contains_key(&key.asset)
    }

    /// Select an asset universe and an inclusive date range.
    ///
    /// An empty universe keeps every asset. A universe member absent from the
    /// panel is an error. Dates left without any price are dropped, since a
    /// narrower universe can leave a date uncovered.
    pub fn restrict(
        &self,
        universe: &[String],
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> PipelineResult<Self> {
        let asset_indices: Vec<usize> = if universe.is_empty() {
            (0..self.assets.len()).collect()
        } else {
            universe
                .iter()
                .map(|asset| {
                    self.asset_index(asset).ok_or_else(|| {
                        PipelineError::InvalidPanel(format!(
                            "universe asset {} not present in price panel",
                            asset
                        ))
                    })
                })
                .collect::<PipelineResult<_>>()?
        };

        let date_indices: Vec<usize> = self
            .dates
            .iter()
            .enumerate()
            .filter(|(_, d)| start.map_or(true, |s| **d >= s) && end.map_or(true, |e| **d <= e))
            .filter(|(i, _)| asset_indices.iter().any(|&a| self.columns[a][*i].is_some()))
            .map(|(i, _)| i)
            .collect();

        let dates = date_indices.iter().map(|&i| self.dates[i]).collect();
        let assets = asset_indices.iter().map(|&a| self.assets[a].clone()).collect();
        let columns = asset_indices
            .iter()
            .map(|&a| date_indices.iter().map(|&i| self.columns[a][i]).collect())
            .collect();

        Self::new(dates, assets, columns)
    }
}

/// Long-form feature table: (date, asset) → named feature vector.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeaturePanel {
    names: Vec<String>,
    rows: BTreeMap<PanelKey, Vec<f64>>,
}

impl FeaturePanel {
    pub fn new(names: Vec<String>) -> Self {
        Self {
            names,
            rows: BTreeMap::new(),
        }
    }

    /// Insert a feature row. The vector must have one finite value per feature
    /// name and the key must be new.
    pub fn insert(&mut self, key: PanelKey, values: Vec<f64>) -> PipelineResult<()> {
        if values.len() != self.names.len() {
            return Err(PipelineError::InvalidPanel(format!(
                "feature row {} has {} values, expected {}",
                key,
                values.len(),
                self.names.len()
            )));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::InvalidPanel(format!(
                "feature row {} contains a non-finite value",
                key
            )));
        }
        if self.rows.contains_key(&key) {
            return Err(PipelineError::InvalidPanel(format!(
                "duplicate feature key {}",
                key
            )));
        }
        self.rows.insert(key, values);
        Ok(())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn get(&self, key: &PanelKey) -> Option<&[f64]> {
        self.rows.get(key).map(Vec::as_slice)
    }

    pub fn contains_key(&self, key: &PanelKey) -> bool {
        self.rows.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &PanelKey> {
        self.rows.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PanelKey, &Vec<f64>)> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First and last dates present, if any.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        date_range(self.rows.keys())
    }
}

/// Long-form single-value table: (date, asset) → scalar.
///
/// Used for both forward-return labels and predictions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScalarPanel {
    column: String,
    rows: BTreeMap<PanelKey, f64>,
}

/// Forward-return targets, column `target_return`.
pub type LabelPanel = ScalarPanel;

/// Out-of-sample predictions, column `predicted_return`.
pub type PredictionPanel = ScalarPanel;

pub const LABEL_COLUMN: &str = "target_return";
pub const PREDICTION_COLUMN: &str = "predicted_return";

impl ScalarPanel {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            rows: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, key: PanelKey, value: f64) -> PipelineResult<()> {
        if self.rows.contains_key(&key) {
            return Err(PipelineError::InvalidPanel(format!(
                "duplicate {} key {}",
                self.column, key
            )));
        }
        self.rows.insert(key, value);
        Ok(())
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn get(&self, key: &PanelKey) -> Option<f64> {
        self.rows.get(key).copied()
    }

    pub fn contains_key(&self, key: &PanelKey) -> bool {
        self.rows.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &PanelKey> {
        self.rows.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PanelKey, f64)> {
        self.rows.iter().map(|(k, v)| (k, *v))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sorted distinct dates.
    pub fn distinct_dates(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self.rows.keys().map(|k| k.date).collect();
        dates.dedup();
        dates
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        date_range(self.rows.keys())
    }
}

fn date_range<'a>(mut keys: impl DoubleEndedIterator<Item = &'a PanelKey>) -> Option<(NaiveDate, NaiveDate)> {
    let first = keys.next()?.date;
    let last = keys.next_back().map_or(first, |k| k.date);
    Some((first, last))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_panel_key_ordering() {
        let a = PanelKey::new(day(2), "MSFT");
        let b = PanelKey::new(day(3), "AAPL");
        let c = PanelKey::new(day(3), "MSFT");
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_price_panel_rejects_unordered_dates() {
        let result = PricePanel::new(
            vec![day(2), day(2)],
            vec!["SPY".to_string()],
            vec![vec![Some(1.0), Some(2.0)]],
        );
        assert!(matches!(result, Err(PipelineError::InvalidPanel(_))));
    }

    #[test]
    fn test_price_panel_rejects_non_positive_price() {
        let result = PricePanel::new(
            vec![day(2), day(3)],
            vec!["SPY".to_string()],
            vec![vec![Some(1.0), Some(0.0)]],
        );
        assert!(matches!(result, Err(PipelineError::InvalidPanel(_))));
    }

    #[test]
    fn test_price_panel_rejects_uncovered_date() {
        let result = PricePanel::new(
            vec![day(2), day(3)],
            vec!["SPY".to_string(), "QQQ".to_string()],
            vec![vec![Some(1.0), None], vec![Some(2.0), None]],
        );
        assert!(matches!(result, Err(PipelineError::InvalidPanel(_))));
    }

    #[test]
    fn test_price_panel_rejects_duplicate_asset() {
        let result = PricePanel::new(
            vec![day(2)],
            vec!["SPY".to_string(), "SPY".to_string()],
            vec![vec![Some(1.0)], vec![Some(2.0)]],
        );
        assert!(matches!(result, Err(PipelineError::InvalidPanel(_))));
    }

    #[test]
    fn test_price_panel_lookup() {
        let panel = PricePanel::new(
            vec![day(2), day(3)],
            vec!["SPY".to_string(), "QQQ".to_string()],
            vec![vec![Some(1.0), Some(1.5)], vec![None, Some(2.0)]],
        )
        .unwrap();

        assert_eq!(panel.len(), 2);
        assert_eq!(panel.price(1, 0), Some(1.5));
        assert_eq!(panel.price(0, 1), None);
        assert_eq!(panel.series("QQQ").unwrap(), &[None, Some(2.0)]);
        assert!(panel.contains_key(&PanelKey::new(day(3), "QQQ")));
        assert!(!panel.contains_key(&PanelKey::new(day(4), "QQQ")));
    }

    #[test]
    fn test_restrict_universe_and_range() {
        let panel = PricePanel::new(
            vec![day(2), day(3), day(4)],
            vec!["SPY".to_string(), "QQQ".to_string()],
            vec![
                vec![Some(1.0), Some(1.1), Some(1.2)],
                vec![Some(2.0), Some(2.1), Some(2.2)],
            ],
        )
        .unwrap();

        let restricted = panel
            .restrict(&["QQQ".to_string()], Some(day(3)), None)
            .unwrap();
        assert_eq!(restricted.assets(), &["QQQ".to_string()]);
        assert_eq!(restricted.dates(), &[day(3), day(4)]);
        assert_eq!(restricted.price(0, 0), Some(2.1));

        let missing = panel.restrict(&["IWM".to_string()], None, None);
        assert!(missing.is_err());
    }

    #[test]
    fn test_scalar_panel_rejects_duplicates() {
        let mut panel = ScalarPanel::new(LABEL_COLUMN);
        panel.insert(PanelKey::new(day(2), "SPY"), 0.1).unwrap();
        assert!(panel.insert(PanelKey::new(day(2), "SPY"), 0.2).is_err());
        assert_eq!(panel.len(), 1);
    }

    #[test]
    fn test_scalar_panel_distinct_dates() {
        let mut panel = ScalarPanel::new(LABEL_COLUMN);
        panel.insert(PanelKey::new(day(3), "SPY"), 0.1).unwrap();
        panel.insert(PanelKey::new(day(2), "SPY"), 0.1).unwrap();
        panel.insert(PanelKey::new(day(3), "QQQ"), 0.1).unwrap();
        assert_eq!(panel.distinct_dates(), vec![day(2), day(3)]);
        assert_eq!(panel.date_range(), Some((day(2), day(3))));
    }

    #[test]
    fn test_feature_panel_rejects_wrong_width() {
        let mut panel = FeaturePanel::new(vec!["mom".to_string(), "vol".to_string()]);
        assert!(panel.insert(PanelKey::new(day(2), "SPY"), vec![0.1]).is_err());
        assert!(panel
            .insert(PanelKey::new(day(2), "SPY"), vec![0.1, f64::NAN])
            .is_err());
        assert!(panel.insert(PanelKey::new(day(2), "SPY"), vec![0.1, 0.2]).is_ok());
    }
}

//! Walk-forward ridge training.
//!
//! For every step the scaler and the model are fitted from scratch on the rows
//! of the trailing window only, then applied to the rows of the single test
//! date. Steps share nothing but read-only panel data, so they run on the rayon
//! pool and are collected back in step order.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::NaiveDate;
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::TrainerConfig;
use crate::data::{FeaturePanel, LabelPanel, PanelKey, PredictionPanel, ScalarPanel, PREDICTION_COLUMN};
use crate::error::{PipelineError, PipelineResult};
use crate::model::{ModelError, RidgeRegression, StandardScaler};

use super::steps::{WalkForwardStep, WalkForwardSteps};

/// What a single step trained on and predicted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSummary {
    /// Cursor into the distinct label dates.
    pub step: usize,
    pub train_start: NaiveDate,
    pub train_end: NaiveDate,
    pub test_date: NaiveDate,
    /// Distinct dates in the training window.
    pub train_dates: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    /// Feature columns with zero variance in this window (left unscaled).
    pub constant_features: usize,
}

/// Output of one step.
#[derive(Debug, Clone)]
pub struct StepBatch {
    pub summary: StepSummary,
    /// Predictions keyed like the test rows, in key order.
    pub predictions: Vec<(PanelKey, f64)>,
}

/// Result of a full walk-forward run.
#[derive(Debug, Clone)]
pub struct WalkForwardRun {
    /// Per-step window boundaries, in temporal order.
    pub steps: Vec<StepSummary>,
    pub predictions: PredictionPanel,
}

impl WalkForwardRun {
    pub fn total_train_rows(&self) -> usize {
        self.steps.iter().map(|s| s.train_rows).sum()
    }

    /// Steps that hit at least one zero-variance feature column.
    pub fn degenerate_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.constant_features > 0).count()
    }
}

struct Row<'a> {
    key: &'a PanelKey,
    features: &'a [f64],
    label: f64,
}

/// Feature/label rows joined by key and bucketed by distinct label date.
///
/// Immutable once built; [`WalkForwardDataset::step`] is a pure function of
/// the step index.
pub struct WalkForwardDataset<'a> {
    dates: Vec<NaiveDate>,
    rows_by_date: Vec<Vec<Row<'a>>>,
    n_features: usize,
    config: TrainerConfig,
}

impl<'a> WalkForwardDataset<'a> {
    /// Join labels to features. Every label key must have a feature row.
    pub fn new(
        features: &'a FeaturePanel,
        labels: &'a LabelPanel,
        config: TrainerConfig,
    ) -> PipelineResult<Self> {
        config.validate()?;

        if features.is_empty() {
            return Err(PipelineError::EmptyInput(
                "feature panel is empty".to_string(),
            ));
        }
        if labels.is_empty() {
            return Err(PipelineError::EmptyInput("label panel is empty".to_string()));
        }

        let mut buckets: BTreeMap<NaiveDate, Vec<Row<'a>>> = BTreeMap::new();
        for (key, label) in labels.iter() {
            let row_features = features.get(key).ok_or_else(|| {
                PipelineError::Alignment(format!("label key {} has no feature row", key))
            })?;
            buckets.entry(key.date).or_default().push(Row {
                key,
                features: row_features,
                label,
            });
        }

        let (dates, rows_by_date): (Vec<NaiveDate>, Vec<Vec<Row<'a>>>) = buckets.into_iter().unzip();

        Ok(Self {
            dates,
            rows_by_date,
            n_features: features.names().len(),
            config,
        })
    }

    /// Sorted distinct label dates.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn steps(&self) -> WalkForwardSteps<'_> {
        WalkForwardSteps::new(&self.dates, self.config.train_window)
    }

    /// Fit and predict for the step whose test date is `dates[index]`.
    pub fn step(&self, index: usize) -> PipelineResult<StepBatch> {
        let width = self.config.train_window;
        let step = self.steps().step(index).ok_or_else(|| {
            PipelineError::InvalidConfig(format!(
                "step {} is outside [{}, {})",
                index,
                width,
                self.dates.len()
            ))
        })?;

        let train: Vec<&Row<'a>> = self.rows_by_date[step.train_range(width)]
            .iter()
            .flatten()
            .collect();
        let test: Vec<&Row<'a>> = self.rows_by_date[step.index].iter().collect();

        let x_train = self.matrix(&train)?;
        let y_train: Array1<f64> = train.iter().map(|r| r.label).collect();

        let scaler = StandardScaler::fit(&x_train)?;
        let mut model = RidgeRegression::new(self.config.ridge_alpha);
        model.fit(&scaler.transform(&x_train)?, &y_train)?;

        let x_test = scaler.transform(&self.matrix(&test)?)?;
        let predicted = model.predict(&x_test)?;

        if !scaler.constant_columns().is_empty() {
            debug!(
                "Step {} ({}): zero-variance feature columns {:?} left unscaled",
                step.index,
                step.test_date,
                scaler.constant_columns()
            );
        }

        let predictions = test
            .iter()
            .zip(predicted.iter())
            .map(|(row, value)| (row.key.clone(), *value))
            .collect();

        Ok(StepBatch {
            summary: summarize(&step, width, train.len(), test.len(), scaler.constant_columns().len()),
            predictions,
        })
    }

    fn matrix(&self, rows: &[&Row<'a>]) -> PipelineResult<Array2<f64>> {
        let flat: Vec<f64> = rows.iter().flat_map(|r| r.features.iter().copied()).collect();
        Array2::from_shape_vec((rows.len(), self.n_features), flat)
            .map_err(|e| ModelError::Computation(e.to_string()).into())
    }
}

fn summarize(
    step: &WalkForwardStep,
    width: usize,
    train_rows: usize,
    test_rows: usize,
    constant_features: usize,
) -> StepSummary {
    StepSummary {
        step: step.index,
        train_start: step.train_start,
        train_end: step.train_end,
        test_date: step.test_date,
        train_dates: width,
        train_rows,
        test_rows,
        constant_features,
    }
}

/// Sliding-window, refit-every-step ridge trainer.
#[derive(Debug, Clone)]
pub struct WalkForwardTrainer {
    config: TrainerConfig,
}

impl WalkForwardTrainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Produce out-of-sample predictions for every label date after the first
    /// training window.
    ///
    /// Fails with [`PipelineError::InsufficientHistory`] before fitting
    /// anything when there are no more distinct label dates than the window.
    pub fn run(&self, features: &FeaturePanel, labels: &LabelPanel) -> PipelineResult<WalkForwardRun> {
        let dataset = WalkForwardDataset::new(features, labels, self.config.clone())?;
        let width = self.config.train_window;

        if dataset.dates().len() <= width {
            return Err(PipelineError::InsufficientHistory {
                label_dates: dataset.dates().len(),
                train_window: width,
            });
        }

        let steps = dataset.steps();
        let total = steps.len();
        info!(
            "Walk-forward: {} steps, {}-date training window, ridge alpha {}, {}",
            total,
            width,
            self.config.ridge_alpha,
            if self.config.parallel { "parallel" } else { "sequential" }
        );

        let progress = AtomicUsize::new(0);
        let run_step = |index: usize| -> PipelineResult<StepBatch> {
            let batch = dataset.step(index)?;

            let done = progress.fetch_add(1, Ordering::Relaxed) + 1;
            if done % (total / 10).max(1) == 0 || done == total {
                info!(
                    "  {:.0}% ({}/{} steps)",
                    done as f64 / total as f64 * 100.0,
                    done,
                    total
                );
            }

            Ok(batch)
        };

        // Both paths yield batches in step order.
        let batches: Vec<StepBatch> = if self.config.parallel {
            steps
                .indices()
                .into_par_iter()
                .map(run_step)
                .collect::<PipelineResult<_>>()?
        } else {
            steps.indices().map(run_step).collect::<PipelineResult<_>>()?
        };

        let mut predictions = ScalarPanel::new(PREDICTION_COLUMN);
        let mut summaries = Vec::with_capacity(batches.len());
        for batch in batches {
            for (key, value) in batch.predictions {
                predictions.insert(key, value)?;
            }
            summaries.push(batch.summary);
        }

        let run = WalkForwardRun {
            steps: summaries,
            predictions,
        };

        let degenerate = run.degenerate_steps();
        if degenerate > 0 {
            warn!(
                "{} of {} steps had zero-variance feature columns; those features were centred but not scaled",
                degenerate, total
            );
        }

        if let Some((first, last)) = run.predictions.date_range() {
            info!(
                "Produced {} predictions ({} to {})",
                run.predictions.len(),
                first,
                last
            );
        }

        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(i: usize) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 1, 1).unwrap() + chrono::Duration::days(i as i64)
    }

    /// Two assets, `n` dates, two features, label linear in the first feature.
    fn panels(n: usize) -> (FeaturePanel, LabelPanel) {
        let mut features = FeaturePanel::new(vec!["a".to_string(), "b".to_string()]);
        let mut labels = ScalarPanel::new(crate::data::LABEL_COLUMN);
        for i in 0..n {
            for (j, asset) in ["AAA", "BBB"].iter().enumerate() {
                let a = ((i * 7 + j * 3) % 11) as f64 / 10.0;
                let b = ((i * 5 + j) % 7) as f64 / 7.0;
                let key = PanelKey::new(day(i), *asset);
                features.insert(key.clone(), vec![a, b]).unwrap();
                labels.insert(key, 0.5 * a - 0.1).unwrap();
            }
        }
        (features, labels)
    }

    fn config(window: usize, parallel: bool) -> TrainerConfig {
        TrainerConfig {
            train_window: window,
            ridge_alpha: 1.0,
            parallel,
        }
    }

    #[test]
    fn test_prediction_count_and_first_date() {
        let (features, labels) = panels(15);
        let run = WalkForwardTrainer::new(config(10, false))
            .run(&features, &labels)
            .unwrap();

        assert_eq!(run.steps.len(), 5);
        assert_eq!(run.predictions.len(), 10);
        assert_eq!(run.predictions.date_range().unwrap().0, day(10));
    }

    #[test]
    fn test_no_lookahead_and_window_width() {
        let (features, labels) = panels(20);
        let run = WalkForwardTrainer::new(config(6, false))
            .run(&features, &labels)
            .unwrap();

        for step in &run.steps {
            assert!(step.train_end < step.test_date);
            assert_eq!(step.train_dates, 6);
            // both assets present on every date
            assert_eq!(step.train_rows, 12);
            assert_eq!(step.test_rows, 2);
        }
        for (key, _) in run.predictions.iter() {
            let step = run.steps.iter().find(|s| s.test_date == key.date).unwrap();
            assert!(step.train_end < key.date);
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let (features, labels) = panels(40);
        let seq = WalkForwardTrainer::new(config(8, false))
            .run(&features, &labels)
            .unwrap();
        let par = WalkForwardTrainer::new(config(8, true))
            .run(&features, &labels)
            .unwrap();

        assert_eq!(seq.steps, par.steps);
        let seq_bits: Vec<_> = seq.predictions.iter().map(|(k, v)| (k.clone(), v.to_bits())).collect();
        let par_bits: Vec<_> = par.predictions.iter().map(|(k, v)| (k.clone(), v.to_bits())).collect();
        assert_eq!(seq_bits, par_bits);
    }

    #[test]
    fn test_step_uses_only_window_rows() {
        let (features, mut labels) = panels(12);
        let baseline = WalkForwardDataset::new(&features, &labels, config(5, false))
            .unwrap()
            .step(5)
            .unwrap();

        // Changing labels at or after the test date must not move its prediction.
        for i in 5..12 {
            for asset in ["AAA", "BBB"] {
                let key = PanelKey::new(day(i), asset);
                let mut rebuilt = ScalarPanel::new(crate::data::LABEL_COLUMN);
                for (k, v) in labels.iter() {
                    let v = if k == &key { v + 100.0 } else { v };
                    rebuilt.insert(k.clone(), v).unwrap();
                }
                labels = rebuilt;
            }
        }
        let perturbed = WalkForwardDataset::new(&features, &labels, config(5, false))
            .unwrap()
            .step(5)
            .unwrap();

        assert_eq!(baseline.predictions, perturbed.predictions);
    }

    #[test]
    fn test_constant_feature_stays_finite() {
        let mut features = FeaturePanel::new(vec!["const".to_string(), "x".to_string()]);
        let mut labels = ScalarPanel::new(crate::data::LABEL_COLUMN);
        for i in 0..8 {
            let key = PanelKey::new(day(i), "AAA");
            features.insert(key.clone(), vec![0.1, i as f64]).unwrap();
            labels.insert(key, i as f64 * 0.01).unwrap();
        }

        let run = WalkForwardTrainer::new(config(4, false))
            .run(&features, &labels)
            .unwrap();

        assert_eq!(run.predictions.len(), 4);
        assert!(run.predictions.iter().all(|(_, v)| v.is_finite()));
        assert_eq!(run.degenerate_steps(), 4);
    }

    #[test]
    fn test_insufficient_history() {
        let (features, labels) = panels(10);
        let result = WalkForwardTrainer::new(config(10, false)).run(&features, &labels);
        assert_eq!(
            result.unwrap_err(),
            PipelineError::InsufficientHistory {
                label_dates: 10,
                train_window: 10
            }
        );
    }

    #[test]
    fn test_label_without_features_is_alignment_error() {
        let (features, mut labels) = panels(12);
        labels.insert(PanelKey::new(day(3), "CCC"), 0.0).unwrap();
        let result = WalkForwardTrainer::new(config(5, false)).run(&features, &labels);
        assert!(matches!(result, Err(PipelineError::Alignment(_))));
    }

    #[test]
    fn test_empty_inputs() {
        let features = FeaturePanel::new(vec!["a".to_string()]);
        let labels = ScalarPanel::new(crate::data::LABEL_COLUMN);
        let result = WalkForwardTrainer::new(config(5, false)).run(&features, &labels);
        assert!(matches!(result, Err(PipelineError::EmptyInput(_))));
    }

    #[test]
    fn test_step_out_of_range() {
        let (features, labels) = panels(12);
        let dataset = WalkForwardDataset::new(&features, &labels, config(5, false)).unwrap();
        assert!(dataset.step(4).is_err());
        assert!(dataset.step(12).is_err());
        assert!(dataset.step(11).is_ok());
    }
}

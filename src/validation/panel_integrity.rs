//! Integrity validation across the price, feature, label and prediction panels.
//!
//! Validates:
//! - Price panel shape (ordered dates, positive prices)
//! - Key containment (predictions ⊆ labels ⊆ features ⊆ prices)
//! - Finite values in every derived panel
//! - Walk-forward windows (train dates strictly before the test date, fixed width)

use std::fmt;

use chrono::NaiveDate;

use crate::data::{FeaturePanel, PanelKey, PricePanel, ScalarPanel};
use crate::walkforward::StepSummary;

/// Maximum number of violations kept as a sample per check.
const MAX_SAMPLE: usize = 5;

/// Where a check failed: a panel row, or a whole date (price ordering, steps).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    Key(PanelKey),
    Date(NaiveDate),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Key(key) => write!(f, "{}", key),
            Violation::Date(date) => write!(f, "{}", date),
        }
    }
}

/// Outcome of one named check over `checked` items.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub name: &'static str,
    /// What a passing item satisfies, e.g. "feature keys present in price panel".
    pub rule: String,
    pub checked: usize,
    pub violations: usize,
    /// First few violations in panel order.
    pub sample: Vec<Violation>,
}

impl CheckResult {
    fn new(
        name: &'static str,
        rule: impl Into<String>,
        checked: usize,
        violations: impl IntoIterator<Item = Violation>,
    ) -> Self {
        let mut count = 0;
        let mut sample = Vec::new();
        for violation in violations {
            if sample.len() < MAX_SAMPLE {
                sample.push(violation);
            }
            count += 1;
        }
        Self {
            name,
            rule: rule.into(),
            checked,
            violations: count,
            sample,
        }
    }

    pub fn passed(&self) -> bool {
        self.violations == 0
    }

    /// Keys among the sampled violations.
    pub fn sample_keys(&self) -> impl Iterator<Item = &PanelKey> {
        self.sample.iter().filter_map(|v| match v {
            Violation::Key(key) => Some(key),
            Violation::Date(_) => None,
        })
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.passed() {
            return write!(f, "{}: {} ({} checked)", self.name, self.rule, self.checked);
        }
        write!(
            f,
            "{}: {} of {} violate \"{}\"",
            self.name, self.violations, self.checked, self.rule
        )?;
        if !self.sample.is_empty() {
            let sample: Vec<String> = self.sample.iter().map(|v| v.to_string()).collect();
            write!(f, " [{}]", sample.join(", "))?;
        }
        Ok(())
    }
}

/// Collected checks for one set of panels.
#[derive(Debug, Default)]
pub struct IntegrityReport {
    pub checks: Vec<CheckResult>,
}

impl IntegrityReport {
    pub fn all_passed(&self) -> bool {
        self.violations() == 0
    }

    /// Total violations over every check.
    pub fn violations(&self) -> usize {
        self.checks.iter().map(|c| c.violations).sum()
    }

    pub fn failed(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| !c.passed())
    }

    pub fn check(&self, name: &str) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.name == name)
    }

    pub fn summary(&self) -> String {
        let failed = self.failed().count();
        format!(
            "{}/{} integrity checks passed, {} violations",
            self.checks.len() - failed,
            self.checks.len(),
            self.violations()
        )
    }
}

/// Runs integrity checks over whichever panels are available.
#[derive(Debug, Default)]
pub struct PanelIntegrityValidator {
    report: IntegrityReport,
}

impl PanelIntegrityValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check_prices(mut self, prices: &PricePanel) -> Self {
        let unordered = prices
            .dates()
            .windows(2)
            .filter(|w| w[1] <= w[0])
            .map(|w| Violation::Date(w[1]));
        self.report.checks.push(CheckResult::new(
            "price_dates_ordered",
            "dates strictly increasing",
            prices.len(),
            unordered,
        ));

        let mut present = 0;
        let mut bad = Vec::new();
        for (a, asset) in prices.assets().iter().enumerate() {
            for (date, price) in prices.dates().iter().zip(prices.series_at(a)) {
                if let Some(p) = price {
                    present += 1;
                    if *p <= 0.0 || !p.is_finite() {
                        bad.push(Violation::Key(PanelKey::new(*date, asset.clone())));
                    }
                }
            }
        }
        self.report.checks.push(CheckResult::new(
            "price_values",
            "present prices positive and finite",
            present,
            bad,
        ));

        self
    }

    pub fn check_features(mut self, features: &FeaturePanel, prices: &PricePanel) -> Self {
        self.report.checks.push(CheckResult::new(
            "features_in_prices",
            "feature keys present in price panel",
            features.len(),
            outside(features.keys(), |k| prices.contains_key(k)),
        ));
        self.report.checks.push(CheckResult::new(
            "features_finite",
            "feature rows finite",
            features.len(),
            features
                .iter()
                .filter(|(_, row)| row.iter().any(|v| !v.is_finite()))
                .map(|(k, _)| Violation::Key(k.clone())),
        ));
        self
    }

    pub fn check_labels(mut self, labels: &ScalarPanel, features: &FeaturePanel) -> Self {
        self.report.checks.push(CheckResult::new(
            "labels_in_features",
            "label keys present in feature panel",
            labels.len(),
            outside(labels.keys(), |k| features.contains_key(k)),
        ));
        self.report
            .checks
            .push(non_finite("labels_finite", "labels finite", labels));
        self
    }

    pub fn check_predictions(mut self, predictions: &ScalarPanel, labels: &ScalarPanel) -> Self {
        self.report.checks.push(CheckResult::new(
            "predictions_in_labels",
            "prediction keys present in label panel",
            predictions.len(),
            outside(predictions.keys(), |k| labels.contains_key(k)),
        ));
        self.report.checks.push(non_finite(
            "predictions_finite",
            "predictions finite",
            predictions,
        ));
        self
    }

    /// Every step trained strictly before its test date on exactly `width`
    /// dates, and every prediction date has a step.
    pub fn check_steps(
        mut self,
        steps: &[StepSummary],
        predictions: &ScalarPanel,
        width: usize,
    ) -> Self {
        self.report.checks.push(CheckResult::new(
            "no_lookahead",
            "training window ends before the test date",
            steps.len(),
            steps
                .iter()
                .filter(|s| s.train_end >= s.test_date || s.train_start > s.train_end)
                .map(|s| Violation::Date(s.test_date)),
        ));

        self.report.checks.push(CheckResult::new(
            "window_width",
            format!("training window spans {} dates", width),
            steps.len(),
            steps
                .iter()
                .filter(|s| s.train_dates != width)
                .map(|s| Violation::Date(s.test_date)),
        ));

        self.report.checks.push(CheckResult::new(
            "predictions_have_steps",
            "prediction dates are step test dates",
            predictions.len(),
            outside(predictions.keys(), |k| {
                steps.binary_search_by(|s| s.test_date.cmp(&k.date)).is_ok()
            }),
        ));

        self
    }

    pub fn finish(self) -> IntegrityReport {
        self.report
    }
}

fn outside<'a>(
    keys: impl Iterator<Item = &'a PanelKey>,
    contains: impl Fn(&PanelKey) -> bool,
) -> Vec<Violation> {
    keys.filter(|k| !contains(*k))
        .map(|k| Violation::Key(k.clone()))
        .collect()
}

fn non_finite(name: &'static str, rule: &str, panel: &ScalarPanel) -> CheckResult {
    CheckResult::new(
        name,
        rule,
        panel.len(),
        panel
            .iter()
            .filter(|(_, v)| !v.is_finite())
            .map(|(k, _)| Violation::Key(k.clone())),
    )
}

//! Walk-forward step generation.
//!
//! Generates fixed-width sliding train windows over an ordered list of
//! distinct dates, each followed by a single test date.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single walk-forward step: train on `dates[index - width..index]`, test on
/// `dates[index]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkForwardStep {
    /// Cursor into the distinct date list (the test date's position).
    pub index: usize,
    /// First training date.
    pub train_start: NaiveDate,
    /// Last training date.
    pub train_end: NaiveDate,
    /// Test date.
    pub test_date: NaiveDate,
}

impl WalkForwardStep {
    /// Position range of the training dates in the distinct date list.
    pub fn train_range(&self, width: usize) -> std::ops::Range<usize> {
        self.index - width..self.index
    }
}

/// Generator for walk-forward steps.
pub struct WalkForwardSteps<'a> {
    dates: &'a [NaiveDate],
    width: usize,
}

impl<'a> WalkForwardSteps<'a> {
    /// `dates` must be sorted and distinct.
    pub fn new(dates: &'a [NaiveDate], width: usize) -> Self {
        Self { dates, width }
    }

    /// Number of steps: `|dates| - width`, or zero.
    pub fn len(&self) -> usize {
        if self.width == 0 {
            return 0;
        }
        self.dates.len().saturating_sub(self.width)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Step whose test date is `dates[index]`.
    pub fn step(&self, index: usize) -> Option<WalkForwardStep> {
        if self.width == 0 || index < self.width || index >= self.dates.len() {
            return None;
        }
        Some(WalkForwardStep {
            index,
            train_start: self.dates[index - self.width],
            train_end: self.dates[index - 1],
            test_date: self.dates[index],
        })
    }

    /// Cursor positions of every step, in temporal order.
    pub fn indices(&self) -> std::ops::Range<usize> {
        if self.is_empty() {
            return 0..0;
        }
        self.width..self.dates.len()
    }

    /// Generate all steps.
    pub fn generate(&self) -> Vec<WalkForwardStep> {
        self.indices().filter_map(|i| self.step(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dates(n: usize) -> Vec<NaiveDate> {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        (0..n)
            .map(|i| start + chrono::Duration::days(i as i64))
            .collect()
    }

    #[test]
    fn test_step_count() {
        let d = dates(15);
        assert_eq!(WalkForwardSteps::new(&d, 10).len(), 5);
        assert_eq!(WalkForwardSteps::new(&d, 15).len(), 0);
        assert_eq!(WalkForwardSteps::new(&d, 20).len(), 0);
        assert_eq!(WalkForwardSteps::new(&d, 0).len(), 0);
    }

    #[test]
    fn test_window_slides_with_fixed_width() {
        let d = dates(15);
        let steps = WalkForwardSteps::new(&d, 10).generate();

        assert_eq!(steps.len(), 5);
        for step in &steps {
            assert!(step.train_end < step.test_date);
            assert_eq!(step.train_range(10).len(), 10);
            assert_eq!(d[step.train_range(10).start], step.train_start);
        }

        assert_eq!(steps[0].train_start, d[0]);
        assert_eq!(steps[0].test_date, d[10]);
        assert_eq!(steps[4].train_start, d[4]);
        assert_eq!(steps[4].train_end, d[13]);
        assert_eq!(steps[4].test_date, d[14]);
    }

    #[test]
    fn test_out_of_range_step() {
        let d = dates(5);
        let steps = WalkForwardSteps::new(&d, 2);
        assert!(steps.step(1).is_none());
        assert!(steps.step(5).is_none());
        assert_eq!(steps.step(2).unwrap().test_date, d[2]);
    }
}

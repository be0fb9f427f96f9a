//! Validation module for panel integrity.
//!
//! This module checks the containment chain and the walk-forward windows of a
//! finished run, independently of the code that produced them.

pub mod panel_integrity;

pub use panel_integrity::{CheckResult, IntegrityReport, PanelIntegrityValidator, Violation};

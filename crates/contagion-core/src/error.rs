//! Error types for the contagion engine.
//!
//! Hard failures (`Validation`, `Io`, `Json`, `Config`, `Taxonomy`) stop a run
//! before analysis starts. `InsufficientData` and `Computation` are raised by a
//! single component and are turned into an [`Outcome`](crate::Outcome) by the
//! engine, so the rest of the report is still produced.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// One problem found while validating an input row.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RowIssue {
    /// 1-based data row number. The header and blank lines are not counted;
    /// 0 means the whole input (header or document).
    pub row: usize,
    pub pair_id: Option<String>,
    pub field: String,
    pub message: String,
}

/// Every validation problem found in a batch.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ValidationReport {
    pub issues: Vec<RowIssue>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        row: usize,
        pair_id: Option<&str>,
        field: &str,
        message: impl Into<String>,
    ) {
        self.issues.push(RowIssue {
            row,
            pair_id: pair_id.map(str::to_string),
            field: field.to_string(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    /// Sorted, de-duplicated row numbers that carry at least one issue.
    pub fn offending_rows(&self) -> Vec<usize> {
        let mut rows: Vec<usize> = self.issues.iter().map(|i| i.row).collect();
        rows.sort_unstable();
        rows.dedup();
        rows
    }

    /// `Ok(())` when nothing was recorded, otherwise a `Validation` error.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ContagionError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = self.offending_rows();
        write!(f, "{} issue(s) across {} row(s)", self.issues.len(), rows.len())?;
        if let Some(first) = self.issues.first() {
            write!(
                f,
                "; first: row {} [{}]: {}",
                first.row, first.field, first.message
            )?;
        }
        Ok(())
    }
}

/// Errors produced by loading, validation and analysis.
#[derive(Debug, Error)]
pub enum ContagionError {
    /// Malformed or out-of-contract input rows.
    #[error("validation failed: {0}")]
    Validation(ValidationReport),

    /// A statistic cannot be computed reliably from the data at hand.
    #[error("insufficient data for {component}: {reason}")]
    InsufficientData {
        component: &'static str,
        reason: String,
    },

    /// Unexpected numerical failure inside one component.
    #[error("computation failed in {component}: {detail}")]
    Computation {
        component: &'static str,
        detail: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid taxonomy: {0}")]
    Taxonomy(String),
}

impl ContagionError {
    pub(crate) fn insufficient(component: &'static str, reason: impl Into<String>) -> Self {
        ContagionError::InsufficientData {
            component,
            reason: reason.into(),
        }
    }

    pub(crate) fn computation(component: &'static str, detail: impl Into<String>) -> Self {
        ContagionError::Computation {
            component,
            detail: detail.into(),
        }
    }

    /// True for the soft failure that degrades to an "insufficient data" marker.
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, ContagionError::InsufficientData { .. })
    }
}

pub type Result<T> = std::result::Result<T, ContagionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report_is_ok() {
        assert!(ValidationReport::new().into_result().is_ok());
    }

    #[test]
    fn test_offending_rows_sorted_and_deduped() {
        let mut report = ValidationReport::new();
        report.push(4, Some("p4"), "depth", "must be >= 1");
        report.push(2, None, "parent_valence", "out of range");
        report.push(4, Some("p4"), "child_valence", "out of range");
        assert_eq!(report.offending_rows(), vec![2, 4]);
        assert_eq!(report.len(), 3);
    }

    #[test]
    fn test_display_mentions_first_issue() {
        let mut report = ValidationReport::new();
        report.push(3, Some("x"), "depth", "must be >= 1");
        let text = report.to_string();
        assert!(text.contains("1 issue(s) across 1 row(s)"));
        assert!(text.contains("row 3 [depth]"));
    }

    #[test]
    fn test_into_result_wraps_validation() {
        let mut report = ValidationReport::new();
        report.push(1, None, "pair_id", "missing");
        match report.into_result() {
            Err(ContagionError::Validation(r)) => assert_eq!(r.len(), 1),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_insufficient_flag() {
        assert!(ContagionError::insufficient("decay", "too few").is_insufficient_data());
        assert!(!ContagionError::computation("decay", "NaN").is_insufficient_data());
    }
}

//! Parent→child macro-label transition matrix.
//!
//! Rows are parent labels, columns child labels, both in taxonomy order.
//! A row with no parent occurrences has `probabilities: None` ("no data")
//! instead of a division by zero.

use serde::Serialize;

use crate::dataset::LabeledPair;
use crate::error::{ContagionError, Result, ValidationReport};
use crate::stats::ensure_finite;
use crate::taxonomy::Taxonomy;

const COMPONENT: &str = "transitions";

/// Row sums must be within this of 1.0.
pub const ROW_SUM_TOLERANCE: f64 = 1e-9;

/// One parent label's outgoing distribution.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TransitionRow {
    pub parent_label: String,
    /// Pairs with this parent label; weights the row's confidence downstream.
    pub observations: u64,
    /// P(child = column | parent = this row), aligned with `TransitionMatrix::labels`.
    /// `None` when `observations` is 0.
    pub probabilities: Option<Vec<f64>>,
}

impl TransitionRow {
    pub fn has_data(&self) -> bool {
        self.probabilities.is_some()
    }
}

/// Square transition matrix with the raw counts it was normalized from.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TransitionMatrix {
    pub labels: Vec<String>,
    /// `counts[parent][child]`.
    pub counts: Vec<Vec<u64>>,
    /// Occurrences of each label on the child side.
    pub child_totals: Vec<u64>,
    pub total: u64,
    pub rows: Vec<TransitionRow>,
}

/// Contingency counts over the taxonomy's macro labels.
pub(crate) fn count_table<'a>(
    pairs: impl IntoIterator<Item = &'a LabeledPair>,
    taxonomy: &Taxonomy,
) -> Result<Vec<Vec<u64>>> {
    let k = taxonomy.macros().len();
    let mut counts = vec![vec![0u64; k]; k];
    let mut report = ValidationReport::new();
    for (i, p) in pairs.into_iter().enumerate() {
        let parent = taxonomy.macro_index(&p.parent_macro_label);
        let child = taxonomy.macro_index(&p.child_macro_label);
        match (parent, child) {
            (Some(a), Some(b)) => counts[a][b] += 1,
            _ => {
                let field = if parent.is_none() {
                    "parent_macro_label"
                } else {
                    "child_macro_label"
                };
                report.push(i + 1, Some(&p.pair_id), field, "label not in taxonomy");
            }
        }
    }
    report.into_result()?;
    Ok(counts)
}

impl TransitionMatrix {
    /// Count and row-normalize parent→child label transitions.
    pub fn build(pairs: &[LabeledPair], taxonomy: &Taxonomy) -> Result<Self> {
        let counts = count_table(pairs, taxonomy)?;
        let labels = taxonomy.macros().to_vec();
        let k = labels.len();

        let mut child_totals = vec![0u64; k];
        let mut rows = Vec::with_capacity(k);
        for (a, row_counts) in counts.iter().enumerate() {
            for (b, &c) in row_counts.iter().enumerate() {
                child_totals[b] += c;
            }
            let observations: u64 = row_counts.iter().sum();
            let probabilities = if observations == 0 {
                None
            } else {
                let probs = row_counts
                    .iter()
                    .map(|&c| c as f64 / observations as f64)
                    .collect::<Vec<_>>();
                check_row(&labels[a], &probs)?;
                Some(probs)
            };
            rows.push(TransitionRow {
                parent_label: labels[a].clone(),
                observations,
                probabilities,
            });
        }

        let total = child_totals.iter().sum();
        let empty = rows.iter().filter(|r| !r.has_data()).count();
        log::info!(
            "transition matrix: {total} pairs, {k} labels, {empty} parent label(s) without data"
        );
        Ok(Self {
            labels,
            counts,
            child_totals,
            total,
            rows,
        })
    }

    pub fn index(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    pub fn row(&self, parent: &str) -> Option<&TransitionRow> {
        self.index(parent).map(|i| &self.rows[i])
    }

    /// P(child | parent); `None` for unknown labels or a row without data.
    pub fn probability(&self, parent: &str, child: &str) -> Option<f64> {
        let a = self.index(parent)?;
        let b = self.index(child)?;
        self.rows[a].probabilities.as_ref().map(|p| p[b])
    }

    /// Unconditional share of pairs whose child carries `label`.
    pub fn child_marginal(&self, label: &str) -> Option<f64> {
        let b = self.index(label)?;
        if self.total == 0 {
            None
        } else {
            Some(self.child_totals[b] as f64 / self.total as f64)
        }
    }
}

fn check_row(label: &str, probs: &[f64]) -> Result<()> {
    let mut sum = 0.0;
    for &p in probs {
        sum += ensure_finite(COMPONENT, "transition probability", p)?;
    }
    if (sum - 1.0).abs() > ROW_SUM_TOLERANCE {
        return Err(ContagionError::computation(
            COMPONENT,
            format!("row '{label}' sums to {sum}"),
        ));
    }
    Ok(())
}

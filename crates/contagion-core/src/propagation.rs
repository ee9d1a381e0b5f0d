//! Per-emotion propagation strength ranking.
//!
//! `strength(l) = P(child = l | parent = l) − P(child = l)`, where the baseline
//! is the marginal share of children labeled `l` in the whole batch. Positive
//! values mean the emotion recurs in replies more often than its overall
//! frequency predicts. The range is [-1, 1].

use std::cmp::Ordering;

use serde::Serialize;

use crate::error::{ContagionError, Result};
use crate::stats::{ensure_finite, safe_div};
use crate::transitions::TransitionMatrix;

const COMPONENT: &str = "propagation";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PropagationScore {
    /// 1-based position in the ranking.
    pub rank: usize,
    pub label: String,
    /// P(child = label | parent = label).
    pub self_transition: f64,
    /// P(child = label) over the batch.
    pub baseline: f64,
    pub strength: f64,
    /// Parent occurrences behind `self_transition`.
    pub support: u64,
}

/// Baseline for one column: the marginal child-label probability.
///
/// `None` when `label_index` is outside the matrix.
pub fn baseline(matrix: &TransitionMatrix, label_index: usize) -> Option<f64> {
    matrix
        .child_totals
        .get(label_index)
        .map(|&n| safe_div(n as f64, matrix.total as f64))
}

/// Score and rank every label that occurs at least once as a parent.
///
/// Order: strength descending, then self-transition descending, then label name.
pub fn rank(matrix: &TransitionMatrix) -> Result<Vec<PropagationScore>> {
    if matrix.total == 0 {
        return Err(ContagionError::insufficient(COMPONENT, "empty transition matrix"));
    }

    let mut scores = Vec::new();
    for (i, row) in matrix.rows.iter().enumerate() {
        let Some(probs) = row.probabilities.as_ref() else {
            continue;
        };
        let (Some(&self_transition), Some(base)) = (probs.get(i), baseline(matrix, i)) else {
            return Err(ContagionError::computation(
                COMPONENT,
                format!(
                    "row '{}' does not fit a {}-label matrix ({} probabilities, {} child totals)",
                    row.parent_label,
                    matrix.labels.len(),
                    probs.len(),
                    matrix.child_totals.len()
                ),
            ));
        };
        let strength = ensure_finite(COMPONENT, "strength", self_transition - base)?;
        scores.push(PropagationScore {
            rank: 0,
            label: row.parent_label.clone(),
            self_transition,
            baseline: base,
            strength,
            support: row.observations,
        });
    }

    scores.sort_by(|a, b| {
        b.strength
            .partial_cmp(&a.strength)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                b.self_transition
                    .partial_cmp(&a.self_transition)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.label.cmp(&b.label))
    });
    for (i, s) in scores.iter_mut().enumerate() {
        s.rank = i + 1;
    }

    if let Some(top) = scores.first() {
        log::info!(
            "propagation: {} label(s) ranked, strongest '{}' ({:+.4})",
            scores.len(),
            top.label,
            top.strength
        );
    }
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::LabeledPair;
    use crate::taxonomy::Taxonomy;

    fn matrix(layout: &[(&str, &str)]) -> TransitionMatrix {
        let pairs: Vec<LabeledPair> = layout
            .iter()
            .enumerate()
            .map(|(i, (p, c))| LabeledPair {
                pair_id: format!("p{i}"),
                parent_id: format!("a{i}"),
                child_id: format!("b{i}"),
                parent_macro_label: p.to_string(),
                parent_valence: 0.0,
                child_macro_label: c.to_string(),
                child_valence: 0.0,
                depth: 1,
                thread_id: None,
            })
            .collect();
        TransitionMatrix::build(&pairs, &Taxonomy::goemotions()).unwrap()
    }

    #[test]
    fn test_strength_is_self_transition_minus_marginal() {
        // joy→joy 2/3, child joy marginal 2/4 → 1/6.
        // anger→anger 0/1, child anger marginal 0 → 0.
        let m = matrix(&[("joy", "joy"), ("joy", "joy"), ("joy", "fear"), ("anger", "fear")]);
        let scores = rank(&m).unwrap();
        let joy = scores.iter().find(|s| s.label == "joy").unwrap();
        assert!((joy.self_transition - 2.0 / 3.0).abs() < 1e-12);
        assert!((joy.baseline - 0.5).abs() < 1e-12);
        assert!((joy.strength - (2.0 / 3.0 - 0.5)).abs() < 1e-12);
        assert_eq!(joy.support, 3);
        let anger = scores.iter().find(|s| s.label == "anger").unwrap();
        assert_eq!(anger.strength, 0.0);
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].label, "joy");
        assert_eq!(scores[0].rank, 1);
    }

    #[test]
    fn test_ties_break_on_self_transition_then_name() {
        // fear and sadness: self 1.0, baseline 0.25 each → strength 0.75; joy, anger: 0.5 - 0.25 = 0.25
        let m = matrix(&[
            ("sadness", "sadness"),
            ("fear", "fear"),
            ("joy", "joy"),
            ("joy", "anger"),
            ("anger", "anger"),
            ("anger", "joy"),
            ("neutral", "sadness"),
            ("neutral", "fear"),
        ]);
        let scores = rank(&m).unwrap();
        let order: Vec<&str> = scores.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(order[..2], ["fear", "sadness"]);
        assert_eq!(order[2..4], ["anger", "joy"]);
        assert_eq!(order[4], "neutral");
    }

    #[test]
    fn test_ranking_independent_of_row_order() {
        let layout = [
            ("joy", "joy"),
            ("anger", "neutral"),
            ("joy", "neutral"),
            ("anger", "anger"),
            ("fear", "fear"),
            ("neutral", "joy"),
        ];
        let mut reversed = layout;
        reversed.reverse();
        assert_eq!(rank(&matrix(&layout)).unwrap(), rank(&matrix(&reversed)).unwrap());
    }

    #[test]
    fn test_strength_bounded() {
        let m = matrix(&[("joy", "joy"), ("anger", "fear"), ("fear", "anger")]);
        for s in rank(&m).unwrap() {
            assert!((-1.0..=1.0).contains(&s.strength));
        }
    }

    #[test]
    fn test_baseline_out_of_range_is_none() {
        let m = matrix(&[("joy", "joy"), ("joy", "anger")]);
        let joy = m.labels.iter().position(|l| l == "joy").unwrap();
        assert_eq!(baseline(&m, joy), Some(0.5));
        assert_eq!(baseline(&m, m.labels.len()), None);
    }

    #[test]
    fn test_inconsistent_matrix_is_computation_error() {
        let m = matrix(&[("joy", "joy"), ("anger", "fear"), ("neutral", "neutral")]);

        let mut short_totals = m.clone();
        short_totals.child_totals.truncate(1);
        let err = rank(&short_totals).unwrap_err();
        assert!(matches!(err, ContagionError::Computation { .. }), "{err}");

        let mut short_row = m.clone();
        for row in &mut short_row.rows {
            if let Some(probs) = row.probabilities.as_mut() {
                probs.clear();
            }
        }
        let err = rank(&short_row).unwrap_err();
        assert!(matches!(err, ContagionError::Computation { .. }), "{err}");
    }

    #[test]
    fn test_empty_matrix_is_insufficient() {
        assert!(rank(&matrix(&[])).unwrap_err().is_insufficient_data());
    }
}

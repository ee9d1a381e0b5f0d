//! Parent→child valence association: Pearson and Spearman correlation.

use serde::Serialize;
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::dataset::LabeledPair;
use crate::error::{ContagionError, Result};
use crate::stats::{EPS, average_ranks, ensure_finite, mean};

const COMPONENT: &str = "correlation";

/// One correlation coefficient with its two-sided p-value.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CorrelationStat {
    pub coefficient: f64,
    pub p_value: f64,
    pub n: usize,
}

/// Linear and rank association between parent and child valence.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CorrelationReport {
    pub pearson: CorrelationStat,
    pub spearman: CorrelationStat,
}

/// Pearson's r with a Student-t p-value on n − 2 degrees of freedom.
///
/// Fewer than two points or zero variance in either series is reported as
/// `InsufficientData`. With exactly two points the p-value is 1.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Result<CorrelationStat> {
    let n = xs.len();
    if n != ys.len() {
        return Err(ContagionError::computation(
            COMPONENT,
            format!("series length mismatch: {n} vs {}", ys.len()),
        ));
    }
    if n < 2 {
        return Err(ContagionError::insufficient(
            COMPONENT,
            format!("need at least 2 pairs, got {n}"),
        ));
    }
    // n >= 2 so both means exist.
    let mx = mean(xs).unwrap_or_default();
    let my = mean(ys).unwrap_or_default();
    let sxx: f64 = xs.iter().map(|x| (x - mx).powi(2)).sum();
    let syy: f64 = ys.iter().map(|y| (y - my).powi(2)).sum();
    if sxx <= EPS || syy <= EPS {
        let which = if sxx <= EPS { "parent" } else { "child" };
        return Err(ContagionError::insufficient(
            COMPONENT,
            format!("{which} valence has zero variance"),
        ));
    }
    let sxy: f64 = xs.iter().zip(ys).map(|(x, y)| (x - mx) * (y - my)).sum();
    let r = ensure_finite(COMPONENT, "r", sxy / (sxx * syy).sqrt())?.clamp(-1.0, 1.0);
    let p_value = t_test_p(r, n)?;
    Ok(CorrelationStat {
        coefficient: r,
        p_value,
        n,
    })
}

/// Spearman's rho: Pearson's r over average ranks.
pub fn spearman(xs: &[f64], ys: &[f64]) -> Result<CorrelationStat> {
    pearson(&average_ranks(xs), &average_ranks(ys))
}

/// Correlate parent valence with child valence across the batch.
pub fn analyze(pairs: &[LabeledPair]) -> Result<CorrelationReport> {
    let parent: Vec<f64> = pairs.iter().map(|p| p.parent_valence).collect();
    let child: Vec<f64> = pairs.iter().map(|p| p.child_valence).collect();
    let report = CorrelationReport {
        pearson: pearson(&parent, &child)?,
        spearman: spearman(&parent, &child)?,
    };
    log::info!(
        "valence correlation: pearson r={:.4} (p={:.4}), spearman rho={:.4} (p={:.4}), n={}",
        report.pearson.coefficient,
        report.pearson.p_value,
        report.spearman.coefficient,
        report.spearman.p_value,
        report.pearson.n
    );
    Ok(report)
}

fn t_test_p(r: f64, n: usize) -> Result<f64> {
    if n <= 2 {
        return Ok(1.0);
    }
    let df = (n - 2) as f64;
    let denom = 1.0 - r * r;
    if denom <= 0.0 {
        return Ok(0.0);
    }
    let t = r * (df / denom).sqrt();
    let dist = StudentsT::new(0.0, 1.0, df)
        .map_err(|e| ContagionError::computation(COMPONENT, format!("t distribution: {e}")))?;
    let p = 2.0 * dist.sf(t.abs());
    ensure_finite(COMPONENT, "p-value", p.clamp(0.0, 1.0))
}

//! Numeric helpers shared by the analysis components.

use std::cmp::Ordering;

use crate::error::{ContagionError, Result};

/// Spread below this is treated as zero.
pub(crate) const EPS: f64 = 1e-12;

pub(crate) fn safe_div(num: f64, den: f64) -> f64 {
    if den.abs() <= EPS { 0.0 } else { num / den }
}

pub(crate) fn mean(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() {
        None
    } else {
        Some(xs.iter().sum::<f64>() / xs.len() as f64)
    }
}

/// Population standard deviation (ddof = 0).
pub(crate) fn population_std(xs: &[f64], mean: f64) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / xs.len() as f64;
    var.sqrt()
}

/// 1-based ranks; tied values share the mean of the positions they span.
pub(crate) fn average_ranks(xs: &[f64]) -> Vec<f64> {
    let n = xs.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| xs[a].partial_cmp(&xs[b]).unwrap_or(Ordering::Equal));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && xs[order[j + 1]] == xs[order[i]] {
            j += 1;
        }
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &pos in &order[i..=j] {
            ranks[pos] = avg;
        }
        i = j + 1;
    }
    ranks
}

/// Ordinary least squares line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct LineFit {
    pub intercept: f64,
    pub slope: f64,
}

/// Fit `y = intercept + slope * x`. `None` with fewer than two points or no spread in x.
pub(crate) fn least_squares(xs: &[f64], ys: &[f64]) -> Option<LineFit> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let mx = mean(xs)?;
    let my = mean(ys)?;
    let sxx: f64 = xs.iter().map(|x| (x - mx).powi(2)).sum();
    if sxx <= EPS {
        return None;
    }
    let sxy: f64 = xs.iter().zip(ys).map(|(x, y)| (x - mx) * (y - my)).sum();
    let slope = sxy / sxx;
    Some(LineFit {
        intercept: my - slope * mx,
        slope,
    })
}

/// Linear-interpolated quantile of an ascending slice (`q` in [0, 1]).
pub(crate) fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Reject NaN/infinite intermediate values with a component-scoped error.
pub(crate) fn ensure_finite(component: &'static str, what: &str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ContagionError::computation(
            component,
            format!("{what} is not finite ({value})"),
        ))
    }
}

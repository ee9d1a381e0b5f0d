//! Depth decay of emotional matching.
//!
//! The batch is bucketed by reply depth and a propagation metric is computed
//! per bucket. Buckets smaller than `min_bucket_size` are kept in the output
//! but flagged low-confidence and left out of the fit. Across the remaining
//! depths two monotone models are fitted and the one with the smaller
//! residual sum of squares is selected:
//!
//! - linear: `y = intercept + slope · depth`
//! - exponential: `y = amplitude · exp(−rate · depth)`, fitted on `ln y`;
//!   only attempted when every usable value is positive.
//!
//! Fewer than two usable buckets leaves the fit as "insufficient data".

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::f64::consts::LN_2;

use serde::Serialize;

use crate::config::{AnalysisConfig, DecayMetric};
use crate::dataset::LabeledPair;
use crate::error::{ContagionError, Result};
use crate::outcome::Outcome;
use crate::stats::{EPS, ensure_finite, least_squares, mean};
use crate::taxonomy::Taxonomy;
use crate::transitions::count_table;

const COMPONENT: &str = "decay";

/// Metric value for one depth bucket.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DepthPoint {
    pub depth: u32,
    pub n: usize,
    pub matches: usize,
    pub value: f64,
    pub low_confidence: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum DecayParameters {
    Linear {
        intercept: f64,
        slope: f64,
    },
    Exponential {
        amplitude: f64,
        rate: f64,
        /// Depths for the metric to halve; only for positive rates.
        half_life: Option<f64>,
    },
}

impl DecayParameters {
    pub fn predict(&self, depth: f64) -> f64 {
        match *self {
            DecayParameters::Linear { intercept, slope } => intercept + slope * depth,
            DecayParameters::Exponential {
                amplitude, rate, ..
            } => amplitude * (-rate * depth).exp(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DecayParameters::Linear { .. } => "linear",
            DecayParameters::Exponential { .. } => "exponential",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FittedPoint {
    pub depth: u32,
    pub value: f64,
}

/// One candidate model with its goodness of fit.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FitCandidate {
    pub parameters: DecayParameters,
    /// Residual sum of squares on the metric's own scale.
    pub rss: f64,
    /// `None` when the usable values have no spread.
    pub r_squared: Option<f64>,
    /// Model prediction at every depth in the curve, for plotting.
    pub fitted: Vec<FittedPoint>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DecayFit {
    pub selected: FitCandidate,
    pub candidates: Vec<FitCandidate>,
    pub depths_used: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DecayCurve {
    pub metric: DecayMetric,
    pub min_bucket_size: usize,
    pub points: Vec<DepthPoint>,
    pub fit: Outcome<DecayFit>,
}

impl DecayCurve {
    pub fn point(&self, depth: u32) -> Option<&DepthPoint> {
        self.points.iter().find(|p| p.depth == depth)
    }
}

/// Bucket pairs by depth, ascending.
pub fn bucket_by_depth(pairs: &[LabeledPair]) -> BTreeMap<u32, Vec<&LabeledPair>> {
    let mut buckets: BTreeMap<u32, Vec<&LabeledPair>> = BTreeMap::new();
    for p in pairs {
        buckets.entry(p.depth).or_default().push(p);
    }
    buckets
}

/// Observed match rate minus the rate expected if child labels were
/// independent of parent labels within this bucket.
pub fn bucket_strength(pairs: &[&LabeledPair], taxonomy: &Taxonomy) -> Result<f64> {
    if pairs.is_empty() {
        return Err(ContagionError::insufficient(COMPONENT, "empty bucket"));
    }
    let counts = count_table(pairs.iter().copied(), taxonomy)?;
    let n = pairs.len() as f64;
    let k = counts.len();
    let observed: f64 = (0..k).map(|i| counts[i][i] as f64).sum::<f64>() / n;
    let expected: f64 = (0..k)
        .map(|i| {
            let parent: u64 = counts[i].iter().sum();
            let child: u64 = counts.iter().map(|row| row[i]).sum();
            (parent as f64 / n) * (child as f64 / n)
        })
        .sum();
    ensure_finite(COMPONENT, "bucket strength", observed - expected)
}

/// Per-depth points plus the selected decay fit.
pub fn model(
    pairs: &[LabeledPair],
    taxonomy: &Taxonomy,
    config: &AnalysisConfig,
) -> Result<DecayCurve> {
    if pairs.is_empty() {
        return Err(ContagionError::insufficient(COMPONENT, "no pairs"));
    }

    let mut points = Vec::new();
    for (depth, bucket) in bucket_by_depth(pairs) {
        let n = bucket.len();
        let matches = bucket.iter().filter(|p| p.is_match()).count();
        let value = match config.decay_metric {
            DecayMetric::MatchRate => matches as f64 / n as f64,
            DecayMetric::PropagationStrength => bucket_strength(&bucket, taxonomy)?,
        };
        let low_confidence = n < config.min_bucket_size;
        if low_confidence {
            log::debug!(
                "depth {depth}: {n} pair(s) below minimum bucket size {}",
                config.min_bucket_size
            );
        }
        points.push(DepthPoint {
            depth,
            n,
            matches,
            value,
            low_confidence,
        });
    }

    let fit = Outcome::from_result(COMPONENT, fit_points(&points, config.min_bucket_size));
    if let Some(f) = fit.value() {
        log::info!(
            "decay: {} model over {} depth(s), rss={:.6}",
            f.selected.parameters.name(),
            f.depths_used.len(),
            f.selected.rss
        );
    }
    Ok(DecayCurve {
        metric: config.decay_metric,
        min_bucket_size: config.min_bucket_size,
        points,
        fit,
    })
}

/// Fit linear and exponential models over the confident points.
pub fn fit_points(points: &[DepthPoint], min_bucket_size: usize) -> Result<DecayFit> {
    let usable: Vec<&DepthPoint> = points.iter().filter(|p| !p.low_confidence).collect();
    if usable.len() < 2 {
        return Err(ContagionError::insufficient(
            COMPONENT,
            format!(
                "{} usable depth bucket(s) with at least {min_bucket_size} pairs; need 2",
                usable.len()
            ),
        ));
    }

    let xs: Vec<f64> = usable.iter().map(|p| p.depth as f64).collect();
    let ys: Vec<f64> = usable.iter().map(|p| p.value).collect();
    let all_depths: Vec<u32> = points.iter().map(|p| p.depth).collect();

    let mut candidates = Vec::new();

    let line = least_squares(&xs, &ys).ok_or_else(|| {
        ContagionError::computation(COMPONENT, "linear fit failed on distinct depths")
    })?;
    candidates.push(candidate(
        DecayParameters::Linear {
            intercept: line.intercept,
            slope: line.slope,
        },
        &xs,
        &ys,
        &all_depths,
    )?);

    if ys.iter().all(|&y| y > 0.0) {
        let logs: Vec<f64> = ys.iter().map(|y| y.ln()).collect();
        if let Some(log_line) = least_squares(&xs, &logs) {
            let rate = -log_line.slope;
            let half_life = (rate > EPS).then(|| LN_2 / rate);
            candidates.push(candidate(
                DecayParameters::Exponential {
                    amplitude: log_line.intercept.exp(),
                    rate,
                    half_life,
                },
                &xs,
                &ys,
                &all_depths,
            )?);
        }
    }

    // Ties keep the linear model, which comes first.
    let selected = candidates
        .iter()
        .min_by(|a, b| a.rss.partial_cmp(&b.rss).unwrap_or(Ordering::Equal))
        .cloned()
        .ok_or_else(|| ContagionError::computation(COMPONENT, "no candidate model"))?;

    Ok(DecayFit {
        selected,
        candidates,
        depths_used: usable.iter().map(|p| p.depth).collect(),
    })
}

fn candidate(
    parameters: DecayParameters,
    xs: &[f64],
    ys: &[f64],
    all_depths: &[u32],
) -> Result<FitCandidate> {
    let rss: f64 = xs
        .iter()
        .zip(ys)
        .map(|(&x, &y)| (y - parameters.predict(x)).powi(2))
        .sum();
    let rss = ensure_finite(COMPONENT, "residual sum of squares", rss)?;
    let y_mean = mean(ys).unwrap_or_default();
    let ss_tot: f64 = ys.iter().map(|y| (y - y_mean).powi(2)).sum();
    let r_squared = (ss_tot > EPS).then(|| 1.0 - rss / ss_tot);
    let fitted = all_depths
        .iter()
        .map(|&d| FittedPoint {
            depth: d,
            value: parameters.predict(d as f64),
        })
        .collect();
    Ok(FitCandidate {
        parameters,
        rss,
        r_squared,
        fitted,
    })
}

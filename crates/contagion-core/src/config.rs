//! Analysis configuration.
//!
//! Every threshold the engine uses lives here with a documented default, so
//! boundary behaviour can be exercised from tests and overridden from a JSON
//! file or the command line.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ContagionError, Result};

/// Per-depth metric tracked by the decay modeler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecayMetric {
    /// Share of pairs whose child label equals the parent label.
    #[default]
    MatchRate,
    /// Match rate minus the match rate expected under independence in the bucket.
    PropagationStrength,
}

/// Per-group statistic fed to the outlier detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierStatistic {
    #[default]
    MatchRate,
    /// Mean of child valence minus parent valence.
    MeanValenceShift,
}

/// Tunable thresholds for one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Depth buckets with fewer pairs are marked low-confidence and left out of the decay fit.
    pub min_bucket_size: usize,
    pub decay_metric: DecayMetric,
    /// |z| above this flags a group as an outlier.
    pub outlier_z_threshold: f64,
    pub outlier_statistic: OutlierStatistic,
    /// Chi-square results with any expected cell below this are marked unreliable.
    pub min_expected_count: f64,
    /// Depths compared by the two-proportion z-test.
    pub depth_groups: (u32, u32),
    /// Label shuffles for the permutation test; 0 disables it.
    pub permutation_rounds: usize,
    pub permutation_seed: u64,
    /// Run independent components on scoped threads.
    pub parallel: bool,
    /// Decimal places kept when the report is serialized.
    pub report_precision: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_bucket_size: 5,
            decay_metric: DecayMetric::MatchRate,
            outlier_z_threshold: 2.0,
            outlier_statistic: OutlierStatistic::MatchRate,
            min_expected_count: 5.0,
            depth_groups: (1, 2),
            permutation_rounds: 1000,
            permutation_seed: 0x5EED_C0DE,
            parallel: true,
            report_precision: 4,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_bucket_size == 0 {
            return Err(ContagionError::Config(
                "min_bucket_size must be greater than 0".into(),
            ));
        }
        if !self.outlier_z_threshold.is_finite() || self.outlier_z_threshold <= 0.0 {
            return Err(ContagionError::Config(
                "outlier_z_threshold must be a positive number".into(),
            ));
        }
        if !self.min_expected_count.is_finite() || self.min_expected_count < 0.0 {
            return Err(ContagionError::Config(
                "min_expected_count must be a non-negative number".into(),
            ));
        }
        let (a, b) = self.depth_groups;
        if a < 1 || b < 1 {
            return Err(ContagionError::Config("depth_groups must be >= 1".into()));
        }
        if a == b {
            return Err(ContagionError::Config(
                "depth_groups must name two different depths".into(),
            ));
        }
        if self.report_precision > 12 {
            return Err(ContagionError::Config(
                "report_precision must be at most 12".into(),
            ));
        }
        Ok(())
    }

    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}

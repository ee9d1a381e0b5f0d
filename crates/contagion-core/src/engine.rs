//! Analysis engine: runs every component over one batch and assembles the report.
//!
//! Correlation, the transition matrix and the significance battery only read
//! the batch, so they can run on scoped threads. The ranker needs the matrix;
//! decay and outliers run after it. Every component lands in the report either
//! as a value or with the reason it has none.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::{Number, Value};

use crate::config::AnalysisConfig;
use crate::correlation::{self, CorrelationReport};
use crate::dataset::Dataset;
use crate::decay::{self, DecayCurve};
use crate::error::Result;
use crate::outcome::Outcome;
use crate::outliers::{self, OutlierReport};
use crate::propagation::{self, PropagationScore};
use crate::significance::{self, SignificanceReport};
use crate::taxonomy::Taxonomy;
use crate::transitions::TransitionMatrix;

/// Identifies the layout of the serialized report.
pub const REPORT_VERSION: &str = "contagion-report/1";

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Provenance for one run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReportMeta {
    pub run_id: String,
    pub tool_version: String,
    pub report_version: String,
    pub created_unix_ms: u64,
    pub pair_count: usize,
    pub group_count: usize,
    pub depths: Vec<u32>,
    pub labels: Vec<String>,
    /// SHA-256 of the batch in `pair_id` order.
    pub input_sha256: String,
    pub config: AnalysisConfig,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AnalysisReport {
    pub meta: ReportMeta,
    pub correlation: Outcome<CorrelationReport>,
    pub transitions: Outcome<TransitionMatrix>,
    pub propagation: Outcome<Vec<PropagationScore>>,
    pub decay: Outcome<DecayCurve>,
    pub significance: SignificanceReport,
    pub outliers: Outcome<OutlierReport>,
}

impl AnalysisReport {
    /// Report as JSON with floats rounded to `config.report_precision` decimals.
    pub fn to_json_value(&self) -> Result<Value> {
        let mut value = serde_json::to_value(self)?;
        round_floats(&mut value, self.meta.config.report_precision);
        Ok(value)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_json_value()?)?)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json_pretty()?)?;
        log::info!("report written to {}", path.display());
        Ok(())
    }

    /// Components that carry no value.
    pub fn degraded_components(&self) -> Vec<(&'static str, &str)> {
        [
            ("correlation", self.correlation.reason()),
            ("transitions", self.transitions.reason()),
            ("propagation", self.propagation.reason()),
            ("decay", self.decay.reason()),
            ("decay.fit", self.decay.value().and_then(|d| d.fit.reason())),
            ("significance.chi_square", self.significance.chi_square.reason()),
            ("significance.depth_match", self.significance.depth_match.reason()),
            ("significance.permutation", self.significance.permutation.reason()),
            ("outliers", self.outliers.reason()),
        ]
        .into_iter()
        .filter_map(|(name, reason)| reason.map(|r| (name, r)))
        .collect()
    }
}

fn round_floats(value: &mut Value, precision: u32) {
    match value {
        Value::Number(n) if n.is_f64() => {
            if let Some(x) = n.as_f64() {
                let scale = 10f64.powi(precision as i32);
                if let Some(rounded) = Number::from_f64((x * scale).round() / scale) {
                    *n = rounded;
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| round_floats(v, precision)),
        Value::Object(map) => map.values_mut().for_each(|v| round_floats(v, precision)),
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct ContagionEngine {
    taxonomy: Taxonomy,
    config: AnalysisConfig,
}

impl ContagionEngine {
    pub fn new(taxonomy: Taxonomy, config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { taxonomy, config })
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Run every component over `dataset`.
    pub fn analyze(&self, dataset: &Dataset) -> AnalysisReport {
        let pairs = dataset.pairs();
        let taxonomy = &self.taxonomy;
        let config = &self.config;
        log::info!(
            "analyzing {} pair(s) across {} depth(s){}",
            pairs.len(),
            dataset.depths().len(),
            if config.parallel { " (parallel)" } else { "" }
        );

        let run_correlation = || Outcome::from_result("correlation", correlation::analyze(pairs));
        let run_transitions = || {
            Outcome::from_result("transitions", TransitionMatrix::build(pairs, taxonomy))
        };
        let run_significance = || significance::run(pairs, taxonomy, config);

        let (correlation, transitions, significance) = if config.parallel {
            std::thread::scope(|s| {
                let c = s.spawn(run_correlation);
                let t = s.spawn(run_transitions);
                let g = s.spawn(run_significance);
                (
                    c.join().unwrap_or_else(|_| panicked("correlation")),
                    t.join().unwrap_or_else(|_| panicked("transitions")),
                    g.join().unwrap_or_else(|_| {
                        log::error!("significance: worker panicked");
                        SignificanceReport::failed("significance worker panicked")
                    }),
                )
            })
        } else {
            (run_correlation(), run_transitions(), run_significance())
        };

        let propagation = match &transitions {
            Outcome::Computed { value } => {
                Outcome::from_result("propagation", propagation::rank(value))
            }
            other => Outcome::Insufficient {
                reason: format!(
                    "transition matrix unavailable ({})",
                    other.reason().unwrap_or("unknown")
                ),
            },
        };
        let decay = Outcome::from_result("decay", decay::model(pairs, taxonomy, config));
        let outliers = Outcome::from_result("outliers", outliers::detect(pairs, config));

        AnalysisReport {
            meta: self.meta(dataset),
            correlation,
            transitions,
            propagation,
            decay,
            significance,
            outliers,
        }
    }

    fn meta(&self, dataset: &Dataset) -> ReportMeta {
        let created_unix_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        ReportMeta {
            run_id: uuid::Uuid::new_v4().to_string(),
            tool_version: crate::VERSION.to_string(),
            report_version: REPORT_VERSION.to_string(),
            created_unix_ms,
            pair_count: dataset.len(),
            group_count: dataset.group_count(),
            depths: dataset.depths().into_iter().collect(),
            labels: self.taxonomy.macros().to_vec(),
            input_sha256: dataset.fingerprint(),
            config: self.config.clone(),
        }
    }
}

fn panicked<T>(component: &str) -> Outcome<T> {
    log::error!("{component}: worker panicked");
    Outcome::Failed {
        reason: format!("{component} worker panicked"),
    }
}

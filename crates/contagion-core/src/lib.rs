//! # contagion-core
//!
//! Propagation analysis for emotional contagion in reply threads.
//!
//! The input is a static batch of labeled parent/child pairs: one macro
//! emotion label and one valence score per side, plus the reply depth. From
//! that batch the engine derives
//!
//! - parent→child valence correlation (Pearson and Spearman),
//! - the macro-label transition matrix,
//! - a per-emotion propagation strength ranking,
//! - a depth decay curve with a fitted model,
//! - significance tests against an independence null,
//! - per-thread outliers.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::path::Path;
//!
//! use contagion_core::{AnalysisConfig, ContagionEngine, Dataset, Taxonomy};
//!
//! let taxonomy = Taxonomy::goemotions();
//! let dataset = Dataset::load(Path::new("pairs.csv"), &taxonomy)?;
//! let engine = ContagionEngine::new(taxonomy, AnalysisConfig::default())?;
//! let report = engine.analyze(&dataset);
//! println!("{}", report.to_json_pretty()?);
//! # Ok::<(), contagion_core::ContagionError>(())
//! ```
//!
//! Components never abort the run on thin data: each report section is an
//! [`Outcome`] that either holds a value or says why it has none.

pub mod config;
pub mod correlation;
pub mod dataset;
pub mod decay;
pub mod engine;
pub mod error;
pub mod outcome;
pub mod outliers;
pub mod propagation;
pub mod significance;
mod stats;
pub mod taxonomy;
pub mod transitions;

pub use config::{AnalysisConfig, DecayMetric, OutlierStatistic};
pub use correlation::{CorrelationReport, CorrelationStat};
pub use dataset::{Dataset, LabeledPair, REQUIRED_COLUMNS};
pub use decay::{DecayCurve, DecayFit, DecayParameters, DepthPoint, FitCandidate};
pub use engine::{AnalysisReport, ContagionEngine, REPORT_VERSION, ReportMeta};
pub use error::{ContagionError, Result, RowIssue, ValidationReport};
pub use outcome::Outcome;
pub use outliers::{OutlierRecord, OutlierReport, PropagatorCategory};
pub use propagation::PropagationScore;
pub use significance::{
    ChiSquareResult, DepthChiSquare, PermutationTest, ProportionGroup, SignificanceReport,
    TwoProportionZ,
};
pub use taxonomy::{Classification, FineLabel, Taxonomy};
pub use transitions::{TransitionMatrix, TransitionRow};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod analyze;
pub mod resolve;
pub mod taxonomy;
pub mod validate;

use std::path::Path;

use contagion_core::{ContagionError, Dataset, DecayMetric, OutlierStatistic, Taxonomy};

/// Issues printed before the rest are summarized.
const MAX_LISTED_ISSUES: usize = 20;

/// Route `log` output to stderr. `RUST_LOG` wins over `-v`.
pub fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).format_timestamp(None);
    if let Ok(spec) = std::env::var("RUST_LOG") {
        builder.parse_filters(&spec);
    }
    let _ = builder.try_init();
}

/// Load a batch, or print what is wrong with it and exit.
pub fn load_dataset_or_exit(path: &str, taxonomy: &Taxonomy) -> Dataset {
    match Dataset::load(Path::new(path), taxonomy) {
        Ok(ds) => ds,
        Err(e) => {
            report_error(path, &e);
            std::process::exit(1);
        }
    }
}

pub fn report_error(path: &str, err: &ContagionError) {
    match err {
        ContagionError::Validation(report) => {
            eprintln!(
                "{path}: {} validation issue(s) in {} row(s)",
                report.len(),
                report.offending_rows().len()
            );
            for issue in report.issues.iter().take(MAX_LISTED_ISSUES) {
                let id = issue.pair_id.as_deref().unwrap_or("-");
                let row = if issue.row == 0 {
                    "header".to_string()
                } else {
                    format!("row {}", issue.row)
                };
                eprintln!("  {row:<10} {id:<16} {:<20} {}", issue.field, issue.message);
            }
            if report.len() > MAX_LISTED_ISSUES {
                eprintln!("  ... {} more", report.len() - MAX_LISTED_ISSUES);
            }
        }
        other => eprintln!("{path}: {other}"),
    }
}

pub fn parse_decay_metric(s: &str) -> Option<DecayMetric> {
    match s.to_lowercase().replace('-', "_").as_str() {
        "match_rate" | "match" => Some(DecayMetric::MatchRate),
        "propagation_strength" | "strength" => Some(DecayMetric::PropagationStrength),
        _ => None,
    }
}

pub fn parse_outlier_statistic(s: &str) -> Option<OutlierStatistic> {
    match s.to_lowercase().replace('-', "_").as_str() {
        "match_rate" | "match" => Some(OutlierStatistic::MatchRate),
        "mean_valence_shift" | "valence_shift" | "shift" => {
            Some(OutlierStatistic::MeanValenceShift)
        }
        _ => None,
    }
}

/// Parse `"A,B"` into a pair of depths.
pub fn parse_depth_groups(s: &str) -> Option<(u32, u32)> {
    let (a, b) = s.split_once(',')?;
    Some((a.trim().parse().ok()?, b.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decay_metric() {
        assert_eq!(parse_decay_metric("match_rate"), Some(DecayMetric::MatchRate));
        assert_eq!(
            parse_decay_metric("Propagation-Strength"),
            Some(DecayMetric::PropagationStrength)
        );
        assert_eq!(parse_decay_metric("half_life"), None);
    }

    #[test]
    fn test_parse_outlier_statistic() {
        assert_eq!(
            parse_outlier_statistic("mean_valence_shift"),
            Some(OutlierStatistic::MeanValenceShift)
        );
        assert_eq!(parse_outlier_statistic("MATCH"), Some(OutlierStatistic::MatchRate));
        assert_eq!(parse_outlier_statistic(""), None);
    }

    #[test]
    fn test_parse_depth_groups() {
        assert_eq!(parse_depth_groups("1,2"), Some((1, 2)));
        assert_eq!(parse_depth_groups(" 2 , 4 "), Some((2, 4)));
        assert_eq!(parse_depth_groups("1"), None);
        assert_eq!(parse_depth_groups("a,2"), None);
    }

    #[test]
    fn test_load_dataset_from_tempfile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pairs.json");
        std::fs::write(
            &path,
            r#"[{"pair_id":"p1","parent_id":"a","child_id":"b","parent_macro_label":"joy",
                "parent_valence":0.5,"child_macro_label":"joy","child_valence":0.4,"depth":1}]"#,
        )
        .unwrap();
        let ds = load_dataset_or_exit(path.to_str().unwrap(), &Taxonomy::goemotions());
        assert_eq!(ds.len(), 1);
    }
}

use std::path::Path;

use contagion_core::{
    AnalysisConfig, AnalysisReport, ContagionEngine, DecayParameters, Outcome, Taxonomy,
};

/// Command-line overrides applied on top of the loaded configuration.
#[derive(Default)]
pub struct ConfigOverrides<'a> {
    pub min_bucket_size: Option<usize>,
    pub z_threshold: Option<f64>,
    pub decay_metric: Option<&'a str>,
    pub outlier_statistic: Option<&'a str>,
    pub depth_groups: Option<&'a str>,
    pub permutations: Option<usize>,
    pub seed: Option<u64>,
    pub serial: bool,
}

pub struct AnalyzeCommandConfig<'a> {
    pub input: &'a str,
    pub config_path: Option<&'a str>,
    pub output_path: Option<&'a str>,
    pub json: bool,
    pub overrides: ConfigOverrides<'a>,
}

/// Configuration file (or defaults) with the flag overrides applied.
pub fn build_config(
    config_path: Option<&str>,
    ov: &ConfigOverrides<'_>,
) -> Result<AnalysisConfig, String> {
    let mut cfg = match config_path {
        Some(path) => AnalysisConfig::load(Path::new(path)).map_err(|e| format!("{path}: {e}"))?,
        None => AnalysisConfig::default(),
    };
    if let Some(n) = ov.min_bucket_size {
        cfg.min_bucket_size = n;
    }
    if let Some(z) = ov.z_threshold {
        cfg.outlier_z_threshold = z;
    }
    if let Some(m) = ov.decay_metric {
        cfg.decay_metric =
            super::parse_decay_metric(m).ok_or_else(|| format!("unknown decay metric '{m}'"))?;
    }
    if let Some(s) = ov.outlier_statistic {
        cfg.outlier_statistic = super::parse_outlier_statistic(s)
            .ok_or_else(|| format!("unknown outlier statistic '{s}'"))?;
    }
    if let Some(g) = ov.depth_groups {
        cfg.depth_groups = super::parse_depth_groups(g)
            .ok_or_else(|| format!("depth groups must look like '1,2', got '{g}'"))?;
    }
    if let Some(n) = ov.permutations {
        cfg.permutation_rounds = n;
    }
    if let Some(seed) = ov.seed {
        cfg.permutation_seed = seed;
    }
    if ov.serial {
        cfg.parallel = false;
    }
    cfg.validate().map_err(|e| e.to_string())?;
    Ok(cfg)
}

pub fn run(cfg: AnalyzeCommandConfig<'_>) {
    let config = match build_config(cfg.config_path, &cfg.overrides) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };
    let taxonomy = Taxonomy::goemotions();
    let dataset = super::load_dataset_or_exit(cfg.input, &taxonomy);
    let engine = match ContagionEngine::new(taxonomy, config) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    let report = engine.analyze(&dataset);

    if cfg.json {
        match report.to_json_pretty() {
            Ok(s) => println!("{s}"),
            Err(e) => {
                eprintln!("Failed to serialize report: {e}");
                std::process::exit(1);
            }
        }
    } else {
        print_summary(&report);
    }

    if let Some(path) = cfg.output_path {
        match report.write_json(Path::new(path)) {
            Ok(()) => {
                if !cfg.json {
                    println!("\nReport written to {path}");
                }
            }
            Err(e) => {
                eprintln!("Failed to write {path}: {e}");
                std::process::exit(1);
            }
        }
    }
}

fn status_line<T>(outcome: &Outcome<T>) -> String {
    match outcome.reason() {
        Some(reason) => format!("{} ({reason})", outcome.status()),
        None => outcome.status().to_string(),
    }
}

fn print_summary(report: &AnalysisReport) {
    let meta = &report.meta;
    println!(
        "Analyzed {} pair(s) in {} group(s), depths {:?}",
        meta.pair_count, meta.group_count, meta.depths
    );
    let digest = meta.input_sha256.get(..12).unwrap_or(&meta.input_sha256);
    println!("  run {}  input sha256 {digest}", meta.run_id);

    println!("\nValence correlation");
    match &report.correlation {
        Outcome::Computed { value } => {
            println!(
                "  Pearson  r   = {:+.4}  p = {:.4}  n = {}",
                value.pearson.coefficient, value.pearson.p_value, value.pearson.n
            );
            println!(
                "  Spearman rho = {:+.4}  p = {:.4}",
                value.spearman.coefficient, value.spearman.p_value
            );
        }
        other => println!("  {}", status_line(other)),
    }

    println!("\nTransition matrix (row = parent, column = child)");
    match &report.transitions {
        Outcome::Computed { value: m } => {
            print!("  {:<15}", "");
            for l in &m.labels {
                print!("{:>15}", l);
            }
            println!("{:>8}", "n");
            for row in &m.rows {
                print!("  {:<15}", row.parent_label);
                match &row.probabilities {
                    Some(probs) => {
                        for p in probs {
                            print!("{p:>15.4}");
                        }
                    }
                    None => {
                        for _ in &m.labels {
                            print!("{:>15}", "-");
                        }
                    }
                }
                println!("{:>8}", row.observations);
            }
        }
        other => println!("  {}", status_line(other)),
    }

    println!("\nPropagation strength (self-transition minus child marginal)");
    match &report.propagation {
        Outcome::Computed { value } => {
            for s in value {
                println!(
                    "  {:>2}. {:<15} {:+.4}  self {:.4}  baseline {:.4}  n = {}",
                    s.rank, s.label, s.strength, s.self_transition, s.baseline, s.support
                );
            }
        }
        other => println!("  {}", status_line(other)),
    }

    println!("\nDepth decay");
    match &report.decay {
        Outcome::Computed { value: curve } => {
            for p in &curve.points {
                println!(
                    "  depth {:>3}  {:.4}  n = {:<6}{}",
                    p.depth,
                    p.value,
                    p.n,
                    if p.low_confidence { " (low confidence)" } else { "" }
                );
            }
            match &curve.fit {
                Outcome::Computed { value: fit } => {
                    let params = match &fit.selected.parameters {
                        DecayParameters::Linear { intercept, slope } => {
                            format!("intercept {intercept:.4}, slope {slope:+.4}")
                        }
                        DecayParameters::Exponential {
                            amplitude,
                            rate,
                            half_life,
                        } => match half_life {
                            Some(h) => format!(
                                "amplitude {amplitude:.4}, rate {rate:.4}, half-life {h:.2} depth(s)"
                            ),
                            None => format!("amplitude {amplitude:.4}, rate {rate:.4}"),
                        },
                    };
                    println!(
                        "  fit: {} ({params}), rss {:.6}",
                        fit.selected.parameters.name(),
                        fit.selected.rss
                    );
                }
                other => println!("  fit: {}", status_line(other)),
            }
        }
        other => println!("  {}", status_line(other)),
    }

    println!("\nSignificance");
    let sig = &report.significance;
    match &sig.chi_square {
        Outcome::Computed { value: c } => println!(
            "  chi-square      {:.4}  dof {}  p = {:.4}{}",
            c.statistic,
            c.degrees_of_freedom,
            c.p_value,
            if c.reliable {
                String::new()
            } else {
                format!("  UNRELIABLE ({} sparse cell(s))", c.sparse_cells)
            }
        ),
        other => println!("  chi-square      {}", status_line(other)),
    }
    for d in &sig.chi_square_by_depth {
        match &d.result {
            Outcome::Computed { value: c } => println!(
                "    depth {:>3}     {:.4}  dof {}  p = {:.4}{}",
                d.depth,
                c.statistic,
                c.degrees_of_freedom,
                c.p_value,
                if c.reliable { "" } else { "  (unreliable)" }
            ),
            other => println!("    depth {:>3}     {}", d.depth, status_line(other)),
        }
    }
    match &sig.depth_match {
        Outcome::Computed { value: z } => println!(
            "  depth {} vs {}    {:.4} (n={}) vs {:.4} (n={})  z = {:+.4}  p = {:.4}",
            z.group_a.depth,
            z.group_b.depth,
            z.group_a.proportion,
            z.group_a.n,
            z.group_b.proportion,
            z.group_b.n,
            z.z,
            z.p_value
        ),
        other => println!("  depth z-test    {}", status_line(other)),
    }
    match &sig.permutation {
        Outcome::Computed { value: p } => println!(
            "  permutation     observed {:.4} vs null {:.4} ± {:.4}  p = {:.4} ({} rounds)",
            p.observed_match_rate, p.null_mean, p.null_std, p.p_value, p.rounds
        ),
        other => println!("  permutation     {}", status_line(other)),
    }

    println!("\nOutliers");
    match &report.outliers {
        Outcome::Computed { value: o } => {
            println!(
                "  {} of {} group(s) beyond |z| > {}  (mean {:.4}, std {:.4})",
                o.outlier_count,
                o.records.len(),
                o.threshold,
                o.population_mean,
                o.population_std
            );
            for r in o.outliers() {
                println!(
                    "    {:<24} {:.4}  z = {:+.3}  n = {}",
                    r.group_id,
                    r.statistic,
                    r.z_score.unwrap_or_default(),
                    r.n_children
                );
            }
        }
        other => println!("  {}", status_line(other)),
    }

    let degraded = report.degraded_components();
    if !degraded.is_empty() {
        println!("\n{} component(s) without a value:", degraded.len());
        for (name, reason) in degraded {
            println!("  {name}: {reason}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contagion_core::DecayMetric;

    #[test]
    fn test_build_config_defaults() {
        let cfg = build_config(None, &ConfigOverrides::default()).unwrap();
        assert_eq!(cfg, AnalysisConfig::default());
    }

    #[test]
    fn test_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"min_bucket_size": 10, "outlier_z_threshold": 3.0}"#).unwrap();
        let ov = ConfigOverrides {
            z_threshold: Some(2.5),
            decay_metric: Some("propagation_strength"),
            serial: true,
            ..ConfigOverrides::default()
        };
        let cfg = build_config(path.to_str(), &ov).unwrap();
        assert_eq!(cfg.min_bucket_size, 10);
        assert_eq!(cfg.outlier_z_threshold, 2.5);
        assert_eq!(cfg.decay_metric, DecayMetric::PropagationStrength);
        assert!(!cfg.parallel);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let ov = ConfigOverrides {
            min_bucket_size: Some(0),
            ..ConfigOverrides::default()
        };
        assert!(build_config(None, &ov).is_err());
        let ov = ConfigOverrides {
            depth_groups: Some("1-2"),
            ..ConfigOverrides::default()
        };
        assert!(build_config(None, &ov).unwrap_err().contains("depth groups"));
    }
}

//! Per-thread outlier detection.
//!
//! Pairs are grouped by thread (or by parent comment when no thread id is
//! present), each group is reduced to one statistic, and groups whose z-score
//! against the population exceeds the threshold in either direction are flagged.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::{AnalysisConfig, OutlierStatistic};
use crate::dataset::LabeledPair;
use crate::error::{ContagionError, Result};
use crate::stats::{EPS, ensure_finite, mean, population_std, quantile_sorted};

const COMPONENT: &str = "outliers";

/// Match-rate quantile at or above which a group counts as heavy-tail.
pub const HEAVY_TAIL_QUANTILE: f64 = 0.99;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PropagatorCategory {
    /// Every child matches the parent label (at least 2 children).
    Perfect,
    /// Match rate in [0.75, 1) with at least 3 children.
    Strong,
    /// Match rate at or above the population's 99th percentile (at least 2 children).
    HeavyTail,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OutlierRecord {
    pub group_id: String,
    pub n_children: usize,
    pub n_matches: usize,
    pub statistic: f64,
    /// `None` when the population has no spread.
    pub z_score: Option<f64>,
    pub is_outlier: bool,
    pub categories: Vec<PropagatorCategory>,
}

impl OutlierRecord {
    pub fn match_rate(&self) -> f64 {
        self.n_matches as f64 / self.n_children as f64
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OutlierReport {
    pub statistic: OutlierStatistic,
    pub threshold: f64,
    pub population_mean: f64,
    pub population_std: f64,
    pub heavy_tail_cutoff: f64,
    /// One record per group, ordered by group id.
    pub records: Vec<OutlierRecord>,
    pub outlier_count: usize,
}

impl OutlierReport {
    pub fn outliers(&self) -> impl Iterator<Item = &OutlierRecord> {
        self.records.iter().filter(|r| r.is_outlier)
    }
}

struct Group<'a> {
    pairs: Vec<&'a LabeledPair>,
}

impl Group<'_> {
    fn matches(&self) -> usize {
        self.pairs.iter().filter(|p| p.is_match()).count()
    }

    fn statistic(&self, kind: OutlierStatistic) -> f64 {
        let n = self.pairs.len() as f64;
        match kind {
            OutlierStatistic::MatchRate => self.matches() as f64 / n,
            OutlierStatistic::MeanValenceShift => {
                self.pairs.iter().map(|p| p.valence_shift()).sum::<f64>() / n
            }
        }
    }
}

fn categorize(n_children: usize, rate: f64, heavy_tail_cutoff: f64) -> Vec<PropagatorCategory> {
    let mut out = Vec::new();
    if n_children >= 2 && rate >= 1.0 {
        out.push(PropagatorCategory::Perfect);
    }
    if n_children >= 3 && (0.75..1.0).contains(&rate) {
        out.push(PropagatorCategory::Strong);
    }
    if n_children >= 2 && rate >= heavy_tail_cutoff {
        out.push(PropagatorCategory::HeavyTail);
    }
    out
}

/// Group, score and flag.
pub fn detect(pairs: &[LabeledPair], config: &AnalysisConfig) -> Result<OutlierReport> {
    if pairs.is_empty() {
        return Err(ContagionError::insufficient(COMPONENT, "no pairs to group"));
    }
    let mut groups: BTreeMap<&str, Group> = BTreeMap::new();
    for p in pairs {
        groups
            .entry(p.group_key())
            .or_insert_with(|| Group { pairs: Vec::new() })
            .pairs
            .push(p);
    }

    let kind = config.outlier_statistic;
    let stats: Vec<f64> = groups.values().map(|g| g.statistic(kind)).collect();
    for &s in &stats {
        ensure_finite(COMPONENT, "group statistic", s)?;
    }
    let population_mean = mean(&stats).unwrap_or_default();
    let population_std = population_std(&stats, population_mean);
    let spread = population_std > EPS;

    let mut rates: Vec<f64> = groups
        .values()
        .map(|g| g.matches() as f64 / g.pairs.len() as f64)
        .collect();
    rates.sort_by(f64::total_cmp);
    let heavy_tail_cutoff = quantile_sorted(&rates, HEAVY_TAIL_QUANTILE).unwrap_or(1.0);

    let threshold = config.outlier_z_threshold;
    let records: Vec<OutlierRecord> = groups
        .iter()
        .zip(&stats)
        .map(|((id, group), &statistic)| {
            let z_score = spread.then(|| (statistic - population_mean) / population_std);
            let n_children = group.pairs.len();
            let n_matches = group.matches();
            OutlierRecord {
                group_id: id.to_string(),
                n_children,
                n_matches,
                statistic,
                z_score,
                is_outlier: z_score.is_some_and(|z| z.abs() > threshold),
                categories: categorize(
                    n_children,
                    n_matches as f64 / n_children as f64,
                    heavy_tail_cutoff,
                ),
            }
        })
        .collect();

    let outlier_count = records.iter().filter(|r| r.is_outlier).count();
    if spread {
        log::info!(
            "outliers: {outlier_count} of {} group(s) beyond |z| > {threshold}",
            records.len()
        );
    } else {
        log::info!(
            "outliers: {} group(s) share one statistic value, nothing flagged",
            records.len()
        );
    }

    Ok(OutlierReport {
        statistic: kind,
        threshold,
        population_mean,
        population_std,
        heavy_tail_cutoff,
        records,
        outlier_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(id: usize, group: &str, parent: &str, child: &str, shift: f64) -> LabeledPair {
        LabeledPair {
            pair_id: format!("p{id}"),
            parent_id: format!("{group}-root"),
            child_id: format!("c{id}"),
            parent_macro_label: parent.into(),
            parent_valence: 0.0,
            child_macro_label: child.into(),
            child_valence: shift,
            depth: 1,
            thread_id: Some(group.into()),
        }
    }

    /// `groups[i]` = (matches, total) for thread `t{i}`.
    fn batch(groups: &[(usize, usize)]) -> Vec<LabeledPair> {
        let mut ps = Vec::new();
        for (g, &(matches, total)) in groups.iter().enumerate() {
            for k in 0..total {
                let child = if k < matches { "joy" } else { "neutral" };
                ps.push(pair(ps.len(), &format!("t{g:02}"), "joy", child, 0.0));
            }
        }
        ps
    }

    #[test]
    fn test_zero_spread_flags_nothing() {
        let ps = batch(&[(1, 2), (2, 4), (3, 6), (5, 10)]);
        let r = detect(&ps, &AnalysisConfig::default()).unwrap();
        assert_eq!(r.population_std, 0.0);
        assert_eq!(r.outlier_count, 0);
        assert!(r.records.iter().all(|rec| rec.z_score.is_none()));
    }

    #[test]
    fn test_flags_extreme_group_both_directions() {
        // Nine groups at rate 0.5 and one at 0: mean 0.45, std 0.15, z = -3.
        let mut layout = vec![(1, 2); 9];
        layout.push((0, 2));
        let r = detect(&batch(&layout), &AnalysisConfig::default()).unwrap();
        assert_eq!(r.outlier_count, 1);
        let flagged: Vec<_> = r.outliers().collect();
        assert_eq!(flagged[0].group_id, "t09");
        assert!((flagged[0].z_score.unwrap() + 3.0).abs() < 1e-9);

        // Mirror case, one perfect group.
        let mut layout = vec![(1, 2); 9];
        layout.push((2, 2));
        let r = detect(&batch(&layout), &AnalysisConfig::default()).unwrap();
        let flagged: Vec<_> = r.outliers().collect();
        assert_eq!(flagged.len(), 1);
        assert!((flagged[0].z_score.unwrap() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_is_strict() {
        // Two groups: z = ±1 exactly.
        let ps = batch(&[(0, 2), (2, 2)]);
        let cfg = AnalysisConfig {
            outlier_z_threshold: 1.0,
            ..AnalysisConfig::default()
        };
        let r = detect(&ps, &cfg).unwrap();
        assert_eq!(r.outlier_count, 0);
        let cfg = AnalysisConfig {
            outlier_z_threshold: 0.99,
            ..AnalysisConfig::default()
        };
        assert_eq!(detect(&ps, &cfg).unwrap().outlier_count, 2);
    }

    #[test]
    fn test_mean_valence_shift_statistic() {
        let ps = vec![
            pair(0, "a", "joy", "joy", 0.4),
            pair(1, "a", "joy", "joy", 0.2),
            pair(2, "b", "joy", "joy", -0.2),
        ];
        let cfg = AnalysisConfig {
            outlier_statistic: OutlierStatistic::MeanValenceShift,
            ..AnalysisConfig::default()
        };
        let r = detect(&ps, &cfg).unwrap();
        assert!((r.records[0].statistic - 0.3).abs() < 1e-12);
        assert!((r.records[1].statistic + 0.2).abs() < 1e-12);
        assert!((r.population_mean - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_groups_fall_back_to_parent_id() {
        let mut ps = batch(&[(1, 1), (0, 1)]);
        for p in &mut ps {
            p.thread_id = None;
        }
        ps[1].parent_id = ps[0].parent_id.clone();
        let r = detect(&ps, &AnalysisConfig::default()).unwrap();
        assert_eq!(r.records.len(), 1);
        assert_eq!(r.records[0].group_id, "t00-root");
        assert_eq!(r.records[0].n_children, 2);
    }

    #[test]
    fn test_categories() {
        let ps = batch(&[(2, 2), (3, 4), (1, 1), (0, 3), (2, 2)]);
        let r = detect(&ps, &AnalysisConfig::default()).unwrap();
        let cats: Vec<&[PropagatorCategory]> =
            r.records.iter().map(|rec| rec.categories.as_slice()).collect();
        assert_eq!(cats[0], [PropagatorCategory::Perfect, PropagatorCategory::HeavyTail]);
        assert_eq!(cats[1], [PropagatorCategory::Strong]);
        // A single child is never categorized.
        assert!(cats[2].is_empty());
        assert!(cats[3].is_empty());
        assert_eq!(r.heavy_tail_cutoff, 1.0);
    }

    #[test]
    fn test_empty_is_insufficient() {
        assert!(detect(&[], &AnalysisConfig::default())
            .unwrap_err()
            .is_insufficient_data());
    }
}

//! Significance tests against an independence null.
//!
//! - Chi-square test of independence between parent and child macro labels,
//!   over the whole batch and within each depth.
//! - Two-proportion z-test comparing label-match rates of two depths.
//! - Label-shuffle permutation test of the overall match rate.

use serde::Serialize;
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::config::AnalysisConfig;
use crate::dataset::LabeledPair;
use crate::decay::bucket_by_depth;
use crate::error::{ContagionError, Result};
use crate::outcome::Outcome;
use crate::stats::{ensure_finite, mean, population_std};
use crate::taxonomy::Taxonomy;
use crate::transitions::count_table;

const COMPONENT: &str = "significance";

// ---------------------------------------------------------------------------
// Chi-square test of independence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChiSquareResult {
    pub statistic: f64,
    pub degrees_of_freedom: usize,
    pub p_value: f64,
    pub n: u64,
    /// Yates continuity correction applied (only for 1 degree of freedom).
    pub yates_correction: bool,
    pub min_expected: f64,
    /// Cells whose expected count is below the configured minimum.
    pub sparse_cells: usize,
    /// False when any expected count is below the minimum.
    pub reliable: bool,
}

/// Chi-square test on a contingency table.
///
/// All-zero rows and columns are dropped first, so only observed labels form
/// the table. One degree of freedom applies the Yates correction; zero degrees
/// of freedom give statistic 0 and p-value 1.
pub fn chi_square(table: &[Vec<u64>], min_expected_count: f64) -> Result<ChiSquareResult> {
    let col_count = table.first().map_or(0, Vec::len);
    let row_totals: Vec<u64> = table.iter().map(|r| r.iter().sum()).collect();
    let col_totals: Vec<u64> = (0..col_count)
        .map(|c| table.iter().map(|r| r[c]).sum())
        .collect();
    let n: u64 = row_totals.iter().sum();
    if n == 0 {
        return Err(ContagionError::insufficient(COMPONENT, "empty contingency table"));
    }

    let rows: Vec<usize> = (0..table.len()).filter(|&r| row_totals[r] > 0).collect();
    let cols: Vec<usize> = (0..col_count).filter(|&c| col_totals[c] > 0).collect();
    let dof = (rows.len() - 1) * (cols.len() - 1);
    let yates = dof == 1;

    let mut statistic = 0.0;
    let mut min_expected = f64::INFINITY;
    let mut sparse_cells = 0;
    for &r in &rows {
        for &c in &cols {
            let expected = row_totals[r] as f64 * col_totals[c] as f64 / n as f64;
            min_expected = min_expected.min(expected);
            if expected < min_expected_count {
                sparse_cells += 1;
            }
            let mut diff = (table[r][c] as f64 - expected).abs();
            if yates {
                diff -= diff.min(0.5);
            }
            statistic += diff * diff / expected;
        }
    }
    let statistic = ensure_finite(COMPONENT, "chi-square statistic", statistic)?;

    let p_value = if dof == 0 {
        1.0
    } else {
        let dist = ChiSquared::new(dof as f64).map_err(|e| {
            ContagionError::computation(COMPONENT, format!("chi-square distribution: {e}"))
        })?;
        ensure_finite(COMPONENT, "chi-square p-value", dist.sf(statistic))?
    };

    Ok(ChiSquareResult {
        statistic: if dof == 0 { 0.0 } else { statistic },
        degrees_of_freedom: dof,
        p_value,
        n,
        yates_correction: yates,
        min_expected,
        sparse_cells,
        reliable: sparse_cells == 0,
    })
}

/// Chi-square test over the parent/child macro labels of `pairs`.
pub fn label_independence<'a>(
    pairs: impl IntoIterator<Item = &'a LabeledPair>,
    taxonomy: &Taxonomy,
    min_expected_count: f64,
) -> Result<ChiSquareResult> {
    let table = count_table(pairs, taxonomy)?;
    chi_square(&table, min_expected_count)
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DepthChiSquare {
    pub depth: u32,
    pub result: Outcome<ChiSquareResult>,
}

// ---------------------------------------------------------------------------
// Two-proportion z-test
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProportionGroup {
    pub depth: u32,
    pub successes: usize,
    pub n: usize,
    pub proportion: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TwoProportionZ {
    pub group_a: ProportionGroup,
    pub group_b: ProportionGroup,
    pub pooled_proportion: f64,
    pub z: f64,
    pub p_value: f64,
}

/// Two-sided z-test for `successes_a / n_a` vs `successes_b / n_b`.
///
/// Returns `(z, p_value, pooled)`. An empty group or a zero pooled standard
/// error is insufficient data.
pub fn two_proportion_z(
    successes_a: usize,
    n_a: usize,
    successes_b: usize,
    n_b: usize,
) -> Result<(f64, f64, f64)> {
    if n_a == 0 || n_b == 0 {
        return Err(ContagionError::insufficient(
            COMPONENT,
            format!("empty comparison group (n_a={n_a}, n_b={n_b})"),
        ));
    }
    let p_a = successes_a as f64 / n_a as f64;
    let p_b = successes_b as f64 / n_b as f64;
    let pooled = (successes_a + successes_b) as f64 / (n_a + n_b) as f64;
    let se = (pooled * (1.0 - pooled) * (1.0 / n_a as f64 + 1.0 / n_b as f64)).sqrt();
    if se == 0.0 {
        return Err(ContagionError::insufficient(COMPONENT, "standard error is zero"));
    }
    let z = ensure_finite(COMPONENT, "z statistic", (p_a - p_b) / se)?;
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| ContagionError::computation(COMPONENT, format!("normal distribution: {e}")))?;
    let p_value = (2.0 * normal.sf(z.abs())).clamp(0.0, 1.0);
    Ok((z, p_value, pooled))
}

fn match_group(pairs: &[LabeledPair], depth: u32) -> ProportionGroup {
    let (successes, n) = pairs
        .iter()
        .filter(|p| p.depth == depth)
        .fold((0, 0), |(s, n), p| (s + usize::from(p.is_match()), n + 1));
    ProportionGroup {
        depth,
        successes,
        n,
        proportion: if n == 0 { 0.0 } else { successes as f64 / n as f64 },
    }
}

/// Compare the label-match rate of two depths.
pub fn depth_match_test(pairs: &[LabeledPair], depths: (u32, u32)) -> Result<TwoProportionZ> {
    let group_a = match_group(pairs, depths.0);
    let group_b = match_group(pairs, depths.1);
    let (z, p_value, pooled_proportion) =
        two_proportion_z(group_a.successes, group_a.n, group_b.successes, group_b.n)?;
    Ok(TwoProportionZ {
        group_a,
        group_b,
        pooled_proportion,
        z,
        p_value,
    })
}

// ---------------------------------------------------------------------------
// Permutation test
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PermutationTest {
    pub observed_match_rate: f64,
    pub null_mean: f64,
    pub null_std: f64,
    pub rounds: usize,
    pub seed: u64,
    /// Shuffles whose match rate reached the observed rate.
    pub exceedances: usize,
    /// One-sided (observed ≥ null), `(1 + exceedances) / (rounds + 1)`.
    pub p_value: f64,
}

/// Shuffle child labels against parent labels to build a null for the match rate.
pub fn permutation_match_test(
    pairs: &[LabeledPair],
    rounds: usize,
    seed: u64,
) -> Result<PermutationTest> {
    if pairs.len() < 2 {
        return Err(ContagionError::insufficient(
            COMPONENT,
            format!("permutation test needs at least 2 pairs, got {}", pairs.len()),
        ));
    }
    if rounds == 0 {
        return Err(ContagionError::insufficient(COMPONENT, "permutation test disabled"));
    }

    let n = pairs.len() as f64;
    let parents: Vec<&str> = pairs.iter().map(|p| p.parent_macro_label.as_str()).collect();
    let mut children: Vec<&str> = pairs.iter().map(|p| p.child_macro_label.as_str()).collect();
    let rate = |children: &[&str]| {
        parents.iter().zip(children).filter(|(a, b)| a == b).count() as f64 / n
    };
    let observed = rate(&children);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut null = Vec::with_capacity(rounds);
    let mut exceedances = 0;
    for _ in 0..rounds {
        children.shuffle(&mut rng);
        let r = rate(&children);
        if r >= observed - 1e-12 {
            exceedances += 1;
        }
        null.push(r);
    }
    let null_mean = mean(&null).unwrap_or_default();
    let null_std = population_std(&null, null_mean);
    Ok(PermutationTest {
        observed_match_rate: observed,
        null_mean,
        null_std,
        rounds,
        seed,
        exceedances,
        p_value: (1 + exceedances) as f64 / (rounds + 1) as f64,
    })
}

// ---------------------------------------------------------------------------
// Battery
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SignificanceReport {
    pub chi_square: Outcome<ChiSquareResult>,
    pub chi_square_by_depth: Vec<DepthChiSquare>,
    pub depth_match: Outcome<TwoProportionZ>,
    pub permutation: Outcome<PermutationTest>,
}

impl SignificanceReport {
    /// Every test marked failed with the same reason.
    pub fn failed(reason: &str) -> Self {
        let failed = || reason.to_string();
        Self {
            chi_square: Outcome::Failed { reason: failed() },
            chi_square_by_depth: Vec::new(),
            depth_match: Outcome::Failed { reason: failed() },
            permutation: Outcome::Failed { reason: failed() },
        }
    }
}

/// Run every test. Individual failures are recorded, never propagated.
pub fn run(pairs: &[LabeledPair], taxonomy: &Taxonomy, config: &AnalysisConfig) -> SignificanceReport {
    let chi_square = Outcome::from_result(
        "chi_square",
        label_independence(pairs, taxonomy, config.min_expected_count),
    );
    if let Some(c) = chi_square.value() {
        log::info!(
            "chi-square: statistic={:.4}, dof={}, p={:.4}{}",
            c.statistic,
            c.degrees_of_freedom,
            c.p_value,
            if c.reliable { "" } else { " (unreliable: sparse cells)" }
        );
    }

    let chi_square_by_depth = bucket_by_depth(pairs)
        .into_iter()
        .map(|(depth, bucket)| DepthChiSquare {
            depth,
            result: Outcome::from_result(
                "chi_square_by_depth",
                label_independence(bucket, taxonomy, config.min_expected_count),
            ),
        })
        .collect();

    let depth_match = Outcome::from_result(
        "depth_match",
        depth_match_test(pairs, config.depth_groups),
    );
    if let Some(z) = depth_match.value() {
        log::info!(
            "depth {} vs {} match rate: {:.4} vs {:.4}, z={:.4}, p={:.4}",
            z.group_a.depth,
            z.group_b.depth,
            z.group_a.proportion,
            z.group_b.proportion,
            z.z,
            z.p_value
        );
    }

    let permutation = Outcome::from_result(
        "permutation",
        permutation_match_test(pairs, config.permutation_rounds, config.permutation_seed),
    );

    SignificanceReport {
        chi_square,
        chi_square_by_depth,
        depth_match,
        permutation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(id: usize, parent: &str, child: &str, depth: u32) -> LabeledPair {
        LabeledPair {
            pair_id: format!("p{id}"),
            parent_id: format!("a{id}"),
            child_id: format!("b{id}"),
            parent_macro_label: parent.into(),
            parent_valence: 0.0,
            child_macro_label: child.into(),
            child_valence: 0.0,
            depth,
            thread_id: None,
        }
    }

    #[test]
    fn test_independent_table_high_p() {
        // Every parent label spreads children uniformly over the same labels.
        let labels = ["joy", "anger", "sadness", "neutral"];
        let mut ps = Vec::new();
        for parent in labels {
            for child in labels {
                for _ in 0..25 {
                    ps.push(pair(ps.len(), parent, child, 1));
                }
            }
        }
        let r = label_independence(&ps, &Taxonomy::goemotions(), 5.0).unwrap();
        assert_eq!(r.degrees_of_freedom, 9);
        assert!(r.statistic.abs() < 1e-9);
        assert!(r.p_value > 0.99);
        assert!(r.reliable);
        assert_eq!(r.n, 400);
    }

    #[test]
    fn test_dependent_table_low_p() {
        let table = vec![vec![50, 5], vec![5, 50]];
        let r = chi_square(&table, 5.0).unwrap();
        assert_eq!(r.degrees_of_freedom, 1);
        assert!(r.yates_correction);
        assert!(r.p_value < 1e-10);
    }

    #[test]
    fn test_yates_matches_reference() {
        // Reference: scipy.stats.chi2_contingency([[10, 20], [20, 10]]) → 5.4, p ≈ 0.0201.
        let r = chi_square(&[vec![10, 20], vec![20, 10]], 5.0).unwrap();
        assert!((r.statistic - 5.4).abs() < 1e-9);
        assert!((r.p_value - 0.0201).abs() < 5e-4);
    }

    #[test]
    fn test_sparse_cells_marked_unreliable() {
        let r = chi_square(&[vec![3, 1, 0], vec![0, 2, 4]], 5.0).unwrap();
        assert!(!r.reliable);
        assert_eq!(r.sparse_cells, 6);
        assert!(r.min_expected < 5.0);
        // Result is still reported.
        assert!(r.statistic > 0.0);
    }

    #[test]
    fn test_zero_rows_and_columns_dropped() {
        let r = chi_square(&[vec![10, 0, 20], vec![0, 0, 0], vec![20, 0, 10]], 5.0).unwrap();
        assert_eq!(r.degrees_of_freedom, 1);
        assert!((r.statistic - 5.4).abs() < 1e-9);
    }

    #[test]
    fn test_single_cell_zero_dof() {
        let r = chi_square(&[vec![0, 0], vec![0, 7]], 5.0).unwrap();
        assert_eq!(r.degrees_of_freedom, 0);
        assert_eq!(r.statistic, 0.0);
        assert_eq!(r.p_value, 1.0);
    }

    #[test]
    fn test_empty_table_insufficient() {
        assert!(chi_square(&[vec![0, 0], vec![0, 0]], 5.0)
            .unwrap_err()
            .is_insufficient_data());
    }

    #[test]
    fn test_two_proportion_reference() {
        // 60/100 vs 40/100: pooled 0.5, se = sqrt(0.25 * 0.02), z ≈ 2.828.
        let (z, p, pooled) = two_proportion_z(60, 100, 40, 100).unwrap();
        assert!((pooled - 0.5).abs() < 1e-12);
        assert!((z - 2.0 * 2.0_f64.sqrt()).abs() < 1e-9);
        assert!((p - 0.00468).abs() < 1e-4);
    }

    #[test]
    fn test_two_proportion_degenerate() {
        assert!(two_proportion_z(0, 0, 1, 2).unwrap_err().is_insufficient_data());
        // All successes in both groups: zero standard error.
        assert!(two_proportion_z(3, 3, 5, 5).unwrap_err().is_insufficient_data());
    }

    #[test]
    fn test_depth_match_groups() {
        let ps = vec![
            pair(0, "joy", "joy", 1),
            pair(1, "anger", "anger", 1),
            pair(2, "joy", "neutral", 2),
            pair(3, "anger", "neutral", 2),
            pair(4, "joy", "neutral", 3),
        ];
        let z = depth_match_test(&ps, (1, 2)).unwrap();
        assert_eq!(z.group_a.successes, 2);
        assert_eq!(z.group_a.proportion, 1.0);
        assert_eq!(z.group_b.n, 2);
        assert_eq!(z.group_b.proportion, 0.0);
        assert!(z.z > 0.0);

        let missing = depth_match_test(&ps, (1, 9)).unwrap_err();
        assert!(missing.is_insufficient_data());
    }

    #[test]
    fn test_permutation_is_seeded() {
        let mut ps = Vec::new();
        for i in 0..40 {
            let label = ["joy", "anger", "fear", "neutral"][i % 4];
            ps.push(pair(i, label, label, 1));
        }
        let a = permutation_match_test(&ps, 200, 7).unwrap();
        let b = permutation_match_test(&ps, 200, 7).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.observed_match_rate, 1.0);
        // Perfect matching is far above the shuffled null.
        assert!(a.p_value < 0.05);
        assert!(a.null_mean < 0.5);
    }

    #[test]
    fn test_permutation_guards() {
        let ps = vec![pair(0, "joy", "joy", 1)];
        assert!(permutation_match_test(&ps, 10, 1).unwrap_err().is_insufficient_data());
        let ps = vec![pair(0, "joy", "joy", 1), pair(1, "fear", "joy", 1)];
        assert!(permutation_match_test(&ps, 0, 1).unwrap_err().is_insufficient_data());
    }

    #[test]
    fn test_run_records_per_depth_results() {
        let ps = vec![
            pair(0, "joy", "joy", 1),
            pair(1, "anger", "anger", 1),
            pair(2, "joy", "neutral", 2),
            pair(3, "anger", "neutral", 2),
        ];
        let report = run(&ps, &Taxonomy::goemotions(), &AnalysisConfig::default());
        assert_eq!(report.chi_square_by_depth.len(), 2);
        let chi = report.chi_square.value().unwrap();
        assert!(!chi.reliable);
        assert!(report.depth_match.is_computed());
        assert!(report.permutation.is_computed());
    }
}

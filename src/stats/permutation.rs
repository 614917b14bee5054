//! One-sample sign-flip permutation t-test with t-max correction.
//!
//! Matches `mne.stats.permutation_t_test(X, n_permutations, tail=0)` with one
//! deliberate difference in bookkeeping: `n_permutations` counts *random*
//! flips, and the observed statistic is added on top, so the smallest
//! attainable p-value is `1 / (n_permutations + 1)`.
//!
//! # Algorithm
//!
//! For `X` of shape `[n_subjects, n_tests]` holding paired differences:
//!
//! ```text
//! t_j      = mean_j / (std_j / sqrt(n))          std with ddof = 1
//! flip s   ∈ {−1, +1}^n                           one per permutation
//! t_j(s)   = mean(s ∘ X_j) / (std(s ∘ X_j) / sqrt(n))
//! H0       = { max_j |t_j(s)| }  ∪ { max_j |t_j| }     (t-max)
//! p_j      = #{h ∈ H0 : h ≥ |t_j|} / |H0|
//! ```
//!
//! `E[x²]` is invariant under sign flips, so each permutation only needs the
//! flipped means: `std(s) = sqrt(E[x²] − mean(s)²) · sqrt(n / (n − 1))`.
//!
//! When `2^(n−1) − 1 ≤ n_permutations` every distinct flip (first subject
//! fixed, the test is two-sided) is enumerated instead and the test is exact.
//!
//! # Determinism
//!
//! Permutation `i` draws its signs from `Xoshiro256++` seeded with
//! `splitmix64(seed, i)`, so results do not depend on how rayon schedules the
//! work.
use log::{debug, warn};
use ndarray::{Array1, ArrayView2, Axis};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from the permutation tester.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PermutationError {
    #[error("need at least 2 subjects, got {0}")]
    TooFewSubjects(usize),
    #[error("difference matrix has no columns")]
    NoTests,
    #[error("n_permutations must be positive")]
    NoPermutations,
    #[error("non-finite difference at subject {row}, column {col}")]
    NonFinite { row: usize, col: usize },
}

/// Multiple-comparison handling across the columns of one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Correction {
    /// Null distribution of the maximum |t| across columns (FWER control).
    #[default]
    MaxStatistic,
    /// Separate null distribution for each column.
    Uncorrected,
}

/// Permutation test settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermutationConfig {
    /// Number of random sign flips.
    ///
    /// Default: `2000`.
    pub n_permutations: usize,
    /// Base seed for the per-permutation RNG streams.
    ///
    /// Default: `42`.
    pub seed: u64,
    /// Default: [`Correction::MaxStatistic`].
    pub correction: Correction,
    /// Significance level used for reporting and resolution checks.
    ///
    /// Default: `0.05`.
    pub alpha: f64,
}

impl Default for PermutationConfig {
    fn default() -> Self {
        Self {
            n_permutations: 2000,
            seed: 42,
            correction: Correction::MaxStatistic,
            alpha: 0.05,
        }
    }
}

/// Output of [`permutation_t_test`].
#[derive(Debug, Clone, PartialEq)]
pub struct PermutationResult {
    /// Observed t statistic per column.
    pub t_obs: Array1<f64>,
    /// Corrected (or per-column, see [`Correction`]) p-value per column.
    pub p_values: Array1<f64>,
    /// Sorted max-|t| null distribution, observed max included.
    pub h0: Array1<f64>,
    /// Number of sign flips evaluated (observed excluded).
    pub n_flips: usize,
    /// `true` when all distinct flips were enumerated.
    pub exact: bool,
    pub correction: Correction,
}

impl PermutationResult {
    /// Smallest p-value this test could have produced.
    pub fn min_p_value(&self) -> f64 {
        1.0 / (self.n_flips + 1) as f64
    }
}

/// Counter-based seed derivation (SplitMix64).
#[inline]
pub fn counter_rng_seed(base_seed: u64, counter: u64) -> u64 {
    let mut z = base_seed.wrapping_add(counter.wrapping_mul(0x9e37_79b9_7f4a_7c15));
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Number of flips an exhaustive two-sided test needs: `2^(n−1) − 1`.
///
/// `None` if that does not fit in `usize`.
pub fn exact_flip_count(n_subjects: usize) -> Option<usize> {
    let bits = u32::try_from(n_subjects.checked_sub(1)?).ok()?;
    1_usize.checked_shl(bits).map(|v| v - 1)
}

/// Smallest attainable p-value for `n_subjects` and `n_permutations`.
pub fn min_p_value(n_subjects: usize, n_permutations: usize) -> f64 {
    let flips = match exact_flip_count(n_subjects) {
        Some(exact) if exact <= n_permutations => exact,
        _ => n_permutations,
    };
    1.0 / (flips + 1) as f64
}

/// Warn when `alpha` is finer than the test can resolve.
///
/// Returns `false` if a warning was emitted.
pub fn check_resolution(alpha: f64, n_subjects: usize, n_permutations: usize) -> bool {
    let p_min = min_p_value(n_subjects, n_permutations);
    if alpha < p_min {
        warn!(
            "alpha = {alpha} is below the smallest attainable p-value {p_min:.3e} \
             ({n_subjects} subjects, {n_permutations} permutations); increase n_permutations"
        );
        return false;
    }
    true
}

/// Sign-flip permutation t-test against a zero mean, column by column.
///
/// `x` is `[n_subjects, n_tests]`; rows with missing values must already be
/// removed.
pub fn permutation_t_test(
    x: ArrayView2<'_, f64>,
    n_permutations: usize,
    seed: u64,
    correction: Correction,
) -> Result<PermutationResult, PermutationError> {
    let (n, n_tests) = x.dim();
    if n < 2 {
        return Err(PermutationError::TooFewSubjects(n));
    }
    if n_tests == 0 {
        return Err(PermutationError::NoTests);
    }
    if n_permutations == 0 {
        return Err(PermutationError::NoPermutations);
    }
    if let Some(((row, col), _)) = x.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(PermutationError::NonFinite { row, col });
    }

    let nf = n as f64;
    let x2: Array1<f64> = x.mapv(|v| v * v).sum_axis(Axis(0)) / nf;
    let mu0: Array1<f64> = x.sum_axis(Axis(0)) / nf;
    let dof_scaling = (nf / (nf - 1.0)).sqrt();
    let t_obs: Array1<f64> = mu0
        .iter()
        .zip(x2.iter())
        .map(|(&m, &m2)| t_from_moments(m, m2, nf, dof_scaling))
        .collect();
    let abs_obs: Vec<f64> = t_obs.iter().map(|t| t.abs()).collect();

    let (flips, exact) = match exact_flip_count(n) {
        Some(all) if all <= n_permutations => (all, true),
        _ => (n_permutations, false),
    };
    debug!(
        "permuting {flips} times{} ({n} subjects, {n_tests} tests)",
        if exact { " (exact test)" } else { "" }
    );

    // Per-flip |t| for every column, in flip order.
    let null: Vec<Vec<f64>> = (0..flips)
        .into_par_iter()
        .map_init(
            || vec![0.0_f64; n],
            |signs, i| {
                if exact {
                    exact_signs(i + 1, signs);
                } else {
                    random_signs(counter_rng_seed(seed, i as u64), signs);
                }
                (0..n_tests)
                    .map(|j| {
                        let col = x.column(j);
                        let mu = signs.iter().zip(col.iter()).map(|(s, v)| s * v).sum::<f64>() / nf;
                        t_from_moments(mu, x2[j], nf, dof_scaling).abs()
                    })
                    .collect::<Vec<f64>>()
            },
        )
        .collect();

    let obs_max = abs_obs.iter().copied().fold(0.0_f64, f64::max);
    let mut h0: Vec<f64> = null
        .iter()
        .map(|row| row.iter().copied().fold(0.0_f64, f64::max))
        .collect();
    h0.push(obs_max);
    h0.sort_by(|a, b| a.total_cmp(b));

    let denom = (flips + 1) as f64;
    let p_values: Array1<f64> = abs_obs
        .iter()
        .enumerate()
        .map(|(j, &t)| {
            let exceed = match correction {
                Correction::MaxStatistic => h0.iter().filter(|&&h| h >= t).count(),
                // Observed value always counts once for its own column.
                Correction::Uncorrected => null.iter().filter(|row| row[j] >= t).count() + 1,
            };
            exceed as f64 / denom
        })
        .collect();

    Ok(PermutationResult {
        t_obs,
        p_values,
        h0: Array1::from(h0),
        n_flips: flips,
        exact,
        correction,
    })
}

/// Run [`permutation_t_test`] with settings from a [`PermutationConfig`].
pub fn permutation_t_test_with(
    x: ArrayView2<'_, f64>,
    cfg: &PermutationConfig,
) -> Result<PermutationResult, PermutationError> {
    check_resolution(cfg.alpha, x.nrows(), cfg.n_permutations);
    permutation_t_test(x, cfg.n_permutations, cfg.seed, cfg.correction)
}

/// One-sample t from the first two raw moments.
///
/// Zero mean with zero spread gives `t = 0`; a non-zero mean with zero spread
/// gives `±inf`.
#[inline]
fn t_from_moments(mean: f64, mean_sq: f64, n: f64, dof_scaling: f64) -> f64 {
    let std = (mean_sq - mean * mean).max(0.0).sqrt() * dof_scaling;
    if std == 0.0 {
        return if mean == 0.0 { 0.0 } else { mean.signum() * f64::INFINITY };
    }
    mean / (std / n.sqrt())
}

/// Signs of flip number `code` (1-based) in the exhaustive enumeration.
///
/// Bit `k` of `code` flips subject `n − 1 − k`; subject 0 is never flipped.
fn exact_signs(code: usize, signs: &mut [f64]) {
    let n = signs.len();
    for (k, s) in signs.iter_mut().enumerate() {
        let bit = n - 1 - k;
        *s = if bit < usize::BITS as usize && (code >> bit) & 1 == 1 { -1.0 } else { 1.0 };
    }
}

fn random_signs(seed: u64, signs: &mut [f64]) {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    for s in signs.iter_mut() {
        *s = if rng.random::<bool>() { -1.0 } else { 1.0 };
    }
}

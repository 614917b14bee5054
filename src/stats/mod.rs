//! Group-level statistics.
//!
//! - [`permutation`]: sign-flip permutation t-test with t-max correction,
//!   matching `mne.stats.permutation_t_test`.
//! - [`describe`]: column summaries in the layout of `DataFrame.describe()`.

pub mod describe;
pub mod permutation;

pub use describe::{quantile_sorted, Describe, Summary};
pub use permutation::{
    check_resolution, counter_rng_seed, exact_flip_count, min_p_value, permutation_t_test,
    permutation_t_test_with, Correction, PermutationConfig, PermutationError, PermutationResult,
};

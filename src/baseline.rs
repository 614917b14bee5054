//! Epoch baseline correction.
//!
//! `baseline_correct_inplace` matches `mne.Epochs(..., baseline=(tmin, tmax))`:
//!   for each epoch and channel: epoch[e, c, :] -= mean(epoch[e, c, b0..=b1])
//!
//! `b0..=b1` are the sample indices of the baseline window inside the epoch.
use std::ops::RangeInclusive;

use ndarray::{s, Array3, Axis};

/// Per-epoch, per-channel baseline correction over the sample range `window`.
///
/// `epochs`: [E, C, T]. An empty or out-of-range window leaves the data untouched.
pub fn baseline_correct_inplace(epochs: &mut Array3<f64>, window: RangeInclusive<usize>) {
    let n_t = epochs.len_of(Axis(2));
    let (b0, b1) = (*window.start(), *window.end());
    if b0 > b1 || b1 >= n_t {
        return;
    }
    for mut epoch in epochs.outer_iter_mut() {
        for mut row in epoch.outer_iter_mut() {
            let m = row.slice(s![b0..=b1]).mean().unwrap_or(0.0);
            row.mapv_inplace(|v| v - m);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn baseline_window_mean_is_zero() {
        let mut epochs = Array3::from_shape_fn((3, 4, 200), |(e, c, t)| {
            e as f64 * 10.0 + c as f64 * 5.0 + (t as f64 * 0.1).sin()
        });
        baseline_correct_inplace(&mut epochs, 20..=80);
        for e in 0..3 {
            for c in 0..4 {
                let m = epochs.slice(s![e, c, 20..=80]).mean().unwrap();
                approx::assert_abs_diff_eq!(m, 0.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn only_offset_changes() {
        let mut epochs = Array3::from_shape_fn((1, 1, 50), |(_, _, t)| t as f64);
        baseline_correct_inplace(&mut epochs, 0..=9);
        // mean(0..=9) = 4.5
        approx::assert_abs_diff_eq!(epochs[[0, 0, 0]], -4.5, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(epochs[[0, 0, 49]], 44.5, epsilon = 1e-12);
    }

    #[test]
    fn out_of_range_window_is_noop() {
        let mut epochs = Array3::from_elem((2, 2, 10), 3.0);
        baseline_correct_inplace(&mut epochs, 5..=20);
        assert!(epochs.iter().all(|&v| v == 3.0));
    }
}

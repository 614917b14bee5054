//! Re-referencing of continuous `[C, T]` recordings.
//!
//! - [`add_reference_channel`]: append the implicit reference electrode as a
//!   flat channel, matching `mne.add_reference_channels(raw, ['TH6'])`.
//! - [`rereference_to`]: subtract a named channel from every channel, falling
//!   back to the average reference when it is absent. Matches
//!   `raw.set_eeg_reference(ref_channels=[name])` / `'average'`.
//! - [`average_reference_inplace`]: `data[c, t] -= mean(data[:, t])`.
use log::{debug, warn};
use ndarray::{concatenate, Array2, Axis};

/// Reference channel of the study montage.
pub const REFERENCE_CHANNEL: &str = "TH6";

/// Which reference ended up applied by [`rereference_to`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppliedReference {
    Channel(String),
    Average,
}

/// Append an all-zero row named `name`.
///
/// No-op if a channel of that name is already present.
pub fn add_reference_channel(data: &mut Array2<f64>, ch_names: &mut Vec<String>, name: &str) {
    if ch_names.iter().any(|c| c == name) {
        debug!("reference channel {name} already present");
        return;
    }
    let zeros = Array2::<f64>::zeros((1, data.ncols()));
    // Shapes agree on the time axis by construction.
    if let Ok(stacked) = concatenate(Axis(0), &[data.view(), zeros.view()]) {
        *data = stacked;
        ch_names.push(name.to_string());
    }
}

/// Re-reference every channel to `name`, or to the average if `name` is absent.
pub fn rereference_to(data: &mut Array2<f64>, ch_names: &[String], name: &str) -> AppliedReference {
    match ch_names.iter().position(|c| c == name) {
        Some(idx) => {
            let reference = data.row(idx).to_owned();
            for mut row in data.rows_mut() {
                row -= &reference;
            }
            AppliedReference::Channel(name.to_string())
        }
        None => {
            warn!("reference channel {name} not found, using average reference");
            average_reference_inplace(data);
            AppliedReference::Average
        }
    }
}

pub fn average_reference_inplace(data: &mut Array2<f64>) {
    let Some(means) = data.mean_axis(Axis(0)) else {
        return;
    };
    for mut row in data.rows_mut() {
        row -= &means;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn channel_sum_is_zero_after_reference() {
        let mut data = Array2::from_shape_fn((8, 512), |(c, t)| ((c * 7 + t * 3) as f64).sin());
        average_reference_inplace(&mut data);
        for &s in data.sum_axis(Axis(0)).iter() {
            approx::assert_abs_diff_eq!(s, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn reference_channel_is_appended_once() {
        let mut data = Array2::from_elem((2, 10), 1.0);
        let mut ch = names(&["SC6", "L1"]);
        add_reference_channel(&mut data, &mut ch, REFERENCE_CHANNEL);
        add_reference_channel(&mut data, &mut ch, REFERENCE_CHANNEL);
        assert_eq!(data.dim(), (3, 10));
        assert_eq!(ch, names(&["SC6", "L1", "TH6"]));
        assert!(data.row(2).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn named_reference_zeroes_that_channel() {
        let mut data = Array2::from_shape_fn((3, 5), |(c, t)| (c * 10 + t) as f64);
        let applied = rereference_to(&mut data, &names(&["SC6", "AC", "L1"]), "AC");
        assert_eq!(applied, AppliedReference::Channel("AC".into()));
        assert!(data.row(1).iter().all(|&v| v == 0.0));
        approx::assert_abs_diff_eq!(data[[0, 3]], -10.0, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(data[[2, 3]], 10.0, epsilon = 1e-12);
    }

    #[test]
    fn missing_reference_falls_back_to_average() {
        let mut data = Array2::from_shape_fn((2, 10), |(c, _)| if c == 0 { 2.0 } else { 4.0 });
        let applied = rereference_to(&mut data, &names(&["SC6", "L1"]), "AL");
        assert_eq!(applied, AppliedReference::Average);
        approx::assert_abs_diff_eq!(data[[0, 0]], -1.0, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(data[[1, 0]], 1.0, epsilon = 1e-12);
    }
}

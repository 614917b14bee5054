//! Event-locked epoching and averaging.
//!
//! Cuts `[tmin, tmax]` windows around each event sample of a continuous
//! `[C, T]` recording, applies per-epoch per-channel baseline correction and
//! averages the epochs into an [`Evoked`]. Matches
//! `mne.Epochs(raw, events, tmin=tmin, tmax=tmax, baseline=baseline).average()`
//! for the settings used here (no rejection, no detrending).
//!
//! Epoch sample bounds are `round(tmin · sfreq) ..= round(tmax · sfreq)`
//! relative to the event; epochs that run off either edge are dropped.
use anyhow::{bail, Result};
use log::debug;
use ndarray::{s, Array2, Array3, Axis};

use crate::baseline::baseline_correct_inplace;
use crate::evoked::{Evoked, Window};

/// Cut event-locked epochs from `data` ([C, T]) into a 3-D array [E, C, n_times].
///
/// `events` are sample indices relative to the first column of `data`.
/// Returns the epochs and the indices of the events that were kept.
pub fn epoch_events(
    data: &Array2<f64>,
    events: &[usize],
    sfreq: f64,
    epoch: &Window,
) -> (Array3<f64>, Vec<usize>) {
    let (n_ch, n_t) = data.dim();
    let start_off = (epoch.start * sfreq).round() as i64;
    let stop_off = (epoch.end * sfreq).round() as i64;
    let n_times = (stop_off - start_off + 1).max(0) as usize;

    let kept: Vec<usize> = events
        .iter()
        .copied()
        .filter(|&ev| {
            let first = ev as i64 + start_off;
            let last = ev as i64 + stop_off;
            let inside = first >= 0 && last < n_t as i64;
            if !inside {
                debug!("dropping event at sample {ev}: epoch [{first}, {last}] outside [0, {n_t})");
            }
            inside
        })
        .collect();

    let mut out = Array3::<f64>::zeros((kept.len(), n_ch, n_times));
    for (e, &ev) in kept.iter().enumerate() {
        let first = (ev as i64 + start_off) as usize;
        out.slice_mut(s![e, .., ..])
            .assign(&data.slice(s![.., first..first + n_times]));
    }
    (out, kept)
}

/// Build a baseline-corrected evoked waveform from a continuous recording.
///
/// * `data`     – [C, T] continuous signal.
/// * `sfreq`    – sampling rate in Hz.
/// * `ch_names` – one name per row of `data`.
/// * `events`   – event sample indices relative to the first column.
/// * `epoch`    – epoch window in seconds, e.g. `[-0.2, 0.2]`.
/// * `baseline` – baseline window in seconds, must lie within `epoch`.
///
/// # Errors
///
/// Fails if the baseline is outside the epoch, or if no event yields a
/// complete epoch.
pub fn evoked_from_raw(
    data: &Array2<f64>,
    sfreq: f64,
    ch_names: &[String],
    events: &[usize],
    epoch: &Window,
    baseline: &Window,
) -> Result<Evoked> {
    if !epoch.contains(baseline) {
        bail!(
            "baseline [{}, {}] s not inside epoch [{}, {}] s",
            baseline.start, baseline.end, epoch.start, epoch.end
        );
    }
    let (mut epochs, kept) = epoch_events(data, events, sfreq, epoch);
    if kept.is_empty() {
        bail!("no complete epochs among {} events", events.len());
    }
    debug!("kept {} of {} epochs", kept.len(), events.len());

    let tmin = (epoch.start * sfreq).round() / sfreq;
    let b0 = ((baseline.start - tmin) * sfreq).round() as usize;
    let b1 = ((baseline.end - tmin) * sfreq).round() as usize;
    baseline_correct_inplace(&mut epochs, b0..=b1);

    let avg = epochs
        .mean_axis(Axis(0))
        .ok_or_else(|| anyhow::anyhow!("cannot average zero epochs"))?;
    Evoked::new(avg, sfreq, tmin, ch_names.to_vec(), kept.len(), Some(*baseline))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("C{i}")).collect()
    }

    #[test]
    fn epoch_shape_is_inclusive() {
        let data = Array2::from_elem((4, 5000), 1.0);
        let w = Window::new(-0.2, 0.2).unwrap();
        let (epochs, kept) = epoch_events(&data, &[1000, 2000, 3000], 1000.0, &w);
        assert_eq!(epochs.shape(), &[3, 4, 401]);
        assert_eq!(kept, vec![1000, 2000, 3000]);
    }

    #[test]
    fn edge_events_dropped() {
        let data = Array2::from_elem((2, 1000), 1.0);
        let w = Window::new(-0.2, 0.2).unwrap();
        let (epochs, kept) = epoch_events(&data, &[100, 500, 900], 1000.0, &w);
        assert_eq!(kept, vec![500]);
        assert_eq!(epochs.shape()[0], 1);
    }

    #[test]
    fn epochs_are_event_locked() {
        // Ramp: value equals sample index.
        let data = Array2::from_shape_fn((1, 3000), |(_, t)| t as f64);
        let w = Window::new(-0.01, 0.01).unwrap();
        let (epochs, _) = epoch_events(&data, &[1500], 1000.0, &w);
        approx::assert_abs_diff_eq!(epochs[[0, 0, 0]], 1490.0, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(epochs[[0, 0, 10]], 1500.0, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(epochs[[0, 0, 20]], 1510.0, epsilon = 1e-12);
    }

    #[test]
    fn average_recovers_repeating_pulse() {
        // Unit pulse 80 samples after each event, on a per-epoch DC offset.
        let events: Vec<usize> = (1..=20).map(|k| k * 500).collect();
        let data = Array2::from_shape_fn((2, 11000), |(_, t)| {
            let offset = ((t + 250) / 500) as f64;
            if t % 500 == 80 { offset + 1.0 } else { offset }
        });
        let ev = evoked_from_raw(
            &data,
            1000.0,
            &names(2),
            &events,
            &Window::new(-0.2, 0.2).unwrap(),
            &Window::new(-0.15, -0.05).unwrap(),
        )
        .unwrap();
        assert_eq!(ev.nave, 20);
        let idx = ev.time_as_index(0.08) as usize;
        approx::assert_abs_diff_eq!(ev.data[[0, idx]], 1.0, epsilon = 1e-9);
        let b = ev.window_indices(&Window::new(-0.15, -0.05).unwrap()).unwrap();
        for t in b {
            approx::assert_abs_diff_eq!(ev.data[[1, t]], 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn no_events_is_error() {
        let data = Array2::zeros((1, 100));
        let r = evoked_from_raw(
            &data,
            1000.0,
            &names(1),
            &[],
            &Window::new(-0.2, 0.2).unwrap(),
            &Window::new(-0.15, -0.05).unwrap(),
        );
        assert!(r.is_err());
    }

    #[test]
    fn baseline_outside_epoch_is_error() {
        let data = Array2::zeros((1, 1000));
        let r = evoked_from_raw(
            &data,
            1000.0,
            &names(1),
            &[500],
            &Window::new(-0.1, 0.1).unwrap(),
            &Window::new(-0.15, -0.05).unwrap(),
        );
        assert!(r.is_err());
    }
}

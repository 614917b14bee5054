//! QRS-artefact signal-to-noise ratio.
//!
//! The heart artefact in an ESG evoked waveform (averaged around R-peaks) is
//! quantified as
//!
//! ```text
//! SNR = max(x[c, t]  for t in QRS window) / std(x[c, t]  for t in baseline)
//! ```
//!
//! per channel `c`. The QRS complex lasts roughly 60–100 ms, so the search
//! window defaults to `[0.06, 0.10]` s; a narrower `[0.07, 0.09]` s window can
//! be selected with [`SnrConfig::reduced_window`]. Noise is the population
//! standard deviation (`ddof = 0`) over a baseline window that must end
//! before the search window starts.
//!
//! The peak is the maximal *signed* value: a window that only contains
//! negative samples yields a negative SNR, which is reported as-is. A flat
//! baseline is not coerced to `inf`/`NaN`; it is the distinct error
//! [`SnrError::FlatBaseline`].
//!
//! The estimator assumes the waveform is already baseline-corrected and does
//! not re-baseline.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::condition::Condition;
use crate::evoked::{Evoked, Window};

/// Relative standard deviation below which a baseline counts as flat.
///
/// A constant baseline produces a std of a few ULPs after the mean is
/// subtracted, so exact comparison with zero is not enough.
pub const FLAT_TOLERANCE: f64 = 1e-12;

/// Errors from SNR estimation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SnrError {
    /// Baseline standard deviation is zero: the SNR is undefined.
    #[error("flat baseline on channel '{channel}': SNR is undefined")]
    FlatBaseline { channel: String },

    /// The channel required for this condition is not in the waveform.
    #[error("channel '{channel}' required for {condition} condition not found")]
    MissingChannel { channel: String, condition: Condition },

    /// A window is empty, out of range, or overlaps the search window.
    #[error("invalid window: {reason}")]
    InvalidWindow { reason: String },

    /// Waveform contains NaN or infinite samples inside a window.
    #[error("non-finite samples on channel '{channel}'")]
    NonFinite { channel: String },

    /// A mean over channels was requested from a waveform without any.
    #[error("evoked waveform has no channels")]
    NoChannels,

    /// Sampling rate must be finite and positive.
    #[error("invalid sampling rate {sfreq} Hz")]
    InvalidSfreq { sfreq: f64 },
}

/// How per-channel SNRs are reduced to one value per recording.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    /// The condition's spinal channel (`SC6` median, `L1` tibial).
    #[default]
    ConditionChannel,
    /// An explicitly named channel.
    Named(String),
    /// Mean over all channels; any flat channel makes the result undefined.
    Mean,
}

/// QRS search windows for one condition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QrsWindows {
    /// Window spanning the physiological QRS duration.
    pub full: Window,
    /// Tighter, empirically chosen sub-window.
    pub reduced: Window,
}

impl Default for QrsWindows {
    fn default() -> Self {
        Self {
            full: Window { start: 0.06, end: 0.10 },
            reduced: Window { start: 0.07, end: 0.09 },
        }
    }
}

/// SNR estimator settings.
///
/// ```
/// use heart_snr::snr::{SnrConfig, Reduction};
///
/// let cfg = SnrConfig {
///     reduced_window: true,
///     reduction: Reduction::Mean,
///     ..SnrConfig::default()
/// };
/// assert!(cfg.reduced_window);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnrConfig {
    /// Use [`QrsWindows::reduced`] instead of [`QrsWindows::full`].
    ///
    /// Default: `false`.
    pub reduced_window: bool,
    /// Search windows for median-nerve recordings.
    pub median: QrsWindows,
    /// Search windows for tibial-nerve recordings.
    pub tibial: QrsWindows,
    /// Per-channel → scalar reduction.
    ///
    /// Default: [`Reduction::ConditionChannel`].
    pub reduction: Reduction,
}

impl Default for SnrConfig {
    fn default() -> Self {
        Self {
            reduced_window: false,
            median: QrsWindows::default(),
            tibial: QrsWindows::default(),
            reduction: Reduction::ConditionChannel,
        }
    }
}

impl SnrConfig {
    /// QRS search window in effect for `condition`.
    pub fn qrs_window(&self, condition: Condition) -> Window {
        let w = match condition {
            Condition::Median => &self.median,
            Condition::Tibial => &self.tibial,
        };
        if self.reduced_window { w.reduced } else { w.full }
    }
}

/// Signal and noise estimates for one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSnr {
    pub channel: String,
    /// Maximal signed sample in the QRS window.
    pub peak: f64,
    /// Time of the peak in seconds.
    pub peak_time: f64,
    /// Population std of the baseline window.
    pub noise: f64,
    /// Largest absolute baseline sample, used to judge flatness.
    baseline_scale: f64,
}

impl ChannelSnr {
    /// `true` when the baseline carries no variance.
    pub fn is_flat(&self) -> bool {
        self.noise <= FLAT_TOLERANCE * self.baseline_scale
    }

    /// `peak / noise`, or [`SnrError::FlatBaseline`].
    pub fn snr(&self) -> Result<f64, SnrError> {
        if self.is_flat() {
            return Err(SnrError::FlatBaseline { channel: self.channel.clone() });
        }
        Ok(self.peak / self.noise)
    }
}

/// Peak and baseline statistics for every channel of `evoked`.
///
/// Fails only on invalid windows or non-finite samples; flat baselines are
/// reported through [`ChannelSnr::snr`].
pub fn compute_snr_per_channel(
    evoked: &Evoked,
    condition: Condition,
    baseline: &Window,
    cfg: &SnrConfig,
) -> Result<Vec<ChannelSnr>, SnrError> {
    let (base_idx, search_idx) = prepare(evoked, condition, baseline, cfg)?;
    (0..evoked.n_chan())
        .map(|c| channel_stats(evoked, c, &base_idx, &search_idx))
        .collect()
}

/// Scalar QRS SNR of one evoked waveform.
///
/// Reduces the per-channel estimates with [`SnrConfig::reduction`]. A single
/// selected channel is measured on its own, so other channels may hold
/// non-finite samples.
pub fn compute_snr(
    evoked: &Evoked,
    condition: Condition,
    baseline: &Window,
    cfg: &SnrConfig,
) -> Result<f64, SnrError> {
    let selected = match &cfg.reduction {
        Reduction::ConditionChannel => Some(condition.snr_channel()),
        Reduction::Named(name) => Some(name.as_str()),
        Reduction::Mean => None,
    };
    let (base_idx, search_idx) = prepare(evoked, condition, baseline, cfg)?;

    match selected {
        Some(name) => {
            let idx = evoked.channel_index(name).ok_or_else(|| SnrError::MissingChannel {
                channel: name.to_string(),
                condition,
            })?;
            channel_stats(evoked, idx, &base_idx, &search_idx)?.snr()
        }
        None => {
            if evoked.n_chan() == 0 {
                return Err(SnrError::NoChannels);
            }
            let mut sum = 0.0;
            for c in 0..evoked.n_chan() {
                sum += channel_stats(evoked, c, &base_idx, &search_idx)?.snr()?;
            }
            Ok(sum / evoked.n_chan() as f64)
        }
    }
}

/// Validate the sampling rate and resolve both windows for `condition`.
fn prepare(
    evoked: &Evoked,
    condition: Condition,
    baseline: &Window,
    cfg: &SnrConfig,
) -> Result<(Indices, Indices), SnrError> {
    if !(evoked.sfreq.is_finite() && evoked.sfreq > 0.0) {
        return Err(SnrError::InvalidSfreq { sfreq: evoked.sfreq });
    }
    resolve_windows(evoked, baseline, &cfg.qrs_window(condition))
}

/// Peak and baseline statistics of channel `c`.
fn channel_stats(
    evoked: &Evoked,
    c: usize,
    base_idx: &Indices,
    search_idx: &Indices,
) -> Result<ChannelSnr, SnrError> {
    let name = &evoked.ch_names[c];
    let row = evoked.channel(c);

    let mut peak = f64::NEG_INFINITY;
    let mut peak_at = *search_idx.start();
    for t in search_idx.clone() {
        let v = row[t];
        if !v.is_finite() {
            return Err(SnrError::NonFinite { channel: name.clone() });
        }
        if v > peak {
            peak = v;
            peak_at = t;
        }
    }

    let base = row.slice(ndarray::s![*base_idx.start()..=*base_idx.end()]);
    if base.iter().any(|v| !v.is_finite()) {
        return Err(SnrError::NonFinite { channel: name.clone() });
    }
    let n = base.len() as f64;
    let mean = base.sum() / n;
    let var = base.iter().map(|&v| (v - mean) * (v - mean)).sum::<f64>() / n;
    let scale = base.iter().fold(0.0_f64, |m, &v| m.max(v.abs()));

    Ok(ChannelSnr {
        channel: name.clone(),
        peak,
        peak_time: evoked.times[peak_at],
        noise: var.sqrt(),
        baseline_scale: scale,
    })
}

type Indices = std::ops::RangeInclusive<usize>;

/// Check window placement and map both windows to sample ranges.
fn resolve_windows(
    evoked: &Evoked,
    baseline: &Window,
    search: &Window,
) -> Result<(Indices, Indices), SnrError> {
    let invalid = |reason: String| SnrError::InvalidWindow { reason };
    // Half a sample of slack: window edges are given in round milliseconds.
    let tol = 0.5 / evoked.sfreq;
    let (tmin, tmax) = (evoked.tmin(), evoked.tmax());

    if baseline.start < tmin - tol || baseline.end > tmax + tol {
        return Err(invalid(format!(
            "baseline [{}, {}] s outside recorded span [{tmin}, {tmax}] s",
            baseline.start, baseline.end
        )));
    }
    if search.start < tmin - tol || search.end > tmax + tol {
        return Err(invalid(format!(
            "QRS window [{}, {}] s outside recorded span [{tmin}, {tmax}] s",
            search.start, search.end
        )));
    }
    if baseline.end >= search.start {
        return Err(invalid(format!(
            "baseline ends at {} s, not before QRS window start {} s",
            baseline.end, search.start
        )));
    }

    let base_idx = evoked
        .window_indices(baseline)
        .ok_or_else(|| invalid("baseline window contains no samples".into()))?;
    let search_idx = evoked
        .window_indices(search)
        .ok_or_else(|| invalid("QRS window contains no samples".into()))?;
    Ok((base_idx, search_idx))
}

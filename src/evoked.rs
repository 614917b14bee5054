//! Trial-averaged (evoked) waveforms and time windows.
//!
//! An [`Evoked`] is what the SNR estimator consumes: a `[C, T]` array that
//! has already been epoched around QRS events, baseline-corrected and averaged
//! (see [`crate::epoch::evoked_from_raw`]), together with its time axis.
//!
//! Time-to-sample mapping follows MNE's `time_as_index(..., use_rounding=True)`:
//! `idx = round((t - times[0]) * sfreq)`, and windows are inclusive on both
//! ends, so `[-0.15, -0.05]` at 1 kHz covers 101 samples.
use std::ops::RangeInclusive;

use anyhow::{bail, Result};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// A closed time interval `[start, end]` in seconds relative to the trigger.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub start: f64,
    pub end: f64,
}

impl Window {
    /// Create a window, rejecting empty, reversed or non-finite bounds.
    pub fn new(start: f64, end: f64) -> Result<Self> {
        if !start.is_finite() || !end.is_finite() {
            bail!("window bounds must be finite, got [{start}, {end}]");
        }
        if start >= end {
            bail!("window start {start} s must precede end {end} s");
        }
        Ok(Self { start, end })
    }

    /// Convert a `[start, end]` pair given in milliseconds.
    pub fn from_ms(ms: [f64; 2]) -> Result<Self> {
        Self::new(ms[0] / 1000.0, ms[1] / 1000.0)
    }

    /// Duration in seconds.
    #[inline]
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// `true` if `other` lies entirely inside `self`.
    pub fn contains(&self, other: &Window) -> bool {
        other.start >= self.start && other.end <= self.end
    }
}

/// An averaged, baseline-corrected waveform.
#[derive(Debug, Clone)]
pub struct Evoked {
    /// `[C, T]` averaged signal.
    pub data: Array2<f64>,
    /// `[T]` sample times in seconds, relative to the trigger at `t = 0`.
    pub times: Array1<f64>,
    /// Sampling rate in Hz.
    pub sfreq: f64,
    /// Channel names, one per row of `data`.
    pub ch_names: Vec<String>,
    /// Number of epochs that went into the average.
    pub nave: usize,
    /// Baseline window that was subtracted, if any.
    pub baseline: Option<Window>,
}

impl Evoked {
    /// Build an evoked waveform whose time axis starts at `tmin` seconds.
    pub fn new(
        data: Array2<f64>,
        sfreq: f64,
        tmin: f64,
        ch_names: Vec<String>,
        nave: usize,
        baseline: Option<Window>,
    ) -> Result<Self> {
        if !(sfreq.is_finite() && sfreq > 0.0) {
            bail!("sampling rate must be positive, got {sfreq}");
        }
        if ch_names.len() != data.nrows() {
            bail!("{} channel names for {} data rows", ch_names.len(), data.nrows());
        }
        if data.nrows() == 0 {
            bail!("evoked waveform has no channels");
        }
        if data.ncols() == 0 {
            bail!("evoked waveform has no samples");
        }
        let times = Array1::from_shape_fn(data.ncols(), |i| tmin + i as f64 / sfreq);
        Ok(Self { data, times, sfreq, ch_names, nave, baseline })
    }

    /// Number of channels.
    #[inline]
    pub fn n_chan(&self) -> usize {
        self.data.nrows()
    }

    /// Number of time samples.
    #[inline]
    pub fn n_times(&self) -> usize {
        self.data.ncols()
    }

    /// First sample time.
    #[inline]
    pub fn tmin(&self) -> f64 {
        self.times[0]
    }

    /// Last sample time.
    #[inline]
    pub fn tmax(&self) -> f64 {
        self.times[self.n_times() - 1]
    }

    /// Recorded span as a window.
    pub fn span(&self) -> Window {
        Window { start: self.tmin(), end: self.tmax() }
    }

    /// Sample index nearest to time `t` (may lie outside the array).
    pub fn time_as_index(&self, t: f64) -> i64 {
        ((t - self.tmin()) * self.sfreq).round() as i64
    }

    /// Inclusive sample range covered by `window`, clipped to the array.
    ///
    /// Returns `None` when no sample falls inside the window.
    pub fn window_indices(&self, window: &Window) -> Option<RangeInclusive<usize>> {
        let last = self.n_times() as i64 - 1;
        let lo = self.time_as_index(window.start).max(0);
        let hi = self.time_as_index(window.end).min(last);
        if lo > hi || hi < 0 || lo > last {
            return None;
        }
        Some(lo as usize..=hi as usize)
    }

    /// Row index of a channel, matching case-insensitively and ignoring spaces.
    pub fn channel_index(&self, name: &str) -> Option<usize> {
        let norm = |s: &str| s.replace(' ', "").to_lowercase();
        let want = norm(name);
        self.ch_names.iter().position(|n| norm(n) == want)
    }

    /// View of one channel's waveform.
    pub fn channel(&self, idx: usize) -> ArrayView1<'_, f64> {
        self.data.row(idx)
    }
}

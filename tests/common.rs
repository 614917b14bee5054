//! Shared helpers: seeded synthetic recordings and an in-memory source.
#![allow(dead_code)]

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use heart_snr::{Condition, Evoked, Recording, RecordingSource, StageColumn};
use ndarray::Array2;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use rand_xoshiro::Xoshiro256PlusPlus;

pub const SFREQ: f64 = 1000.0;

/// `[n_ch, n_t]` standard-normal noise from `seed`.
pub fn gaussian(n_ch: usize, n_t: usize, seed: u64) -> Array2<f64> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let normal = Normal::new(0.0, 1.0).unwrap();
    Array2::from_shape_simple_fn((n_ch, n_t), || normal.sample(&mut rng))
}

pub fn names(extra: &[&str], n_ch: usize) -> Vec<String> {
    let mut v: Vec<String> = extra.iter().map(|s| s.to_string()).collect();
    let mut i = 0;
    while v.len() < n_ch {
        v.push(format!("S{i}"));
        i += 1;
    }
    v
}

/// Evoked waveform @ 1 kHz over `[-0.2, 0.2)` s of i.i.d. standard-normal
/// noise with a pulse of `amp` at +80 ms.
pub fn raw_pulse_evoked(n_ch: usize, amp: f64, seed: u64) -> Evoked {
    let mut data = gaussian(n_ch, 400, seed);
    data.column_mut(280).fill(amp);
    let ch = names(&["SC6", "L1"], n_ch);
    Evoked::new(data, SFREQ, -0.2, ch, 1, None).unwrap()
}

/// As [`raw_pulse_evoked`], but each channel's baseline `[-150, -50]` ms is
/// rescaled to mean 0 and population std 1, so the SNR is exactly `amp`.
pub fn pulse_evoked(n_ch: usize, amp: f64, seed: u64) -> Evoked {
    let mut ev = raw_pulse_evoked(n_ch, amp, seed);
    for mut row in ev.data.rows_mut() {
        let base = row.slice(ndarray::s![50..=150]).to_owned();
        let mean = base.mean().unwrap();
        let std = base.std(0.0);
        row.mapv_inplace(|v| (v - mean) / std);
        row[280] = amp;
    }
    ev
}

/// Continuous recording of `secs` seconds with one beat per second.
///
/// Every beat adds `amp` at +80 ms on all channels over noise of std `noise`.
pub fn beating_recording(ch: &[&str], secs: usize, amp: f64, noise: f64, seed: u64) -> Recording {
    let n_t = secs * SFREQ as usize;
    let mut data = gaussian(ch.len(), n_t, seed) * noise;
    let events: Vec<usize> = (1..secs).map(|s| s * SFREQ as usize).collect();
    for &ev in &events {
        for mut row in data.rows_mut() {
            row[ev + 80] += amp;
        }
    }
    Recording {
        data,
        sfreq: SFREQ,
        ch_names: ch.iter().map(|s| s.to_string()).collect(),
        events,
    }
}

/// Recordings keyed by (subject, condition, column label); absent keys fail.
#[derive(Default)]
pub struct MemorySource {
    pub recordings: HashMap<(u32, Condition, String), Recording>,
}

impl MemorySource {
    pub fn insert(&mut self, subject: u32, condition: Condition, label: &str, rec: Recording) {
        self.recordings.insert((subject, condition, label.to_string()), rec);
    }
}

impl RecordingSource for MemorySource {
    fn load(&self, subject: u32, condition: Condition, column: &StageColumn) -> Result<Recording> {
        self.recordings
            .get(&(subject, condition, column.label.clone()))
            .cloned()
            .ok_or_else(|| anyhow!("no recording for subject {subject} {condition} {}", column.label))
    }
}

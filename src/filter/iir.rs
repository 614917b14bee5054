//! Zero-phase Butterworth band-pass as a cascade of second-order sections.
//!
//! Design matches `scipy.signal.butter(order, [l, h], 'bandpass')`:
//!
//! ```text
//! prototype poles   p_k = exp(iπ(2k + N + 1) / 2N)          k = 0 .. N
//! pre-warped edges  ω = 2·fs·tan(π·f / fs)
//! band-pass poles   s = p·bw/2 ± sqrt((p·bw/2)² − ω₁ω₂)     bw = ω₂ − ω₁
//! bilinear          z = (2fs + s) / (2fs − s), zeros at z = ±1
//! ```
//!
//! Application matches MNE's `phase='zero'` IIR path (`scipy.signal.sosfiltfilt`
//! with a pad length from `_estimate_ringing_samples`): odd extension, sections
//! started in their steady state, forward pass, backward pass.
use std::f64::consts::PI;

use anyhow::{ensure, Result};
use log::warn;
use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;
use rustfft::num_complex::Complex64;

use super::apply::smart_pad;

/// One biquad `(b0 + b1·z⁻¹ + b2·z⁻²) / (1 + a1·z⁻¹ + a2·z⁻²)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Section {
    pub b: [f64; 3],
    /// `[a1, a2]`; `a0` is 1.
    pub a: [f64; 2],
}

impl Section {
    /// Direct Form II transposed over `x` in place, starting from state `z`.
    /// Returns the final state.
    fn run(&self, x: &mut [f64], mut z: [f64; 2]) -> [f64; 2] {
        let [b0, b1, b2] = self.b;
        let [a1, a2] = self.a;
        for v in x.iter_mut() {
            let y = b0 * *v + z[0];
            z[0] = b1 * *v - a1 * y + z[1];
            z[1] = b2 * *v - a2 * y;
            *v = y;
        }
        z
    }

    fn dc_gain(&self) -> f64 {
        self.b.iter().sum::<f64>() / (1.0 + self.a[0] + self.a[1])
    }

    /// State after a unit step has settled (`scipy.signal.lfilter_zi`).
    fn step_state(&self) -> [f64; 2] {
        let g = self.dc_gain();
        [g - self.b[0], self.b[2] - self.a[1] * g]
    }

    /// Poles strictly inside the unit circle.
    pub fn is_stable(&self) -> bool {
        self.a[1].abs() < 1.0 && self.a[0].abs() < 1.0 + self.a[1]
    }
}

/// Second-order sections applied in sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Sos {
    pub sections: Vec<Section>,
}

impl Sos {
    /// Digital Butterworth band-pass of prototype order `order` (`order`
    /// sections, `2·order` poles) with −3 dB edges at `l_freq` and `h_freq`.
    pub fn butter_bandpass(order: usize, l_freq: f64, h_freq: f64, sfreq: f64) -> Result<Self> {
        ensure!(order > 0, "Butterworth order must be positive");
        let nyquist = sfreq / 2.0;
        ensure!(
            l_freq > 0.0 && l_freq < h_freq && h_freq < nyquist,
            "band [{l_freq}, {h_freq}] Hz must satisfy 0 < low < high < {nyquist} Hz"
        );
        let fs2 = 2.0 * sfreq;
        let (w1, w2) = (prewarp(l_freq, sfreq), prewarp(h_freq, sfreq));
        let bw = w2 - w1;
        let wo2 = w1 * w2;
        let bilinear = |s: Complex64| (fs2 + s) / (fs2 - s);

        let mut sections = Vec::with_capacity(order);
        let mut gain = Complex64::new(1.0, 0.0);
        // Conjugate prototype poles are covered by their partners.
        for p in butterworth_poles(order).into_iter().filter(|p| p.im > -1e-12) {
            let half = p * (bw / 2.0);
            let disc = (half * half - wo2).sqrt();
            let (s1, s2) = (half + disc, half - disc);
            let (z1, z2) = (bilinear(s1), bilinear(s2));
            let b = [1.0, 0.0, -1.0];

            if p.im.abs() <= 1e-12 {
                // Real prototype pole: s1, s2 are a conjugate or real pair.
                gain *= bw * fs2 / ((fs2 - s1) * (fs2 - s2));
                sections.push(Section { b, a: [-(z1 + z2).re, (z1 * z2).re] });
            } else {
                // Each band-pass pole pairs with its conjugate from the mirrored prototype pole.
                gain *= (bw * fs2 / ((fs2 - s1) * (fs2 - s2))).norm_sqr();
                for z in [z1, z2] {
                    sections.push(Section { b, a: [-2.0 * z.re, z.norm_sqr()] });
                }
            }
        }
        if let Some(first) = sections.first_mut() {
            first.b.iter_mut().for_each(|v| *v *= gain.re);
        }
        Ok(Self { sections })
    }

    /// Magnitude of the single-pass response at `freq` Hz.
    pub fn response_at(&self, freq: f64, sfreq: f64) -> f64 {
        let z1 = Complex64::from_polar(1.0, -2.0 * PI * freq / sfreq);
        let z2 = z1 * z1;
        self.sections
            .iter()
            .map(|s| {
                let num = s.b[0] + z1 * s.b[1] + z2 * s.b[2];
                let den = 1.0 + z1 * s.a[0] + z2 * s.a[1];
                (num / den).norm()
            })
            .product()
    }

    /// Samples until the impulse response stays below 0.1 % of its running
    /// peak, in chunks of 1000 up to 100 000 (MNE `_estimate_ringing_samples`).
    pub fn ringing_samples(&self) -> usize {
        const CHUNK: usize = 1000;
        const MAX_CHUNKS: usize = 100;

        let mut states = vec![[0.0; 2]; self.sections.len()];
        let mut thresh = 0.0_f64;
        let mut last_good = CHUNK;
        for ii in 0..MAX_CHUNKS {
            let mut h = vec![0.0; CHUNK];
            if ii == 0 {
                h[0] = 1.0;
            }
            for (s, z) in self.sections.iter().zip(states.iter_mut()) {
                *z = s.run(&mut h, *z);
            }
            let peak = h.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
            thresh = thresh.max(1e-3 * peak);
            match h.iter().rposition(|v| v.abs() > thresh) {
                Some(i) => last_good = i,
                None => return ii.saturating_sub(1) * CHUNK + last_good,
            }
        }
        warn!("IIR ringing did not decay within {} samples", CHUNK * MAX_CHUNKS);
        CHUNK * MAX_CHUNKS
    }

    /// Forward-backward filter `x` with `padlen` samples of odd extension
    /// (`scipy.signal.sosfiltfilt`); the pad is capped at `len(x) − 1`.
    pub fn filtfilt(&self, x: &[f64], padlen: usize) -> Vec<f64> {
        let n = x.len();
        if n == 0 {
            return Vec::new();
        }
        let edge = padlen.min(n - 1);
        let mut ext = smart_pad(x, edge);
        self.run_settled(&mut ext);
        ext.reverse();
        self.run_settled(&mut ext);
        ext.reverse();
        ext[edge..edge + n].to_vec()
    }

    /// One pass with every section settled at the level of the first sample.
    fn run_settled(&self, x: &mut [f64]) {
        let mut level = x[0];
        for s in &self.sections {
            let [z0, z1] = s.step_state();
            s.run(x, [z0 * level, z1 * level]);
            level *= s.dc_gain();
        }
    }
}

/// Zero-phase filter each channel of `data` ([C, T]) in place, padding by the
/// filter's ringing length.
pub fn apply_iir_zero_phase(data: &mut Array2<f64>, sos: &Sos) {
    if data.ncols() == 0 {
        return;
    }
    let padlen = sos.ringing_samples();
    let filtered: Vec<Vec<f64>> = (0..data.nrows())
        .into_par_iter()
        .map(|ch| sos.filtfilt(&data.row(ch).to_vec(), padlen))
        .collect();
    for (mut row, y) in data.rows_mut().into_iter().zip(&filtered) {
        row.assign(&ArrayView1::from(y));
    }
}

fn prewarp(freq: f64, sfreq: f64) -> f64 {
    2.0 * sfreq * (PI * freq / sfreq).tan()
}

/// Left-half-plane poles of the unit-cutoff analog Butterworth low-pass.
fn butterworth_poles(order: usize) -> Vec<Complex64> {
    (0..order)
        .map(|k| {
            let theta = PI * (2 * k + order + 1) as f64 / (2 * order) as f64;
            Complex64::from_polar(1.0, theta)
        })
        .collect()
}

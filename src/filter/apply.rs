//! Overlap-add zero-phase FIR convolution.
//!
//! Matches MNE's `_overlap_add_filter` + `_1d_overlap_filter`:
//!
//! ```text
//! x_ext = smart_pad(x, N − 1)                  odd reflection, zeros past the signal
//! y     = x_ext ∗ h                             FFT overlap-add, block size by MNE cost
//! out   = y[(N − 1) + (N − 1)/2 ..][..len(x)]   drop padding and group delay
//! ```
//!
//! The kernel spectrum and FFT plans are computed once per call and shared by
//! all channels, which run in parallel on the rayon pool.
use std::sync::Arc;

use anyhow::{ensure, Result};
use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;
use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Apply a zero-phase FIR filter to each channel of `data` ([C, T]) in-place.
///
/// `h` must have odd length (guaranteed by the designers in [`super::design`]).
pub fn apply_fir_zero_phase(data: &mut Array2<f64>, h: &[f64]) -> Result<()> {
    if data.ncols() == 0 {
        return Ok(());
    }
    let ola = OverlapAdd::plan(h, data.ncols())?;
    let filtered: Vec<Vec<f64>> = (0..data.nrows())
        .into_par_iter()
        .map(|ch| ola.filter(&data.row(ch).to_vec()))
        .collect();
    for (mut row, y) in data.rows_mut().into_iter().zip(&filtered) {
        row.assign(&ArrayView1::from(y));
    }
    Ok(())
}

/// Zero-phase filter a single signal; the output has the length of `x`.
pub fn filter_1d(x: &[f64], h: &[f64]) -> Result<Vec<f64>> {
    if x.is_empty() {
        return Ok(Vec::new());
    }
    Ok(OverlapAdd::plan(h, x.len())?.filter(x))
}

/// Kernel spectrum and FFT plans for signals of one length.
struct OverlapAdd {
    n_h: usize,
    /// Input samples per block: `n_fft − n_h + 1`.
    block: usize,
    h_fft: Vec<Complex<f64>>,
    fwd: Arc<dyn Fft<f64>>,
    inv: Arc<dyn Fft<f64>>,
}

impl OverlapAdd {
    fn plan(h: &[f64], n_x: usize) -> Result<Self> {
        let n_h = h.len();
        ensure!(n_h % 2 == 1, "zero-phase FIR needs an odd number of taps, got {n_h}");
        let n_fft = choose_fft_len(n_h, n_x + 2 * (n_h - 1));

        let mut planner = FftPlanner::<f64>::new();
        let fwd = planner.plan_fft_forward(n_fft);
        let inv = planner.plan_fft_inverse(n_fft);

        let mut h_fft = vec![Complex::default(); n_fft];
        for (c, &v) in h_fft.iter_mut().zip(h) {
            c.re = v;
        }
        fwd.process(&mut h_fft);
        // Fold the inverse FFT's 1/n into the kernel.
        let scale = 1.0 / n_fft as f64;
        h_fft.iter_mut().for_each(|c| *c *= scale);

        Ok(Self { n_h, block: n_fft - n_h + 1, h_fft, fwd, inv })
    }

    fn filter(&self, x: &[f64]) -> Vec<f64> {
        let pad = self.n_h - 1;
        let delay = pad / 2;
        let y = self.convolve(&smart_pad(x, pad));
        y[pad + delay..pad + delay + x.len()].to_vec()
    }

    /// Full linear convolution `x ∗ h`, length `len(x) + n_h − 1`.
    fn convolve(&self, x: &[f64]) -> Vec<f64> {
        let mut y = vec![0.0; x.len() + self.n_h - 1];
        let mut buf = vec![Complex::default(); self.h_fft.len()];
        for (k, chunk) in x.chunks(self.block).enumerate() {
            buf.fill(Complex::default());
            for (b, &v) in buf.iter_mut().zip(chunk) {
                b.re = v;
            }
            self.fwd.process(&mut buf);
            for (b, &hf) in buf.iter_mut().zip(&self.h_fft) {
                *b *= hf;
            }
            self.inv.process(&mut buf);

            let start = k * self.block;
            let len = chunk.len() + self.n_h - 1;
            for (out, b) in y[start..start + len].iter_mut().zip(&buf) {
                *out += b.re;
            }
        }
        y
    }
}

/// Odd reflection of `n_pad` samples around each end (MNE's `_smart_pad`).
///
/// ```text
/// left[i]  = 2·x[0]  − x[i]        i = n_pad ..= 1
/// right[i] = 2·x[−1] − x[−1 − i]   i = 1 ..= n_pad
/// ```
///
/// Reflection stops at the far end of the signal; the rest is zero.
pub(super) fn smart_pad(x: &[f64], n_pad: usize) -> Vec<f64> {
    let n = x.len();
    let reach = n_pad.min(n - 1);
    let (first, last) = (x[0], x[n - 1]);

    let mut out = Vec::with_capacity(n + 2 * n_pad);
    out.resize(n_pad - reach, 0.0);
    out.extend((1..=reach).rev().map(|i| 2.0 * first - x[i]));
    out.extend_from_slice(x);
    out.extend((1..=reach).map(|i| 2.0 * last - x[n - 1 - i]));
    out.resize(n + 2 * n_pad, 0.0);
    out
}

/// Power-of-two FFT length with the lowest MNE cost
/// `ceil(n_x / (n − n_h + 1)) · n · (log2 n + 1) + 4e-5 · n · n_x`.
fn choose_fft_len(n_h: usize, n_x: usize) -> usize {
    let lo = (2 * n_h - 1).next_power_of_two().trailing_zeros();
    let hi = n_x.next_power_of_two().trailing_zeros() + 1;
    let cost = |p: u32| {
        let n = (1_usize << p) as f64;
        let blocks = (n_x as f64 / (n - n_h as f64 + 1.0)).ceil();
        blocks * n * (p as f64 + 1.0) + 4e-5 * n * n_x as f64
    };

    let mut best = lo;
    for p in lo + 1..=hi {
        if cost(p) < cost(best) {
            best = p;
        }
    }
    1 << best
}

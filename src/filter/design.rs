//! FIR filter design matching MNE / `scipy.signal.firwin`.
//!
//! Filter length N = ceil(3.3 / trans_bw · sfreq), rounded to odd, with a
//! Hamming-windowed sinc kernel.
//!
//! Notch filters follow `mne.filter.notch_filter(method='fir')`: a band-stop
//! of width `freq / 200` around each line frequency with 1 Hz transitions.
use std::f64::consts::PI;

/// Number of FIR taps for a given transition bandwidth.
/// Returns an odd integer (required for zero-phase linear-phase FIR).
///
/// Formula: `ceil(3.3 / trans_bw * sfreq)` rounded up to odd.
pub fn auto_filter_length(trans_bw: f64, sfreq: f64) -> usize {
    let n_raw = (3.3 / trans_bw * sfreq).ceil() as usize;
    if n_raw % 2 == 0 { n_raw + 1 } else { n_raw }
}

/// Zero-phase band-stop FIR removing `[freq − width/2, freq + width/2]`.
///
/// `trans_bw` is the total transition width shared by both edges.
pub fn design_bandstop(freq: f64, width: f64, trans_bw: f64, sfreq: f64) -> Vec<f64> {
    let half_tb = trans_bw / 2.0;
    // Pass-band edges.
    let h_edge = freq - width / 2.0 - half_tb;
    let l_edge = freq + width / 2.0 + half_tb;
    let n = auto_filter_length(half_tb, sfreq);

    let lo = firwin(n, h_edge + half_tb / 2.0, sfreq, true);
    let hi = firwin(n, l_edge - half_tb / 2.0, sfreq, true);
    // Stop = delta − (hi − lo)
    let mut h: Vec<f64> = hi.iter().zip(&lo).map(|(a, b)| -(a - b)).collect();
    h[n / 2] += 1.0;
    h
}

/// Notch at `freq` with MNE's default width (`freq / 200`) and 1 Hz transition.
pub fn design_notch(freq: f64, sfreq: f64) -> Vec<f64> {
    design_bandstop(freq, freq / 200.0, 1.0, sfreq)
}

/// Design a lowpass (or, with `pass_zero = false`, highpass) FIR using a
/// Hamming-windowed sinc. `cutoff_hz` is the -6 dB point.
pub fn firwin(n: usize, cutoff_hz: f64, sfreq: f64, pass_zero: bool) -> Vec<f64> {
    assert!(n % 2 == 1, "firwin requires odd N for linear-phase filter");
    let alpha = (n - 1) as f64 / 2.0;
    let fc = cutoff_hz / (sfreq / 2.0); // normalised [0, 1]

    let win = hamming(n);

    let mut h: Vec<f64> = (0..n)
        .map(|i| {
            let x = i as f64 - alpha;
            // f(x) = sin(π·fc·x) / (π·x);  lim_{x→0} f(x) = fc
            let sinc = if x == 0.0 { fc } else { (PI * fc * x).sin() / (PI * x) };
            sinc * win[i]
        })
        .collect();

    // Unit DC gain.
    let s: f64 = h.iter().sum();
    h.iter_mut().for_each(|v| *v /= s);

    if !pass_zero {
        h.iter_mut().for_each(|v| *v = -*v);
        h[n / 2] += 1.0;
    }

    h
}

/// Hamming window of length `n`.
pub fn hamming(n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![1.0];
    }
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / (n - 1) as f64).cos())
        .collect()
}

/// Magnitude of the frequency response of `h` at `freq` Hz.
pub fn response_at(h: &[f64], freq: f64, sfreq: f64) -> f64 {
    let w = 2.0 * PI * freq / sfreq;
    let (re, im) = h.iter().enumerate().fold((0.0, 0.0), |(re, im), (k, &v)| {
        let phase = w * k as f64;
        (re + v * phase.cos(), im - v * phase.sin())
    });
    (re * re + im * im).sqrt()
}

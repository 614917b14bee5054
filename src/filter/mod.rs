//! ESG filtering.
//!
//! - [`iir`]: zero-phase Butterworth band-pass (second-order sections, run
//!   forward and backward), matching `raw.filter(method='iir', phase='zero')`.
//! - [`design`]: Hamming-windowed sinc band-stop design for line-noise notches,
//!   matching `mne.filter.create_filter(fir_window='hamming', phase='zero')`.
//! - [`apply`]: Overlap-add zero-phase FIR convolution, matching MNE's
//!   `_overlap_add_filter` / `_1d_overlap_filter`.

pub mod apply;
pub mod design;
pub mod iir;

use anyhow::Result;
use log::debug;
use ndarray::Array2;

pub use apply::{apply_fir_zero_phase, filter_1d};
pub use design::{auto_filter_length, design_bandstop, design_notch, firwin, hamming, response_at};
pub use iir::{apply_iir_zero_phase, Section, Sos};

/// ESG band-pass (Butterworth of `order`) followed by one FIR notch per line
/// frequency, in place.
pub fn bandpass_notch_inplace(
    data: &mut Array2<f64>,
    sfreq: f64,
    band: [f64; 2],
    order: usize,
    notch_freqs: &[f64],
) -> Result<()> {
    let sos = Sos::butter_bandpass(order, band[0], band[1], sfreq)?;
    debug!(
        "band-pass {}–{} Hz, Butterworth order {order}, {} sections",
        band[0],
        band[1],
        sos.sections.len()
    );
    apply_iir_zero_phase(data, &sos);
    for &f in notch_freqs {
        let h = design_notch(f, sfreq);
        debug!("notch {f} Hz, {} taps", h.len());
        apply_fir_zero_phase(data, &h)?;
    }
    Ok(())
}

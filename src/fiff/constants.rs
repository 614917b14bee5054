//! FIFF format constants used by the reader.
//!
//! Names mirror [`mne/_fiff/constants.py`][mne-src] so the reader can be
//! cross-referenced with MNE. Only the tags and types this crate reads are
//! listed.
//!
//! [mne-src]: https://github.com/mne-tools/mne-python/blob/main/mne/_fiff/constants.py

// ── Block kinds ───────────────────────────────────────────────────────────

/// Measurement block, top-level container for one recording.
pub const FIFFB_MEAS:            i32 = 100;
/// Measurement-info block: channel metadata, sfreq, bad channels.
pub const FIFFB_MEAS_INFO:       i32 = 101;
/// Raw (continuous) data block.
pub const FIFFB_RAW_DATA:        i32 = 102;
/// Continuous data block (alias used by some acquisition systems).
pub const FIFFB_CONTINUOUS_DATA: i32 = 112;
/// MNE annotations block (onsets, durations, descriptions).
pub const FIFFB_MNE_ANNOTATIONS: i32 = 3810;

// ── Tag kinds: structure ──────────────────────────────────────────────────

/// Unique file identifier (first tag in every FIF file).
pub const FIFF_FILE_ID:          i32 = 100;
/// Pointer to the embedded tag directory (payload = byte offset).
pub const FIFF_DIR_POINTER:      i32 = 101;
/// Opens a new block; payload = block kind (i32).
pub const FIFF_BLOCK_START:      i32 = 104;
/// Closes the most recently opened block.
pub const FIFF_BLOCK_END:        i32 = 105;

// ── Tag kinds: measurement info ───────────────────────────────────────────

pub const FIFF_NCHAN:            i32 = 200;
/// Sampling frequency in Hz (f32).
pub const FIFF_SFREQ:            i32 = 201;
/// Channel info struct, one per channel.
pub const FIFF_CH_INFO:          i32 = 203;
/// Measurement date: `[seconds, microseconds]` since the epoch.
pub const FIFF_MEAS_DATE:        i32 = 204;
/// Free text; in the annotations block, the `:`-joined descriptions.
pub const FIFF_COMMENT:          i32 = 206;
/// Index of the first sample in acquisition time (i32).
pub const FIFF_FIRST_SAMPLE:     i32 = 208;
/// Colon-separated list of bad channel names.
pub const FIFF_BAD_CHS:          i32 = 220;
/// Power-line frequency in Hz (f32).
pub const FIFF_LINE_FREQ:        i32 = 235;

// ── Tag kinds: data buffers ───────────────────────────────────────────────

/// One buffer of samples, interleaved `[n_samp, n_chan]`, big-endian.
pub const FIFF_DATA_BUFFER:      i32 = 300;
/// Skip `n` complete buffers (payload = n as i32).
pub const FIFF_DATA_SKIP:        i32 = 301;

// ── Tag kinds: annotations ────────────────────────────────────────────────

/// Annotation onsets in seconds.
pub const FIFF_MNE_BASELINE_MIN: i32 = 3546;
/// Annotation ends (`onset + duration`) in seconds.
pub const FIFF_MNE_BASELINE_MAX: i32 = 3547;

// ── Tag payload types ─────────────────────────────────────────────────────

pub const FIFFT_SHORT:             u32 = 2;
pub const FIFFT_INT:               u32 = 3;
pub const FIFFT_FLOAT:             u32 = 4;
pub const FIFFT_DOUBLE:            u32 = 5;
/// Latin-1 string, **not** NUL-terminated.
pub const FIFFT_STRING:            u32 = 10;
/// 16-bit DAU packed sample (same wire width as `FIFFT_SHORT`).
pub const FIFFT_DAU_PACK16:        u32 = 16;
/// 96-byte channel info struct.
pub const FIFFT_CH_INFO_STRUCT:    u32 = 30;
/// Tag-directory entry struct (16 bytes per entry).
pub const FIFFT_DIR_ENTRY_STRUCT:  u32 = 32;

// ── `next` field sentinels in a tag header ────────────────────────────────

/// The next tag follows immediately: `next_pos = pos + 16 + size`.
pub const FIFFV_NEXT_SEQ:  i32 = 0;
/// There is no next tag.
pub const FIFFV_NEXT_NONE: i32 = -1;

/// EEG channel kind (`ChannelInfo::kind`).
pub const FIFFV_EEG_CH:    i32 = 2;

/// Bytes per sample of a data-buffer tag type, `None` if not a sample type.
///
/// ```
/// use heart_snr::fiff::constants::{bytes_per_sample, FIFFT_FLOAT, FIFFT_DOUBLE, FIFFT_SHORT};
/// assert_eq!(bytes_per_sample(FIFFT_FLOAT),  Some(4));
/// assert_eq!(bytes_per_sample(FIFFT_DOUBLE), Some(8));
/// assert_eq!(bytes_per_sample(FIFFT_SHORT),  Some(2));
/// assert_eq!(bytes_per_sample(99),           None);
/// ```
pub fn bytes_per_sample(tag_type: u32) -> Option<usize> {
    match tag_type {
        FIFFT_DAU_PACK16 | FIFFT_SHORT => Some(2),
        FIFFT_FLOAT | FIFFT_INT        => Some(4),
        FIFFT_DOUBLE                   => Some(8),
        _                              => None,
    }
}

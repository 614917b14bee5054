//! Raw FIF reader, the counterpart of `mne.io.read_raw_fif`.
//!
//! # Algorithm
//! 1. Load the tag directory (embedded directory tag, else a scan).
//! 2. Build the block tree.
//! 3. Read `MeasInfo` from `FIFFB_MEAS_INFO` and the annotations block.
//! 4. Walk the `FIFFB_RAW_DATA` (or `FIFFB_CONTINUOUS_DATA`) block to collect
//!    data-buffer records; `FIFF_DATA_SKIP` gaps read as zeros.
//!
//! # Calibration
//! ```text
//! data[ch, t] = stored[t, ch] × chs[ch].cal × chs[ch].range
//! ```
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};
use anyhow::{bail, Context, Result};
use log::debug;
use ndarray::Array2;

use super::annotations::{read_annotations, Annotations};
use super::constants::*;
use super::info::{read_meas_info, MeasInfo};
use super::tag::{be_f32, be_i32, read_i32, read_raw_bytes, TagHeader};
use super::tree::{load_directory, read_tree};

/// One contiguous block of samples: a data buffer or a skipped gap.
#[derive(Debug, Clone)]
pub struct BufferRecord {
    /// `None` for a gap left by `FIFF_DATA_SKIP`.
    pub tag:    Option<TagHeader>,
    /// Number of samples in this block.
    pub n_samp: usize,
}

/// An opened raw recording; samples are read on demand.
#[derive(Debug, Clone)]
pub struct RawFif {
    pub info:        MeasInfo,
    /// First sample index in acquisition time.
    pub first_samp:  u64,
    pub annotations: Annotations,
    pub path:        PathBuf,
    pub buffers:     Vec<BufferRecord>,
}

impl RawFif {
    pub fn n_times(&self) -> usize {
        self.buffers.iter().map(|b| b.n_samp).sum()
    }

    pub fn ch_names(&self) -> Vec<String> {
        self.info.ch_names()
    }

    /// Read every sample into a calibrated `[n_chan, n_times]` array.
    pub fn read_all_data(&self) -> Result<Array2<f64>> {
        let n_ch = self.info.n_chan;
        let cals = self.info.cals();
        let mut out = Array2::<f64>::zeros((n_ch, self.n_times()));

        let file = File::open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        let mut reader = BufReader::new(file);
        let mut offset = 0;
        for buf in &self.buffers {
            if let Some(tag) = &buf.tag {
                let raw = read_raw_bytes(&mut reader, tag)?;
                decode_buffer(&raw, tag.ftype, n_ch, &cals, &mut out, offset)?;
            }
            offset += buf.n_samp;
        }
        Ok(out)
    }

    /// Sample indices, relative to the first data column, of the annotations
    /// described as `description`. Sorted; events outside the data are dropped.
    ///
    /// Follows `mne.events_from_annotations`: onsets with an origin time are
    /// counted from the measurement start, so `first_samp` is subtracted;
    /// onsets without one are already relative to the first sample.
    pub fn events_from_annotations(&self, description: &str) -> Vec<usize> {
        let sfreq = self.info.sfreq;
        let n_times = self.n_times() as i64;
        let shift = match self.annotations.orig_time {
            Some(orig) => {
                let delta = self.info.meas_date.map_or(0.0, |m| orig - m);
                Some((delta, self.first_samp as i64))
            }
            None => None,
        };

        let mut events: Vec<usize> = self
            .annotations
            .onsets_of(description)
            .filter_map(|onset| {
                let idx = match shift {
                    Some((delta, first)) => ((onset + delta) * sfreq).round() as i64 - first,
                    None => (onset * sfreq).round() as i64,
                };
                (0..n_times).contains(&idx).then_some(idx as usize)
            })
            .collect();
        events.sort_unstable();
        debug!(
            "{} '{description}' events in {}",
            events.len(),
            self.path.display()
        );
        events
    }
}

/// Open a FIF file without reading samples.
pub fn open_raw<P: AsRef<Path>>(path: P) -> Result<RawFif> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut reader = BufReader::new(file);

    let directory = load_directory(&mut reader)?;
    let tree = read_tree(&mut reader, &directory)?;
    let info = read_meas_info(&mut reader, &tree)?;
    let annotations = read_annotations(&mut reader, &tree)?;

    let meas_node = tree.find_block(FIFFB_MEAS).context("FIFFB_MEAS not found")?;
    let raw_node = meas_node
        .find_block(FIFFB_RAW_DATA)
        .or_else(|| meas_node.find_block(FIFFB_CONTINUOUS_DATA))
        .context("no raw-data block in FIF file")?;

    let mut first_samp: u64 = match raw_node.find_tag(FIFF_FIRST_SAMPLE) {
        Some(t) => read_i32(&mut reader, t)?.max(0) as u64,
        None => 0,
    };
    let mut first_skip = 0usize;
    let mut pending_skip = 0usize;
    let mut seen_buffer = false;
    let mut buffers = Vec::new();

    for ent in &raw_node.entries {
        match ent.kind {
            FIFF_DATA_SKIP if !seen_buffer => {
                first_skip += read_i32(&mut reader, ent)?.max(0) as usize;
            }
            FIFF_DATA_SKIP => {
                pending_skip += read_i32(&mut reader, ent)?.max(0) as usize;
            }
            FIFF_DATA_BUFFER => {
                seen_buffer = true;
                let bps = bytes_per_sample(ent.ftype)
                    .with_context(|| format!("unknown buffer type {}", ent.ftype))?;
                if info.n_chan == 0 {
                    bail!("data buffer in a recording without channels");
                }
                let n_samp = ent.len() / (bps * info.n_chan);
                // A leading skip moves the start; later skips leave gaps.
                if first_skip > 0 {
                    first_samp += (n_samp * first_skip) as u64;
                    first_skip = 0;
                }
                if pending_skip > 0 {
                    buffers.push(BufferRecord { tag: None, n_samp: n_samp * pending_skip });
                    pending_skip = 0;
                }
                buffers.push(BufferRecord { tag: Some(*ent), n_samp });
            }
            _ => {}
        }
    }

    if buffers.is_empty() {
        bail!("no FIFF_DATA_BUFFER tags in {}", path.display());
    }
    debug!(
        "opened {}: {} channels @ {} Hz, {} buffers, {} annotations",
        path.display(),
        info.n_chan,
        info.sfreq,
        buffers.len(),
        annotations.len()
    );

    Ok(RawFif {
        info,
        first_samp,
        annotations,
        path: path.to_path_buf(),
        buffers,
    })
}

/// Decode one interleaved `[n_samp, n_chan]` big-endian buffer into
/// `out[.., offset..]`, applying calibration.
fn decode_buffer(
    raw: &[u8],
    ftype: u32,
    n_chan: usize,
    cals: &[f64],
    out: &mut Array2<f64>,
    offset: usize,
) -> Result<()> {
    let decode: fn(&[u8]) -> f64 = match ftype {
        FIFFT_FLOAT => |b| be_f32(b) as f64,
        FIFFT_DOUBLE => |b| f64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]),
        FIFFT_INT => |b| be_i32(b) as f64,
        FIFFT_SHORT | FIFFT_DAU_PACK16 => |b| i16::from_be_bytes([b[0], b[1]]) as f64,
        other => bail!("unsupported buffer type {other}"),
    };
    let width = bytes_per_sample(ftype).unwrap_or(4);
    for (i, sample) in raw.chunks_exact(width).enumerate() {
        let (t, c) = (i / n_chan, i % n_chan);
        out[[c, offset + t]] = decode(sample) * cals[c];
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiff::testutil::{ch_info_bytes, FifBuilder};
    use std::io::Write;

    /// Two channels @ 100 Hz; sample t of channel c is `c * 100 + t` scaled by
    /// the channel's calibration.
    fn recording(first_samp: i32, annotations: Option<(&[f32], &str, Option<f64>)>) -> Vec<u8> {
        let mut b = FifBuilder::with_file_id()
            .start(FIFFB_MEAS)
            .start(FIFFB_MEAS_INFO)
            .int(FIFF_NCHAN, 2)
            .float(FIFF_SFREQ, 100.0)
            .doubles(FIFF_MEAS_DATE, &[0.0, 0.0])
            .raw(FIFF_CH_INFO, FIFFT_CH_INFO_STRUCT, &ch_info_bytes("SC6", FIFFV_EEG_CH, 1.0, 1.0))
            .raw(FIFF_CH_INFO, FIFFT_CH_INFO_STRUCT, &ch_info_bytes("L1", FIFFV_EEG_CH, 0.5, 1.0))
            .end(FIFFB_MEAS_INFO);
        if let Some((onsets, desc, orig)) = annotations {
            b = b
                .start(FIFFB_MNE_ANNOTATIONS)
                .floats(FIFF_MNE_BASELINE_MIN, onsets)
                .floats(FIFF_MNE_BASELINE_MAX, onsets)
                .string(FIFF_COMMENT, &vec![desc; onsets.len()].join(":"));
            if let Some(o) = orig {
                b = b.doubles(FIFF_MEAS_DATE, &[o, 0.0]);
            }
            b = b.end(FIFFB_MNE_ANNOTATIONS);
        }
        b = b.start(FIFFB_RAW_DATA).int(FIFF_FIRST_SAMPLE, first_samp);
        for block in 0..3 {
            let samples: Vec<f32> = (0..50)
                .flat_map(|t| {
                    let t = (block * 50 + t) as f32;
                    [t, 100.0 + t]
                })
                .collect();
            b = b.floats(FIFF_DATA_BUFFER, &samples);
        }
        b.end(FIFFB_RAW_DATA).end(FIFFB_MEAS).finish()
    }

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(bytes).unwrap();
        f
    }

    #[test]
    fn reads_calibrated_samples() {
        let f = write_temp(&recording(0, None));
        let raw = open_raw(f.path()).unwrap();
        assert_eq!(raw.ch_names(), vec!["SC6", "L1"]);
        assert_eq!(raw.n_times(), 150);
        assert_eq!(raw.buffers.len(), 3);
        let data = raw.read_all_data().unwrap();
        assert_eq!(data.dim(), (2, 150));
        approx::assert_abs_diff_eq!(data[[0, 120]], 120.0);
        // cal 0.5
        approx::assert_abs_diff_eq!(data[[1, 120]], 110.0);
    }

    #[test]
    fn events_relative_to_first_sample() {
        let onsets = [0.25_f32, 1.0, 0.5, 9.0];
        let f = write_temp(&recording(0, Some((&onsets, "qrs", None))));
        let raw = open_raw(f.path()).unwrap();
        // 9.0 s is past the end (1.5 s of data).
        assert_eq!(raw.events_from_annotations("qrs"), vec![25, 50, 100]);
        assert!(raw.events_from_annotations("Median - Stimulation").is_empty());
    }

    #[test]
    fn events_with_orig_time_subtract_first_samp() {
        let onsets = [2.25_f32, 3.0];
        let f = write_temp(&recording(200, Some((&onsets, "qrs", Some(0.0)))));
        let raw = open_raw(f.path()).unwrap();
        assert_eq!(raw.first_samp, 200);
        assert_eq!(raw.events_from_annotations("qrs"), vec![25, 100]);
    }

    #[test]
    fn missing_file_is_error() {
        assert!(open_raw("/nonexistent/recording_raw.fif").is_err());
    }
}

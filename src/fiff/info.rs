//! Measurement info read from `FIFFB_MEAS_INFO`.
//!
//! Only what the SNR pipeline needs: channel names and calibration, sampling
//! rate, bad channels and the measurement date (the origin of annotation
//! onsets).
use std::io::{Read, Seek};
use anyhow::{bail, Context, Result};

use super::constants::*;
use super::tag::*;
use super::tree::Node;

/// Channel info, parsed from a `FIFFT_CH_INFO_STRUCT` tag.
///
/// On-disk layout (big-endian, 96 bytes):
/// ```text
///  0  scanno     i32      20  coil_type  i32
///  4  logno      i32      24  loc        12 × f32
///  8  kind       i32      72  unit       i32
/// 12  range      f32      76  unit_mul   i32
/// 16  cal        f32      80  ch_name    16 × u8, NUL-padded Latin-1
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelInfo {
    pub name:  String,
    pub kind:  i32,
    pub range: f32,
    pub cal:   f32,
}

impl ChannelInfo {
    /// Factor applied to stored samples: `cal × range`.
    #[inline]
    pub fn calibration(&self) -> f64 {
        (self.cal as f64) * (self.range as f64)
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        if raw.len() < 96 {
            bail!("ch_info payload too short: {} bytes (need 96)", raw.len());
        }
        let name_bytes = &raw[80..96];
        let end = name_bytes.iter().position(|&b| b == 0).unwrap_or(16);
        Ok(ChannelInfo {
            name:  name_bytes[..end].iter().map(|&b| b as char).collect(),
            kind:  be_i32(&raw[8..12]),
            range: be_f32(&raw[12..16]),
            cal:   be_f32(&raw[16..20]),
        })
    }
}

/// Measurement metadata of one recording.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasInfo {
    pub n_chan:    usize,
    pub sfreq:     f64,
    pub chs:       Vec<ChannelInfo>,
    pub bads:      Vec<String>,
    pub line_freq: Option<f64>,
    /// Seconds since the Unix epoch, if recorded.
    pub meas_date: Option<f64>,
}

impl MeasInfo {
    /// `cal × range` per channel.
    pub fn cals(&self) -> Vec<f64> {
        self.chs.iter().map(ChannelInfo::calibration).collect()
    }

    pub fn ch_names(&self) -> Vec<String> {
        self.chs.iter().map(|c| c.name.clone()).collect()
    }
}

/// `[seconds, microseconds]` stamp as stored in `FIFF_MEAS_DATE`.
pub(crate) fn read_meas_date<R: Read + Seek>(reader: &mut R, tag: &TagHeader) -> Result<Option<f64>> {
    let v = read_f64_vec(reader, tag)?;
    Ok(match v.as_slice() {
        [secs, usecs, ..] => Some(secs + usecs * 1e-6),
        [secs] => Some(*secs),
        [] => None,
    })
}

/// Read [`MeasInfo`] from the `FIFFB_MEAS_INFO` block of `tree`.
pub fn read_meas_info<R: Read + Seek>(reader: &mut R, tree: &Node) -> Result<MeasInfo> {
    let info_node = tree
        .find_block(FIFFB_MEAS)
        .context("FIFFB_MEAS block not found")?
        .find_block(FIFFB_MEAS_INFO)
        .context("FIFFB_MEAS_INFO block not found")?;

    let mut n_chan    = None::<usize>;
    let mut sfreq     = None::<f64>;
    let mut chs       = Vec::new();
    let mut bads      = Vec::new();
    let mut line_freq = None;
    let mut meas_date = None;

    for ent in &info_node.entries {
        match ent.kind {
            FIFF_NCHAN => n_chan = Some(read_i32(reader, ent)?.max(0) as usize),
            FIFF_SFREQ => sfreq = Some(read_f32(reader, ent)? as f64),
            FIFF_CH_INFO => chs.push(ChannelInfo::from_bytes(&read_raw_bytes(reader, ent)?)?),
            FIFF_BAD_CHS => {
                bads = read_string(reader, ent)?
                    .split(':')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            FIFF_LINE_FREQ => {
                let v = read_f32(reader, ent)?;
                line_freq = v.is_finite().then_some(v as f64);
            }
            FIFF_MEAS_DATE => meas_date = read_meas_date(reader, ent)?,
            _ => {}
        }
    }

    let n_chan = n_chan.context("FIFF_NCHAN not found")?;
    let sfreq = sfreq.context("FIFF_SFREQ not found")?;
    if !(sfreq.is_finite() && sfreq > 0.0) {
        bail!("invalid sampling rate {sfreq} Hz");
    }
    if chs.len() != n_chan {
        bail!("expected {n_chan} ch_info structs, got {}", chs.len());
    }

    Ok(MeasInfo { n_chan, sfreq, chs, bads, line_freq, meas_date })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiff::testutil::{ch_info_bytes, FifBuilder};
    use crate::fiff::tree::{read_tree, scan_directory};
    use std::io::Cursor;

    #[test]
    fn ch_info_from_bytes_basic() {
        let ch = ChannelInfo::from_bytes(&ch_info_bytes("SC6", FIFFV_EEG_CH, 2.0, 1.0)).unwrap();
        assert_eq!(ch.name, "SC6");
        assert_eq!(ch.kind, FIFFV_EEG_CH);
        approx::assert_abs_diff_eq!(ch.calibration(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn ch_info_too_short() {
        assert!(ChannelInfo::from_bytes(&[0u8; 95]).is_err());
    }

    #[test]
    fn meas_info_block() {
        let bytes = FifBuilder::new()
            .start(FIFFB_MEAS)
            .start(FIFFB_MEAS_INFO)
            .int(FIFF_NCHAN, 2)
            .float(FIFF_SFREQ, 1000.0)
            .raw(FIFF_MEAS_DATE, FIFFT_INT, &[0, 0, 0, 10, 0, 7, 0xa1, 0x20])
            .raw(FIFF_CH_INFO, FIFFT_CH_INFO_STRUCT, &ch_info_bytes("SC6", FIFFV_EEG_CH, 1.0, 1.0))
            .raw(FIFF_CH_INFO, FIFFT_CH_INFO_STRUCT, &ch_info_bytes("L1", FIFFV_EEG_CH, 1.0, 1.0))
            .string(FIFF_BAD_CHS, "L1")
            .end(FIFFB_MEAS_INFO)
            .end(FIFFB_MEAS)
            .finish();
        let mut cursor = Cursor::new(bytes);
        let dir = scan_directory(&mut cursor).unwrap();
        let tree = read_tree(&mut cursor, &dir).unwrap();
        let info = read_meas_info(&mut cursor, &tree).unwrap();
        assert_eq!(info.n_chan, 2);
        assert_eq!(info.ch_names(), vec!["SC6", "L1"]);
        assert_eq!(info.bads, vec!["L1"]);
        approx::assert_abs_diff_eq!(info.sfreq, 1000.0);
        // 10 s + 500 000 µs
        approx::assert_abs_diff_eq!(info.meas_date.unwrap(), 10.5, epsilon = 1e-9);
    }
}

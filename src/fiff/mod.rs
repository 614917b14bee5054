//! FIFF file format reader.
//!
//! Reads the raw `.fif` recordings produced by the ESG preparation and
//! cleaning steps, together with their annotations (QRS markers, stimulation
//! triggers). Compatible with files written by
//! [MNE-Python](https://mne.tools).
//!
//! ```no_run
//! use heart_snr::fiff::open_raw;
//!
//! let raw = open_raw("data/sub-001/esg/prepro/clean_ica_auto_median.fif").unwrap();
//! let data = raw.read_all_data().unwrap();               // [n_chan, n_times] f64
//! let qrs = raw.events_from_annotations("qrs");          // sample indices
//! println!("{} channels, {} beats", raw.info.n_chan, qrs.len());
//! ```
pub mod annotations;
pub mod constants;
pub mod info;
pub mod raw;
pub mod tag;
pub mod tree;

pub use annotations::{read_annotations, Annotations};
pub use info::{read_meas_info, ChannelInfo, MeasInfo};
pub use raw::{open_raw, BufferRecord, RawFif};
pub use tag::{read_tag_header, TagHeader};
pub use tree::{load_directory, read_tree, Node};

/// Minimal FIF writer for unit tests.
#[cfg(test)]
pub(crate) mod testutil {
    use super::constants::*;

    /// Sequential tag chain; the last tag gets `next = -1`.
    pub struct FifBuilder {
        tags: Vec<(i32, u32, Vec<u8>)>,
    }

    impl FifBuilder {
        pub fn new() -> Self {
            Self { tags: Vec::new() }
        }

        /// Starts with `FIFF_FILE_ID` and a `FIFF_DIR_POINTER` of -1.
        pub fn with_file_id() -> Self {
            Self::new()
                .raw(FIFF_FILE_ID, 31, &[0u8; 20])
                .int(FIFF_DIR_POINTER, -1)
        }

        pub fn raw(mut self, kind: i32, ftype: u32, payload: &[u8]) -> Self {
            self.tags.push((kind, ftype, payload.to_vec()));
            self
        }

        pub fn int(self, kind: i32, v: i32) -> Self {
            self.raw(kind, FIFFT_INT, &v.to_be_bytes())
        }

        pub fn float(self, kind: i32, v: f32) -> Self {
            self.raw(kind, FIFFT_FLOAT, &v.to_be_bytes())
        }

        pub fn floats(self, kind: i32, v: &[f32]) -> Self {
            let bytes: Vec<u8> = v.iter().flat_map(|x| x.to_be_bytes()).collect();
            self.raw(kind, FIFFT_FLOAT, &bytes)
        }

        pub fn doubles(self, kind: i32, v: &[f64]) -> Self {
            let bytes: Vec<u8> = v.iter().flat_map(|x| x.to_be_bytes()).collect();
            self.raw(kind, FIFFT_DOUBLE, &bytes)
        }

        pub fn string(self, kind: i32, s: &str) -> Self {
            self.raw(kind, FIFFT_STRING, s.as_bytes())
        }

        pub fn start(self, block: i32) -> Self {
            self.int(FIFF_BLOCK_START, block)
        }

        pub fn end(self, block: i32) -> Self {
            self.int(FIFF_BLOCK_END, block)
        }

        pub fn finish(self) -> Vec<u8> {
            let n = self.tags.len();
            let mut out = Vec::new();
            for (i, (kind, ftype, payload)) in self.tags.into_iter().enumerate() {
                let next = if i + 1 == n { FIFFV_NEXT_NONE } else { FIFFV_NEXT_SEQ };
                out.extend_from_slice(&kind.to_be_bytes());
                out.extend_from_slice(&ftype.to_be_bytes());
                out.extend_from_slice(&(payload.len() as i32).to_be_bytes());
                out.extend_from_slice(&next.to_be_bytes());
                out.extend_from_slice(&payload);
            }
            out
        }
    }

    /// 96-byte channel info payload.
    pub fn ch_info_bytes(name: &str, kind: i32, cal: f32, range: f32) -> Vec<u8> {
        let mut raw = vec![0u8; 96];
        raw[8..12].copy_from_slice(&kind.to_be_bytes());
        raw[12..16].copy_from_slice(&range.to_be_bytes());
        raw[16..20].copy_from_slice(&cal.to_be_bytes());
        let n = name.len().min(15);
        raw[80..80 + n].copy_from_slice(&name.as_bytes()[..n]);
        raw
    }
}

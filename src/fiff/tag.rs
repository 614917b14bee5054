//! FIFF tag I/O.
//!
//! A tag is the smallest structural unit of a FIF file.
//! On-disk layout (always big-endian):
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  kind : i32  │  type : u32  │  size : i32  │  next : i32   │  ← 16 bytes
//! ├────────────────────────────────────────────────────────────┤
//! │  <size bytes of payload data>                              │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! `next == 0` means the next tag follows immediately (pos + 16 + size),
//! `next > 0` is an absolute byte offset, `next == -1` ends the chain.
use std::io::{Read, Seek, SeekFrom};
use anyhow::{bail, Context, Result};

use super::constants::*;

/// Lightweight tag header; the payload is read on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagHeader {
    pub kind: i32,
    pub ftype: u32,   // "type" is a Rust keyword
    pub size: i32,
    pub next: i32,
    /// Byte offset of the header in the file.
    pub pos: u64,
}

impl TagHeader {
    /// Byte position of the first payload byte.
    #[inline]
    pub fn data_pos(&self) -> u64 {
        self.pos + 16
    }

    /// Payload length in bytes (negative sizes read as empty).
    #[inline]
    pub fn len(&self) -> usize {
        self.size.max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position of the next tag header, `None` at the end of the chain.
    pub fn next_pos(&self) -> Option<u64> {
        match self.next {
            FIFFV_NEXT_SEQ => Some(self.data_pos() + self.len() as u64),
            n if n > 0 => Some(n as u64),
            _ => None,
        }
    }
}

/// Big-endian `i32` from the first four bytes of `b`.
#[inline]
pub(crate) fn be_i32(b: &[u8]) -> i32 {
    i32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

#[inline]
pub(crate) fn be_u32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

#[inline]
pub(crate) fn be_f32(b: &[u8]) -> f32 {
    f32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

/// Read only the 16-byte tag header at `pos`.
pub fn read_tag_header<R: Read + Seek>(reader: &mut R, pos: u64) -> Result<TagHeader> {
    reader.seek(SeekFrom::Start(pos))
        .with_context(|| format!("seek to tag header @ {pos:#x}"))?;
    let mut buf = [0u8; 16];
    reader.read_exact(&mut buf)
        .with_context(|| format!("read tag header @ {pos:#x}"))?;
    Ok(TagHeader {
        kind:  be_i32(&buf[0..4]),
        ftype: be_u32(&buf[4..8]),
        size:  be_i32(&buf[8..12]),
        next:  be_i32(&buf[12..16]),
        pos,
    })
}

/// Read the entire payload as raw bytes.
pub fn read_raw_bytes<R: Read + Seek>(reader: &mut R, tag: &TagHeader) -> Result<Vec<u8>> {
    reader
        .seek(SeekFrom::Start(tag.data_pos()))
        .with_context(|| format!("seek to tag data @ {:#x}", tag.data_pos()))?;
    let mut buf = vec![0u8; tag.len()];
    reader
        .read_exact(&mut buf)
        .with_context(|| format!("read {} payload bytes of tag {}", tag.len(), tag.kind))?;
    Ok(buf)
}

/// Read a single big-endian i32 payload.
pub fn read_i32<R: Read + Seek>(reader: &mut R, tag: &TagHeader) -> Result<i32> {
    let raw = read_raw_bytes(reader, tag)?;
    if raw.len() < 4 {
        bail!("tag {} holds {} bytes, expected an i32", tag.kind, raw.len());
    }
    Ok(be_i32(&raw))
}

/// Read a single big-endian f32 payload.
pub fn read_f32<R: Read + Seek>(reader: &mut R, tag: &TagHeader) -> Result<f32> {
    let raw = read_raw_bytes(reader, tag)?;
    if raw.len() < 4 {
        bail!("tag {} holds {} bytes, expected an f32", tag.kind, raw.len());
    }
    Ok(be_f32(&raw))
}

/// Read a Latin-1 string payload.
pub fn read_string<R: Read + Seek>(reader: &mut R, tag: &TagHeader) -> Result<String> {
    // Latin-1 maps byte-for-byte onto the first 256 code points.
    Ok(read_raw_bytes(reader, tag)?.iter().map(|&b| b as char).collect())
}

/// Read a numeric array payload as `f64`, whatever its element type.
///
/// Annotation onsets are written as `FIFFT_FLOAT` by MNE and as
/// `FIFFT_DOUBLE` by some converters; both are accepted, as are ints.
pub fn read_f64_vec<R: Read + Seek>(reader: &mut R, tag: &TagHeader) -> Result<Vec<f64>> {
    let raw = read_raw_bytes(reader, tag)?;
    let out = match tag.ftype {
        FIFFT_FLOAT => raw.chunks_exact(4).map(|b| be_f32(b) as f64).collect(),
        FIFFT_INT => raw.chunks_exact(4).map(|b| be_i32(b) as f64).collect(),
        FIFFT_DOUBLE => raw
            .chunks_exact(8)
            .map(|b| f64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect(),
        other => bail!("tag {} has non-numeric type {other}", tag.kind),
    };
    Ok(out)
}

/// Read the tag directory a `FIFF_DIR_POINTER` points to.
///
/// Each 16-byte entry mirrors a tag header, except that the last field is
/// the tag's file position instead of `next`.
pub fn read_directory<R: Read + Seek>(
    reader: &mut R,
    tag: &TagHeader,
) -> Result<Vec<TagHeader>> {
    if tag.ftype != FIFFT_DIR_ENTRY_STRUCT {
        bail!("expected FIFFT_DIR_ENTRY_STRUCT, got {}", tag.ftype);
    }
    let raw = read_raw_bytes(reader, tag)?;
    Ok(raw
        .chunks_exact(16)
        .map(|b| TagHeader {
            kind:  be_i32(&b[0..4]),
            ftype: be_u32(&b[4..8]),
            size:  be_i32(&b[8..12]),
            next:  FIFFV_NEXT_NONE,
            pos:   be_u32(&b[12..16]) as u64,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiff::testutil::FifBuilder;
    use std::io::Cursor;

    #[test]
    fn reads_scalar_tags() {
        let bytes = FifBuilder::new()
            .int(FIFF_NCHAN, 42)
            .float(FIFF_SFREQ, 1000.0)
            .string(FIFF_COMMENT, "qrs:Median - Stimulation")
            .finish();
        let mut cursor = Cursor::new(bytes);

        let t0 = read_tag_header(&mut cursor, 0).unwrap();
        assert_eq!(t0.kind, FIFF_NCHAN);
        assert_eq!(read_i32(&mut cursor, &t0).unwrap(), 42);

        let t1 = read_tag_header(&mut cursor, t0.next_pos().unwrap()).unwrap();
        approx::assert_abs_diff_eq!(read_f32(&mut cursor, &t1).unwrap(), 1000.0_f32);

        let t2 = read_tag_header(&mut cursor, t1.next_pos().unwrap()).unwrap();
        assert_eq!(read_string(&mut cursor, &t2).unwrap(), "qrs:Median - Stimulation");
        assert_eq!(t2.next_pos(), None);
    }

    #[test]
    fn numeric_arrays_of_any_width() {
        let bytes = FifBuilder::new()
            .floats(FIFF_MNE_BASELINE_MIN, &[0.5, 1.25])
            .doubles(FIFF_MNE_BASELINE_MAX, &[0.75, 2.0])
            .finish();
        let mut cursor = Cursor::new(bytes);
        let t0 = read_tag_header(&mut cursor, 0).unwrap();
        assert_eq!(read_f64_vec(&mut cursor, &t0).unwrap(), vec![0.5, 1.25]);
        let t1 = read_tag_header(&mut cursor, t0.next_pos().unwrap()).unwrap();
        assert_eq!(read_f64_vec(&mut cursor, &t1).unwrap(), vec![0.75, 2.0]);
    }

    #[test]
    fn next_pos_variants() {
        let seq = TagHeader { kind: 1, ftype: 3, size: 8, next: 0, pos: 100 };
        assert_eq!(seq.next_pos(), Some(124));
        let jump = TagHeader { next: 5000, ..seq };
        assert_eq!(jump.next_pos(), Some(5000));
        let end = TagHeader { next: -1, ..seq };
        assert_eq!(end.next_pos(), None);
    }

    #[test]
    fn short_payload_is_error() {
        let bytes = FifBuilder::new().raw(FIFF_NCHAN, FIFFT_INT, &[0, 1]).finish();
        let mut cursor = Cursor::new(bytes);
        let t = read_tag_header(&mut cursor, 0).unwrap();
        assert!(read_i32(&mut cursor, &t).is_err());
    }
}

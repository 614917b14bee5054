//! FIF block tree.
//!
//! Tags are grouped into nested blocks delimited by `FIFF_BLOCK_START` /
//! `FIFF_BLOCK_END`. The directory (a flat list of tag headers) comes from
//! the embedded directory tag when the file has one, or from following the
//! `next` chain otherwise, as in `mne/_fiff/open.py`.
use std::io::{Read, Seek};
use anyhow::Result;
use log::debug;

use super::constants::*;
use super::tag::{read_directory, read_i32, read_tag_header, TagHeader};

/// One block of the tree.
#[derive(Debug, Default, Clone)]
pub struct Node {
    /// Block kind (`FIFFB_*`); 0 for the root.
    pub block:    i32,
    /// Non-structural tags directly inside this block.
    pub entries:  Vec<TagHeader>,
    pub children: Vec<Node>,
}

impl Node {
    /// Depth-first search for the first block of kind `kind`, `self` included.
    pub fn find_block(&self, kind: i32) -> Option<&Node> {
        if self.block == kind {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_block(kind))
    }

    /// First tag of kind `kind` directly in this block.
    pub fn find_tag(&self, kind: i32) -> Option<&TagHeader> {
        self.entries.iter().find(|e| e.kind == kind)
    }
}

/// Build the block tree from a flat directory, reading block kinds from the file.
pub fn read_tree<R: Read + Seek>(reader: &mut R, directory: &[TagHeader]) -> Result<Node> {
    let mut stack: Vec<Node> = vec![Node::default()];
    for tag in directory {
        match tag.kind {
            FIFF_BLOCK_START => {
                let block = read_i32(reader, tag)?;
                stack.push(Node { block, ..Node::default() });
            }
            FIFF_BLOCK_END if stack.len() > 1 => {
                if let Some(done) = stack.pop() {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(done);
                    }
                }
            }
            FIFF_BLOCK_END => debug!("unmatched FIFF_BLOCK_END @ {:#x}", tag.pos),
            _ => {
                if let Some(node) = stack.last_mut() {
                    node.entries.push(*tag);
                }
            }
        }
    }
    // Unclosed blocks end at EOF.
    while stack.len() > 1 {
        if let Some(open) = stack.pop() {
            if let Some(parent) = stack.last_mut() {
                parent.children.push(open);
            }
        }
    }
    Ok(stack.pop().unwrap_or_default())
}

/// Read every tag header by following the `next` chain from offset 0.
pub fn scan_directory<R: Read + Seek>(reader: &mut R) -> Result<Vec<TagHeader>> {
    let mut directory = Vec::new();
    let mut pos = Some(0);
    while let Some(p) = pos {
        let tag = read_tag_header(reader, p)?;
        pos = tag.next_pos();
        directory.push(tag);
    }
    Ok(directory)
}

/// The embedded tag directory, or `None` if the file has none.
///
/// The first tag must be `FIFF_FILE_ID` and the second `FIFF_DIR_POINTER`
/// with a positive offset to a `FIFFT_DIR_ENTRY_STRUCT` tag.
pub fn try_load_directory<R: Read + Seek>(reader: &mut R) -> Result<Option<Vec<TagHeader>>> {
    let id_tag = read_tag_header(reader, 0)?;
    if id_tag.kind != FIFF_FILE_ID {
        return Ok(None);
    }
    let Some(next) = id_tag.next_pos() else {
        return Ok(None);
    };
    let dir_ptr = read_tag_header(reader, next)?;
    if dir_ptr.kind != FIFF_DIR_POINTER {
        return Ok(None);
    }
    let dirpos = read_i32(reader, &dir_ptr)?;
    if dirpos <= 0 {
        return Ok(None);
    }
    let dir_tag = read_tag_header(reader, dirpos as u64)?;
    if dir_tag.ftype != FIFFT_DIR_ENTRY_STRUCT {
        return Ok(None);
    }
    Ok(Some(read_directory(reader, &dir_tag)?))
}

/// Embedded directory if present, else a full scan.
pub fn load_directory<R: Read + Seek>(reader: &mut R) -> Result<Vec<TagHeader>> {
    match try_load_directory(reader)? {
        Some(dir) => Ok(dir),
        None => {
            debug!("no tag directory, scanning");
            scan_directory(reader)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiff::testutil::FifBuilder;
    use std::io::Cursor;

    fn tree_of(b: FifBuilder) -> Node {
        let mut cursor = Cursor::new(b.finish());
        let dir = load_directory(&mut cursor).unwrap();
        read_tree(&mut cursor, &dir).unwrap()
    }

    #[test]
    fn flat_file_has_no_children() {
        let root = tree_of(FifBuilder::new().int(FIFF_NCHAN, 1).float(FIFF_SFREQ, 1.0));
        assert_eq!(root.entries.len(), 2);
        assert!(root.children.is_empty());
    }

    #[test]
    fn nested_blocks_resolve_kinds() {
        let root = tree_of(
            FifBuilder::new()
                .start(FIFFB_MEAS)
                .start(FIFFB_MEAS_INFO)
                .int(FIFF_NCHAN, 3)
                .end(FIFFB_MEAS_INFO)
                .start(FIFFB_MNE_ANNOTATIONS)
                .end(FIFFB_MNE_ANNOTATIONS)
                .end(FIFFB_MEAS),
        );
        let meas = root.find_block(FIFFB_MEAS).unwrap();
        assert_eq!(meas.children.len(), 2);
        let info = root.find_block(FIFFB_MEAS_INFO).unwrap();
        assert!(info.find_tag(FIFF_NCHAN).is_some());
        assert!(root.find_block(FIFFB_MNE_ANNOTATIONS).is_some());
        assert!(root.find_block(FIFFB_RAW_DATA).is_none());
    }

    #[test]
    fn file_id_without_directory_falls_back_to_scan() {
        let mut cursor = Cursor::new(FifBuilder::with_file_id().int(FIFF_NCHAN, 1).finish());
        assert!(try_load_directory(&mut cursor).unwrap().is_none());
        let dir = load_directory(&mut cursor).unwrap();
        assert_eq!(dir.len(), 3);
    }

    #[test]
    fn unclosed_block_is_kept() {
        let root = tree_of(FifBuilder::new().start(FIFFB_MEAS).int(FIFF_NCHAN, 1));
        assert_eq!(root.find_block(FIFFB_MEAS).unwrap().entries.len(), 1);
    }
}

//! MNE annotations stored in a raw FIF file.
//!
//! `raw.set_annotations(...)` followed by `raw.save(...)` writes a
//! `FIFFB_MNE_ANNOTATIONS` block holding:
//!
//! | tag                     | content                                  |
//! |-------------------------|------------------------------------------|
//! | `FIFF_MNE_BASELINE_MIN` | onsets in seconds                        |
//! | `FIFF_MNE_BASELINE_MAX` | `onset + duration` in seconds            |
//! | `FIFF_COMMENT`          | descriptions joined with `:`             |
//! | `FIFF_MEAS_DATE`        | origin of the onsets (optional)          |
//!
//! A `:` inside a description is written as `;`, and restored on read.
//!
//! QRS peaks detected on the ECG channel are stored this way, one
//! annotation per beat with description `"qrs"`.
use std::io::{Read, Seek};
use anyhow::{ensure, Result};

use super::constants::*;
use super::info::read_meas_date;
use super::tag::{read_f64_vec, read_string};
use super::tree::Node;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotations {
    /// Onsets in seconds.
    pub onset:       Vec<f64>,
    /// Durations in seconds.
    pub duration:    Vec<f64>,
    pub description: Vec<String>,
    /// Onset origin in seconds since the Unix epoch; `None` means onsets are
    /// relative to the first sample.
    pub orig_time:   Option<f64>,
}

impl Annotations {
    pub fn len(&self) -> usize {
        self.onset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.onset.is_empty()
    }

    /// Onsets of annotations whose description equals `description`.
    pub fn onsets_of<'a>(&'a self, description: &'a str) -> impl Iterator<Item = f64> + 'a {
        self.onset
            .iter()
            .zip(&self.description)
            .filter(move |(_, d)| d.as_str() == description)
            .map(|(&o, _)| o)
    }
}

/// Read the annotations of a recording; empty if the file has none.
///
/// Several annotation blocks are concatenated in file order.
pub fn read_annotations<R: Read + Seek>(reader: &mut R, tree: &Node) -> Result<Annotations> {
    let mut out = Annotations::default();
    let mut blocks = Vec::new();
    collect(tree, &mut blocks);

    for node in blocks {
        let mut onset = Vec::new();
        let mut end = Vec::new();
        let mut description = Vec::new();
        for ent in &node.entries {
            match ent.kind {
                FIFF_MNE_BASELINE_MIN => onset = read_f64_vec(reader, ent)?,
                FIFF_MNE_BASELINE_MAX => end = read_f64_vec(reader, ent)?,
                FIFF_COMMENT => {
                    description = read_string(reader, ent)?
                        .split(':')
                        .map(|d| d.replace(';', ":"))
                        .collect();
                }
                FIFF_MEAS_DATE => out.orig_time = read_meas_date(reader, ent)?,
                _ => {}
            }
        }
        if onset.is_empty() {
            continue;
        }
        ensure!(
            end.len() == onset.len() && description.len() == onset.len(),
            "annotation block has {} onsets, {} ends and {} descriptions",
            onset.len(),
            end.len(),
            description.len()
        );
        out.duration.extend(onset.iter().zip(&end).map(|(o, e)| e - o));
        out.onset.extend(onset);
        out.description.extend(description);
    }
    Ok(out)
}

fn collect<'a>(node: &'a Node, out: &mut Vec<&'a Node>) {
    if node.block == FIFFB_MNE_ANNOTATIONS {
        out.push(node);
    }
    for child in &node.children {
        collect(child, out);
    }
}

//! Pairwise comparison of denoising stages.
//!
//! For each condition the stage stores are merged into a [`StageTable`]
//! (`Prep`, `PCA`, `ICA`, `Post-ICA`, `SSP_5`, `SSP_6`). Every anchor column
//! is then compared against each column that follows it:
//!
//! ```text
//! Prep-PCA  = PCA  − Prep
//! Prep-ICA  = ICA  − Prep
//! ...
//! ```
//!
//! Subjects missing a value in any column of the table are dropped (and
//! logged), so every anchor tests the same subjects, and the remaining `[subjects, pairs]` matrix goes through the sign-flip
//! permutation t-test with t-max correction.
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context, Result};
use log::{debug, info, warn};
use ndarray::Array2;
use serde::Serialize;

use crate::condition::{subject_id, Condition};
use crate::config::StudyConfig;
use crate::results::SnrRecord;
use crate::stage::{RunOptions, StageKind, StageSpec};
use crate::stats::{permutation_t_test_with, Correction, Describe, PermutationConfig};

/// Named SNR columns of one condition over a common subject list.
#[derive(Debug, Clone, PartialEq)]
pub struct StageTable {
    pub condition: Condition,
    pub subjects: Vec<u32>,
    pub columns: Vec<(String, Vec<Option<f64>>)>,
}

impl StageTable {
    pub fn new(condition: Condition, subjects: Vec<u32>) -> Self {
        Self { condition, subjects, columns: Vec::new() }
    }

    /// Append a column; `values` follow [`StageTable::subjects`].
    pub fn push_column(&mut self, label: impl Into<String>, values: Vec<Option<f64>>) -> Result<()> {
        let label = label.into();
        ensure!(
            values.len() == self.subjects.len(),
            "column {label} has {} values for {} subjects",
            values.len(),
            self.subjects.len()
        );
        ensure!(self.column(&label).is_none(), "duplicate column {label}");
        self.columns.push((label, values));
        Ok(())
    }

    pub fn labels(&self) -> Vec<&str> {
        self.columns.iter().map(|(l, _)| l.as_str()).collect()
    }

    pub fn column(&self, label: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v.as_slice())
    }

    /// Take `columns` (in that order) from whichever store holds each of them.
    ///
    /// Subjects absent from a store read as missing.
    pub fn from_stores(
        condition: Condition,
        subjects: &[u32],
        stores: &[SnrRecord],
        columns: &[String],
    ) -> Result<Self> {
        let mut table = Self::new(condition, subjects.to_vec());
        for label in columns {
            let (matrix, col) = stores
                .iter()
                .map(|s| s.get(condition))
                .find_map(|m| m.column_of(label).map(|c| (m, c)))
                .with_context(|| format!("no store holds column {label}"))?;
            let values = subjects
                .iter()
                .map(|&s| matrix.row_of(s).and_then(|r| matrix.get(r, col)))
                .collect();
            table.push_column(label.clone(), values)?;
        }
        Ok(table)
    }

    /// `(anchor, later)` label pairs for every column after `anchor`.
    pub fn anchor_pairs(&self, anchor: &str) -> Result<Vec<(String, String)>> {
        let Some(pos) = self.columns.iter().position(|(l, _)| l == anchor) else {
            bail!("anchor {anchor} is not a column of {:?}", self.labels());
        };
        Ok(self.columns[pos + 1..]
            .iter()
            .map(|(l, _)| (anchor.to_string(), l.clone()))
            .collect())
    }

    /// Whether `row` has a value in every column.
    fn row_complete(&self, row: usize) -> bool {
        self.columns.iter().all(|(_, v)| v[row].is_some())
    }

    /// `later − anchor` for every anchor pair.
    ///
    /// Only rows complete across the whole table are kept, whichever the anchor.
    pub fn differences(&self, anchor: &str) -> Result<DifferenceTable> {
        let pairs = self.anchor_pairs(anchor)?;
        ensure!(!pairs.is_empty(), "no columns after anchor {anchor}");
        let base = self
            .column(anchor)
            .with_context(|| format!("anchor column {anchor}"))?;
        let later: Vec<&[Option<f64>]> = pairs
            .iter()
            .filter_map(|(_, b)| self.column(b))
            .collect();

        let mut kept = Vec::new();
        let mut dropped = Vec::new();
        let mut flat = Vec::new();
        for (row, &subject) in self.subjects.iter().enumerate() {
            if !self.row_complete(row) {
                dropped.push(subject);
                continue;
            }
            let diffs: Option<Vec<f64>> = later
                .iter()
                .map(|col| Some(col[row]? - base[row]?))
                .collect();
            match diffs {
                Some(d) => {
                    kept.push(subject);
                    flat.extend(d);
                }
                None => dropped.push(subject),
            }
        }
        if !dropped.is_empty() {
            let ids: Vec<String> = dropped.iter().map(|&s| subject_id(s)).collect();
            warn!(
                "{} anchor {anchor}: dropping {} incomplete subjects: {}",
                self.condition,
                dropped.len(),
                ids.join(", ")
            );
        }
        let values = Array2::from_shape_vec((kept.len(), pairs.len()), flat)?;
        Ok(DifferenceTable {
            anchor: anchor.to_string(),
            condition: self.condition,
            labels: pairs.iter().map(|(a, b)| format!("{a}-{b}")).collect(),
            subjects: kept,
            dropped,
            values,
        })
    }

    /// Summary of every column, missing values left out.
    pub fn describe(&self) -> Describe {
        let present: Vec<(&str, Vec<f64>)> = self
            .columns
            .iter()
            .map(|(l, v)| (l.as_str(), v.iter().flatten().copied().collect()))
            .collect();
        Describe::new(present.iter().map(|(l, v)| (*l, v.as_slice())))
    }
}

/// Paired differences against one anchor, rows with missing values removed.
#[derive(Debug, Clone, PartialEq)]
pub struct DifferenceTable {
    pub anchor: String,
    pub condition: Condition,
    /// `"A-B"` per column.
    pub labels: Vec<String>,
    /// Subjects of the rows of `values`.
    pub subjects: Vec<u32>,
    pub dropped: Vec<u32>,
    /// `[subjects, labels]`.
    pub values: Array2<f64>,
}

impl DifferenceTable {
    pub fn describe(&self) -> Describe {
        let cols: Vec<Vec<f64>> = self.values.columns().into_iter().map(|c| c.to_vec()).collect();
        Describe::new(self.labels.iter().map(String::as_str).zip(cols.iter().map(Vec::as_slice)))
    }
}

/// One tested pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PValueEntry {
    pub label: String,
    pub t_obs: f64,
    pub p_value: f64,
}

/// Result of testing all pairs of one anchor and condition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PValueReport {
    pub anchor: String,
    pub condition: Condition,
    pub entries: Vec<PValueEntry>,
    pub subjects: Vec<u32>,
    pub dropped: Vec<u32>,
    /// Sign flips evaluated, observed excluded.
    pub n_permutations: usize,
    pub exact: bool,
    pub correction: Correction,
    pub alpha: f64,
}

impl PValueReport {
    /// `pvalues_<anchor>_<condition>.json`
    pub fn file_name(&self) -> String {
        format!("pvalues_{}_{}.json", self.anchor, self.condition)
    }

    pub fn significant(&self) -> impl Iterator<Item = &PValueEntry> {
        self.entries.iter().filter(|e| e.p_value < self.alpha)
    }

    /// Write the report as pretty JSON into `dir`.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        let path = dir.join(self.file_name());
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).with_context(|| format!("write {}", path.display()))?;
        debug!("wrote {}", path.display());
        Ok(path)
    }
}

impl fmt::Display for PValueReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} vs later stages, {} ({} subjects, {} {} permutations, {:?})",
            self.anchor,
            self.condition,
            self.subjects.len(),
            self.n_permutations,
            if self.exact { "exact" } else { "random" },
            self.correction,
        )?;
        if !self.dropped.is_empty() {
            let ids: Vec<String> = self.dropped.iter().map(|&s| subject_id(s)).collect();
            writeln!(f, "  dropped: {}", ids.join(", "))?;
        }
        let width = self.entries.iter().map(|e| e.label.len()).max().unwrap_or(0).max(10);
        writeln!(f, "  {:<width$} {:>10} {:>10}", "comparison", "t", "p")?;
        for e in &self.entries {
            let mark = if e.p_value < self.alpha { " *" } else { "" };
            writeln!(f, "  {:<width$} {:>10.4} {:>10.4}{mark}", e.label, e.t_obs, e.p_value)?;
        }
        Ok(())
    }
}

/// Test every pair of `anchor` in `table`.
pub fn run_comparison(
    table: &StageTable,
    anchor: &str,
    cfg: &PermutationConfig,
) -> Result<PValueReport> {
    let diffs = table.differences(anchor)?;
    let result = permutation_t_test_with(diffs.values.view(), cfg)
        .with_context(|| format!("{} anchor {anchor}", table.condition))?;
    info!(
        "{} anchor {anchor}: {} subjects, {} pairs, min p {:.4}",
        table.condition,
        diffs.subjects.len(),
        diffs.labels.len(),
        result.p_values.iter().copied().fold(f64::INFINITY, f64::min)
    );
    let entries = diffs
        .labels
        .iter()
        .zip(result.t_obs.iter().zip(result.p_values.iter()))
        .map(|(label, (&t_obs, &p_value))| PValueEntry { label: label.clone(), t_obs, p_value })
        .collect();
    Ok(PValueReport {
        anchor: anchor.to_string(),
        condition: table.condition,
        entries,
        subjects: diffs.subjects,
        dropped: diffs.dropped,
        n_permutations: result.n_flips,
        exact: result.exact,
        correction: result.correction,
        alpha: cfg.alpha,
    })
}

/// Column labels of the comparison in table order.
pub fn comparison_columns(cfg: &StudyConfig) -> Vec<String> {
    [StageKind::Prep, StageKind::Pca, StageKind::Ica, StageKind::PostIca]
        .iter()
        .map(|k| k.label().to_string())
        .chain(cfg.compare.ssp_projectors.iter().map(|n| format!("SSP_{n}")))
        .collect()
}

/// Load the stage stores and build one table per condition.
pub fn load_stage_tables(cfg: &StudyConfig) -> Result<Vec<StageTable>> {
    let mut stores = Vec::new();
    for kind in StageKind::ALL {
        let spec = StageSpec::new(kind, cfg, RunOptions::default());
        let path = spec.dir.join(&cfg.compare.store_name);
        let record = SnrRecord::load(&path)
            .with_context(|| format!("loading {} store {}", kind, path.display()))?;
        stores.push(record);
    }
    let columns = comparison_columns(cfg);
    Condition::ALL
        .iter()
        .map(|&c| StageTable::from_stores(c, &cfg.subjects, &stores, &columns))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> StageTable {
        let mut t = StageTable::new(Condition::Median, vec![1, 2, 3, 4]);
        t.push_column("Prep", vec![Some(10.0), Some(12.0), Some(11.0), Some(9.0)]).unwrap();
        t.push_column("PCA", vec![Some(2.0), Some(3.0), None, Some(1.0)]).unwrap();
        t.push_column("ICA", vec![Some(1.0), Some(1.5), Some(2.0), Some(0.5)]).unwrap();
        t
    }

    #[test]
    fn anchor_pairs_follow_column_order() {
        let t = table();
        assert_eq!(
            t.anchor_pairs("Prep").unwrap(),
            vec![("Prep".to_string(), "PCA".to_string()), ("Prep".to_string(), "ICA".to_string())]
        );
        assert_eq!(t.anchor_pairs("PCA").unwrap().len(), 1);
        assert!(t.anchor_pairs("ICA").unwrap().is_empty());
        assert!(t.anchor_pairs("SSP_5").is_err());
    }

    #[test]
    fn differences_drop_incomplete_rows() {
        let d = table().differences("Prep").unwrap();
        assert_eq!(d.labels, vec!["Prep-PCA", "Prep-ICA"]);
        assert_eq!(d.subjects, vec![1, 2, 4]);
        assert_eq!(d.dropped, vec![3]);
        assert_eq!(d.values.dim(), (3, 2));
        assert_eq!(d.values[[0, 0]], -8.0);
        assert_eq!(d.values[[2, 1]], -8.5);
    }

    #[test]
    fn missing_anchor_value_drops_subject_for_every_anchor() {
        let mut t = StageTable::new(Condition::Tibial, vec![1, 2, 3]);
        t.push_column("Prep", vec![Some(10.0), None, Some(11.0)]).unwrap();
        t.push_column("PCA", vec![Some(2.0), Some(3.0), Some(4.0)]).unwrap();
        t.push_column("ICA", vec![Some(1.0), Some(1.5), Some(2.5)]).unwrap();

        let d = t.differences("PCA").unwrap();
        assert_eq!(d.subjects, vec![1, 3]);
        assert_eq!(d.dropped, vec![2]);
        assert_eq!(d.values.column(0).to_vec(), vec![-1.0, -1.5]);
        assert_eq!(t.differences("Prep").unwrap().subjects, d.subjects);
    }

    #[test]
    fn last_column_has_nothing_to_compare() {
        assert!(table().differences("ICA").is_err());
    }

    #[test]
    fn push_rejects_bad_columns() {
        let mut t = table();
        assert!(t.push_column("SSP_5", vec![Some(1.0)]).is_err());
        assert!(t.push_column("PCA", vec![None; 4]).is_err());
    }

    #[test]
    fn from_stores_aligns_subjects() {
        let mut prep = SnrRecord::new(vec![2, 1], vec!["Prep".into()]);
        prep.median.set(0, 0, 20.0);
        prep.median.set(1, 0, 10.0);
        let mut ssp = SnrRecord::new(vec![1, 2], vec!["SSP_5".into(), "SSP_6".into()]);
        ssp.median.set(0, 1, 3.0);
        let cols = vec!["Prep".to_string(), "SSP_6".to_string()];
        let t = StageTable::from_stores(Condition::Median, &[1, 2, 7], &[prep, ssp], &cols).unwrap();
        assert_eq!(t.column("Prep").unwrap(), &[Some(10.0), Some(20.0), None]);
        assert_eq!(t.column("SSP_6").unwrap(), &[Some(3.0), None, None]);
        let missing = vec!["PCA".to_string()];
        assert!(StageTable::from_stores(Condition::Median, &[1], &[], &missing).is_err());
    }

    #[test]
    fn report_names_and_marks() {
        let t = table();
        let cfg = PermutationConfig::default();
        let r = run_comparison(&t, "Prep", &cfg).unwrap();
        assert_eq!(r.file_name(), "pvalues_Prep_median.json");
        // Three subjects: 3 distinct flips, exact.
        assert!(r.exact);
        assert_eq!(r.n_permutations, 3);
        assert_eq!(r.entries.len(), 2);
        let text = r.to_string();
        assert!(text.contains("Prep-ICA"));
        assert!(text.contains("sub-003"));
    }

    #[test]
    fn describe_skips_missing() {
        let d = table().describe();
        let pca = &d.columns.iter().find(|(l, _)| l == "PCA").unwrap().1;
        assert_eq!(pca.count, 3);
    }
}

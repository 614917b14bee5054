//! Per-stage SNR results and their on-disk store.
//!
//! One [`SnrRecord`] per pipeline stage holds a subjects × columns
//! [`ResultMatrix`] for each [`Condition`]. The store is a safetensors file:
//!
//! | key          | dtype | shape                  |
//! |--------------|-------|------------------------|
//! | `snr_med`    | F64   | `[subjects, columns]`  |
//! | `snr_tib`    | F64   | `[subjects, columns]`  |
//! | `status_med` | I32   | `[subjects, columns]`  |
//! | `status_tib` | I32   | `[subjects, columns]`  |
//! | `subjects`   | I32   | `[subjects]`           |
//! | `columns`    | U8    | newline-joined labels  |
//!
//! Cells without a value are written as NaN; the status code says why.
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use log::debug;

use crate::condition::Condition;
use crate::io::{StReader, StWriter};

/// Outcome of one (subject, condition, column) cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CellStatus {
    Ok,
    /// Flat baseline: SNR undefined.
    UndefinedSnr,
    /// Loading or processing failed.
    Failed,
    /// Not computed.
    #[default]
    Missing,
}

impl CellStatus {
    pub fn code(self) -> i32 {
        match self {
            CellStatus::Ok => 0,
            CellStatus::UndefinedSnr => 1,
            CellStatus::Failed => 2,
            CellStatus::Missing => 3,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(CellStatus::Ok),
            1 => Some(CellStatus::UndefinedSnr),
            2 => Some(CellStatus::Failed),
            3 => Some(CellStatus::Missing),
            _ => None,
        }
    }
}

/// Subjects × columns SNR values for one condition.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultMatrix {
    subjects: Vec<u32>,
    columns: Vec<String>,
    values: Vec<Option<f64>>,
    status: Vec<CellStatus>,
}

impl ResultMatrix {
    /// All cells [`CellStatus::Missing`].
    pub fn new(subjects: Vec<u32>, columns: Vec<String>) -> Self {
        let n = subjects.len() * columns.len();
        Self {
            subjects,
            columns,
            values: vec![None; n],
            status: vec![CellStatus::Missing; n],
        }
    }

    pub fn subjects(&self) -> &[u32] {
        &self.subjects
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn row_of(&self, subject: u32) -> Option<usize> {
        self.subjects.iter().position(|&s| s == subject)
    }

    pub fn column_of(&self, label: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == label)
    }

    fn index(&self, row: usize, col: usize) -> usize {
        row * self.columns.len() + col
    }

    /// Store a computed value.
    ///
    /// A non-finite value is stored as [`CellStatus::UndefinedSnr`].
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        let i = self.index(row, col);
        if value.is_finite() {
            self.values[i] = Some(value);
            self.status[i] = CellStatus::Ok;
        } else {
            self.values[i] = None;
            self.status[i] = CellStatus::UndefinedSnr;
        }
    }

    /// Mark a cell as having no value.
    pub fn mark(&mut self, row: usize, col: usize, status: CellStatus) {
        let i = self.index(row, col);
        self.values[i] = None;
        self.status[i] = status;
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.values[self.index(row, col)]
    }

    pub fn status(&self, row: usize, col: usize) -> CellStatus {
        self.status[self.index(row, col)]
    }

    /// Values of one column in subject order.
    pub fn column(&self, col: usize) -> Vec<Option<f64>> {
        (0..self.subjects.len()).map(|r| self.get(r, col)).collect()
    }

    /// Number of cells with each status, in `Ok, UndefinedSnr, Failed,
    /// Missing` order.
    pub fn status_counts(&self) -> [usize; 4] {
        let mut counts = [0; 4];
        for s in &self.status {
            counts[s.code() as usize] += 1;
        }
        counts
    }

    fn to_flat(&self) -> (Vec<f64>, Vec<i32>) {
        let values = self.values.iter().map(|v| v.unwrap_or(f64::NAN)).collect();
        let codes = self.status.iter().map(|s| s.code()).collect();
        (values, codes)
    }

    fn from_flat(
        subjects: Vec<u32>,
        columns: Vec<String>,
        values: &[f64],
        codes: &[i32],
    ) -> Result<Self> {
        let n = subjects.len() * columns.len();
        ensure!(
            values.len() == n && codes.len() == n,
            "expected {n} cells, got {} values and {} status codes",
            values.len(),
            codes.len()
        );
        let mut m = Self::new(subjects, columns);
        for (i, (&v, &code)) in values.iter().zip(codes).enumerate() {
            let status =
                CellStatus::from_code(code).with_context(|| format!("unknown status code {code}"))?;
            match status {
                CellStatus::Ok if v.is_finite() => m.values[i] = Some(v),
                CellStatus::Ok => bail!("cell {i} marked ok but holds {v}"),
                _ => {}
            }
            m.status[i] = status;
        }
        Ok(m)
    }
}

/// Results of one pipeline stage for both conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct SnrRecord {
    pub median: ResultMatrix,
    pub tibial: ResultMatrix,
}

impl SnrRecord {
    pub fn new(subjects: Vec<u32>, columns: Vec<String>) -> Self {
        Self {
            median: ResultMatrix::new(subjects.clone(), columns.clone()),
            tibial: ResultMatrix::new(subjects, columns),
        }
    }

    pub fn get(&self, condition: Condition) -> &ResultMatrix {
        match condition {
            Condition::Median => &self.median,
            Condition::Tibial => &self.tibial,
        }
    }

    pub fn get_mut(&mut self, condition: Condition) -> &mut ResultMatrix {
        match condition {
            Condition::Median => &mut self.median,
            Condition::Tibial => &mut self.tibial,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let subjects = self.median.subjects();
        let columns = self.median.columns();
        ensure!(
            self.tibial.subjects() == subjects && self.tibial.columns() == columns,
            "median and tibial matrices have different layouts"
        );
        let shape = [subjects.len(), columns.len()];
        let mut w = StWriter::new();
        for condition in Condition::ALL {
            let (values, codes) = self.get(condition).to_flat();
            w.add_f64(condition.store_key(), &values, &shape);
            w.add_i32(condition.status_key(), &codes, &shape);
        }
        let ids: Vec<i32> = subjects.iter().map(|&s| s as i32).collect();
        w.add_i32("subjects", &ids, &[ids.len()]);
        w.add_strings("columns", columns);
        w.write(path)?;
        debug!("wrote {} × {} store to {}", shape[0], shape[1], path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let r = StReader::open(path)?;
        let subjects: Vec<u32> = r
            .read_i32("subjects")?
            .into_iter()
            .map(|s| u32::try_from(s).with_context(|| format!("negative subject number {s}")))
            .collect::<Result<_>>()?;
        let columns = r.read_strings("columns")?;

        let matrix = |condition: Condition| -> Result<ResultMatrix> {
            let values = r.read_f64(condition.store_key())?;
            let codes = r.read_i32(condition.status_key())?;
            ResultMatrix::from_flat(subjects.clone(), columns.clone(), &values, &codes)
                .with_context(|| format!("{} matrix in {}", condition, path.display()))
        };
        Ok(Self {
            median: matrix(Condition::Median)?,
            tibial: matrix(Condition::Tibial)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_round_trip() {
        for s in [CellStatus::Ok, CellStatus::UndefinedSnr, CellStatus::Failed, CellStatus::Missing] {
            assert_eq!(CellStatus::from_code(s.code()), Some(s));
        }
        assert_eq!(CellStatus::from_code(9), None);
    }

    #[test]
    fn set_and_mark() {
        let mut m = ResultMatrix::new(vec![1, 2], vec!["Prep".into(), "PCA".into()]);
        m.set(0, 1, 4.5);
        m.set(1, 0, f64::INFINITY);
        m.mark(1, 1, CellStatus::Failed);
        assert_eq!(m.get(0, 1), Some(4.5));
        assert_eq!(m.status(1, 0), CellStatus::UndefinedSnr);
        assert_eq!(m.get(1, 0), None);
        assert_eq!(m.status(0, 0), CellStatus::Missing);
        assert_eq!(m.status_counts(), [1, 1, 1, 1]);
        assert_eq!(m.column(1), vec![Some(4.5), None]);
        assert_eq!(m.row_of(2), Some(1));
        assert_eq!(m.column_of("PCA"), Some(1));
    }

    #[test]
    fn ok_cell_with_nan_is_rejected() {
        let r = ResultMatrix::from_flat(vec![1], vec!["Prep".into()], &[f64::NAN], &[0]);
        assert!(r.is_err());
    }
}

//! Column summaries in the layout of `pandas.DataFrame.describe()`.
//!
//! `std` uses `ddof = 1`; quartiles use linear interpolation between the two
//! nearest ranks (numpy's default `method='linear'`).
use std::fmt;

use serde::Serialize;

/// Summary statistics of one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
}

impl Summary {
    /// Summarise `values`; returns `None` for an empty slice.
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len();
        let mean = values.iter().sum::<f64>() / n as f64;
        let std = if n > 1 {
            let ss: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
            (ss / (n - 1) as f64).sqrt()
        } else {
            f64::NAN
        };
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        Some(Self {
            count: n,
            mean,
            std,
            min: sorted[0],
            q25: quantile_sorted(&sorted, 0.25),
            median: quantile_sorted(&sorted, 0.5),
            q75: quantile_sorted(&sorted, 0.75),
            max: sorted[n - 1],
        })
    }
}

/// Linear-interpolated quantile of an ascending, non-empty slice.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Labelled summaries of several columns, printable as a table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Describe {
    pub columns: Vec<(String, Summary)>,
}

impl Describe {
    /// Summarise each `(label, values)` pair; empty columns are skipped.
    pub fn new<'a, I>(columns: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a [f64])>,
    {
        let columns = columns
            .into_iter()
            .filter_map(|(label, v)| Summary::of(v).map(|s| (label.to_string(), s)))
            .collect();
        Self { columns }
    }
}

impl fmt::Display for Describe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .columns
            .iter()
            .map(|(l, _)| l.len())
            .max()
            .unwrap_or(0)
            .max(10);
        write!(f, "{:<6}", "")?;
        for (label, _) in &self.columns {
            write!(f, " {label:>width$}")?;
        }
        writeln!(f)?;
        type Row = (&'static str, fn(&Summary) -> f64);
        let rows: [Row; 8] = [
            ("count", |s| s.count as f64),
            ("mean", |s| s.mean),
            ("std", |s| s.std),
            ("min", |s| s.min),
            ("25%", |s| s.q25),
            ("50%", |s| s.median),
            ("75%", |s| s.q75),
            ("max", |s| s.max),
        ];
        for (name, get) in rows {
            write!(f, "{name:<6}")?;
            for (_, s) in &self.columns {
                write!(f, " {:>width$.6}", get(s))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_pandas_describe() {
        // pandas.Series([1, 2, 3, 4, 10]).describe()
        let s = Summary::of(&[4.0, 1.0, 10.0, 3.0, 2.0]).unwrap();
        assert_eq!(s.count, 5);
        approx::assert_abs_diff_eq!(s.mean, 4.0, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(s.std, 3.535_533_905_932_738, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(s.min, 1.0, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(s.q25, 2.0, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(s.median, 3.0, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(s.q75, 4.0, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(s.max, 10.0, epsilon = 1e-12);
    }

    #[test]
    fn interpolated_quartiles() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        approx::assert_abs_diff_eq!(quantile_sorted(&sorted, 0.25), 1.75, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(quantile_sorted(&sorted, 0.5), 2.5, epsilon = 1e-12);
    }

    #[test]
    fn single_value_has_nan_std() {
        let s = Summary::of(&[2.5]).unwrap();
        assert!(s.std.is_nan());
        assert_eq!(s.median, 2.5);
        assert!(Summary::of(&[]).is_none());
    }

    #[test]
    fn display_has_all_rows() {
        let a = [1.0, 2.0, 3.0];
        let d = Describe::new([("Prep-PCA", &a[..])]);
        let text = d.to_string();
        for row in ["count", "mean", "std", "min", "25%", "50%", "75%", "max", "Prep-PCA"] {
            assert!(text.contains(row), "missing {row} in\n{text}");
        }
    }
}

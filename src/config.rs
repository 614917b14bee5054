//! Study configuration.
//!
//! [`StudyConfig`] holds every tunable parameter of the SNR study. It is read
//! from a JSON file; any field left out takes the value used in the study:
//!
//! ```json
//! {
//!   "subjects": [1, 2, 3],
//!   "esg_bp_freq": [30.0, 400.0],
//!   "snr": { "reduced_window": true },
//!   "paths": { "root": "/data/esg" }
//! }
//! ```
//!
//! Windows are given in milliseconds, as in the acquisition setup, and
//! converted to seconds by [`StudyConfig::epoch_window`] and
//! [`StudyConfig::baseline_window`].
use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::evoked::Window;
use crate::snr::SnrConfig;
use crate::stats::PermutationConfig;

/// Configuration of the whole study.
///
/// All fields are `pub` so a configuration can also be built in code with
/// struct-update syntax:
///
/// ```
/// use heart_snr::StudyConfig;
///
/// let cfg = StudyConfig {
///     subjects: (1..=4).collect(),
///     ..StudyConfig::default()
/// };
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyConfig {
    /// Subject numbers, one row each in the result matrices.
    ///
    /// Default: `1..=36`.
    pub subjects: Vec<u32>,

    /// Sampling rate of the prepared recordings in Hz; part of their file names.
    ///
    /// Default: `1000`.
    pub sampling_rate: u32,

    /// Line-noise frequencies removed with a notch filter, in Hz.
    ///
    /// Default: `[50.0]`.
    pub notch_freq: Vec<f64>,

    /// ESG band-pass `[low, high]` in Hz.
    ///
    /// Default: `[30.0, 400.0]`.
    pub esg_bp_freq: [f64; 2],

    /// Butterworth order of the ESG band-pass, run forward and backward.
    ///
    /// Default: `2`.
    pub esg_bp_order: usize,

    /// Epoch window around each QRS event in milliseconds.
    ///
    /// Default: `[-200, 200]`.
    pub iv_epoch: [f64; 2],

    /// Baseline window in milliseconds; also the noise window of the SNR.
    ///
    /// Default: `[-150, -50]`.
    pub iv_baseline: [f64; 2],

    /// Annotation description of the QRS events.
    ///
    /// Default: `"qrs"`.
    pub event_name: String,

    /// SSP projector counts computed by the SSP stage, one column each.
    ///
    /// Default: `5..=20`.
    pub ssp_projectors: Vec<u32>,

    pub snr: SnrConfig,
    pub permutation: PermutationConfig,
    pub compare: CompareConfig,
    pub paths: PathConfig,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            subjects: (1..=36).collect(),
            sampling_rate: 1000,
            notch_freq: vec![50.0],
            esg_bp_freq: [30.0, 400.0],
            esg_bp_order: 2,
            iv_epoch: [-200.0, 200.0],
            iv_baseline: [-150.0, -50.0],
            event_name: "qrs".to_string(),
            ssp_projectors: (5..=20).collect(),
            snr: SnrConfig::default(),
            permutation: PermutationConfig::default(),
            compare: CompareConfig::default(),
            paths: PathConfig::default(),
        }
    }
}

impl StudyConfig {
    /// Read and validate a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let cfg: Self = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        cfg.validate()
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(cfg)
    }

    /// Epoch window in seconds.
    pub fn epoch_window(&self) -> Result<Window> {
        Window::from_ms(self.iv_epoch).context("iv_epoch")
    }

    /// Baseline window in seconds.
    pub fn baseline_window(&self) -> Result<Window> {
        Window::from_ms(self.iv_baseline).context("iv_baseline")
    }

    /// Check value ranges and window placement.
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.subjects.is_empty(), "no subjects configured");
        let mut sorted = self.subjects.clone();
        sorted.sort_unstable();
        sorted.dedup();
        ensure!(sorted.len() == self.subjects.len(), "duplicate subject numbers");
        ensure!(self.sampling_rate > 0, "sampling_rate must be positive");

        let nyquist = self.sampling_rate as f64 / 2.0;
        let [lo, hi] = self.esg_bp_freq;
        if !(lo > 0.0 && lo < hi && hi < nyquist) {
            bail!("esg_bp_freq [{lo}, {hi}] Hz must satisfy 0 < low < high < {nyquist} Hz");
        }
        ensure!(
            (1..=10).contains(&self.esg_bp_order),
            "esg_bp_order {} outside 1..=10",
            self.esg_bp_order
        );
        for &f in &self.notch_freq {
            ensure!(f > 0.0 && f < nyquist, "notch frequency {f} Hz outside (0, {nyquist}) Hz");
        }

        let epoch = self.epoch_window()?;
        let baseline = self.baseline_window()?;
        ensure!(
            epoch.contains(&baseline),
            "baseline {:?} ms not inside epoch {:?} ms",
            self.iv_baseline,
            self.iv_epoch
        );
        for c in crate::Condition::ALL {
            let qrs = self.snr.qrs_window(c);
            ensure!(
                epoch.contains(&qrs),
                "{c} QRS window [{}, {}] s not inside epoch",
                qrs.start,
                qrs.end
            );
            ensure!(
                baseline.end < qrs.start,
                "baseline must end before the {c} QRS window starts"
            );
        }

        ensure!(!self.event_name.is_empty(), "event_name is empty");
        ensure!(self.permutation.n_permutations > 0, "n_permutations must be positive");
        ensure!(
            self.permutation.alpha > 0.0 && self.permutation.alpha < 1.0,
            "alpha must lie in (0, 1)"
        );
        ensure!(!self.compare.anchors.is_empty(), "no comparison anchors");
        Ok(())
    }
}

/// Settings of the pairwise stage comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareConfig {
    /// Stage columns compared against every later column.
    ///
    /// Default: `["Prep", "PCA"]`.
    pub anchors: Vec<String>,

    /// SSP projector counts taken into the comparison table as `SSP_<n>`.
    ///
    /// Default: `[5, 6]`.
    pub ssp_projectors: Vec<u32>,

    /// Store file read from each stage directory.
    ///
    /// Default: `"snr_heart.safetensors"`.
    pub store_name: String,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            anchors: vec!["Prep".into(), "PCA".into()],
            ssp_projectors: vec![5, 6],
            store_name: "snr_heart.safetensors".into(),
        }
    }
}

/// Directory layout. Stage directories are relative to `root` unless absolute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    pub root: PathBuf,
    /// Prepared recordings, heart artefact still present.
    pub prepared: PathBuf,
    /// PCA-cleaned recordings.
    pub pca: PathBuf,
    /// ICA-cleaned recordings.
    pub ica: PathBuf,
    /// Recordings cleaned by ICA after PCA.
    pub post_ica: PathBuf,
    /// SSP-cleaned recordings, one sub-directory per projector count.
    pub ssp: PathBuf,
    /// Where the comparison writes its reports.
    pub stats_output: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
            prepared: PathBuf::from("prepared_py"),
            pca: PathBuf::from("ecg_rm_py"),
            ica: PathBuf::from("baseline_ica_py"),
            post_ica: PathBuf::from("ica_py"),
            ssp: PathBuf::from("SSP"),
            stats_output: PathBuf::from("stats"),
        }
    }
}

impl PathConfig {
    /// Resolve `dir` against `root`.
    pub fn resolve(&self, dir: &Path) -> PathBuf {
        self.root.join(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = StudyConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.subjects.len(), 36);
        assert_eq!(cfg.ssp_projectors.first(), Some(&5));
        assert_eq!(cfg.ssp_projectors.last(), Some(&20));
    }

    #[test]
    fn windows_in_seconds() {
        let cfg = StudyConfig::default();
        let e = cfg.epoch_window().unwrap();
        let b = cfg.baseline_window().unwrap();
        approx::assert_abs_diff_eq!(e.start, -0.2, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(e.end, 0.2, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(b.start, -0.15, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(b.end, -0.05, epsilon = 1e-12);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: StudyConfig = serde_json::from_str(
            r#"{ "subjects": [3, 4], "snr": { "reduced_window": true } }"#,
        )
        .unwrap();
        assert_eq!(cfg.subjects, vec![3, 4]);
        assert!(cfg.snr.reduced_window);
        assert_eq!(cfg.iv_epoch, [-200.0, 200.0]);
        assert_eq!(cfg.permutation.n_permutations, 2000);
        assert_eq!(cfg.compare.anchors, vec!["Prep", "PCA"]);
    }

    #[test]
    fn rejects_bad_values() {
        let bad_band = StudyConfig { esg_bp_freq: [400.0, 30.0], ..StudyConfig::default() };
        let bad_order = StudyConfig { esg_bp_order: 0, ..StudyConfig::default() };
        assert!(bad_order.validate().is_err());
        assert!(bad_band.validate().is_err());

        let baseline_outside = StudyConfig { iv_baseline: [-300.0, -50.0], ..StudyConfig::default() };
        assert!(baseline_outside.validate().is_err());

        let overlap = StudyConfig { iv_baseline: [-150.0, 70.0], ..StudyConfig::default() };
        assert!(overlap.validate().is_err());

        let dup = StudyConfig { subjects: vec![1, 1], ..StudyConfig::default() };
        assert!(dup.validate().is_err());
    }

    #[test]
    fn paths_resolve_against_root() {
        let p = PathConfig { root: PathBuf::from("/data"), ..PathConfig::default() };
        assert_eq!(p.resolve(&p.pca), PathBuf::from("/data/ecg_rm_py"));
        assert_eq!(p.resolve(Path::new("/abs")), PathBuf::from("/abs"));
    }
}

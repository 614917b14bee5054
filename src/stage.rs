//! Per-stage SNR computation over all subjects and conditions.
//!
//! A [`StageSpec`] describes where one denoising stage keeps its cleaned
//! recordings and which columns it contributes (one, or one per SSP
//! projector count). [`run_stage`] loads every (subject, condition, column)
//! recording through a [`RecordingSource`], builds the QRS-locked evoked
//! waveform and computes its SNR. A failing cell is recorded in the result
//! matrix and logged; the batch carries on.
//!
//! ```text
//! for subject × condition × column:
//!   load recording ─► [reference + band-pass + notch] ─► epoch/average ─► SNR
//! ```
//!
//! The bracketed step only runs for stages whose files were saved before
//! filtering (`prep`, `pca`).
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use ndarray::Array2;

use crate::condition::{subject_id, Condition};
use crate::config::StudyConfig;
use crate::epoch::evoked_from_raw;
use crate::fiff::open_raw;
use crate::filter::bandpass_notch_inplace;
use crate::reference::{add_reference_channel, rereference_to, REFERENCE_CHANNEL};
use crate::results::{CellStatus, SnrRecord};
use crate::snr::{compute_snr, SnrConfig, SnrError};

/// Denoising stage whose output is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    /// Prepared data, heart artefact still present.
    Prep,
    Pca,
    Ica,
    /// ICA applied after PCA.
    PostIca,
    Ssp,
}

impl StageKind {
    pub const ALL: [StageKind; 5] = [
        StageKind::Prep,
        StageKind::Pca,
        StageKind::Ica,
        StageKind::PostIca,
        StageKind::Ssp,
    ];

    /// Command-line name.
    pub fn name(self) -> &'static str {
        match self {
            StageKind::Prep => "prep",
            StageKind::Pca => "pca",
            StageKind::Ica => "ica",
            StageKind::PostIca => "post-ica",
            StageKind::Ssp => "ssp",
        }
    }

    /// Column label in result stores and comparison tables.
    pub fn label(self) -> &'static str {
        match self {
            StageKind::Prep => "Prep",
            StageKind::Pca => "PCA",
            StageKind::Ica => "ICA",
            StageKind::PostIca => "Post-ICA",
            StageKind::Ssp => "SSP",
        }
    }

    /// Recordings of `prep` and `pca` are stored unfiltered and unreferenced.
    pub fn preprocess(self) -> Preprocess {
        match self {
            StageKind::Prep | StageKind::Pca => Preprocess::ReferenceAndFilter,
            StageKind::Ica | StageKind::PostIca | StageKind::Ssp => Preprocess::None,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "prep" | "prepared" | "raw" => Ok(StageKind::Prep),
            "pca" => Ok(StageKind::Pca),
            "ica" => Ok(StageKind::Ica),
            "post-ica" | "post_ica" | "postica" => Ok(StageKind::PostIca),
            "ssp" => Ok(StageKind::Ssp),
            other => bail!("unknown stage '{other}' (expected prep, pca, ica, post-ica or ssp)"),
        }
    }
}

/// Processing applied to a loaded recording before epoching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preprocess {
    /// Load as stored.
    None,
    /// Add the reference channel (or re-reference anteriorly), then band-pass
    /// and notch filter.
    ReferenceAndFilter,
}

/// Run-wide switches that select file variants and the output name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Use the anteriorly re-referenced recordings.
    pub anterior_reference: bool,
    /// Use the reduced QRS search window.
    pub reduced_window: bool,
}

impl RunOptions {
    /// `snr_heart[_ant][_smallwin].safetensors`
    pub fn output_file_name(&self) -> String {
        let mut name = String::from("snr_heart");
        if self.anterior_reference {
            name.push_str("_ant");
        }
        if self.reduced_window {
            name.push_str("_smallwin");
        }
        name.push_str(".safetensors");
        name
    }
}

/// One measured column of a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageColumn {
    pub label: String,
    /// Path with `{subject_id}` and `{condition}` placeholders.
    pub template: String,
}

impl StageColumn {
    pub fn path(&self, subject: u32, condition: Condition) -> PathBuf {
        PathBuf::from(
            self.template
                .replace("{subject_id}", &subject_id(subject))
                .replace("{condition}", condition.name()),
        )
    }
}

/// Where a stage's recordings live and what it measures.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSpec {
    pub kind: StageKind,
    pub dir: PathBuf,
    pub columns: Vec<StageColumn>,
    pub preprocess: Preprocess,
    pub options: RunOptions,
}

impl StageSpec {
    /// The study's file layout for `kind`.
    pub fn new(kind: StageKind, cfg: &StudyConfig, options: RunOptions) -> Self {
        let paths = &cfg.paths;
        let ant = if options.anterior_reference { "_antRef" } else { "" };
        let prepro = "{subject_id}/esg/prepro";
        let (dir, columns) = match kind {
            StageKind::Prep => (
                paths.resolve(&paths.prepared),
                vec![(
                    kind.label().to_string(),
                    format!("{prepro}/noStimart_sr{}_{{condition}}_withqrs.fif", cfg.sampling_rate),
                )],
            ),
            StageKind::Pca => (
                paths.resolve(&paths.pca),
                vec![(
                    kind.label().to_string(),
                    format!("{prepro}/data_clean_ecg_spinal_{{condition}}_withqrs.fif"),
                )],
            ),
            StageKind::Ica => (
                paths.resolve(&paths.ica),
                vec![(
                    kind.label().to_string(),
                    format!("{prepro}/clean_baseline_ica_auto{ant}_{{condition}}.fif"),
                )],
            ),
            StageKind::PostIca => (
                paths.resolve(&paths.post_ica),
                vec![(
                    kind.label().to_string(),
                    format!("{prepro}/clean_ica_auto{ant}_{{condition}}.fif"),
                )],
            ),
            StageKind::Ssp => (
                paths.resolve(&paths.ssp),
                cfg.ssp_projectors
                    .iter()
                    .map(|n| {
                        (
                            format!("SSP_{n}"),
                            format!("{{subject_id}}/{n} projections/ssp_cleaned_{{condition}}{ant}.fif"),
                        )
                    })
                    .collect(),
            ),
        };
        let columns = columns
            .into_iter()
            .map(|(label, rel)| StageColumn {
                label,
                template: dir.join(rel).to_string_lossy().into_owned(),
            })
            .collect();
        Self { kind, dir, columns, preprocess: kind.preprocess(), options }
    }

    pub fn labels(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.label.clone()).collect()
    }

    pub fn output_path(&self) -> PathBuf {
        self.dir.join(self.options.output_file_name())
    }
}

/// A continuous recording with its QRS event samples.
#[derive(Debug, Clone)]
pub struct Recording {
    /// `[C, T]`.
    pub data: Array2<f64>,
    pub sfreq: f64,
    pub ch_names: Vec<String>,
    /// QRS sample indices relative to the first column of `data`.
    pub events: Vec<usize>,
}

/// Supplies the recording of one (subject, condition, column) cell.
pub trait RecordingSource {
    fn load(&self, subject: u32, condition: Condition, column: &StageColumn) -> Result<Recording>;
}

/// Reads `.fif` files named by the column templates.
#[derive(Debug, Clone)]
pub struct FifSource {
    /// Annotation description of the QRS events.
    pub event_name: String,
}

impl FifSource {
    pub fn new(event_name: impl Into<String>) -> Self {
        Self { event_name: event_name.into() }
    }
}

impl RecordingSource for FifSource {
    fn load(&self, subject: u32, condition: Condition, column: &StageColumn) -> Result<Recording> {
        let path = column.path(subject, condition);
        let raw = open_raw(&path)?;
        let events = raw.events_from_annotations(&self.event_name);
        if events.is_empty() {
            bail!("no '{}' annotations in {}", self.event_name, path.display());
        }
        let data = raw
            .read_all_data()
            .with_context(|| format!("reading samples of {}", path.display()))?;
        Ok(Recording { data, sfreq: raw.info.sfreq, ch_names: raw.ch_names(), events })
    }
}

/// Compute the SNR of one cell.
pub fn process_recording(
    mut rec: Recording,
    condition: Condition,
    preprocess: Preprocess,
    cfg: &StudyConfig,
    options: RunOptions,
) -> Result<f64> {
    if preprocess == Preprocess::ReferenceAndFilter {
        if options.anterior_reference {
            rereference_to(&mut rec.data, &rec.ch_names, condition.anterior_reference());
        } else {
            add_reference_channel(&mut rec.data, &mut rec.ch_names, REFERENCE_CHANNEL);
        }
        bandpass_notch_inplace(
            &mut rec.data,
            rec.sfreq,
            cfg.esg_bp_freq,
            cfg.esg_bp_order,
            &cfg.notch_freq,
        )?;
    }
    let evoked = evoked_from_raw(
        &rec.data,
        rec.sfreq,
        &rec.ch_names,
        &rec.events,
        &cfg.epoch_window()?,
        &cfg.baseline_window()?,
    )?;
    let snr_cfg = SnrConfig {
        reduced_window: options.reduced_window || cfg.snr.reduced_window,
        ..cfg.snr.clone()
    };
    Ok(compute_snr(&evoked, condition, &cfg.baseline_window()?, &snr_cfg)?)
}

/// Compute every cell of `spec` for all configured subjects and conditions.
pub fn run_stage<S: RecordingSource + ?Sized>(
    spec: &StageSpec,
    source: &S,
    cfg: &StudyConfig,
) -> Result<SnrRecord> {
    cfg.validate()?;
    let mut record = SnrRecord::new(cfg.subjects.clone(), spec.labels());
    info!(
        "stage {}: {} subjects × {} columns{}{}",
        spec.kind,
        cfg.subjects.len(),
        spec.columns.len(),
        if spec.options.anterior_reference { ", anterior reference" } else { "" },
        if spec.options.reduced_window { ", reduced window" } else { "" },
    );

    for condition in Condition::ALL {
        for (row, &subject) in cfg.subjects.iter().enumerate() {
            for (col, column) in spec.columns.iter().enumerate() {
                let outcome = source
                    .load(subject, condition, column)
                    .and_then(|rec| {
                        if (rec.sfreq - cfg.sampling_rate as f64).abs() > 1e-6 {
                            debug!(
                                "{} {condition}: recorded at {} Hz, configured {} Hz",
                                subject_id(subject),
                                rec.sfreq,
                                cfg.sampling_rate
                            );
                        }
                        process_recording(rec, condition, spec.preprocess, cfg, spec.options)
                    });
                let matrix = record.get_mut(condition);
                match outcome {
                    Ok(snr) => {
                        debug!("{} {condition} {}: SNR {snr:.3}", subject_id(subject), column.label);
                        matrix.set(row, col, snr);
                    }
                    Err(e) => {
                        let status = match e.downcast_ref::<SnrError>() {
                            Some(SnrError::FlatBaseline { .. }) => CellStatus::UndefinedSnr,
                            _ => CellStatus::Failed,
                        };
                        warn!("{} {condition} {}: {e:#}", subject_id(subject), column.label);
                        matrix.mark(row, col, status);
                    }
                }
            }
        }
        let [ok, undefined, failed, _] = record.get(condition).status_counts();
        info!("stage {} {condition}: {ok} ok, {undefined} undefined, {failed} failed", spec.kind);
    }
    Ok(record)
}

/// [`run_stage`], then write the store to [`StageSpec::output_path`].
pub fn run_and_save<S: RecordingSource + ?Sized>(
    spec: &StageSpec,
    source: &S,
    cfg: &StudyConfig,
) -> Result<(SnrRecord, PathBuf)> {
    let record = run_stage(spec, source, cfg)?;
    let path = spec.output_path();
    record.save(&path)?;
    info!("wrote {}", path.display());
    Ok((record, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_names_parse() {
        for kind in StageKind::ALL {
            assert_eq!(kind.name().parse::<StageKind>().unwrap(), kind);
        }
        assert!("fastica".parse::<StageKind>().is_err());
    }

    #[test]
    fn output_names() {
        let o = |a, r| RunOptions { anterior_reference: a, reduced_window: r }.output_file_name();
        assert_eq!(o(false, false), "snr_heart.safetensors");
        assert_eq!(o(true, false), "snr_heart_ant.safetensors");
        assert_eq!(o(false, true), "snr_heart_smallwin.safetensors");
        assert_eq!(o(true, true), "snr_heart_ant_smallwin.safetensors");
    }

    #[test]
    fn ssp_has_one_column_per_projector() {
        let cfg = StudyConfig::default();
        let spec = StageSpec::new(StageKind::Ssp, &cfg, RunOptions::default());
        assert_eq!(spec.columns.len(), 16);
        assert_eq!(spec.columns[0].label, "SSP_5");
        assert_eq!(spec.columns[15].label, "SSP_20");
        let p = spec.columns[1].path(7, Condition::Tibial);
        assert_eq!(p, PathBuf::from("data/SSP/sub-007/6 projections/ssp_cleaned_tibial.fif"));
    }

    #[test]
    fn anterior_variants_of_file_names() {
        let cfg = StudyConfig::default();
        let opts = RunOptions { anterior_reference: true, reduced_window: false };
        let ica = StageSpec::new(StageKind::PostIca, &cfg, opts);
        assert_eq!(
            ica.columns[0].path(1, Condition::Median),
            PathBuf::from("data/ica_py/sub-001/esg/prepro/clean_ica_auto_antRef_median.fif")
        );
        // Unfiltered stages are re-referenced at load time, file name unchanged.
        let prep = StageSpec::new(StageKind::Prep, &cfg, opts);
        assert_eq!(
            prep.columns[0].path(1, Condition::Median),
            PathBuf::from("data/prepared_py/sub-001/esg/prepro/noStimart_sr1000_median_withqrs.fif")
        );
        assert_eq!(prep.output_path(), PathBuf::from("data/prepared_py/snr_heart_ant.safetensors"));
        assert_eq!(prep.preprocess, Preprocess::ReferenceAndFilter);
        assert_eq!(ica.preprocess, Preprocess::None);
    }
}

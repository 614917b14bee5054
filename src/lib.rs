//! # heart-snr: QRS-artefact SNR across ESG denoising stages
//!
//! Spinal electrophysiology (ESG) recordings carry a large cardiac artefact.
//! `heart-snr` measures how much of it survives each cleaning stage (PCA,
//! ICA, PCA followed by ICA, SSP with 5 to 20 projectors) and tests whether
//! the stages differ at group level.
//!
//! ## Pipeline overview
//!
//! ```text
//! cleaned_recording.fif  (one per subject × condition × stage column)
//!   │
//!   ├─ fiff::open_raw()          native FIFF reader, QRS events from annotations
//!   ├─ reference + filter        prep/pca stages only: TH6 or anterior
//!   │                            reference, 30–400 Hz Butterworth band-pass,
//!   │                            50 Hz FIR notch
//!   ├─ epoch::evoked_from_raw()  [-200, 200] ms around each R-peak,
//!   │                            baseline [-150, -50] ms, averaged
//!   ├─ snr::compute_snr()        max over QRS window / std over baseline
//!   └─ results::SnrRecord        subjects × columns per condition → safetensors
//!        │
//!        └─ compare              anchor-vs-later differences
//!             └─ stats           sign-flip permutation t-test, t-max correction
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use heart_snr::{run_stage, FifSource, RunOptions, StageKind, StageSpec, StudyConfig};
//!
//! let cfg = StudyConfig::default();
//! let spec = StageSpec::new(StageKind::Ica, &cfg, RunOptions::default());
//! let record = run_stage(&spec, &FifSource::new(&cfg.event_name), &cfg).unwrap();
//! record.save(&spec.output_path()).unwrap();
//! ```
//!
//! ## Single steps
//!
//! ```no_run
//! use heart_snr::{compute_snr, evoked_from_raw, Condition, SnrConfig, Window};
//! use heart_snr::fiff::open_raw;
//!
//! let raw = open_raw("sub-001/esg/prepro/clean_ica_auto_median.fif").unwrap();
//! let data = raw.read_all_data().unwrap();
//! let events = raw.events_from_annotations("qrs");
//!
//! let epoch = Window::from_ms([-200.0, 200.0]).unwrap();
//! let baseline = Window::from_ms([-150.0, -50.0]).unwrap();
//! let evoked = evoked_from_raw(&data, raw.info.sfreq, &raw.ch_names(), &events, &epoch, &baseline)
//!     .unwrap();
//! let snr = compute_snr(&evoked, Condition::Median, &baseline, &SnrConfig::default()).unwrap();
//! println!("SC6 heart SNR: {snr:.2}");
//! ```

pub mod baseline;
pub mod compare;
pub mod condition;
pub mod config;
pub mod epoch;
pub mod evoked;
pub mod fiff;
pub mod filter;
pub mod io;
pub mod reference;
pub mod results;
pub mod snr;
pub mod stage;
pub mod stats;

// ── Crate-root re-exports ─────────────────────────────────────────────────

// condition, config
pub use condition::{subject_id, Condition};
pub use config::{CompareConfig, PathConfig, StudyConfig};

// evoked waveforms
pub use baseline::baseline_correct_inplace;
pub use epoch::{epoch_events, evoked_from_raw};
pub use evoked::{Evoked, Window};

// SNR
pub use snr::{compute_snr, compute_snr_per_channel, ChannelSnr, QrsWindows, Reduction, SnrConfig, SnrError};

// preprocessing
pub use filter::{apply_fir_zero_phase, apply_iir_zero_phase, bandpass_notch_inplace, design_notch, Sos};
pub use reference::{
    add_reference_channel, average_reference_inplace, rereference_to, AppliedReference,
    REFERENCE_CHANNEL,
};

// stages and results
pub use results::{CellStatus, ResultMatrix, SnrRecord};
pub use stage::{
    process_recording, run_and_save, run_stage, FifSource, Preprocess, Recording,
    RecordingSource, RunOptions, StageColumn, StageKind, StageSpec,
};

// statistics
pub use compare::{
    comparison_columns, load_stage_tables, run_comparison, DifferenceTable, PValueEntry,
    PValueReport, StageTable,
};
pub use stats::{
    permutation_t_test, permutation_t_test_with, Correction, Describe, PermutationConfig,
    PermutationError, PermutationResult, Summary,
};

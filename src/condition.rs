//! Stimulation conditions and the attributes derived from them.
//!
//! The study records two conditions: median-nerve stimulation (cervical
//! spinal cord, nerve 1) and tibial-nerve stimulation (lumbar spinal cord,
//! nerve 2). SNR channels, reference electrodes and store keys are derived
//! here, so no other module matches on condition strings.
use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Stimulation condition of a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    Median,
    Tibial,
}

impl Condition {
    /// Both conditions in processing order.
    pub const ALL: [Condition; 2] = [Condition::Median, Condition::Tibial];

    /// Condition name as used in file names (`median`, `tibial`).
    pub fn name(self) -> &'static str {
        match self {
            Condition::Median => "median",
            Condition::Tibial => "tibial",
        }
    }

    /// Nerve number: 1 for median, 2 for tibial.
    pub fn nerve(self) -> u8 {
        match self {
            Condition::Median => 1,
            Condition::Tibial => 2,
        }
    }

    /// Inverse of [`Condition::nerve`].
    pub fn from_nerve(nerve: u8) -> Option<Self> {
        match nerve {
            1 => Some(Condition::Median),
            2 => Some(Condition::Tibial),
            _ => None,
        }
    }

    /// Spinal channel over the segment that receives the stimulated nerve.
    ///
    /// Cervical `SC6` for the median nerve, lumbar `L1` for the tibial nerve.
    pub fn snr_channel(self) -> &'static str {
        match self {
            Condition::Median => "SC6",
            Condition::Tibial => "L1",
        }
    }

    /// Anterior (ventral) reference electrode for this condition.
    pub fn anterior_reference(self) -> &'static str {
        match self {
            Condition::Median => "AC",
            Condition::Tibial => "AL",
        }
    }

    /// Key of this condition's matrix in a result store.
    pub fn store_key(self) -> &'static str {
        match self {
            Condition::Median => "snr_med",
            Condition::Tibial => "snr_tib",
        }
    }

    /// Key of this condition's status codes in a result store.
    pub fn status_key(self) -> &'static str {
        match self {
            Condition::Median => "status_med",
            Condition::Tibial => "status_tib",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Condition {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "median" | "med" | "1" => Ok(Condition::Median),
            "tibial" | "tib" | "2" => Ok(Condition::Tibial),
            other => bail!("unknown condition '{other}' (expected 'median' or 'tibial')"),
        }
    }
}

/// BIDS-style subject id: `sub-001`.
pub fn subject_id(subject: u32) -> String {
    format!("sub-{subject:03}")
}

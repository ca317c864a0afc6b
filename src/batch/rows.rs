//! Flat output rows, one struct per table.
//!
//! Missing values stay `None`; with the `serde` feature a CSV writer emits
//! them as empty cells.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::FailureReason;
use crate::state::TransitionPair;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BaselineEnergyRow {
    pub subject: String,
    pub from: usize,
    pub to: usize,
    pub from_state: String,
    pub to_state: String,
    pub energy: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PerturbedEnergyRow {
    pub subject: String,
    pub from: usize,
    pub to: usize,
    pub region: usize,
    pub energy: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RercRow {
    pub subject: String,
    pub from: usize,
    pub to: usize,
    pub region: usize,
    pub rerc: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SubjectRercRow {
    pub subject: String,
    pub region: usize,
    pub mean_rerc: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GroupRercRow {
    pub group: String,
    pub region: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub subjects: usize,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SubjectSummaryRow {
    pub subject: String,
    pub group: Option<String>,
    pub ave_te: Option<f64>,
    pub ave_pe: Option<f64>,
    pub stability: Option<f64>,
    pub items: usize,
    pub failures: usize,
    pub failure_ratio: f64,
    pub warning: Option<String>,
}

/// A missing value and why it is missing.
///
/// `region` is `None` for the baseline energy of the pair.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FailureRecord {
    pub subject: String,
    pub from: usize,
    pub to: usize,
    pub region: Option<usize>,
    pub reason: FailureReason,
    pub detail: String,
}

impl FailureRecord {
    pub fn pair(&self) -> TransitionPair {
        TransitionPair::new(self.from, self.to)
    }

    pub(crate) fn sort_key(&self) -> (usize, usize, Option<usize>) {
        (self.from, self.to, self.region)
    }
}

use nalgebra::DVector;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::StateError;

/// A labelled brain configuration: one value per region.
#[derive(Debug, Clone, PartialEq)]
pub struct BrainState {
    pub label: String,
    pub values: DVector<f64>,
}

impl BrainState {
    pub fn new(label: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            label: label.into(),
            values: DVector::from_vec(values),
        }
    }

    /// Check the state against the system size and optionally scale it to
    /// unit L2 norm.
    pub fn prepare(&self, regions: usize, normalize: bool) -> Result<DVector<f64>, StateError> {
        prepare_state(&self.values, regions, normalize)
    }
}

pub fn prepare_state(
    values: &DVector<f64>,
    regions: usize,
    normalize: bool,
) -> Result<DVector<f64>, StateError> {
    if values.len() != regions {
        return Err(StateError::DimensionMismatch {
            expected: regions,
            got: values.len(),
        });
    }
    if let Some(index) = values.iter().position(|v| !v.is_finite()) {
        return Err(StateError::NonFinite { index });
    }
    if !normalize {
        return Ok(values.clone());
    }
    let norm = values.norm();
    if norm == 0.0 {
        return Err(StateError::ZeroNorm);
    }
    Ok(values / norm)
}

/// Ordered (initial, target) pair of state indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TransitionPair {
    pub from: usize,
    pub to: usize,
}

impl TransitionPair {
    pub fn new(from: usize, to: usize) -> Self {
        Self { from, to }
    }

    /// x -> x: the cost of holding a state against the free dynamics.
    pub fn is_persistence(&self) -> bool {
        self.from == self.to
    }
}

/// All ordered pairs of distinct states, row-major by initial state.
/// Persistence pairs (i, i) are interleaved in place when requested.
pub fn transition_pairs(states: usize, include_persistence: bool) -> Vec<TransitionPair> {
    let mut pairs = Vec::with_capacity(states * states);
    for from in 0..states {
        for to in 0..states {
            if from != to || include_persistence {
                pairs.push(TransitionPair::new(from, to));
            }
        }
    }
    pairs
}

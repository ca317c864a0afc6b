#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::state::TransitionPair;

/// Regional energy regulation capacity: `(E_base - E_pert) / E_base`.
///
/// `None` when either energy is missing, or when the baseline is non-finite
/// or too small (`<= min_baseline`) to divide by. Positive values mean that
/// extra control weight on the region made the transition cheaper.
pub fn rerc(baseline: Option<f64>, perturbed: Option<f64>, min_baseline: f64) -> Option<f64> {
    let base = baseline?;
    let pert = perturbed?;
    if !base.is_finite() || !pert.is_finite() || base <= min_baseline {
        return None;
    }
    Some((base - pert) / base)
}

/// Mean of the present values, `None` if there are none.
pub fn mean(values: impl IntoIterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .flatten()
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Per-region mean rERC over a subject's transition pairs.
///
/// `by_pair[p][r]` is the rERC of region `r` for pair `p`.
pub fn subject_mean_rerc(by_pair: &[Vec<Option<f64>>], regions: usize) -> Vec<Option<f64>> {
    (0..regions)
        .map(|r| mean(by_pair.iter().map(|row| row.get(r).copied().flatten())))
        .collect()
}

/// Group-level dispersion of one region's subject means.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RegionSummary {
    pub region: usize,
    pub mean: Option<f64>,
    /// Sample standard deviation; needs at least two subjects.
    pub std: Option<f64>,
    pub subjects: usize,
}

/// Mean ± sample standard deviation per region across subjects. Subjects
/// without a value for a region are left out of that region's statistics.
pub fn group_summary(subject_means: &[Vec<Option<f64>>], regions: usize) -> Vec<RegionSummary> {
    (0..regions)
        .map(|region| {
            let values: Vec<f64> = subject_means
                .iter()
                .filter_map(|row| row.get(region).copied().flatten())
                .collect();
            let n = values.len();
            let mean = mean(values.iter().copied().map(Some));
            let std = match (mean, n) {
                (Some(m), n) if n >= 2 => {
                    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
                    Some((ss / (n - 1) as f64).sqrt())
                }
                _ => None,
            };
            RegionSummary {
                region,
                mean,
                std,
                subjects: n,
            }
        })
        .collect()
}

/// Subject-level energy landscape summary.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EnergySummary {
    /// Mean baseline energy over transitions between distinct states.
    pub ave_transition: Option<f64>,
    /// Mean baseline energy of holding a state (x -> x pairs).
    pub ave_persistence: Option<f64>,
    /// `1 / log10(ave_persistence)`.
    pub stability: Option<f64>,
}

pub fn energy_summary(baseline: &[(TransitionPair, Option<f64>)]) -> EnergySummary {
    let ave_transition = mean(
        baseline
            .iter()
            .filter(|(p, _)| !p.is_persistence())
            .map(|(_, e)| *e),
    );
    let ave_persistence = mean(
        baseline
            .iter()
            .filter(|(p, _)| p.is_persistence())
            .map(|(_, e)| *e),
    );
    let stability = ave_persistence.and_then(|pe| {
        let log = pe.log10();
        (pe > 0.0 && log != 0.0 && log.is_finite()).then(|| 1.0 / log)
    });
    EnergySummary {
        ave_transition,
        ave_persistence,
        stability,
    }
}

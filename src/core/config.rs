#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Parameters of one study run.
///
/// The first four fields are study design choices and have no defaults: every
/// subject of a run must be computed with the same values for the energies to
/// be comparable. The remaining fields are numerical tolerances and runtime
/// knobs with conservative defaults.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunConfig {
    /// Control horizon T.
    pub time_horizon: f64,
    /// Normalization constant c in `A / (c + lambda_max) - I`.
    pub normalization_c: f64,
    /// Weight added to one region's control input during the sweep.
    pub perturbation_delta: f64,
    /// Diagonal loading applied to an ill-conditioned Gramian before inversion.
    pub regularization_epsilon: f64,

    /// Condition number above which the Gramian is regularized.
    #[cfg_attr(feature = "serde", serde(default = "defaults::max_condition"))]
    pub max_condition: f64,
    /// Symmetry tolerance, relative to the largest absolute connectivity weight.
    #[cfg_attr(feature = "serde", serde(default = "defaults::symmetry_tolerance"))]
    pub symmetry_tolerance: f64,
    /// Negative Gramian eigenvalues are tolerated down to `-psd_tolerance * lambda_max`.
    #[cfg_attr(feature = "serde", serde(default = "defaults::psd_tolerance"))]
    pub psd_tolerance: f64,
    /// Largest relative component of the transfer error allowed in an
    /// uncontrollable direction.
    #[cfg_attr(feature = "serde", serde(default = "defaults::reach_tolerance"))]
    pub reach_tolerance: f64,
    /// Baseline energies at or below this are too small to divide by.
    #[cfg_attr(feature = "serde", serde(default = "defaults::min_baseline_energy"))]
    pub min_baseline_energy: f64,
    /// Wall-clock budget per work item. `None` disables the guard.
    #[cfg_attr(feature = "serde", serde(default))]
    pub item_timeout_ms: Option<u64>,
    /// Failure ratio above which a subject is flagged with a warning.
    #[cfg_attr(feature = "serde", serde(default = "defaults::failure_warn_ratio"))]
    pub failure_warn_ratio: f64,
    /// Scale every state to unit L2 norm before building transitions.
    #[cfg_attr(feature = "serde", serde(default = "defaults::enabled"))]
    pub normalize_states: bool,
    /// Also compute x -> x persistence energies.
    #[cfg_attr(feature = "serde", serde(default))]
    pub include_persistence: bool,
    /// Accept connectomes where a region has no connections.
    #[cfg_attr(feature = "serde", serde(default))]
    pub allow_isolated_regions: bool,
    /// Upper bound on worker threads (`parallel` feature only).
    #[cfg_attr(feature = "serde", serde(default))]
    pub max_threads: Option<usize>,
}

mod defaults {
    pub fn max_condition() -> f64 {
        1e12
    }

    pub fn symmetry_tolerance() -> f64 {
        1e-8
    }

    pub fn psd_tolerance() -> f64 {
        1e-9
    }

    pub fn reach_tolerance() -> f64 {
        1e-8
    }

    pub fn min_baseline_energy() -> f64 {
        1e-12
    }

    pub fn failure_warn_ratio() -> f64 {
        0.1
    }

    pub fn enabled() -> bool {
        true
    }
}

impl RunConfig {
    pub fn new(
        time_horizon: f64,
        normalization_c: f64,
        perturbation_delta: f64,
        regularization_epsilon: f64,
    ) -> Self {
        Self {
            time_horizon,
            normalization_c,
            perturbation_delta,
            regularization_epsilon,
            max_condition: defaults::max_condition(),
            symmetry_tolerance: defaults::symmetry_tolerance(),
            psd_tolerance: defaults::psd_tolerance(),
            reach_tolerance: defaults::reach_tolerance(),
            min_baseline_energy: defaults::min_baseline_energy(),
            item_timeout_ms: None,
            failure_warn_ratio: defaults::failure_warn_ratio(),
            normalize_states: defaults::enabled(),
            include_persistence: false,
            allow_isolated_regions: false,
            max_threads: None,
        }
    }

    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.item_timeout_ms = Some(ms);
        self
    }

    pub fn with_state_normalization(mut self, enabled: bool) -> Self {
        self.normalize_states = enabled;
        self
    }

    pub fn with_persistence(mut self, enabled: bool) -> Self {
        self.include_persistence = enabled;
        self
    }

    pub fn with_max_threads(mut self, threads: usize) -> Self {
        self.max_threads = Some(threads.max(1));
        self
    }

    pub fn with_perturbation_delta(mut self, delta: f64) -> Self {
        self.perturbation_delta = delta;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("time_horizon", self.time_horizon)?;
        non_negative("normalization_c", self.normalization_c)?;
        positive("perturbation_delta", self.perturbation_delta)?;
        non_negative("regularization_epsilon", self.regularization_epsilon)?;
        positive("max_condition", self.max_condition)?;
        non_negative("symmetry_tolerance", self.symmetry_tolerance)?;
        non_negative("psd_tolerance", self.psd_tolerance)?;
        non_negative("reach_tolerance", self.reach_tolerance)?;
        non_negative("min_baseline_energy", self.min_baseline_energy)?;
        if !(0.0..=1.0).contains(&self.failure_warn_ratio) {
            return Err(ConfigError::Invalid {
                field: "failure_warn_ratio",
                requirement: "within [0, 1]",
                value: self.failure_warn_ratio,
            });
        }
        Ok(())
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            requirement: "positive and finite",
            value,
        })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            requirement: "non-negative and finite",
            value,
        })
    }
}

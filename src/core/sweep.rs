use std::sync::Arc;

use hashbrown::HashMap;
use nalgebra::DVector;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::RunConfig;
use crate::energy::EnergySolver;
use crate::error::{SolveError, SolveResult};
use crate::exec::{map_tasks, CancelToken};
use crate::expm::Deadline;
use crate::gramian::{controllability_gramian, free_response, Gramian};
use crate::normalize::SystemMatrix;
use crate::system::{ControlSet, LinearSystem};

/// Which control set a Gramian was computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ControlConfig {
    Baseline,
    /// Baseline with `perturbation_delta` added to one region's weight.
    Perturbed { region: usize },
}

impl ControlConfig {
    /// Baseline first, then every region in order.
    pub fn sweep(regions: usize) -> Vec<ControlConfig> {
        core::iter::once(ControlConfig::Baseline)
            .chain((0..regions).map(|region| ControlConfig::Perturbed { region }))
            .collect()
    }

    pub fn region(&self) -> Option<usize> {
        match self {
            ControlConfig::Baseline => None,
            ControlConfig::Perturbed { region } => Some(*region),
        }
    }

    pub fn control_set(&self, baseline: &ControlSet, delta: f64) -> SolveResult<ControlSet> {
        match self {
            ControlConfig::Baseline => Ok(baseline.clone()),
            ControlConfig::Perturbed { region } => baseline.perturbed(*region, delta),
        }
    }
}

/// Composite cache key: one subject, one control configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GramianKey {
    pub subject: Arc<str>,
    pub config: ControlConfig,
}

/// Gramians of one subject, keyed explicitly by control configuration.
///
/// The Gramian depends on (A, B, T) but not on the transition pair, so every
/// pair of a subject reuses the same entries. The cache belongs to a single
/// subject's batch: entries for another subject are refused, and [`clear`]
/// (or dropping the cache) ends its lifetime.
///
/// [`clear`]: GramianCache::clear
#[derive(Debug)]
pub struct GramianCache {
    subject: Arc<str>,
    entries: HashMap<GramianKey, Arc<Gramian>>,
}

impl GramianCache {
    pub fn new(subject: impl Into<Arc<str>>) -> Self {
        Self {
            subject: subject.into(),
            entries: HashMap::new(),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn key(&self, config: ControlConfig) -> GramianKey {
        GramianKey {
            subject: Arc::clone(&self.subject),
            config,
        }
    }

    /// Store a Gramian. Returns `false` (and stores nothing) when the key
    /// belongs to another subject.
    pub fn insert(&mut self, key: GramianKey, gramian: Gramian) -> bool {
        if key.subject != self.subject {
            return false;
        }
        self.entries.insert(key, Arc::new(gramian));
        true
    }

    pub fn get(&self, key: &GramianKey) -> Option<Arc<Gramian>> {
        self.entries.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Solve the Gramian of every requested control configuration.
///
/// Each configuration is an independent task with its own deadline. Once
/// `cancel` fires, configurations that have not started are skipped and
/// reported as `None`.
pub fn solve_configs(
    a: &SystemMatrix,
    baseline: &ControlSet,
    configs: &[ControlConfig],
    cfg: &RunConfig,
    cancel: &CancelToken,
) -> Vec<(ControlConfig, Option<SolveResult<Gramian>>)> {
    map_tasks(configs.to_vec(), cfg.max_threads, |config| {
        if cancel.is_cancelled() {
            return (config, None);
        }
        let deadline = Deadline::from_millis(cfg.item_timeout_ms);
        let result = config
            .control_set(baseline, cfg.perturbation_delta)
            .and_then(|b| LinearSystem::new(a, b, cfg.time_horizon))
            .and_then(|system| controllability_gramian(&system, cfg, &deadline));
        (config, Some(result))
    })
}

/// Perturbed energies of one transition for every region, in region order.
///
/// The single-pair form of the sweep; batch runs go through the orchestrator,
/// which shares each Gramian across all pairs of a subject.
pub fn perturbed_energies(
    a: &SystemMatrix,
    baseline: &ControlSet,
    x0: &DVector<f64>,
    xf: &DVector<f64>,
    cfg: &RunConfig,
) -> Vec<SolveResult<f64>> {
    let configs: Vec<ControlConfig> = (0..a.dim())
        .map(|region| ControlConfig::Perturbed { region })
        .collect();
    let free = match free_response(
        a,
        cfg.time_horizon,
        &Deadline::from_millis(cfg.item_timeout_ms),
    ) {
        Ok(free) => free,
        Err(e) => return vec![Err(e); configs.len()],
    };
    solve_configs(a, baseline, &configs, cfg, &CancelToken::new())
        .into_iter()
        .map(|(_, result)| {
            let gramian = result.unwrap_or_else(|| {
                Err(SolveError::GramianIllConditioned("gramian task skipped".into()))
            })?;
            EnergySolver::new(&gramian, &free, cfg)?.energy(x0, xf)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::energy::minimum_energy;
    use nalgebra::DMatrix;

    fn fixture() -> SystemMatrix {
        SystemMatrix::from_normalized(DMatrix::from_row_slice(
            3,
            3,
            &[-1.0, 0.2, 0.0, 0.2, -1.0, 0.3, 0.0, 0.3, -1.0],
        ))
        .unwrap()
    }

    fn e(i: usize) -> DVector<f64> {
        let mut v = DVector::zeros(3);
        v[i] = 1.0;
        v
    }

    #[test]
    fn sweep_lists_baseline_then_regions() {
        let configs = ControlConfig::sweep(3);
        assert_eq!(configs.len(), 4);
        assert_eq!(configs[0], ControlConfig::Baseline);
        assert_eq!(configs[3].region(), Some(2));
    }

    #[test]
    fn every_perturbation_lowers_energy() {
        let a = fixture();
        let cfg = RunConfig::new(1.0, 1.0, 1.0, 1e-10);
        let base = {
            let sys = LinearSystem::new(&a, ControlSet::full(3), 1.0).unwrap();
            minimum_energy(&sys, &e(0), &e(1), &cfg).unwrap()
        };
        let perturbed = perturbed_energies(&a, &ControlSet::full(3), &e(0), &e(1), &cfg);
        assert_eq!(perturbed.len(), 3);
        for energy in perturbed {
            assert!(energy.unwrap() < base);
        }
    }

    #[test]
    fn cancelled_configs_are_skipped() {
        let a = fixture();
        let cfg = RunConfig::new(1.0, 1.0, 1.0, 1e-10);
        let cancel = CancelToken::new();
        cancel.cancel();
        let out = solve_configs(&a, &ControlSet::full(3), &ControlConfig::sweep(3), &cfg, &cancel);
        assert!(out.iter().all(|(_, r)| r.is_none()));
    }

    #[test]
    fn cache_is_scoped_to_one_subject() {
        let a = fixture();
        let cfg = RunConfig::new(1.0, 1.0, 1.0, 1e-10);
        let sys = LinearSystem::new(&a, ControlSet::full(3), 1.0).unwrap();
        let gramian = controllability_gramian(&sys, &cfg, &Deadline::none()).unwrap();

        let mut cache = GramianCache::new("sub-01");
        let key = cache.key(ControlConfig::Baseline);
        assert!(cache.insert(key.clone(), gramian.clone()));
        assert!(cache.get(&key).is_some());

        let foreign = GramianKey {
            subject: Arc::from("sub-02"),
            config: ControlConfig::Baseline,
        };
        assert!(!cache.insert(foreign.clone(), gramian));
        assert!(cache.get(&foreign).is_none());

        cache.clear();
        assert!(cache.is_empty());
    }
}

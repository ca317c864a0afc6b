//! Subject × pair × region orchestration.
//!
//! Subjects run one after another; inside a subject, the Gramian of every
//! control configuration and then every (pair, configuration) energy are
//! independent tasks. A failing item is recorded with its reason and the
//! rest of the grid keeps going.

mod archive;
mod rows;

pub use rows::{
    BaselineEnergyRow, FailureRecord, GroupRercRow, PerturbedEnergyRow, RercRow, SubjectRercRow,
    SubjectSummaryRow,
};

use std::collections::BTreeMap;

use hashbrown::{HashMap, HashSet};
use nalgebra::{DMatrix, DVector};
use tracing::{debug, error, info, warn};

use crate::capacity::{
    energy_summary, group_summary, rerc, subject_mean_rerc, EnergySummary, RegionSummary,
};
use crate::config::RunConfig;
use crate::energy::EnergySolver;
use crate::error::{BatchError, FailureReason, NormalizationError, SolveError};
use crate::exec::{map_tasks, CancelToken};
use crate::expm::Deadline;
use crate::gramian::free_response;
use crate::normalize::normalize;
use crate::state::{transition_pairs, BrainState, TransitionPair};
use crate::sweep::{solve_configs, ControlConfig, GramianCache};
use crate::system::ControlSet;

/// Group label used for subjects without one.
pub const DEFAULT_GROUP: &str = "all";

/// One subject's inputs.
#[derive(Debug, Clone)]
pub struct SubjectInput {
    pub id: String,
    pub group: Option<String>,
    /// Raw structural connectivity, N×N, or why it could not be loaded.
    pub connectivity: Result<DMatrix<f64>, NormalizationError>,
    pub states: Vec<BrainState>,
    /// Explicit transitions to compute. All ordered pairs when `None`.
    pub pairs: Option<Vec<TransitionPair>>,
}

impl SubjectInput {
    pub fn new(id: impl Into<String>, connectivity: DMatrix<f64>, states: Vec<BrainState>) -> Self {
        Self {
            id: id.into(),
            group: None,
            connectivity: Ok(connectivity),
            states,
            pairs: None,
        }
    }

    /// A subject whose connectivity could not be loaded. Every item is
    /// recorded as a normalization failure; the region count is taken from
    /// the states.
    pub fn unreadable(
        id: impl Into<String>,
        reason: impl Into<String>,
        states: Vec<BrainState>,
    ) -> Self {
        Self {
            id: id.into(),
            group: None,
            connectivity: Err(NormalizationError::Unreadable(reason.into())),
            states,
            pairs: None,
        }
    }

    pub fn regions(&self) -> usize {
        match &self.connectivity {
            Ok(m) => m.nrows(),
            Err(_) => self.states.first().map_or(0, |s| s.values.len()),
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_pairs(mut self, pairs: Vec<TransitionPair>) -> Self {
        self.pairs = Some(pairs);
        self
    }

    /// Sorted, de-duplicated transitions of this subject.
    pub fn transition_pairs(&self, include_persistence: bool) -> Vec<TransitionPair> {
        let mut pairs = match &self.pairs {
            Some(p) => p.clone(),
            None => transition_pairs(self.states.len(), include_persistence),
        };
        pairs.sort_unstable();
        pairs.dedup();
        pairs
    }
}

/// Everything computed for one subject.
///
/// `baseline[p]` is the energy of `pairs[p]`; `perturbed[p][r]` and
/// `rerc[p][r]` are indexed by pair then region.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectReport {
    pub subject: String,
    pub group: Option<String>,
    pub regions: usize,
    pub state_labels: Vec<String>,
    pub pairs: Vec<TransitionPair>,
    pub baseline: Vec<Option<f64>>,
    pub perturbed: Vec<Vec<Option<f64>>>,
    pub rerc: Vec<Vec<Option<f64>>>,
    pub mean_rerc: Vec<Option<f64>>,
    pub summary: EnergySummary,
    pub failures: Vec<FailureRecord>,
    pub warning: Option<String>,
}

impl SubjectReport {
    fn empty(
        subject: String,
        group: Option<String>,
        regions: usize,
        state_labels: Vec<String>,
        pairs: Vec<TransitionPair>,
    ) -> Self {
        let n_pairs = pairs.len();
        Self {
            subject,
            group,
            regions,
            state_labels,
            pairs,
            baseline: vec![None; n_pairs],
            perturbed: vec![vec![None; regions]; n_pairs],
            rerc: vec![vec![None; regions]; n_pairs],
            mean_rerc: vec![None; regions],
            summary: EnergySummary::default(),
            failures: Vec::new(),
            warning: None,
        }
    }

    /// Work items of the subject: one baseline and one per region, per pair.
    pub fn items(&self) -> usize {
        self.pairs.len() * (self.regions + 1)
    }

    pub fn failure_ratio(&self) -> f64 {
        match self.items() {
            0 => 0.0,
            n => self.failures.len() as f64 / n as f64,
        }
    }

    pub fn energy(&self, pair: TransitionPair, region: Option<usize>) -> Option<f64> {
        let p = self.pairs.binary_search(&pair).ok()?;
        match region {
            None => self.baseline[p],
            Some(r) => self.perturbed[p].get(r).copied().flatten(),
        }
    }

    pub fn state_label(&self, index: usize) -> String {
        self.state_labels
            .get(index)
            .cloned()
            .unwrap_or_else(|| index.to_string())
    }

    fn record(&mut self, p: usize, config: ControlConfig, outcome: Result<f64, ItemFailure>) {
        match outcome {
            Ok(energy) => match config.region() {
                None => self.baseline[p] = Some(energy),
                Some(r) => self.perturbed[p][r] = Some(energy),
            },
            Err(failure) => {
                let pair = self.pairs[p];
                warn!(
                    subject = %self.subject,
                    from = pair.from,
                    to = pair.to,
                    region = ?config.region(),
                    reason = %failure.reason,
                    "{}",
                    failure.detail
                );
                self.push_failure(p, config, failure);
            }
        }
    }

    /// Mark every item of the subject as failed. Logged once by the caller.
    fn fail_all(&mut self, configs: &[ControlConfig], failure: ItemFailure) {
        for p in 0..self.pairs.len() {
            for &config in configs {
                self.push_failure(p, config, failure.clone());
            }
        }
        debug!(subject = %self.subject, items = self.failures.len(), "all items failed");
    }

    fn push_failure(&mut self, p: usize, config: ControlConfig, failure: ItemFailure) {
        let pair = self.pairs[p];
        self.failures.push(FailureRecord {
            subject: self.subject.clone(),
            from: pair.from,
            to: pair.to,
            region: config.region(),
            reason: failure.reason,
            detail: failure.detail,
        });
    }

    /// Derive rERC, summaries and the failure warning from the raw energies.
    fn finish(&mut self, cfg: &RunConfig) {
        self.failures.sort_by_key(FailureRecord::sort_key);
        self.rerc = self
            .baseline
            .iter()
            .zip(&self.perturbed)
            .map(|(base, row)| {
                row.iter()
                    .map(|pert| rerc(*base, *pert, cfg.min_baseline_energy))
                    .collect()
            })
            .collect();
        self.mean_rerc = subject_mean_rerc(&self.rerc, self.regions);

        let by_pair: Vec<(TransitionPair, Option<f64>)> = self
            .pairs
            .iter()
            .copied()
            .zip(self.baseline.iter().copied())
            .collect();
        self.summary = energy_summary(&by_pair);

        let ratio = self.failure_ratio();
        self.warning = (ratio > cfg.failure_warn_ratio).then(|| {
            format!(
                "{} of {} items failed ({:.1}%)",
                self.failures.len(),
                self.items(),
                ratio * 100.0
            )
        });
    }

    pub fn baseline_rows(&self) -> Vec<BaselineEnergyRow> {
        self.pairs
            .iter()
            .zip(&self.baseline)
            .map(|(pair, energy)| BaselineEnergyRow {
                subject: self.subject.clone(),
                from: pair.from,
                to: pair.to,
                from_state: self.state_label(pair.from),
                to_state: self.state_label(pair.to),
                energy: *energy,
            })
            .collect()
    }

    pub fn perturbed_rows(&self) -> Vec<PerturbedEnergyRow> {
        let mut rows = Vec::with_capacity(self.pairs.len() * self.regions);
        for (pair, energies) in self.pairs.iter().zip(&self.perturbed) {
            for (region, energy) in energies.iter().enumerate() {
                rows.push(PerturbedEnergyRow {
                    subject: self.subject.clone(),
                    from: pair.from,
                    to: pair.to,
                    region,
                    energy: *energy,
                });
            }
        }
        rows
    }

    pub fn rerc_rows(&self) -> Vec<RercRow> {
        let mut rows = Vec::with_capacity(self.pairs.len() * self.regions);
        for (pair, values) in self.pairs.iter().zip(&self.rerc) {
            for (region, value) in values.iter().enumerate() {
                rows.push(RercRow {
                    subject: self.subject.clone(),
                    from: pair.from,
                    to: pair.to,
                    region,
                    rerc: *value,
                });
            }
        }
        rows
    }

    pub fn subject_rerc_rows(&self) -> Vec<SubjectRercRow> {
        self.mean_rerc
            .iter()
            .enumerate()
            .map(|(region, mean_rerc)| SubjectRercRow {
                subject: self.subject.clone(),
                region,
                mean_rerc: *mean_rerc,
            })
            .collect()
    }

    pub fn summary_row(&self) -> SubjectSummaryRow {
        SubjectSummaryRow {
            subject: self.subject.clone(),
            group: self.group.clone(),
            ave_te: self.summary.ave_transition,
            ave_pe: self.summary.ave_persistence,
            stability: self.summary.stability,
            items: self.items(),
            failures: self.failures.len(),
            failure_ratio: self.failure_ratio(),
            warning: self.warning.clone(),
        }
    }
}

/// Group-level rERC dispersion for one group label.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSummary {
    pub group: String,
    pub regions: Vec<RegionSummary>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    /// Sorted by subject id.
    pub subjects: Vec<SubjectReport>,
    /// Sorted by group label.
    pub groups: Vec<GroupSummary>,
    /// The cancel token fired during the run.
    pub cancelled: bool,
}

impl BatchReport {
    pub fn new(mut subjects: Vec<SubjectReport>, cancelled: bool) -> Self {
        subjects.sort_by(|a, b| a.subject.cmp(&b.subject));

        let mut by_group: BTreeMap<String, Vec<&SubjectReport>> = BTreeMap::new();
        for s in &subjects {
            let label = s.group.clone().unwrap_or_else(|| DEFAULT_GROUP.to_string());
            by_group.entry(label).or_default().push(s);
        }
        let groups = by_group
            .into_iter()
            .map(|(group, members)| {
                let regions = members.iter().map(|s| s.regions).max().unwrap_or(0);
                let means: Vec<Vec<Option<f64>>> =
                    members.iter().map(|s| s.mean_rerc.clone()).collect();
                GroupSummary {
                    group,
                    regions: group_summary(&means, regions),
                }
            })
            .collect();

        Self {
            subjects,
            groups,
            cancelled,
        }
    }

    pub fn subject(&self, id: &str) -> Option<&SubjectReport> {
        self.subjects.iter().find(|s| s.subject == id)
    }

    pub fn items(&self) -> usize {
        self.subjects.iter().map(SubjectReport::items).sum()
    }

    /// All failure records, sorted by (subject, pair, region).
    pub fn failures(&self) -> Vec<FailureRecord> {
        self.subjects
            .iter()
            .flat_map(|s| s.failures.iter().cloned())
            .collect()
    }

    pub fn baseline_rows(&self) -> Vec<BaselineEnergyRow> {
        self.subjects.iter().flat_map(|s| s.baseline_rows()).collect()
    }

    pub fn perturbed_rows(&self) -> Vec<PerturbedEnergyRow> {
        self.subjects.iter().flat_map(|s| s.perturbed_rows()).collect()
    }

    pub fn rerc_rows(&self) -> Vec<RercRow> {
        self.subjects.iter().flat_map(|s| s.rerc_rows()).collect()
    }

    pub fn subject_rerc_rows(&self) -> Vec<SubjectRercRow> {
        self.subjects
            .iter()
            .flat_map(|s| s.subject_rerc_rows())
            .collect()
    }

    pub fn summary_rows(&self) -> Vec<SubjectSummaryRow> {
        self.subjects.iter().map(SubjectReport::summary_row).collect()
    }

    pub fn group_rows(&self) -> Vec<GroupRercRow> {
        self.groups
            .iter()
            .flat_map(|g| {
                g.regions.iter().map(move |r| GroupRercRow {
                    group: g.group.clone(),
                    region: r.region,
                    mean: r.mean,
                    std: r.std,
                    subjects: r.subjects,
                })
            })
            .collect()
    }
}

/// Why one item has no value.
#[derive(Debug, Clone)]
struct ItemFailure {
    reason: FailureReason,
    detail: String,
}

impl ItemFailure {
    fn new(reason: FailureReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }

    fn cancelled() -> Self {
        Self::new(FailureReason::Cancelled, "batch cancelled before dispatch")
    }
}

impl From<SolveError> for ItemFailure {
    fn from(err: SolveError) -> Self {
        Self::new(FailureReason::from(&err), err.to_string())
    }
}

/// Read-only inputs shared by the energy tasks of one subject.
struct EnergyContext<'a> {
    cache: &'a GramianCache,
    free_response: &'a Result<DMatrix<f64>, ItemFailure>,
    config_failures: &'a HashMap<ControlConfig, ItemFailure>,
    states: &'a [Result<DVector<f64>, String>],
    cfg: &'a RunConfig,
    cancel: &'a CancelToken,
}

impl EnergyContext<'_> {
    fn state(&self, index: usize) -> Result<&DVector<f64>, ItemFailure> {
        match self.states.get(index) {
            Some(Ok(x)) => Ok(x),
            Some(Err(detail)) => Err(ItemFailure::new(FailureReason::InvalidState, detail.clone())),
            None => Err(ItemFailure::new(
                FailureReason::InvalidState,
                format!("state index {index} out of range ({} states)", self.states.len()),
            )),
        }
    }

    fn energy(&self, pair: TransitionPair, config: ControlConfig) -> Result<f64, ItemFailure> {
        if self.cancel.is_cancelled() {
            return Err(ItemFailure::cancelled());
        }
        let x0 = self.state(pair.from)?;
        let xf = self.state(pair.to)?;
        if let Some(failure) = self.config_failures.get(&config) {
            return Err(failure.clone());
        }

        let deadline = Deadline::from_millis(self.cfg.item_timeout_ms);
        let gramian = self.cache.get(&self.cache.key(config)).ok_or_else(|| {
            ItemFailure::new(FailureReason::GramianIllConditioned, "no gramian for configuration")
        })?;
        let free_response = self.free_response.as_ref().map_err(Clone::clone)?;
        let solver = EnergySolver::new(&gramian, free_response, self.cfg)?;
        deadline.check()?;
        Ok(solver.energy(x0, xf)?)
    }
}

fn config_name(config: ControlConfig) -> String {
    match config {
        ControlConfig::Baseline => "baseline".to_string(),
        ControlConfig::Perturbed { region } => format!("region {region}"),
    }
}

/// Run every pair and every region of one subject.
pub fn run_subject(input: &SubjectInput, cfg: &RunConfig, cancel: &CancelToken) -> SubjectReport {
    let regions = input.regions();
    let labels = input.states.iter().map(|s| s.label.clone()).collect();
    let mut report = SubjectReport::empty(
        input.id.clone(),
        input.group.clone(),
        regions,
        labels,
        input.transition_pairs(cfg.include_persistence),
    );
    let configs = ControlConfig::sweep(regions);

    if cancel.is_cancelled() {
        report.fail_all(&configs, ItemFailure::cancelled());
        report.finish(cfg);
        return report;
    }

    let a = match input
        .connectivity
        .as_ref()
        .map_err(Clone::clone)
        .and_then(|m| normalize(m, cfg))
    {
        Ok(a) => a,
        Err(e) => {
            error!(subject = %input.id, error = %e, "connectivity rejected");
            report.fail_all(
                &configs,
                ItemFailure::new(FailureReason::NormalizationError, e.to_string()),
            );
            report.finish(cfg);
            return report;
        }
    };

    let states: Vec<Result<DVector<f64>, String>> = input
        .states
        .iter()
        .map(|s| {
            s.prepare(regions, cfg.normalize_states)
                .map_err(|e| format!("state {}: {e}", s.label))
        })
        .collect();

    // exp(A·T) is shared by every configuration of the subject.
    let free = free_response(
        &a,
        cfg.time_horizon,
        &Deadline::from_millis(cfg.item_timeout_ms),
    )
    .map_err(|e| {
        let reason = FailureReason::from(&e);
        ItemFailure::new(reason, format!("free response: {e}"))
    });

    let mut cache = GramianCache::new(input.id.as_str());
    let mut config_failures = HashMap::new();
    for (config, outcome) in solve_configs(&a, &ControlSet::full(regions), &configs, cfg, cancel) {
        match outcome {
            Some(Ok(gramian)) => {
                let key = cache.key(config);
                cache.insert(key, gramian);
            }
            Some(Err(e)) => {
                let detail = format!("{} gramian: {e}", config_name(config));
                config_failures.insert(config, ItemFailure::new(FailureReason::from(&e), detail));
            }
            None => {
                config_failures.insert(config, ItemFailure::cancelled());
            }
        }
    }
    debug!(
        subject = %input.id,
        gramians = cache.len(),
        failed = config_failures.len(),
        "gramians solved"
    );

    let tasks: Vec<(usize, ControlConfig)> = (0..report.pairs.len())
        .flat_map(|p| configs.iter().map(move |&config| (p, config)))
        .collect();
    let ctx = EnergyContext {
        cache: &cache,
        free_response: &free,
        config_failures: &config_failures,
        states: &states,
        cfg,
        cancel,
    };
    let pairs = &report.pairs;
    let outcomes = map_tasks(tasks, cfg.max_threads, |(p, config)| {
        (p, config, ctx.energy(pairs[p], config))
    });
    cache.clear();

    for (p, config, outcome) in outcomes {
        report.record(p, config, outcome);
    }
    report.finish(cfg);
    report
}

/// Run the whole study.
///
/// Fails only on an invalid configuration or duplicate subject ids; every
/// per-item problem ends up in the subject's failure records instead.
pub fn run_batch(
    subjects: &[SubjectInput],
    cfg: &RunConfig,
    cancel: &CancelToken,
) -> Result<BatchReport, BatchError> {
    cfg.validate()?;
    let mut seen = HashSet::new();
    for s in subjects {
        if !seen.insert(s.id.as_str()) {
            return Err(BatchError::DuplicateSubject(s.id.clone()));
        }
    }

    let mut order: Vec<&SubjectInput> = subjects.iter().collect();
    order.sort_by(|a, b| a.id.cmp(&b.id));
    info!(subjects = order.len(), "batch started");

    let mut reports = Vec::with_capacity(order.len());
    for input in order {
        let report = run_subject(input, cfg, cancel);
        match &report.warning {
            Some(w) => warn!(subject = %report.subject, "{w}"),
            None => info!(
                subject = %report.subject,
                items = report.items(),
                failures = report.failures.len(),
                "subject finished"
            ),
        }
        reports.push(report);
    }

    let report = BatchReport::new(reports, cancel.is_cancelled());
    info!(
        items = report.items(),
        failures = report.failures().len(),
        cancelled = report.cancelled,
        "batch finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prng::Prng;

    fn chain(n: usize) -> DMatrix<f64> {
        let mut m = DMatrix::zeros(n, n);
        for i in 0..n - 1 {
            m[(i, i + 1)] = 1.0;
            m[(i + 1, i)] = 1.0;
        }
        m
    }

    fn states(n: usize, seed: u64) -> Vec<BrainState> {
        let mut rng = Prng::new(seed);
        ["Vis", "SomMot", "DorsAttn"]
            .iter()
            .map(|label| BrainState::new(*label, rng.state(n).iter().copied().collect()))
            .collect()
    }

    fn cfg() -> RunConfig {
        RunConfig::new(1.0, 1.0, 1.0, 1e-10)
    }

    #[test]
    fn subject_report_is_complete() {
        let input = SubjectInput::new("sub-01", chain(4), states(4, 7));
        let report = run_subject(&input, &cfg(), &CancelToken::new());
        assert_eq!(report.pairs.len(), 6);
        assert!(report.failures.is_empty());
        assert!(report.baseline.iter().all(|e| e.unwrap() > 0.0));
        for (base, row) in report.baseline.iter().zip(&report.perturbed) {
            for pert in row {
                assert!(pert.unwrap() < base.unwrap());
            }
        }
        assert!(report.mean_rerc.iter().all(|m| m.unwrap() > 0.0));
        assert!(report.summary.ave_transition.is_some());
        assert_eq!(report.summary.ave_persistence, None);
        assert_eq!(report.warning, None);
    }

    #[test]
    fn bad_connectivity_fails_every_item() {
        let input = SubjectInput::new("sub-02", DMatrix::zeros(4, 4), states(4, 3));
        let report = run_subject(&input, &cfg(), &CancelToken::new());
        assert_eq!(report.failures.len(), report.items());
        assert!(report
            .failures
            .iter()
            .all(|f| f.reason == FailureReason::NormalizationError));
        assert!(report.baseline.iter().all(Option::is_none));
        assert!(report.warning.is_some());
    }

    #[test]
    fn unreadable_connectivity_fails_every_item() {
        let input = SubjectInput::unreadable("sub-05", "row 2 has 3 columns", states(4, 3));
        let report = run_subject(&input, &cfg(), &CancelToken::new());
        assert_eq!(report.regions, 4);
        assert_eq!(report.failures.len(), report.items());
        assert!(report.failures.iter().all(|f| {
            f.reason == FailureReason::NormalizationError && f.detail.contains("row 2")
        }));
    }

    #[test]
    fn invalid_state_only_fails_its_pairs() {
        let mut st = states(4, 11);
        st[2] = BrainState::new("DorsAttn", vec![0.0; 4]);
        let input = SubjectInput::new("sub-03", chain(4), st)
            .with_pairs(vec![TransitionPair::new(0, 1), TransitionPair::new(1, 2)]);
        let report = run_subject(&input, &cfg(), &CancelToken::new());

        assert!(report.energy(TransitionPair::new(0, 1), None).is_some());
        assert!(report.energy(TransitionPair::new(1, 2), None).is_none());
        assert_eq!(report.failures.len(), 5);
        assert!(report
            .failures
            .iter()
            .all(|f| f.reason == FailureReason::InvalidState && f.pair() == TransitionPair::new(1, 2)));
    }

    #[test]
    fn expired_budget_fails_every_item_with_timeout() {
        let input = SubjectInput::new("sub-04", chain(4), states(4, 9));
        let report = run_subject(&input, &cfg().with_timeout_ms(0), &CancelToken::new());
        assert_eq!(report.failures.len(), report.items());
        assert!(report
            .failures
            .iter()
            .all(|f| f.reason == FailureReason::TimeoutExceeded));
        assert!(report.mean_rerc.iter().all(Option::is_none));
        assert!(report.warning.is_some());
    }

    #[test]
    fn cancelled_batch_records_cancelled_items() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let subjects = vec![SubjectInput::new("sub-01", chain(3), states(3, 5))];
        let report = run_batch(&subjects, &cfg(), &cancel).unwrap();
        assert!(report.cancelled);
        assert_eq!(report.failures().len(), report.items());
        assert!(report
            .failures()
            .iter()
            .all(|f| f.reason == FailureReason::Cancelled));
    }

    #[test]
    fn duplicate_subjects_are_rejected() {
        let subjects = vec![
            SubjectInput::new("sub-01", chain(3), states(3, 5)),
            SubjectInput::new("sub-01", chain(3), states(3, 6)),
        ];
        assert!(matches!(
            run_batch(&subjects, &cfg(), &CancelToken::new()),
            Err(BatchError::DuplicateSubject(id)) if id == "sub-01"
        ));
    }

    #[test]
    fn rows_are_sorted_by_subject_pair_region() {
        let subjects = vec![
            SubjectInput::new("sub-02", chain(3), states(3, 1)).with_group("patients"),
            SubjectInput::new("sub-01", chain(3), states(3, 2)).with_group("controls"),
        ];
        let report = run_batch(&subjects, &cfg(), &CancelToken::new()).unwrap();
        let rows = report.perturbed_rows();
        assert_eq!(rows.len(), 2 * 6 * 3);
        let keys: Vec<_> = rows
            .iter()
            .map(|r| (r.subject.clone(), r.from, r.to, r.region))
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);

        let groups: Vec<_> = report.groups.iter().map(|g| g.group.as_str()).collect();
        assert_eq!(groups, ["controls", "patients"]);
        assert_eq!(report.group_rows().len(), 6);
    }
}

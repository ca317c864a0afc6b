//! Study configuration and subject manifest.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use nalgebra::DMatrix;
use nctrl::batch::SubjectInput;
use nctrl::config::RunConfig;
use nctrl::state::{BrainState, TransitionPair};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{RunError, RunResult};
use crate::paths::resolve;
use crate::tables::{self, StatesBySubject};

/// Yeo 7-network labels, the study's default state order.
pub const YEO_7: [&str; 7] = [
    "Vis",
    "SomMot",
    "DorsAttn",
    "VentAttn",
    "Limbic",
    "Frontoparietal",
    "Default",
];

fn default_state_labels() -> Vec<String> {
    YEO_7.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyConfig {
    pub run: RunConfig,
    /// Long-format states table: `subject,state,value`.
    pub states_csv: PathBuf,
    /// State order used for pair indices. Labels a subject lacks are
    /// skipped for that subject.
    #[serde(default = "default_state_labels")]
    pub state_labels: Vec<String>,
    /// Keep only the first `n_regions` regions of every input.
    #[serde(default)]
    pub n_regions: Option<usize>,
    /// Restrict the transitions to compute, as (from, to) state indices.
    #[serde(default)]
    pub pairs: Option<Vec<(usize, usize)>>,
}

impl StudyConfig {
    pub fn load(path: &Path) -> RunResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| RunError::io(path, e))?;
        let mut study: StudyConfig =
            serde_json::from_str(&text).map_err(|e| RunError::json(path, e))?;
        study.states_csv = resolve(path, &study.states_csv);
        study.run.validate()?;
        if study.state_labels.is_empty() {
            return Err(RunError::input(path, "state_labels is empty"));
        }
        Ok(study)
    }

    fn transition_pairs(&self) -> Option<Vec<TransitionPair>> {
        self.pairs.as_ref().map(|pairs| {
            pairs
                .iter()
                .map(|&(from, to)| TransitionPair::new(from, to))
                .collect()
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectEntry {
    pub id: String,
    #[serde(default)]
    pub group: Option<String>,
    /// Header-less N×N connectivity CSV.
    pub connectivity: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub subjects: Vec<SubjectEntry>,
}

impl Manifest {
    pub fn load(path: &Path) -> RunResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| RunError::io(path, e))?;
        let mut manifest: Manifest =
            serde_json::from_str(&text).map_err(|e| RunError::json(path, e))?;
        for s in &mut manifest.subjects {
            s.connectivity = resolve(path, &s.connectivity);
        }
        Ok(manifest)
    }
}

/// Read every subject's connectivity and states into batch inputs.
///
/// Only the states table is required to be readable. A subject whose
/// connectivity cannot be loaded, or that has no states, still becomes an
/// input so that its items are recorded as failures.
pub fn load_subjects(study: &StudyConfig, manifest: &Manifest) -> RunResult<Vec<SubjectInput>> {
    let states_file = fs::File::open(&study.states_csv)
        .map_err(|e| RunError::io(&study.states_csv, e))?;
    let states = tables::read_states(states_file, &study.states_csv)?;

    let inputs = build_subjects(study, manifest, states, |entry| {
        let file = fs::File::open(&entry.connectivity)
            .map_err(|e| RunError::io(&entry.connectivity, e))?;
        tables::read_connectivity(file, &entry.connectivity)
    });
    info!(subjects = inputs.len(), "inputs loaded");
    Ok(inputs)
}

/// Assemble batch inputs from parsed states and a connectivity loader.
pub fn build_subjects<F>(
    study: &StudyConfig,
    manifest: &Manifest,
    mut states: StatesBySubject,
    mut read_connectivity: F,
) -> Vec<SubjectInput>
where
    F: FnMut(&SubjectEntry) -> RunResult<DMatrix<f64>>,
{
    manifest
        .subjects
        .iter()
        .map(|entry| {
            let by_label = states.remove(&entry.id);
            let loaded = subject_states(study, &entry.id, by_label);
            let connectivity = read_connectivity(entry).and_then(|m| truncate(study, entry, m));

            let mut input = match connectivity {
                Ok(m) => SubjectInput::new(entry.id.clone(), m, loaded.states),
                Err(e) => {
                    warn!(subject = %entry.id, error = %e, "connectivity not loaded");
                    SubjectInput::unreadable(entry.id.clone(), e.to_string(), loaded.states)
                }
            };
            input.group = entry.group.clone();
            input.pairs = loaded.pairs;
            input
        })
        .collect()
}

struct SubjectStates {
    states: Vec<BrainState>,
    pairs: Option<Vec<TransitionPair>>,
}

/// States of one subject in study label order, keeping only the labels the
/// subject has. A subject without any of them gets every label with no
/// values, which fails each of its items as an invalid state.
fn subject_states(
    study: &StudyConfig,
    subject: &str,
    by_label: Option<BTreeMap<String, Vec<f64>>>,
) -> SubjectStates {
    let mut by_label = by_label.unwrap_or_default();
    let mut states = Vec::with_capacity(study.state_labels.len());
    // Study label index -> index among this subject's states.
    let mut index = vec![None; study.state_labels.len()];
    for (i, label) in study.state_labels.iter().enumerate() {
        if let Some(mut values) = by_label.remove(label) {
            if let Some(n) = study.n_regions {
                values.truncate(n);
            }
            index[i] = Some(states.len());
            states.push(BrainState::new(label.clone(), values));
        }
    }

    if states.is_empty() {
        warn!(subject = %subject, "no states found");
        return SubjectStates {
            states: study
                .state_labels
                .iter()
                .map(|label| BrainState::new(label.clone(), Vec::new()))
                .collect(),
            pairs: study.transition_pairs(),
        };
    }
    if states.len() < study.state_labels.len() {
        let missing: Vec<&str> = study
            .state_labels
            .iter()
            .zip(&index)
            .filter(|(_, i)| i.is_none())
            .map(|(label, _)| label.as_str())
            .collect();
        debug!(subject = %subject, ?missing, "states skipped");
    }

    let pairs = study.pairs.as_ref().map(|pairs| {
        pairs
            .iter()
            .filter_map(|&(from, to)| {
                let from = index.get(from).copied().flatten()?;
                let to = index.get(to).copied().flatten()?;
                Some(TransitionPair::new(from, to))
            })
            .collect()
    });
    SubjectStates { states, pairs }
}

fn truncate(study: &StudyConfig, entry: &SubjectEntry, m: DMatrix<f64>) -> RunResult<DMatrix<f64>> {
    let Some(n) = study.n_regions else {
        return Ok(m);
    };
    if n > m.nrows() || n > m.ncols() {
        return Err(RunError::input(
            &entry.connectivity,
            format!("n_regions {n} exceeds the {}x{} matrix", m.nrows(), m.ncols()),
        ));
    }
    Ok(m.view((0, 0), (n, n)).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nctrl::batch::run_batch;
    use nctrl::error::FailureReason;
    use nctrl::exec::CancelToken;

    const SYMMETRIC: &str = "0,1,0.5\n1,0,1\n0.5,1,0\n";
    const WIDE: &str = "0,1,2\n1,0,2\n";
    const RAGGED: &str = "0,1\n1,0,2\n";

    fn study(labels: &[&str]) -> StudyConfig {
        StudyConfig {
            run: RunConfig::new(1.0, 1.0, 1.0, 1e-10),
            states_csv: PathBuf::from("states.csv"),
            state_labels: labels.iter().map(|l| l.to_string()).collect(),
            n_regions: None,
            pairs: None,
        }
    }

    fn entry(id: &str) -> SubjectEntry {
        SubjectEntry {
            id: id.to_string(),
            group: None,
            connectivity: PathBuf::from(format!("{id}.csv")),
        }
    }

    fn states_csv(subjects: &[&str]) -> String {
        let mut csv = String::from("subject,state,value\n");
        for id in subjects {
            for (label, values) in [("Vis", [1.0, 0.0, 0.0]), ("Default", [0.0, 1.0, 0.0])] {
                for v in values {
                    csv.push_str(&format!("{id},{label},{v}\n"));
                }
            }
        }
        csv
    }

    #[test]
    fn malformed_subjects_are_recorded_not_fatal() {
        let study = study(&["Vis", "Default"]);
        let manifest = Manifest {
            subjects: vec![entry("good"), entry("wide"), entry("ragged"), entry("stateless")],
        };
        let csv = states_csv(&["good", "wide", "ragged"]);
        let states = tables::read_states(csv.as_bytes(), Path::new("states.csv")).unwrap();

        let inputs = build_subjects(&study, &manifest, states, |e| {
            let text = match e.id.as_str() {
                "wide" => WIDE,
                "ragged" => RAGGED,
                _ => SYMMETRIC,
            };
            tables::read_connectivity(text.as_bytes(), &e.connectivity)
        });
        assert_eq!(inputs.len(), 4);

        let report = run_batch(&inputs, &study.run, &CancelToken::new()).unwrap();
        assert_eq!(report.subjects.len(), 4);

        let good = report.subject("good").unwrap();
        assert!(good.failures.is_empty());
        assert!(good.baseline.iter().all(Option::is_some));
        assert_eq!(good.items(), 2 * 4);

        for id in ["wide", "ragged"] {
            let s = report.subject(id).unwrap();
            assert!(s.items() > 0);
            assert_eq!(s.failures.len(), s.items());
            assert!(s
                .failures
                .iter()
                .all(|f| f.reason == FailureReason::NormalizationError));
        }
        assert_eq!(report.subject("ragged").unwrap().regions, 3);

        let stateless = report.subject("stateless").unwrap();
        assert_eq!(stateless.pairs.len(), 2);
        assert_eq!(stateless.failures.len(), stateless.items());
        assert!(stateless
            .failures
            .iter()
            .all(|f| f.reason == FailureReason::InvalidState));
    }

    #[test]
    fn absent_labels_are_skipped_per_subject() {
        let mut study = study(&YEO_7);
        study.pairs = Some(vec![(0, 4), (0, 6), (6, 1)]);
        let by_label: BTreeMap<String, Vec<f64>> = YEO_7
            .iter()
            .filter(|l| **l != "Limbic")
            .map(|l| (l.to_string(), vec![1.0, 0.0]))
            .collect();

        let s = subject_states(&study, "sub-01", Some(by_label));
        let labels: Vec<&str> = s.states.iter().map(|st| st.label.as_str()).collect();
        assert_eq!(
            labels,
            ["Vis", "SomMot", "DorsAttn", "VentAttn", "Frontoparietal", "Default"]
        );
        // Pairs touching Limbic are dropped; the rest follow the shifted indices.
        assert_eq!(
            s.pairs.unwrap(),
            vec![TransitionPair::new(0, 5), TransitionPair::new(5, 1)]
        );
    }

    #[test]
    fn study_config_defaults() {
        let json = r#"{
            "run": {
                "time_horizon": 1.0,
                "normalization_c": 1.0,
                "perturbation_delta": 1.0,
                "regularization_epsilon": 1e-10
            },
            "states_csv": "states.csv"
        }"#;
        let study: StudyConfig = serde_json::from_str(json).unwrap();
        assert_eq!(study.state_labels, YEO_7);
        assert_eq!(study.n_regions, None);
        assert!(study.transition_pairs().is_none());
    }

    #[test]
    fn explicit_pairs_are_parsed() {
        let json = r#"{
            "run": {
                "time_horizon": 1.0,
                "normalization_c": 1.0,
                "perturbation_delta": 1.0,
                "regularization_epsilon": 0.0
            },
            "states_csv": "states.csv",
            "state_labels": ["A", "B"],
            "pairs": [[0, 1], [1, 0]]
        }"#;
        let study: StudyConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            study.transition_pairs().unwrap(),
            vec![TransitionPair::new(0, 1), TransitionPair::new(1, 0)]
        );
    }

    #[test]
    fn manifest_parses_optional_group() {
        let json = r#"{"subjects": [
            {"id": "sub-01", "group": "controls", "connectivity": "sc/sub-01.csv"},
            {"id": "sub-02", "connectivity": "sc/sub-02.csv"}
        ]}"#;
        let manifest: Manifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.subjects[0].group.as_deref(), Some("controls"));
        assert_eq!(manifest.subjects[1].group, None);
    }
}

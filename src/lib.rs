//! # nctrl
//!
//! Control-energy engine for structural connectomes under linear network
//! control theory.
//!
//! Given a structural connectivity matrix, a set of brain states and a
//! control-input configuration, the crate computes the minimum energy needed
//! to drive ẋ = Ax + Bu from one state to another over a fixed horizon, and
//! the regional energy regulation capacity (rERC) obtained by adding control
//! weight to one region at a time.
//!
//! ## Quick Start
//!
//! ```
//! use nalgebra::{DMatrix, DVector};
//! use nctrl::prelude::*;
//!
//! let raw = DMatrix::from_row_slice(3, 3, &[
//!     0.0, 0.4, 0.1,
//!     0.4, 0.0, 0.6,
//!     0.1, 0.6, 0.0,
//! ]);
//! let cfg = RunConfig::new(1.0, 1.0, 1.0, 1e-10);
//! let a = normalize(&raw, &cfg).unwrap();
//! let system = LinearSystem::new(&a, ControlSet::full(3), cfg.time_horizon).unwrap();
//!
//! let x0 = DVector::from_vec(vec![1.0, 0.0, 0.0]);
//! let xf = DVector::from_vec(vec![0.0, 1.0, 0.0]);
//! let energy = minimum_energy(&system, &x0, &xf, &cfg).unwrap();
//! assert!(energy.is_finite() && energy > 0.0);
//! ```
//!
//! ## Feature Flags
//!
//! - `serde` (default): Serialization of configuration and result rows
//! - `parallel`: Multi-threaded Gramian and energy tasks via rayon
//!
//! ## Modules
//!
//! - [`normalize`]: Connectivity validation and stabilizing normalization
//! - [`system`]: Control sets and the linear system model
//! - [`expm`]: Matrix exponential under a wall-clock deadline
//! - [`gramian`]: Finite-horizon controllability Gramian
//! - [`energy`]: Minimum-energy solver and optimal trajectories
//! - [`sweep`]: Per-region control perturbations and the Gramian cache
//! - [`capacity`]: rERC and subject/group summaries
//! - [`batch`]: Subject × pair × region orchestration
//! - [`storage`]: Per-subject result archives

#[path = "core/error.rs"]
pub mod error;

#[path = "core/config.rs"]
pub mod config;

#[path = "core/prng.rs"]
pub mod prng;

#[path = "core/state.rs"]
pub mod state;

#[path = "core/normalize.rs"]
pub mod normalize;

#[path = "core/system.rs"]
pub mod system;

#[path = "core/expm.rs"]
pub mod expm;

#[path = "core/gramian.rs"]
pub mod gramian;

#[path = "core/energy.rs"]
pub mod energy;

#[path = "core/exec.rs"]
pub mod exec;

#[path = "core/sweep.rs"]
pub mod sweep;

#[path = "core/capacity.rs"]
pub mod capacity;

#[path = "core/storage.rs"]
pub mod storage;

pub mod batch;

/// Prelude module for convenient imports.
///
/// ```
/// use nctrl::prelude::*;
/// ```
pub mod prelude {
    pub use crate::batch::{
        run_batch, BatchReport, FailureRecord, SubjectInput, SubjectReport,
    };
    pub use crate::capacity::{rerc, EnergySummary, RegionSummary};
    pub use crate::config::RunConfig;
    pub use crate::energy::{minimum_energy, EnergySolver, Trajectory};
    pub use crate::error::{FailureReason, NormalizationError, SolveError, StateError};
    pub use crate::exec::CancelToken;
    pub use crate::expm::{expm, Deadline};
    pub use crate::gramian::{
        controllability_gramian, free_response, solve_gramian, Gramian, GramianSolution,
    };
    pub use crate::normalize::{normalize, SystemMatrix};
    pub use crate::state::{transition_pairs, BrainState, TransitionPair};
    pub use crate::sweep::{perturbed_energies, ControlConfig, GramianCache, GramianKey};
    pub use crate::system::{ControlSet, LinearSystem};
}

use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Rejection of a raw connectivity matrix by the normalizer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizationError {
    /// The matrix never made it into memory (missing file, ragged or
    /// non-numeric rows).
    #[error("connectivity could not be read: {0}")]
    Unreadable(String),

    #[error("connectivity matrix is empty")]
    Empty,

    #[error("connectivity matrix is not square ({rows}x{cols})")]
    NotSquare { rows: usize, cols: usize },

    #[error("non-finite entry at ({row}, {col})")]
    NonFinite { row: usize, col: usize },

    #[error("asymmetric entry at ({row}, {col}): |a_ij - a_ji| = {diff:e}")]
    Asymmetric { row: usize, col: usize, diff: f64 },

    #[error("negative weight {value} at ({row}, {col})")]
    NegativeWeight { row: usize, col: usize, value: f64 },

    /// No structural connections at all: zero spectral radius.
    #[error("connectivity matrix has no connections")]
    Degenerate,

    #[error("region {region} has no connections")]
    IsolatedRegion { region: usize },

    #[error("normalization scale c + lambda_max = {0} is not positive")]
    NonPositiveScale(f64),
}

/// Problems with a state vector handed to the solvers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateError {
    #[error("state has {got} entries, system has {expected} regions")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("state entry {index} is not finite")]
    NonFinite { index: usize },

    #[error("state has zero norm and cannot be normalized")]
    ZeroNorm,
}

/// Failure of a single Gramian or energy computation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    #[error("gramian ill-conditioned: {0}")]
    GramianIllConditioned(String),

    #[error("transition unreachable: {0}")]
    UncontrollableTransition(String),

    #[error("item exceeded its {budget_ms}ms budget")]
    TimeoutExceeded { budget_ms: u64 },

    #[error("invalid state: {0}")]
    InvalidState(#[from] StateError),

    #[error("{what} has dimension {got}, expected {expected}")]
    Dimension {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("invalid control input: {0}")]
    InvalidControl(String),

    #[error("time horizon must be positive and finite, got {0}")]
    InvalidHorizon(f64),
}

pub type SolveResult<T> = Result<T, SolveError>;

/// Rejected run configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be {requirement}, got {value}")]
    Invalid {
        field: &'static str,
        requirement: &'static str,
        value: f64,
    },
}

/// Batch-level failures. Per-item failures never surface here.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("duplicate subject id {0:?}")]
    DuplicateSubject(String),
}

/// Reason code attached to every missing value in the output tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FailureReason {
    NormalizationError,
    GramianIllConditioned,
    UncontrollableTransition,
    TimeoutExceeded,
    InvalidState,
    Cancelled,
}

impl FailureReason {
    pub const ALL: [FailureReason; 6] = [
        FailureReason::NormalizationError,
        FailureReason::GramianIllConditioned,
        FailureReason::UncontrollableTransition,
        FailureReason::TimeoutExceeded,
        FailureReason::InvalidState,
        FailureReason::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FailureReason::NormalizationError => "NormalizationError",
            FailureReason::GramianIllConditioned => "GramianIllConditioned",
            FailureReason::UncontrollableTransition => "UncontrollableTransition",
            FailureReason::TimeoutExceeded => "TimeoutExceeded",
            FailureReason::InvalidState => "InvalidState",
            FailureReason::Cancelled => "Cancelled",
        }
    }

    /// Stable on-disk code used by the result archive.
    pub fn code(self) -> u8 {
        match self {
            FailureReason::NormalizationError => 1,
            FailureReason::GramianIllConditioned => 2,
            FailureReason::UncontrollableTransition => 3,
            FailureReason::TimeoutExceeded => 4,
            FailureReason::InvalidState => 5,
            FailureReason::Cancelled => 6,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.code() == code)
    }
}

impl core::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&SolveError> for FailureReason {
    fn from(err: &SolveError) -> Self {
        match err {
            SolveError::GramianIllConditioned(_) => FailureReason::GramianIllConditioned,
            SolveError::UncontrollableTransition(_) => FailureReason::UncontrollableTransition,
            SolveError::TimeoutExceeded { .. } => FailureReason::TimeoutExceeded,
            SolveError::InvalidState(_)
            | SolveError::Dimension { .. }
            | SolveError::InvalidControl(_)
            | SolveError::InvalidHorizon(_) => FailureReason::InvalidState,
        }
    }
}

impl From<&NormalizationError> for FailureReason {
    fn from(_: &NormalizationError) -> Self {
        FailureReason::NormalizationError
    }
}

//! Matrix exponential under a wall-clock budget.
//!
//! The exponential itself is nalgebra's scaling and squaring Padé
//! implementation; this module adds input checks and [`Deadline`] checks
//! around it.

use std::time::{Duration, Instant};

use nalgebra::DMatrix;

use crate::error::{SolveError, SolveResult};

/// Wall-clock budget for one work item.
///
/// Checked cooperatively between expensive stages; a running matrix product is
/// never interrupted.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    pub fn none() -> Self {
        Self {
            start: Instant::now(),
            budget: None,
        }
    }

    pub fn after(budget: Duration) -> Self {
        Self {
            start: Instant::now(),
            budget: Some(budget),
        }
    }

    pub fn from_millis(ms: Option<u64>) -> Self {
        match ms {
            Some(ms) => Self::after(Duration::from_millis(ms)),
            None => Self::none(),
        }
    }

    pub fn check(&self) -> SolveResult<()> {
        match self.budget {
            Some(budget) if self.start.elapsed() >= budget => Err(SolveError::TimeoutExceeded {
                budget_ms: budget.as_millis() as u64,
            }),
            _ => Ok(()),
        }
    }
}

/// exp(A) for a square matrix.
///
/// The deadline is checked before and after the exponential; a running
/// exponential is never interrupted.
pub fn expm(a: &DMatrix<f64>, deadline: &Deadline) -> SolveResult<DMatrix<f64>> {
    let n = a.nrows();
    if a.ncols() != n {
        return Err(SolveError::Dimension {
            what: "matrix exponential input",
            expected: n,
            got: a.ncols(),
        });
    }
    if n == 0 {
        return Ok(DMatrix::zeros(0, 0));
    }
    if a.iter().any(|v| !v.is_finite()) {
        return Err(SolveError::GramianIllConditioned(
            "non-finite entry in matrix exponential input".into(),
        ));
    }
    deadline.check()?;
    let e = a.exp();
    deadline.check()?;

    if e.iter().all(|v| v.is_finite()) {
        Ok(e)
    } else {
        Err(SolveError::GramianIllConditioned(
            "matrix exponential overflowed".into(),
        ))
    }
}

use nalgebra::{DMatrix, DVector, SymmetricEigen};

use crate::config::RunConfig;
use crate::error::{SolveError, SolveResult};
use crate::expm::{expm, Deadline};
use crate::normalize::SystemMatrix;
use crate::system::LinearSystem;

/// Finite-horizon controllability Gramian
/// `Wc = ∫_0^T exp(Aτ) B Bᵗ exp(Aᵗτ) dτ`, with its eigendecomposition.
///
/// Invariant: symmetric, and every eigenvalue is at least
/// `-psd_tolerance * lambda_max`; eigenvalues inside that band are clamped
/// to zero.
#[derive(Debug, Clone)]
pub struct Gramian {
    wc: DMatrix<f64>,
    eigenvalues: DVector<f64>,
    eigenvectors: DMatrix<f64>,
}

impl Gramian {
    pub fn from_matrix(wc: DMatrix<f64>, psd_tolerance: f64) -> SolveResult<Self> {
        if wc.nrows() != wc.ncols() {
            return Err(SolveError::Dimension {
                what: "gramian",
                expected: wc.nrows(),
                got: wc.ncols(),
            });
        }
        if wc.iter().any(|v| !v.is_finite()) {
            return Err(SolveError::GramianIllConditioned(
                "gramian has non-finite entries".into(),
            ));
        }

        let wc = (&wc + wc.transpose()) * 0.5;
        let eig = SymmetricEigen::new(wc.clone());
        let max = eig.eigenvalues.max();
        let min = eig.eigenvalues.min();
        let floor = -psd_tolerance * max.abs().max(f64::MIN_POSITIVE);
        if min < floor {
            return Err(SolveError::GramianIllConditioned(format!(
                "gramian is not positive semidefinite: min eigenvalue {min:e}, max {max:e}"
            )));
        }

        Ok(Self {
            wc,
            eigenvalues: eig.eigenvalues.map(|l| l.max(0.0)),
            eigenvectors: eig.eigenvectors,
        })
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.wc
    }

    pub fn dim(&self) -> usize {
        self.wc.nrows()
    }

    pub fn eigenvalues(&self) -> &DVector<f64> {
        &self.eigenvalues
    }

    /// Orthonormal eigenvectors, one per column, matching [`Self::eigenvalues`].
    pub fn eigenvectors(&self) -> &DMatrix<f64> {
        &self.eigenvectors
    }

    pub fn max_eigenvalue(&self) -> f64 {
        self.eigenvalues.max()
    }

    pub fn min_eigenvalue(&self) -> f64 {
        self.eigenvalues.min()
    }

    /// `lambda_max / lambda_min`; infinite for a singular Gramian.
    pub fn condition_number(&self) -> f64 {
        let min = self.min_eigenvalue();
        if min <= 0.0 {
            f64::INFINITY
        } else {
            self.max_eigenvalue() / min
        }
    }
}

/// Gramian of one system plus the free response exp(A·T).
#[derive(Debug, Clone)]
pub struct GramianSolution {
    pub gramian: Gramian,
    pub free_response: DMatrix<f64>,
}

/// Solve for the Gramian through the exponential of the augmented matrix.
///
/// With `exp(M T) = [[E11, E12], [0, E22]]` for `M = [[A, B Bᵗ], [0, -Aᵗ]]`:
/// `E11 = exp(AT)`, `E22 = exp(-AᵗT)` and `Wc = E12 E22⁻¹`. The product is
/// obtained from an LU solve of `E22ᵗ Wcᵗ = E12ᵗ`, never from an explicit
/// inverse.
pub fn solve_gramian(
    system: &LinearSystem<'_>,
    cfg: &RunConfig,
    deadline: &Deadline,
) -> SolveResult<GramianSolution> {
    let n = system.dim();
    let e = augmented_exponential(system, deadline)?;
    let gramian = gramian_from_blocks(&e, n, cfg, deadline)?;
    Ok(GramianSolution {
        gramian,
        free_response: e.view((0, 0), (n, n)).into_owned(),
    })
}

/// Like [`solve_gramian`], but only the Gramian is kept.
///
/// exp(A·T) does not depend on the control set; sweeps compute it once with
/// [`free_response`] and share it across configurations.
pub fn controllability_gramian(
    system: &LinearSystem<'_>,
    cfg: &RunConfig,
    deadline: &Deadline,
) -> SolveResult<Gramian> {
    let e = augmented_exponential(system, deadline)?;
    gramian_from_blocks(&e, system.dim(), cfg, deadline)
}

/// exp(A·T), the uncontrolled evolution over the horizon.
pub fn free_response(
    a: &SystemMatrix,
    horizon: f64,
    deadline: &Deadline,
) -> SolveResult<DMatrix<f64>> {
    expm(&(a.matrix() * horizon), deadline)
}

fn augmented_exponential(
    system: &LinearSystem<'_>,
    deadline: &Deadline,
) -> SolveResult<DMatrix<f64>> {
    expm(&(system.augmented() * system.horizon()), deadline)
}

fn gramian_from_blocks(
    e: &DMatrix<f64>,
    n: usize,
    cfg: &RunConfig,
    deadline: &Deadline,
) -> SolveResult<Gramian> {
    let e12 = e.view((0, n), (n, n));
    let e22 = e.view((n, n), (n, n));
    deadline.check()?;

    let wc_t = e22
        .transpose()
        .lu()
        .solve(&e12.transpose())
        .ok_or_else(|| {
            SolveError::GramianIllConditioned("singular exp(-A^T T) block".into())
        })?;

    Gramian::from_matrix(wc_t.transpose(), cfg.psd_tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::ControlSet;

    fn fixture() -> SystemMatrix {
        SystemMatrix::from_normalized(DMatrix::from_row_slice(
            3,
            3,
            &[-1.0, 0.2, 0.0, 0.2, -1.0, 0.3, 0.0, 0.3, -1.0],
        ))
        .unwrap()
    }

    fn cfg() -> RunConfig {
        RunConfig::new(1.0, 1.0, 1.0, 1e-10)
    }

    #[test]
    fn scalar_system_closed_form() {
        // a = -1, b = 1: Wc = (1 - exp(-2T)) / 2
        let a = SystemMatrix::from_normalized(DMatrix::from_element(1, 1, -1.0)).unwrap();
        for t in [0.1, 1.0, 3.0] {
            let sys = LinearSystem::new(&a, ControlSet::full(1), t).unwrap();
            let sol = solve_gramian(&sys, &cfg(), &Deadline::none()).unwrap();
            let expected = (1.0 - (-2.0 * t).exp()) / 2.0;
            assert!((sol.gramian.matrix()[(0, 0)] - expected).abs() < 1e-13);
            assert!((sol.free_response[(0, 0)] - (-t).exp()).abs() < 1e-14);
        }
    }

    #[test]
    fn diagonal_system_closed_form() {
        // Decoupled regions: Wc_ii = w_i^2 (1 - exp(2 a_i T)) / (-2 a_i)
        let diag = [-0.5, -1.0, -2.0];
        let a = SystemMatrix::from_normalized(DMatrix::from_diagonal(&DVector::from_row_slice(
            &diag,
        )))
        .unwrap();
        let b = ControlSet::from_weights(DVector::from_vec(vec![1.0, 2.0, 0.5])).unwrap();
        let t = 1.5;
        let sys = LinearSystem::new(&a, b.clone(), t).unwrap();
        let sol = solve_gramian(&sys, &cfg(), &Deadline::none()).unwrap();
        for i in 0..3 {
            let w = b.weights()[i];
            let expected = w * w * (1.0 - (2.0 * diag[i] * t).exp()) / (-2.0 * diag[i]);
            assert!((sol.gramian.matrix()[(i, i)] - expected).abs() < 1e-12);
        }
        assert!(sol.gramian.matrix()[(0, 1)].abs() < 1e-14);
    }

    #[test]
    fn matches_quadrature() {
        let a = fixture();
        let sys = LinearSystem::new(&a, ControlSet::full(3), 1.0).unwrap();
        let sol = solve_gramian(&sys, &cfg(), &Deadline::none()).unwrap();

        // Composite Simpson on the Gramian integral.
        let steps = 400;
        let h = 1.0 / steps as f64;
        let mut acc = DMatrix::<f64>::zeros(3, 3);
        for k in 0..=steps {
            let e = expm(&(a.matrix() * (k as f64 * h)), &Deadline::none()).unwrap();
            let w = if k == 0 || k == steps {
                1.0
            } else if k % 2 == 1 {
                4.0
            } else {
                2.0
            };
            acc += (&e * e.transpose()) * w;
        }
        acc *= h / 3.0;
        assert!((sol.gramian.matrix() - acc).amax() < 1e-10);
    }

    #[test]
    fn gramian_is_positive_definite_under_full_control() {
        let a = fixture();
        let sys = LinearSystem::new(&a, ControlSet::full(3), 1.0).unwrap();
        let g = solve_gramian(&sys, &cfg(), &Deadline::none()).unwrap().gramian;
        assert!(g.min_eigenvalue() > 0.0);
        assert!(g.condition_number().is_finite());
        assert_eq!(g.matrix(), &g.matrix().transpose());
    }

    #[test]
    fn zero_control_gives_zero_gramian() {
        let a = fixture();
        let b = ControlSet::select(3, &[]).unwrap();
        let sys = LinearSystem::new(&a, b, 1.0).unwrap();
        let g = solve_gramian(&sys, &cfg(), &Deadline::none()).unwrap().gramian;
        assert_eq!(g.max_eigenvalue(), 0.0);
        assert_eq!(g.condition_number(), f64::INFINITY);
    }

    #[test]
    fn indefinite_matrix_is_rejected() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, -0.5]);
        assert!(matches!(
            Gramian::from_matrix(m, 1e-9),
            Err(SolveError::GramianIllConditioned(_))
        ));
    }

    #[test]
    fn split_solve_matches_combined() {
        let a = fixture();
        let b = ControlSet::select(3, &[0, 2]).unwrap();
        let sys = LinearSystem::new(&a, b, 1.0).unwrap();
        let sol = solve_gramian(&sys, &cfg(), &Deadline::none()).unwrap();
        let g = controllability_gramian(&sys, &cfg(), &Deadline::none()).unwrap();
        let free = free_response(&a, 1.0, &Deadline::none()).unwrap();
        assert!((sol.gramian.matrix() - g.matrix()).amax() < 1e-14);
        assert!((sol.free_response - free).amax() < 1e-12);
    }
}

use nalgebra::{DMatrix, SymmetricEigen};

use crate::config::RunConfig;
use crate::error::NormalizationError;

/// Stabilized system matrix A derived from a connectome.
///
/// Invariant: square, finite. When produced by [`normalize`] it is also
/// symmetric with every eigenvalue in `(-2, 0)`, so ẋ = Ax is stable and the
/// finite-horizon Gramian is well defined.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemMatrix {
    a: DMatrix<f64>,
    spectral_radius: f64,
}

impl SystemMatrix {
    /// Wrap a matrix that is already a valid system matrix (e.g. a fixture).
    /// Only squareness and finiteness are checked.
    pub fn from_normalized(a: DMatrix<f64>) -> Result<Self, NormalizationError> {
        check_shape(&a)?;
        check_finite(&a)?;
        Ok(Self {
            a,
            spectral_radius: f64::NAN,
        })
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.a
    }

    pub fn dim(&self) -> usize {
        self.a.nrows()
    }

    /// Largest eigenvalue magnitude of the raw connectome (NaN when the
    /// matrix was supplied pre-normalized).
    pub fn raw_spectral_radius(&self) -> f64 {
        self.spectral_radius
    }

    /// Copy with regions reordered so that new index `i` is old `order[i]`.
    pub fn permuted(&self, order: &[usize]) -> Self {
        let n = self.dim();
        let a = DMatrix::from_fn(n, n, |i, j| self.a[(order[i], order[j])]);
        Self {
            a,
            spectral_radius: self.spectral_radius,
        }
    }
}

/// Validate a raw connectome and rescale it to `A / (c + lambda_max) - I`.
///
/// Self-loops are ignored: the diagonal is zeroed before anything else is
/// computed from it.
pub fn normalize(raw: &DMatrix<f64>, cfg: &RunConfig) -> Result<SystemMatrix, NormalizationError> {
    check_shape(raw)?;
    check_finite(raw)?;

    let n = raw.nrows();
    let mut a = raw.clone();
    a.fill_diagonal(0.0);

    let max_abs = a.amax();
    if max_abs == 0.0 {
        return Err(NormalizationError::Degenerate);
    }

    let tol = cfg.symmetry_tolerance * max_abs;
    for i in 0..n {
        for j in 0..n {
            let value = a[(i, j)];
            if value < 0.0 {
                return Err(NormalizationError::NegativeWeight {
                    row: i,
                    col: j,
                    value,
                });
            }
            if j > i {
                let diff = (value - a[(j, i)]).abs();
                if diff > tol {
                    return Err(NormalizationError::Asymmetric {
                        row: i,
                        col: j,
                        diff,
                    });
                }
            }
        }
    }

    if !cfg.allow_isolated_regions {
        if let Some(region) = (0..n).find(|&i| a.row(i).iter().all(|&w| w == 0.0)) {
            return Err(NormalizationError::IsolatedRegion { region });
        }
    }

    // Remove sub-tolerance asymmetry so the eigensolver sees a symmetric input.
    let a = (&a + a.transpose()) * 0.5;
    let spectral_radius = SymmetricEigen::new(a.clone()).eigenvalues.amax();
    if spectral_radius <= f64::EPSILON * max_abs {
        return Err(NormalizationError::Degenerate);
    }

    let scale = cfg.normalization_c + spectral_radius;
    if !(scale > 0.0) {
        return Err(NormalizationError::NonPositiveScale(scale));
    }

    let a = a / scale - DMatrix::<f64>::identity(n, n);
    Ok(SystemMatrix { a, spectral_radius })
}

fn check_shape(a: &DMatrix<f64>) -> Result<(), NormalizationError> {
    if a.nrows() == 0 || a.ncols() == 0 {
        return Err(NormalizationError::Empty);
    }
    if a.nrows() != a.ncols() {
        return Err(NormalizationError::NotSquare {
            rows: a.nrows(),
            cols: a.ncols(),
        });
    }
    Ok(())
}

fn check_finite(a: &DMatrix<f64>) -> Result<(), NormalizationError> {
    for j in 0..a.ncols() {
        for i in 0..a.nrows() {
            if !a[(i, j)].is_finite() {
                return Err(NormalizationError::NonFinite { row: i, col: j });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prng::Prng;

    fn cfg() -> RunConfig {
        RunConfig::new(1.0, 1.0, 1.0, 1e-10)
    }

    #[test]
    fn normalized_system_is_stable() {
        let raw = Prng::new(11).connectome(20, 0.3);
        let sys = normalize(&raw, &cfg()).unwrap();
        let eig = SymmetricEigen::new(sys.matrix().clone()).eigenvalues;
        assert!(eig.iter().all(|&l| l < 0.0 && l > -2.0), "{eig}");
        assert!(sys.raw_spectral_radius() > 0.0);
    }

    #[test]
    fn diagonal_is_ignored() {
        let mut raw = Prng::new(5).connectome(6, 0.5);
        let clean = normalize(&raw, &cfg()).unwrap();
        raw.fill_diagonal(9.0);
        let loops = normalize(&raw, &cfg()).unwrap();
        assert_eq!(clean, loops);
        for i in 0..6 {
            assert!((loops.matrix()[(i, i)] + 1.0).abs() < 1e-15);
        }
    }

    #[test]
    fn rejects_malformed_input() {
        let c = cfg();
        assert_eq!(
            normalize(&DMatrix::zeros(0, 0), &c),
            Err(NormalizationError::Empty)
        );
        assert!(matches!(
            normalize(&DMatrix::zeros(2, 3), &c),
            Err(NormalizationError::NotSquare { rows: 2, cols: 3 })
        ));

        let mut nan = Prng::new(1).connectome(4, 0.5);
        nan[(1, 2)] = f64::NAN;
        assert!(matches!(
            normalize(&nan, &c),
            Err(NormalizationError::NonFinite { row: 1, col: 2 })
        ));

        let mut skew = Prng::new(1).connectome(4, 0.5);
        skew[(0, 1)] += 0.5;
        assert!(matches!(
            normalize(&skew, &c),
            Err(NormalizationError::Asymmetric { .. })
        ));

        let mut neg = Prng::new(1).connectome(4, 0.5);
        neg[(0, 3)] = -0.2;
        neg[(3, 0)] = -0.2;
        assert!(matches!(
            normalize(&neg, &c),
            Err(NormalizationError::NegativeWeight { .. })
        ));
    }

    #[test]
    fn singular_connectomes_are_rejected() {
        let c = cfg();
        assert_eq!(
            normalize(&DMatrix::zeros(5, 5), &c),
            Err(NormalizationError::Degenerate)
        );

        let mut raw = Prng::new(2).connectome(5, 0.6);
        for k in 0..5 {
            raw[(2, k)] = 0.0;
            raw[(k, 2)] = 0.0;
        }
        assert_eq!(
            normalize(&raw, &c),
            Err(NormalizationError::IsolatedRegion { region: 2 })
        );

        let mut lenient = c.clone();
        lenient.allow_isolated_regions = true;
        let sys = normalize(&raw, &lenient).unwrap();
        assert!((sys.matrix()[(2, 2)] + 1.0).abs() < 1e-15);
    }

    #[test]
    fn permutation_reorders_regions() {
        let sys = normalize(&Prng::new(9).connectome(4, 0.7), &cfg()).unwrap();
        let order = [2, 0, 3, 1];
        let p = sys.permuted(&order);
        assert_eq!(p.matrix()[(0, 1)], sys.matrix()[(2, 0)]);
        assert_eq!(p.matrix()[(3, 2)], sys.matrix()[(1, 3)]);
    }
}

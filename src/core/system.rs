use nalgebra::{DMatrix, DVector};

use crate::error::{SolveError, SolveResult};
use crate::normalize::SystemMatrix;

/// Diagonal control-input matrix B, stored as its diagonal.
///
/// A zero weight removes a region from the control set, which is equivalent to
/// dropping its column from B: both give the same B Bᵗ.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlSet {
    weights: DVector<f64>,
}

impl ControlSet {
    /// B = I: every region receives unit control input.
    pub fn full(n: usize) -> Self {
        Self {
            weights: DVector::from_element(n, 1.0),
        }
    }

    /// Unit weight on `regions`, zero elsewhere.
    pub fn select(n: usize, regions: &[usize]) -> SolveResult<Self> {
        let mut weights = DVector::zeros(n);
        for &r in regions {
            if r >= n {
                return Err(SolveError::InvalidControl(format!(
                    "region {r} out of range for {n} regions"
                )));
            }
            weights[r] = 1.0;
        }
        Ok(Self { weights })
    }

    pub fn from_weights(weights: DVector<f64>) -> SolveResult<Self> {
        if let Some(i) = weights.iter().position(|w| !w.is_finite() || *w < 0.0) {
            return Err(SolveError::InvalidControl(format!(
                "weight {} at region {i} must be finite and non-negative",
                weights[i]
            )));
        }
        Ok(Self { weights })
    }

    /// Same control set with `delta` added to `region`'s weight.
    pub fn perturbed(&self, region: usize, delta: f64) -> SolveResult<Self> {
        if region >= self.dim() {
            return Err(SolveError::InvalidControl(format!(
                "region {region} out of range for {} regions",
                self.dim()
            )));
        }
        let mut weights = self.weights.clone();
        weights[region] += delta;
        Self::from_weights(weights)
    }

    pub fn dim(&self) -> usize {
        self.weights.len()
    }

    pub fn weights(&self) -> &DVector<f64> {
        &self.weights
    }

    pub fn matrix(&self) -> DMatrix<f64> {
        DMatrix::from_diagonal(&self.weights)
    }

    /// Apply B to a vector.
    pub fn apply(&self, u: &DVector<f64>) -> DVector<f64> {
        self.weights.component_mul(u)
    }

    pub fn permuted(&self, order: &[usize]) -> Self {
        Self {
            weights: DVector::from_fn(self.dim(), |i, _| self.weights[order[i]]),
        }
    }
}

/// ẋ(t) = A x(t) + B u(t) over the horizon [0, T].
///
/// Immutable; a new system is built for each control set.
#[derive(Debug, Clone)]
pub struct LinearSystem<'a> {
    a: &'a SystemMatrix,
    b: ControlSet,
    horizon: f64,
}

impl<'a> LinearSystem<'a> {
    pub fn new(a: &'a SystemMatrix, b: ControlSet, horizon: f64) -> SolveResult<Self> {
        if b.dim() != a.dim() {
            return Err(SolveError::Dimension {
                what: "control set",
                expected: a.dim(),
                got: b.dim(),
            });
        }
        if !(horizon.is_finite() && horizon > 0.0) {
            return Err(SolveError::InvalidHorizon(horizon));
        }
        Ok(Self { a, b, horizon })
    }

    pub fn a(&self) -> &DMatrix<f64> {
        self.a.matrix()
    }

    pub fn control(&self) -> &ControlSet {
        &self.b
    }

    pub fn horizon(&self) -> f64 {
        self.horizon
    }

    pub fn dim(&self) -> usize {
        self.a.dim()
    }

    /// The 2N×2N block matrix `[[A, B Bᵗ], [0, -Aᵗ]]`.
    pub fn augmented(&self) -> DMatrix<f64> {
        let n = self.dim();
        let mut m = DMatrix::zeros(2 * n, 2 * n);
        m.view_mut((0, 0), (n, n)).copy_from(self.a());
        for i in 0..n {
            let w = self.b.weights[i];
            m[(i, n + i)] = w * w;
        }
        m.view_mut((n, n), (n, n)).copy_from(&(-self.a().transpose()));
        m
    }

    /// Right-hand side A x + B u.
    pub fn derivative(&self, x: &DVector<f64>, u: &DVector<f64>) -> DVector<f64> {
        self.a() * x + self.b.apply(u)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> SystemMatrix {
        SystemMatrix::from_normalized(DMatrix::from_row_slice(
            3,
            3,
            &[-1.0, 0.2, 0.0, 0.2, -1.0, 0.3, 0.0, 0.3, -1.0],
        ))
        .unwrap()
    }

    #[test]
    fn augmented_block_layout() {
        let a = fixture();
        let b = ControlSet::full(3).perturbed(1, 0.5).unwrap();
        let sys = LinearSystem::new(&a, b, 1.0).unwrap();
        let m = sys.augmented();

        assert_eq!(m.shape(), (6, 6));
        assert_eq!(m[(0, 1)], 0.2);
        assert_eq!(m[(4, 4)], 1.0);
        assert_eq!(m[(1, 4)], 2.25);
        assert_eq!(m[(0, 3)], 1.0);
        assert_eq!(m[(0, 4)], 0.0);
        assert!(m.view((3, 0), (3, 3)).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn control_sets() {
        let b = ControlSet::select(4, &[0, 2]).unwrap();
        assert_eq!(b.weights().as_slice(), &[1.0, 0.0, 1.0, 0.0]);
        assert!(ControlSet::select(4, &[4]).is_err());
        assert!(ControlSet::full(3).perturbed(3, 1.0).is_err());
        assert!(ControlSet::full(3).perturbed(0, -2.0).is_err());
        assert_eq!(ControlSet::full(2).matrix(), DMatrix::identity(2, 2));
    }

    #[test]
    fn rejects_mismatched_inputs() {
        let a = fixture();
        assert!(matches!(
            LinearSystem::new(&a, ControlSet::full(4), 1.0),
            Err(SolveError::Dimension { .. })
        ));
        assert!(matches!(
            LinearSystem::new(&a, ControlSet::full(3), 0.0),
            Err(SolveError::InvalidHorizon(_))
        ));
    }
}

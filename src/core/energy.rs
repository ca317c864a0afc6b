use nalgebra::{DMatrix, DVector};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::RunConfig;
use crate::error::{SolveError, SolveResult, StateError};
use crate::expm::{expm, Deadline};
use crate::gramian::{solve_gramian, Gramian};
use crate::system::LinearSystem;

/// Minimum-energy solver bound to one Gramian.
///
/// Works in the Gramian's eigenbasis: `E = Σ (q_iᵗ Δ)² / λ_i`. Directions whose
/// eigenvalue is numerically zero (at most `N · ε_machine · λ_max`) are
/// uncontrollable: no input moves the state along them, and diagonal loading
/// would only hide that. The remaining spectrum is regularized (`λ_i + ε`)
/// once, at construction, when the condition number exceeds `max_condition`.
#[derive(Debug, Clone)]
pub struct EnergySolver<'g> {
    gramian: &'g Gramian,
    free_response: &'g DMatrix<f64>,
    inverse_eigenvalues: DVector<f64>,
    null_directions: Vec<usize>,
    regularized: bool,
    reach_tolerance: f64,
}

impl<'g> EnergySolver<'g> {
    pub fn new(
        gramian: &'g Gramian,
        free_response: &'g DMatrix<f64>,
        cfg: &RunConfig,
    ) -> SolveResult<Self> {
        let n = gramian.dim();
        if free_response.shape() != (n, n) {
            return Err(SolveError::Dimension {
                what: "free response",
                expected: n,
                got: free_response.nrows(),
            });
        }

        let regularized = gramian.condition_number() > cfg.max_condition;
        let shift = if regularized {
            cfg.regularization_epsilon
        } else {
            0.0
        };
        let max = gramian.max_eigenvalue();
        let zero_floor = n as f64 * f64::EPSILON * max;

        let mut null_directions = Vec::new();
        let mut inverse_eigenvalues = DVector::zeros(n);
        for (i, &l) in gramian.eigenvalues().iter().enumerate() {
            if max <= 0.0 || l <= zero_floor {
                null_directions.push(i);
            } else {
                inverse_eigenvalues[i] = 1.0 / (l + shift);
            }
        }

        Ok(Self {
            gramian,
            free_response,
            inverse_eigenvalues,
            null_directions,
            regularized,
            reach_tolerance: cfg.reach_tolerance,
        })
    }

    /// Whether diagonal loading was applied before inversion.
    pub fn is_regularized(&self) -> bool {
        self.regularized
    }

    /// Number of eigen-directions the control input cannot reach.
    pub fn uncontrollable_directions(&self) -> usize {
        self.null_directions.len()
    }

    /// Δ = xf − exp(AT) x0: what the input has to add to the free response.
    pub fn transfer_error(&self, x0: &DVector<f64>, xf: &DVector<f64>) -> SolveResult<DVector<f64>> {
        let n = self.gramian.dim();
        for x in [x0, xf] {
            if x.len() != n {
                return Err(StateError::DimensionMismatch {
                    expected: n,
                    got: x.len(),
                }
                .into());
            }
            if let Some(index) = x.iter().position(|v| !v.is_finite()) {
                return Err(StateError::NonFinite { index }.into());
            }
        }
        Ok(xf - self.free_response * x0)
    }

    /// Coordinates of Δ in the eigenbasis, after checking reachability.
    fn reachable_coordinates(&self, delta: &DVector<f64>) -> SolveResult<DVector<f64>> {
        let coords = self.gramian.eigenvectors().tr_mul(delta);
        let scale = delta.norm();
        for &i in &self.null_directions {
            if coords[i].abs() > self.reach_tolerance * scale {
                return Err(SolveError::UncontrollableTransition(format!(
                    "transfer error has component {:e} along an uncontrollable direction \
                     ({} of {} directions unreachable)",
                    coords[i],
                    self.null_directions.len(),
                    self.gramian.dim()
                )));
            }
        }
        Ok(coords)
    }

    /// Δᵗ Wc⁻¹ Δ for the transition x0 → xf.
    pub fn energy(&self, x0: &DVector<f64>, xf: &DVector<f64>) -> SolveResult<f64> {
        let delta = self.transfer_error(x0, xf)?;
        let coords = self.reachable_coordinates(&delta)?;
        let energy = coords
            .iter()
            .zip(self.inverse_eigenvalues.iter())
            .map(|(c, inv)| c * c * inv)
            .sum::<f64>();
        Ok(energy.max(0.0))
    }

    /// Wc⁻¹ Δ (pseudo-inverse on uncontrollable directions).
    fn costate(&self, delta: &DVector<f64>) -> SolveResult<DVector<f64>> {
        let coords = self.reachable_coordinates(delta)?;
        Ok(self.gramian.eigenvectors() * coords.component_mul(&self.inverse_eigenvalues))
    }

    /// Optimal input `u*(t) = Bᵗ exp(Aᵗ(T−t)) Wc⁻¹ Δ` on `resolution + 1`
    /// evenly spaced samples of `[0, T]`, with the state reached by RK4
    /// integration of ẋ = Ax + Bu.
    ///
    /// Inputs are evaluated on the half-step grid so each RK4 midpoint uses an
    /// exact sample rather than an interpolation.
    pub fn trajectory(
        &self,
        system: &LinearSystem<'_>,
        x0: &DVector<f64>,
        xf: &DVector<f64>,
        resolution: usize,
    ) -> SolveResult<Trajectory> {
        if system.dim() != self.gramian.dim() {
            return Err(SolveError::Dimension {
                what: "system",
                expected: self.gramian.dim(),
                got: system.dim(),
            });
        }
        let steps = resolution.max(1);
        let h = system.horizon() / steps as f64;

        let delta = self.transfer_error(x0, xf)?;
        let costate = self.costate(&delta)?;

        // Backwards from t = T: w(t - h/2) = exp(Aᵗ h/2) w(t).
        let half_step = expm(&(system.a().transpose() * (0.5 * h)), &Deadline::none())?;
        let mut inputs = vec![DVector::zeros(0); 2 * steps + 1];
        let mut w = costate;
        for j in (0..=2 * steps).rev() {
            inputs[j] = system.control().apply(&w);
            if j > 0 {
                w = &half_step * &w;
            }
        }

        let mut state = Vec::with_capacity(steps + 1);
        let mut x = x0.clone();
        state.push(x.clone());
        for k in 0..steps {
            let (u0, um, u1) = (&inputs[2 * k], &inputs[2 * k + 1], &inputs[2 * k + 2]);
            let k1 = system.derivative(&x, u0);
            let k2 = system.derivative(&(&x + &k1 * (0.5 * h)), um);
            let k3 = system.derivative(&(&x + &k2 * (0.5 * h)), um);
            let k4 = system.derivative(&(&x + &k3 * h), u1);
            x += (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (h / 6.0);
            state.push(x.clone());
        }

        let times = (0..=steps).map(|k| k as f64 * h).collect();
        let control = inputs.into_iter().step_by(2).collect();
        Ok(Trajectory {
            times,
            control,
            state,
        })
    }
}

/// Sampled optimal input and the state it produces.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Trajectory {
    pub times: Vec<f64>,
    pub control: Vec<DVector<f64>>,
    pub state: Vec<DVector<f64>>,
}

impl Trajectory {
    pub fn final_state(&self) -> Option<&DVector<f64>> {
        self.state.last()
    }

    /// Trapezoidal estimate of ∫ |u(t)|² dt.
    pub fn integrated_energy(&self) -> f64 {
        self.times
            .windows(2)
            .zip(self.control.windows(2))
            .map(|(t, u)| 0.5 * (t[1] - t[0]) * (u[0].norm_squared() + u[1].norm_squared()))
            .sum()
    }
}

/// One-shot minimum energy for a single transition.
pub fn minimum_energy(
    system: &LinearSystem<'_>,
    x0: &DVector<f64>,
    xf: &DVector<f64>,
    cfg: &RunConfig,
) -> SolveResult<f64> {
    let deadline = Deadline::from_millis(cfg.item_timeout_ms);
    let sol = solve_gramian(system, cfg, &deadline)?;
    EnergySolver::new(&sol.gramian, &sol.free_response, cfg)?.energy(x0, xf)
}

// Minimal PRNG (no external crates).
//
// This is NOT cryptographically secure.
// It is used only for synthetic connectomes and states in tests, assays and
// benches, where runs must be reproducible from a seed.

use nalgebra::{DMatrix, DVector};

#[derive(Debug, Clone)]
pub struct Prng {
    state: u64,
}

impl Prng {
    pub fn new(seed: u64) -> Self {
        // Avoid a zero state.
        let seed = if seed == 0 { 0x9E3779B97F4A7C15 } else { seed };
        Self { state: seed }
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        // xorshift64*
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    #[inline]
    pub fn next_f64_01(&mut self) -> f64 {
        // 53 random mantissa bits -> [0,1).
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    #[inline]
    pub fn gen_range_f64(&mut self, low: f64, high: f64) -> f64 {
        low + (high - low) * self.next_f64_01()
    }

    /// Symmetric non-negative weight matrix with a zero diagonal.
    ///
    /// Each off-diagonal pair is connected with probability `density`. A ring
    /// through all regions is always present so no region is isolated.
    pub fn connectome(&mut self, n: usize, density: f64) -> DMatrix<f64> {
        let mut m = DMatrix::zeros(n, n);
        for i in 0..n {
            for j in (i + 1)..n {
                if self.next_f64_01() < density {
                    let w = self.gen_range_f64(0.05, 1.0);
                    m[(i, j)] = w;
                    m[(j, i)] = w;
                }
            }
        }
        if n > 1 {
            for i in 0..n {
                let j = (i + 1) % n;
                if m[(i, j)] == 0.0 {
                    let w = self.gen_range_f64(0.05, 1.0);
                    m[(i, j)] = w;
                    m[(j, i)] = w;
                }
            }
        }
        m
    }

    pub fn state(&mut self, n: usize) -> DVector<f64> {
        DVector::from_fn(n, |_, _| self.gen_range_f64(-1.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_connectome() {
        let a = Prng::new(7).connectome(12, 0.3);
        let b = Prng::new(7).connectome(12, 0.3);
        assert_eq!(a, b);
    }

    #[test]
    fn connectome_is_symmetric_without_isolated_regions() {
        let m = Prng::new(3).connectome(10, 0.0);
        assert_eq!(m, m.transpose());
        for i in 0..10 {
            assert_eq!(m[(i, i)], 0.0);
            assert!(m.row(i).iter().any(|&w| w > 0.0));
        }
    }
}

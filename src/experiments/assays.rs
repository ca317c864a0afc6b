use nalgebra::DVector;
use nctrl::prelude::*;
use nctrl::prng::Prng;

#[derive(Debug, Clone)]
struct AssayReport {
    seed: u64,
    regions: usize,

    // Worst relative energy difference under region relabelling.
    permutation_error: f64,
    // Regions whose extra control weight did not lower the energy.
    non_monotone_regions: usize,
    // |rERC| for each delta in DELTAS, largest delta first.
    rerc_by_delta: Vec<f64>,
    // Max abs error between the simulated final state and the target.
    round_trip_error: f64,
    // Largest eigenvalue of the normalized system matrix.
    max_eigenvalue: f64,
}

const DELTAS: [f64; 4] = [1e-1, 1e-2, 1e-3, 1e-4];

/// Run every assay on a few synthetic connectomes. Returns the number of
/// failed checks.
pub fn run() -> usize {
    let mut failed = 0;
    for (seed, regions) in [(1u64, 6usize), (2, 10), (3, 16)] {
        match assay(seed, regions) {
            Ok(report) => {
                print_report(&report);
                failed += check(&report);
            }
            Err(e) => {
                println!("seed={seed} regions={regions}: FAILED to solve: {e}");
                failed += 1;
            }
        }
    }
    if failed == 0 {
        println!("all assays passed");
    } else {
        println!("{failed} assay check(s) failed");
    }
    failed
}

fn assay(seed: u64, regions: usize) -> Result<AssayReport, String> {
    let mut rng = Prng::new(seed);
    let raw = rng.connectome(regions, 0.3);
    let cfg = RunConfig::new(1.0, 1.0, 1.0, 1e-10);
    let a = normalize(&raw, &cfg).map_err(|e| e.to_string())?;
    let x0 = unit(rng.state(regions));
    let xf = unit(rng.state(regions));

    let energy = |a: &SystemMatrix,
                  b: ControlSet,
                  x0: &DVector<f64>,
                  xf: &DVector<f64>|
     -> Result<f64, SolveError> {
        let sys = LinearSystem::new(a, b, cfg.time_horizon)?;
        minimum_energy(&sys, x0, xf, &cfg)
    };

    let baseline = energy(&a, ControlSet::full(regions), &x0, &xf).map_err(|e| e.to_string())?;

    // Reverse the region order.
    let order: Vec<usize> = (0..regions).rev().collect();
    let permute = |x: &DVector<f64>| DVector::from_fn(regions, |i, _| x[order[i]]);
    let permuted = energy(
        &a.permuted(&order),
        ControlSet::full(regions),
        &permute(&x0),
        &permute(&xf),
    )
    .map_err(|e| e.to_string())?;
    let permutation_error = (permuted - baseline).abs() / baseline;

    let mut non_monotone_regions = 0;
    for pert in perturbed_energies(&a, &ControlSet::full(regions), &x0, &xf, &cfg) {
        if pert.map_err(|e| e.to_string())? > baseline {
            non_monotone_regions += 1;
        }
    }

    let mut rerc_by_delta = Vec::with_capacity(DELTAS.len());
    for delta in DELTAS {
        let b = ControlSet::full(regions)
            .perturbed(0, delta)
            .map_err(|e| e.to_string())?;
        let pert = energy(&a, b, &x0, &xf).map_err(|e| e.to_string())?;
        let value = rerc(Some(baseline), Some(pert), cfg.min_baseline_energy).unwrap_or(f64::NAN);
        rerc_by_delta.push(value.abs());
    }

    let sys = LinearSystem::new(&a, ControlSet::full(regions), cfg.time_horizon)
        .map_err(|e| e.to_string())?;
    let sol = solve_gramian(&sys, &cfg, &Deadline::none()).map_err(|e| e.to_string())?;
    let trajectory = EnergySolver::new(&sol.gramian, &sol.free_response, &cfg)
        .and_then(|s| s.trajectory(&sys, &x0, &xf, 400))
        .map_err(|e| e.to_string())?;
    let round_trip_error = trajectory
        .final_state()
        .map(|x| (x - &xf).amax())
        .unwrap_or(f64::INFINITY);

    let max_eigenvalue = a
        .matrix()
        .clone()
        .symmetric_eigenvalues()
        .max();

    Ok(AssayReport {
        seed,
        regions,
        permutation_error,
        non_monotone_regions,
        rerc_by_delta,
        round_trip_error,
        max_eigenvalue,
    })
}

fn unit(x: DVector<f64>) -> DVector<f64> {
    let norm = x.norm();
    x / norm
}

fn check(r: &AssayReport) -> usize {
    let mut failed = 0;
    let mut expect = |name: &str, ok: bool| {
        if !ok {
            println!("  FAIL {name}");
            failed += 1;
        }
    };
    expect("permutation equivariance", r.permutation_error < 1e-8);
    expect("monotone in control weight", r.non_monotone_regions == 0);
    expect(
        "rERC vanishes with delta",
        r.rerc_by_delta.windows(2).all(|w| w[1] < w[0]) && r.rerc_by_delta[3] < 1e-2,
    );
    expect("trajectory reaches target", r.round_trip_error < 1e-6);
    expect("normalized system is stable", r.max_eigenvalue < 0.0);
    failed
}

fn print_report(r: &AssayReport) {
    println!("seed={} regions={}", r.seed, r.regions);
    println!("  permutation rel. error  {:.2e}", r.permutation_error);
    println!("  non-monotone regions    {}", r.non_monotone_regions);
    let deltas: Vec<String> = DELTAS
        .iter()
        .zip(&r.rerc_by_delta)
        .map(|(d, v)| format!("{d:.0e}:{v:.2e}"))
        .collect();
    println!("  |rERC| by delta         {}", deltas.join(" "));
    println!("  round-trip error        {:.2e}", r.round_trip_error);
    println!("  max eigenvalue of A     {:.4}", r.max_eigenvalue);
}

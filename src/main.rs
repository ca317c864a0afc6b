mod experiments;

use nalgebra::{DMatrix, DVector};
use nctrl::prelude::*;
use serde::Serialize;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() >= 2 && (args[1] == "--help" || args[1] == "-h" || args[1] == "help") {
        print_help();
        return;
    }
    if args.len() >= 2 && args[1] == "assays" {
        let failed = experiments::assays::run();
        if failed > 0 {
            std::process::exit(1);
        }
        return;
    }
    if args.len() >= 2 && args[1] == "trajectory" {
        run_trajectory_demo();
        return;
    }
    if args.len() >= 2 && args[1] != "fixture" {
        eprintln!("Unknown command: {}", args[1]);
        print_help();
        std::process::exit(2);
    }

    run_fixture();
}

fn print_help() {
    println!("nctrl demo");
    println!();
    println!("USAGE:");
    println!("  nctrl [fixture]     3-region fixture: baseline and perturbed energies");
    println!("  nctrl trajectory    optimal control trajectory of the fixture transition");
    println!("  nctrl assays        property checks on synthetic connectomes");
    println!("  nctrl help");
}

#[derive(Debug, Serialize)]
struct FixtureReport {
    horizon: f64,
    baseline_energy: f64,
    perturbed_region: usize,
    perturbed_weight: f64,
    perturbed_energy: f64,
    rerc: Option<f64>,
    gramian_condition: f64,
}

/// Already-stable system used as the regression fixture.
fn fixture_system() -> SystemMatrix {
    let a = DMatrix::from_row_slice(3, 3, &[-1.0, 0.2, 0.0, 0.2, -1.0, 0.3, 0.0, 0.3, -1.0]);
    match SystemMatrix::from_normalized(a) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("fixture matrix rejected: {e}");
            std::process::exit(1);
        }
    }
}

fn unit(n: usize, i: usize) -> DVector<f64> {
    let mut v = DVector::zeros(n);
    v[i] = 1.0;
    v
}

fn run_fixture() {
    let cfg = RunConfig::new(1.0, 1.0, 0.5, 1e-10);
    let a = fixture_system();
    let (x0, xf) = (unit(3, 0), unit(3, 1));

    let result = (|| -> Result<FixtureReport, SolveError> {
        let base_sys = LinearSystem::new(&a, ControlSet::full(3), cfg.time_horizon)?;
        let base = solve_gramian(&base_sys, &cfg, &Deadline::none())?;
        let baseline_energy =
            EnergySolver::new(&base.gramian, &base.free_response, &cfg)?.energy(&x0, &xf)?;

        let region = 1;
        let control = ControlSet::full(3).perturbed(region, cfg.perturbation_delta)?;
        let perturbed_weight = control.weights()[region];
        let pert_sys = LinearSystem::new(&a, control, cfg.time_horizon)?;
        let perturbed_energy = minimum_energy(&pert_sys, &x0, &xf, &cfg)?;

        Ok(FixtureReport {
            horizon: cfg.time_horizon,
            baseline_energy,
            perturbed_region: region,
            perturbed_weight,
            perturbed_energy,
            rerc: rerc(
                Some(baseline_energy),
                Some(perturbed_energy),
                cfg.min_baseline_energy,
            ),
            gramian_condition: base.gramian.condition_number(),
        })
    })();

    match result {
        Ok(report) => match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("failed to serialize fixture report: {e}"),
        },
        Err(e) => {
            eprintln!("fixture failed: {e}");
            std::process::exit(1);
        }
    }
}

fn run_trajectory_demo() {
    let cfg = RunConfig::new(1.0, 1.0, 0.5, 1e-10);
    let a = fixture_system();
    let (x0, xf) = (unit(3, 0), unit(3, 1));

    let result = (|| -> Result<(Trajectory, f64), SolveError> {
        let sys = LinearSystem::new(&a, ControlSet::full(3), cfg.time_horizon)?;
        let sol = solve_gramian(&sys, &cfg, &Deadline::none())?;
        let solver = EnergySolver::new(&sol.gramian, &sol.free_response, &cfg)?;
        let energy = solver.energy(&x0, &xf)?;
        Ok((solver.trajectory(&sys, &x0, &xf, 20)?, energy))
    })();

    let (trajectory, energy) = match result {
        Ok(v) => v,
        Err(e) => {
            eprintln!("trajectory failed: {e}");
            std::process::exit(1);
        }
    };

    println!("t\t|u|\tx1\tx2\tx3");
    for ((t, u), x) in trajectory
        .times
        .iter()
        .zip(&trajectory.control)
        .zip(&trajectory.state)
    {
        println!("{t:.3}\t{:.4}\t{:.4}\t{:.4}\t{:.4}", u.norm(), x[0], x[1], x[2]);
    }
    let miss = trajectory
        .final_state()
        .map(|x| (x - &xf).amax())
        .unwrap_or(f64::NAN);
    println!();
    println!("energy (closed form)  {energy:.6}");
    println!("energy (integrated)   {:.6}", trajectory.integrated_energy());
    println!("final state error     {miss:.2e}");
}

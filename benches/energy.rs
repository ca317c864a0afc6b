//! Criterion benchmarks for the nctrl energy pipeline.
//!
//! Run with:
//!   cargo bench
//!   cargo bench --features parallel
//!
//! Results are saved to target/criterion/

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nalgebra::DVector;

use nctrl::prelude::*;
use nctrl::prng::Prng;

fn config() -> RunConfig {
    RunConfig::new(1.0, 1.0, 1.0, 1e-10)
}

fn make_system(regions: usize, seed: u64) -> SystemMatrix {
    let raw = Prng::new(seed).connectome(regions, 0.2);
    normalize(&raw, &config()).unwrap()
}

fn make_states(regions: usize, seed: u64) -> (DVector<f64>, DVector<f64>) {
    let mut rng = Prng::new(seed);
    let x0 = rng.state(regions);
    let xf = rng.state(regions);
    (x0.normalize(), xf.normalize())
}

/// Matrix exponential of the 2N augmented matrix.
fn bench_expm(c: &mut Criterion) {
    let mut group = c.benchmark_group("expm");

    for size in [16, 64, 100, 200].iter() {
        group.throughput(Throughput::Elements(*size as u64));

        group.bench_with_input(BenchmarkId::new("augmented", size), size, |b, &size| {
            let a = make_system(size, 42);
            let system = LinearSystem::new(&a, ControlSet::full(size), 1.0).unwrap();
            let m = system.augmented();
            b.iter(|| black_box(expm(&m, &Deadline::none()).unwrap()[(0, 0)]));
        });
    }

    group.finish();
}

/// Gramian solve with varying region counts.
fn bench_gramian_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("gramian_size");
    let cfg = config();

    for size in [16, 64, 100, 200].iter() {
        group.throughput(Throughput::Elements(*size as u64));

        group.bench_with_input(BenchmarkId::new("solve", size), size, |b, &size| {
            let a = make_system(size, 42);
            let system = LinearSystem::new(&a, ControlSet::full(size), 1.0).unwrap();
            b.iter(|| {
                let sol = solve_gramian(&system, &cfg, &Deadline::none()).unwrap();
                black_box(sol.gramian.max_eigenvalue())
            });
        });
    }

    group.finish();
}

/// Energy evaluation against an already solved Gramian.
fn bench_energy(c: &mut Criterion) {
    let mut group = c.benchmark_group("energy");
    let cfg = config();

    for size in [16, 100, 200].iter() {
        group.bench_with_input(BenchmarkId::new("cached_gramian", size), size, |b, &size| {
            let a = make_system(size, 7);
            let system = LinearSystem::new(&a, ControlSet::full(size), 1.0).unwrap();
            let sol = solve_gramian(&system, &cfg, &Deadline::none()).unwrap();
            let solver = EnergySolver::new(&sol.gramian, &sol.free_response, &cfg).unwrap();
            let (x0, xf) = make_states(size, 7);
            b.iter(|| black_box(solver.energy(&x0, &xf).unwrap()));
        });
    }

    group.finish();
}

/// Full per-region sweep of one transition.
fn bench_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("sweep");
    group.sample_size(10);
    let cfg = config();

    for size in [16, 32].iter() {
        group.throughput(Throughput::Elements(*size as u64));

        group.bench_with_input(BenchmarkId::new("perturbed", size), size, |b, &size| {
            let a = make_system(size, 3);
            let (x0, xf) = make_states(size, 3);
            b.iter(|| {
                let energies = perturbed_energies(&a, &ControlSet::full(size), &x0, &xf, &cfg);
                black_box(energies.len())
            });
        });
    }

    group.finish();
}

/// Per-subject archive round-trip.
fn bench_archive(c: &mut Criterion) {
    let mut group = c.benchmark_group("archive");
    group.sample_size(10);
    let cfg = config();

    let size = 16;
    let mut rng = Prng::new(11);
    let states = ["Vis", "SomMot", "DorsAttn", "VentAttn"]
        .iter()
        .map(|label| BrainState::new(*label, rng.state(size).iter().copied().collect()))
        .collect();
    let input = SubjectInput::new("sub-bench", rng.connectome(size, 0.2), states);
    let report = nctrl::batch::run_subject(&input, &cfg, &CancelToken::new());

    group.bench_function("save", |b| {
        let mut buf = Vec::with_capacity(64 * 1024);
        b.iter(|| {
            buf.clear();
            report.save_archive_to(&mut buf).unwrap();
            black_box(buf.len())
        });
    });

    group.bench_function("load", |b| {
        let mut buf = Vec::new();
        report.save_archive_to(&mut buf).unwrap();
        b.iter(|| {
            let mut cursor = std::io::Cursor::new(&buf);
            let loaded = SubjectReport::load_archive_from(&mut cursor, &cfg).unwrap();
            black_box(loaded.pairs.len())
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_expm,
    bench_gramian_sizes,
    bench_energy,
    bench_sweep,
    bench_archive,
);
criterion_main!(benches);

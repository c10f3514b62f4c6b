//! Device tests. Run with `cargo test -- --ignored` on a machine with
//! a compute adapter.

use approx::assert_relative_eq;
use std::sync::Arc;
use surfdist::{
    geo::geometry::Coord, heightmap::Heightmap, GpuContext, KernelConfig, ReferenceSolver,
    Solver, SurfaceDistance, SurfdistError,
};

fn coord(x: f32, y: f32) -> Coord<f32> {
    Coord { x, y }
}

fn hills(width: usize, phase: f32) -> Heightmap {
    Heightmap::from_fn(width, |x, y| {
        let h = 128.0 + 60.0 * (x as f32 * 0.21 + phase).sin() * (y as f32 * 0.17).cos();
        h.round() as u8
    })
}

fn gpu() -> Arc<GpuContext> {
    Arc::new(GpuContext::new().unwrap())
}

#[test]
#[ignore = "requires a GPU adapter"]
fn test_gpu_matches_reference() {
    let gpu = gpu();
    for cfg in [
        KernelConfig::default(),
        KernelConfig {
            workgroup_size: 64,
            sample_count: 1000,
            ..KernelConfig::default()
        },
    ] {
        let mut device = Solver::builder()
            .pre(hills(128, 0.0))
            .post(hills(128, 1.3))
            .config(cfg)
            .build(&gpu)
            .unwrap();
        let mut host = ReferenceSolver::new(hills(128, 0.0), hills(128, 1.3), cfg).unwrap();

        for (a, b) in [
            (coord(0.0, 0.0), coord(128.0, 128.0)),
            (coord(100.5, 3.25), coord(7.0, 90.0)),
            (coord(64.0, 64.0), coord(64.0, 64.0)),
            (coord(128.0, 0.0), coord(0.0, 128.0)),
        ] {
            let expected = host.compute_distance(a, b).unwrap();
            let actual = device.compute_distance(a, b).unwrap();
            assert_relative_eq!(actual.pre, expected.pre, max_relative = 1e-4, epsilon = 1e-3);
            assert_relative_eq!(actual.post, expected.post, max_relative = 1e-4, epsilon = 1e-3);
        }
    }
}

#[test]
#[ignore = "requires a GPU adapter"]
fn test_gpu_flat_512_scenario() {
    let mut solver = Solver::builder()
        .pre(Heightmap::flat(512, 100))
        .post(Heightmap::flat(512, 100))
        .build(&gpu())
        .unwrap();
    let d = solver
        .compute_distance(coord(167.0, 316.0), coord(317.0, 316.0))
        .unwrap();
    assert_relative_eq!(d.pre, 4500.0, max_relative = 1e-4);
    assert_relative_eq!(d.post, 4500.0, max_relative = 1e-4);
}

#[test]
#[ignore = "requires a GPU adapter"]
fn test_gpu_outputs_are_independent() {
    // Very different grids; a shared output buffer would leak post
    // sums into pre.
    let mut solver = Solver::builder()
        .pre(Heightmap::flat(64, 0))
        .post(Heightmap::from_fn(64, |x, _| if x % 2 == 0 { 0 } else { 255 }))
        .build(&gpu())
        .unwrap();
    for _ in 0..8 {
        let d = solver
            .compute_distance(coord(1.0, 1.0), coord(60.0, 1.0))
            .unwrap();
        assert_relative_eq!(d.pre, 59.0 * 30.0, max_relative = 1e-4);
        assert!(d.post > d.pre * 10.0);
    }
}

#[test]
#[ignore = "requires a GPU adapter"]
fn test_gpu_setup_and_query_errors() {
    let gpu = gpu();
    let err = Solver::builder()
        .post(Heightmap::flat(64, 0))
        .build(&gpu)
        .err()
        .unwrap();
    assert!(matches!(err, SurfdistError::Builder("pre")));

    let err = Solver::builder()
        .pre(Heightmap::flat(64, 0))
        .post(Heightmap::flat(32, 0))
        .build(&gpu)
        .err()
        .unwrap();
    assert!(matches!(err, SurfdistError::GridMismatch { .. }));

    let mut solver = Solver::builder()
        .pre(Heightmap::flat(64, 0))
        .post(Heightmap::flat(64, 0))
        .build(&gpu)
        .unwrap();
    assert!(matches!(
        solver.compute_distance(coord(0.0, 0.0), coord(0.0, 65.0)),
        Err(SurfdistError::OutOfBounds { .. })
    ));
    assert!(solver
        .compute_distance(coord(0.0, 0.0), coord(0.0, 64.0))
        .is_ok());
}

#[test]
#[ignore = "requires a GPU adapter"]
fn test_gpu_coarse_sampling_limits_line_length() {
    let coarse = KernelConfig {
        sample_count: 1024,
        ..KernelConfig::default()
    };
    let mut solver = Solver::builder()
        .pre(Heightmap::flat(512, 100))
        .post(Heightmap::flat(512, 100))
        .config(coarse)
        .build(&gpu())
        .unwrap();
    let d = solver
        .compute_distance(coord(167.0, 316.0), coord(317.0, 316.0))
        .unwrap();
    assert_relative_eq!(d.pre, 4500.0, max_relative = 1e-4);
    assert!(matches!(
        solver.compute_distance(coord(0.0, 0.0), coord(512.0, 512.0)),
        Err(SurfdistError::TileBudget { .. })
    ));
}

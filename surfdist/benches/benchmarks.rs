use criterion::{criterion_group, criterion_main, Criterion};
use surfdist::{
    geo::geometry::Coord, heightmap::Heightmap, KernelConfig, ReferenceSolver, SurfaceDistance,
};

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

fn hills() -> Heightmap {
    Heightmap::from_fn(512, |x, y| {
        let h = 128.0 + 60.0 * (x as f32 * 0.05).sin() * (y as f32 * 0.03).cos();
        h.round() as u8
    })
}

fn reference_distance(c: &mut Criterion) {
    let mut group = c.benchmark_group("Reference Distance");

    let start = Coord { x: 167.0, y: 316.0 };
    let end = Coord { x: 317.0, y: 316.0 };

    for sample_count in [8192, 16384] {
        let cfg = KernelConfig {
            sample_count,
            ..KernelConfig::default()
        };
        let mut solver = ReferenceSolver::new(hills(), hills(), cfg).unwrap();
        group.bench_function(format!("{sample_count} samples"), |b| {
            b.iter(|| solver.compute_distance(start, end).unwrap())
        });
    }
}

criterion_group!(benches, reference_distance);
criterion_main!(benches);

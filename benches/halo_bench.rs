use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};

use atlas_halo::algs::boundary::partition_boundary_nodes;
use atlas_halo::prelude::*;

fn grid(nlon: usize, nlat: usize) -> StructuredGridConfig {
    StructuredGridConfig {
        nlon,
        nlat,
        lat_min: -80.0,
        lat_max: 80.0,
        ..StructuredGridConfig::default()
    }
}

fn bench_build_halo(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_halo");
    for &(nlon, nlat) in &[(64, 32), (256, 128)] {
        let mesh = generate(&grid(nlon, nlat), 0, 1).unwrap();
        for depth in [1usize, 2] {
            group.bench_with_input(
                BenchmarkId::new(format!("{nlon}x{nlat}"), depth),
                &depth,
                |b, &depth| {
                    b.iter_batched(
                        || mesh.clone(),
                        |mut m| build_halo(&mut m, depth, &NoComm).unwrap(),
                        BatchSize::LargeInput,
                    );
                },
            );
        }
    }
    group.finish();
}

fn bench_boundary(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition_boundary");
    let mesh = generate(&grid(256, 128), 0, 1).unwrap();
    for strategy in [BoundaryStrategy::Facets, BoundaryStrategy::Polygon] {
        group.bench_function(format!("{strategy:?}"), |b| {
            b.iter(|| partition_boundary_nodes(&mesh, 0, strategy).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_build_halo, bench_boundary);
criterion_main!(benches);

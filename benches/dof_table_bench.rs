use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use dof_cluster::prelude::*;

/// Cells split into slabs along z, one slab per rank.
fn slab_owners(grid: &StructuredGrid, n_ranks: usize) -> Vec<usize> {
    let [nx, ny, nz] = grid.shape();
    let mut owners = vec![0; grid.n_cells()];
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                owners[grid.cell_at(i, j, k)] = k * n_ranks / nz;
            }
        }
    }
    owners
}

fn random_owners(grid: &StructuredGrid, n_ranks: usize, seed: u64) -> Vec<usize> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..grid.n_cells()).map(|_| rng.gen_range(0..n_ranks)).collect()
}

fn build_world(parts: &[InMemoryPartition], layout: DofLayout) -> u64 {
    let world = ThreadComm::world(parts.len());
    std::thread::scope(|s| {
        let handles: Vec<_> = world
            .iter()
            .map(|comm| {
                s.spawn(move || {
                    let part = &parts[comm.rank()];
                    let local = InMemoryDofTable::build(part, layout).unwrap();
                    build_dof_table(part, &local, comm).unwrap().n_dofs()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).max().unwrap_or(0)
    })
}

fn bench_dof_table(c: &mut Criterion) {
    let mut group = c.benchmark_group("dof_table");
    group.sample_size(20);
    let grid = StructuredGrid::unit_cube(8, 8, 8).unwrap();
    let layouts = [
        ("p1", DofLayout::p1()),
        ("q2x3", DofLayout::lagrange(1, 1, 1, 1).with_components(3)),
    ];
    for n_ranks in [1, 2, 4] {
        let owner_sets = [
            ("slabs", slab_owners(&grid, n_ranks)),
            ("random", random_owners(&grid, n_ranks, 42)),
        ];
        for (owners_name, owners) in &owner_sets {
            let parts = grid
                .partition(owners, n_ranks, GhostLayer::Vertices)
                .unwrap();
            for (layout_name, layout) in layouts {
                let id = BenchmarkId::new(format!("{layout_name}/{owners_name}"), n_ranks);
                group.bench_with_input(id, &parts, |b, parts| {
                    b.iter(|| build_world(parts, layout));
                });
            }
        }
    }
    group.finish();
}

criterion_group!(benches, bench_dof_table);
criterion_main!(benches);

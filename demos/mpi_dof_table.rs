// Run with e.g. `mpirun -n 3 cargo run --example mpi_dof_table --features mpi-support`.
// Every rank partitions the same structured cube, keeps its own piece and
// takes part in the distributed numbering.
fn main() {
    use dof_cluster::prelude::*;
    use mpi::traits::CommunicatorCollectives;

    let universe = mpi::initialize().unwrap();
    let world = universe.world();
    let comm = MpiComm::new();
    let n_ranks = comm.size();

    let grid = StructuredGrid::unit_cube(4, 4, 4).unwrap();
    let [_, _, nz] = grid.shape();
    let owners: Vec<usize> = (0..grid.n_cells())
        .map(|c| (c / (grid.n_cells() / nz)) * n_ranks / nz)
        .collect();
    let parts = grid
        .partition(&owners, n_ranks, GhostLayer::Vertices)
        .unwrap();
    let part = &parts[comm.rank()];
    let local = InMemoryDofTable::build(part, DofLayout::lagrange(1, 1, 1, 1)).unwrap();

    match DofTableBuilder::new(part, &local, &comm).build_with_stats() {
        Ok((table, stats)) => println!(
            "rank {}: {} of {} dofs owned, {} ghosts, {} rounds, {} redirects",
            comm.rank(),
            table.n_owned(),
            table.n_dofs(),
            table.ghost_dofs().count(),
            stats.ghost_rounds,
            stats.redirects_followed,
        ),
        Err(err) => eprintln!("rank {}: {err}", comm.rank()),
    }
    world.barrier();
}

// Builds the global dof numbering of a Q2 vector field on a 4 x 4 square
// split between four threads, then prints what each rank ended up with.
use dof_cluster::prelude::*;

fn main() -> Result<(), DofMapError> {
    let n_ranks = 4;
    let grid = StructuredGrid::unit_square(4, 4)?;
    // Quadrants: rank = 2 * (j >= 2) + (i >= 2)
    let mut owners = vec![0; grid.n_cells()];
    for j in 0..4 {
        for i in 0..4 {
            owners[grid.cell_at(i, j, 0)] = 2 * (j / 2) + i / 2;
        }
    }
    let parts = grid.partition(&owners, n_ranks, GhostLayer::Faces)?;
    let layout = DofLayout::lagrange(1, 1, 1, 0).with_components(2);

    let world = ThreadComm::world(n_ranks);
    let results: Vec<Result<(DofTable, BuildStats), DofMapError>> = std::thread::scope(|s| {
        let handles: Vec<_> = world
            .iter()
            .map(|comm| {
                let part = &parts[comm.rank()];
                s.spawn(move || {
                    let local = InMemoryDofTable::build(part, layout)?;
                    DofTableBuilder::new(part, &local, comm).build_with_stats()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("rank thread panicked"))
            .collect()
    });

    for result in results {
        let (table, stats) = result?;
        println!(
            "rank {}: {} local dofs, {} owned in [{:?}, {:?}], {} ghosts from ranks {:?}, {} rounds",
            table.rank(),
            table.n_local_dofs(),
            table.n_owned(),
            table.first_df(table.rank()),
            table.last_df(table.rank()),
            table.ghost_dofs().count(),
            table.neighbor_ranks(),
            stats.ghost_rounds,
        );
    }
    Ok(())
}

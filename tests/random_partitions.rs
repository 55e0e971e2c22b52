mod util;
use util::*;

use dof_cluster::prelude::*;
use proptest::prelude::*;

fn layer_strategy() -> impl Strategy<Value = GhostLayer> {
    prop_oneof![Just(GhostLayer::Faces), Just(GhostLayer::Vertices)]
}

fn owners_strategy(n_cells: usize) -> impl Strategy<Value = (usize, Vec<usize>)> {
    (1usize..=4).prop_flat_map(move |n_ranks| {
        (
            Just(n_ranks),
            proptest::collection::vec(0..n_ranks, n_cells),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn square_partitions_agree((n_ranks, owners) in owners_strategy(9), layer in layer_strategy()) {
        let grid = StructuredGrid::unit_square(3, 3).unwrap();
        let layout = DofLayout::lagrange(1, 1, 1, 0);
        let out = build_all(&grid, &owners, n_ranks, layer, layout, DofTableConfig::default());
        prop_assert_eq!(out[0].table.n_dofs(), 49);
        prop_assert_eq!(owned_counts(&out).iter().sum::<usize>(), 49);
        for o in &out {
            prop_assert!(o.stats.ghost_rounds <= n_ranks + 1);
        }
        assert_globally_consistent(&out);
    }

    #[test]
    fn cube_partitions_agree((n_ranks, owners) in owners_strategy(8), layer in layer_strategy()) {
        let grid = StructuredGrid::unit_cube(2, 2, 2).unwrap();
        let layout = DofLayout::lagrange(2, 1, 0, 0).with_components(2);
        let out = build_all(&grid, &owners, n_ranks, layer, layout, DofTableConfig::default());
        prop_assert_eq!(out[0].table.n_dofs(), 2 * (2 * 27 + 54));
        assert_globally_consistent(&out);
    }

    #[test]
    fn chain_partitions_agree((n_ranks, owners) in owners_strategy(7)) {
        let grid = StructuredGrid::interval(7).unwrap();
        let out = build_all(&grid, &owners, n_ranks, GhostLayer::Faces, DofLayout::lagrange(1, 2, 0, 0), DofTableConfig::default());
        prop_assert_eq!(out[0].table.n_dofs(), 8 + 2 * 7);
        assert_globally_consistent(&out);
    }
}

mod util;
use util::*;

use dof_cluster::prelude::*;

#[test]
fn chain_split_between_two_ranks() {
    let grid = StructuredGrid::interval(4).unwrap();
    let out = build_all(
        &grid,
        &[0, 0, 1, 1],
        2,
        GhostLayer::Faces,
        DofLayout::p1(),
        DofTableConfig::default(),
    );
    assert_eq!(owned_counts(&out), vec![3, 2]);
    for o in &out {
        assert_eq!(o.table.n_dofs(), 5);
        assert_eq!(o.table.first_df(0), Some(0));
        assert_eq!(o.table.last_df(0), Some(2));
        assert_eq!(o.table.first_df(1), Some(3));
        assert_eq!(o.table.last_df(1), Some(4));
    }
    assert_eq!(out[0].table.process_to_cluster(), &[0, 1, 2, 3]);
    assert_eq!(out[1].table.process_to_cluster(), &[2, 3, 4, 1]);
    assert_eq!(out[1].table.owner(DofId::new(0)), Some(0));
    assert_eq!(out[1].table.owner(DofId::new(3)), Some(0));
    assert_eq!(out[0].table.owner(DofId::new(3)), Some(1));
    assert_eq!(out[1].table.local_of_cluster(1), Some(DofId::new(3)));
    assert_eq!(out[0].table.local_of_cluster(4), None);
    assert_globally_consistent(&out);
}

#[test]
fn corner_vertex_found_through_a_redirect() {
    let grid = StructuredGrid::unit_square(2, 2).unwrap();
    let out = build_all(
        &grid,
        &[0, 1, 1, 2],
        3,
        GhostLayer::Faces,
        DofLayout::p1(),
        DofTableConfig::default(),
    );
    assert_eq!(owned_counts(&out), vec![4, 4, 1]);
    for o in &out {
        assert_eq!(o.table.n_dofs(), 9);
        assert_eq!(o.stats.ghost_rounds, 2);
    }
    assert!(out[2].stats.redirects_followed >= 1);
    assert_eq!(out[0].stats.redirects_followed, 0);
    assert_globally_consistent(&out);

    let centre = |o: &RankOutcome| {
        (0..o.local.n_local_dofs())
            .map(DofId::new)
            .find(|&d| o.local.dof_point(d).unwrap().coords() == [0.5, 0.5, 0.0])
            .unwrap()
    };
    let owner_index = out[0].table.global_cluster(centre(&out[0])).unwrap();
    for o in &out {
        assert_eq!(o.table.global_cluster(centre(o)), Some(owner_index));
        assert_eq!(o.table.owner(centre(o)), Some(0));
    }
}

#[test]
fn corner_shared_with_a_lower_diagonal_rank_has_one_owner() {
    let grid = StructuredGrid::unit_square(2, 2).unwrap();
    let out = build_all(
        &grid,
        &[0, 2, 2, 1],
        3,
        GhostLayer::Faces,
        DofLayout::p1(),
        DofTableConfig::default(),
    );
    assert_eq!(owned_counts(&out), vec![4, 3, 2]);
    for o in &out {
        assert_eq!(o.table.n_dofs(), 9);
        let centre = (0..o.local.n_local_dofs())
            .map(DofId::new)
            .find(|&d| o.local.dof_point(d).unwrap().coords() == [0.5, 0.5, 0.0])
            .unwrap();
        assert_eq!(o.table.owner(centre), Some(0));
    }
    assert_globally_consistent(&out);
}

#[test]
fn two_dofs_per_vertex_on_a_chain() {
    let grid = StructuredGrid::interval(4).unwrap();
    let out = build_all(
        &grid,
        &[0, 0, 1, 1],
        2,
        GhostLayer::Faces,
        DofLayout::lagrange(2, 0, 0, 0),
        DofTableConfig::default(),
    );
    assert_eq!(owned_counts(&out), vec![6, 4]);
    assert_eq!(out[0].table.process_to_cluster(), &[0, 1, 2, 3, 4, 5, 6, 7]);
    assert_eq!(out[1].table.process_to_cluster(), &[4, 5, 6, 7, 8, 9, 2, 3]);
    assert_globally_consistent(&out);
}

#[test]
fn diagonal_ghosts_resolve_in_one_round() {
    let grid = StructuredGrid::unit_square(2, 2).unwrap();
    let out = build_all(
        &grid,
        &[0, 1, 1, 2],
        3,
        GhostLayer::Vertices,
        DofLayout::p1(),
        DofTableConfig::default(),
    );
    assert_eq!(owned_counts(&out), vec![4, 4, 1]);
    for o in &out {
        assert_eq!(o.stats.ghost_rounds, 1);
        assert_eq!(o.stats.redirects_followed, 0);
    }
    assert_globally_consistent(&out);
}

#[test]
fn rank_without_cells_owns_nothing() {
    let grid = StructuredGrid::unit_square(2, 1).unwrap();
    let out = build_all(
        &grid,
        &[0, 0],
        2,
        GhostLayer::Faces,
        DofLayout::p1(),
        DofTableConfig::default(),
    );
    assert_eq!(owned_counts(&out), vec![6, 0]);
    let empty = &out[1].table;
    assert_eq!(empty.n_local_dofs(), 0);
    assert_eq!(empty.n_dofs(), 6);
    assert!(empty.ranges().range(1).is_empty());
    assert!(empty.neighbor_ranks().is_empty());
    assert_globally_consistent(&out);
}

#[test]
fn one_thread_rank_matches_serial_build() {
    let grid = StructuredGrid::unit_square(3, 2).unwrap();
    let layout = DofLayout::lagrange(1, 2, 1, 0);
    let parts = grid.partition(&[0; 6], 1, GhostLayer::Faces).unwrap();
    let local = InMemoryDofTable::build(&parts[0], layout).unwrap();
    let serial = build_dof_table(&parts[0], &local, &NoComm).unwrap();

    let threaded = build_all(
        &grid,
        &[0; 6],
        1,
        GhostLayer::Faces,
        layout,
        DofTableConfig::default(),
    );
    assert_eq!(threaded[0].table, serial);
    assert_eq!(serial.n_dofs() as usize, local.n_local_dofs());
    assert_eq!(serial.ghost_dofs().count(), 0);
}

#[test]
fn ghost_dofs_and_neighbours() {
    let grid = StructuredGrid::unit_square(2, 2).unwrap();
    let out = build_all(
        &grid,
        &[0, 1, 1, 2],
        3,
        GhostLayer::Vertices,
        DofLayout::p1(),
        DofTableConfig::default(),
    );
    let t = &out[2].table;
    assert_eq!(t.n_local_dofs(), 9);
    assert_eq!(t.ghost_dofs().count(), 8);
    assert_eq!(t.neighbor_ranks().into_iter().collect::<Vec<_>>(), vec![0, 1]);
    for d in t.ghost_dofs() {
        assert!(!t.is_owned(d));
        assert_ne!(t.owner(d), Some(2));
    }
}

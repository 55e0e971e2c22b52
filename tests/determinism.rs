mod util;
use util::*;

use dof_cluster::prelude::*;

fn tables(config: DofTableConfig) -> Vec<String> {
    let grid = StructuredGrid::unit_cube(3, 2, 2).unwrap();
    let owners: Vec<usize> = (0..grid.n_cells()).map(|c| (c * 7) % 3).collect();
    let layout = DofLayout::lagrange(1, 1, 1, 0).with_components(2);
    build_all(&grid, &owners, 3, GhostLayer::Vertices, layout, config)
        .iter()
        .map(|o| serde_json::to_string(&o.table).unwrap())
        .collect()
}

#[test]
fn rebuilding_gives_identical_tables() {
    let first = tables(DofTableConfig::default());
    let second = tables(DofTableConfig::default());
    assert_eq!(first, second);
}

#[test]
fn tag_base_does_not_change_the_result() {
    let shifted = DofTableConfig::default().with_tag_base(0x4000);
    assert_eq!(tables(DofTableConfig::default()), tables(shifted));
}

#[test]
fn frozen_table_survives_serialization() {
    let grid = StructuredGrid::unit_square(2, 2).unwrap();
    let out = build_all(
        &grid,
        &[0, 1, 1, 2],
        3,
        GhostLayer::Faces,
        DofLayout::p1(),
        DofTableConfig::default(),
    );
    for o in &out {
        let json = serde_json::to_string(&o.table).unwrap();
        let back: DofTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, o.table);
        back.validate_invariants().unwrap();
    }
}

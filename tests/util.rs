#![allow(dead_code)]
use dof_cluster::prelude::*;
use std::collections::{HashMap, HashSet};

/// Run `f` once per rank of a fresh in-process world, each rank on its own thread.
pub fn run_ranks<R, F>(n: usize, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(&ThreadComm) -> R + Sync,
{
    let world = ThreadComm::world(n);
    let f = &f;
    std::thread::scope(|s| {
        let handles: Vec<_> = world.iter().map(|comm| s.spawn(move || f(comm))).collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("rank panicked"))
            .collect()
    })
}

pub struct RankOutcome {
    pub part: InMemoryPartition,
    pub local: InMemoryDofTable,
    pub table: DofTable,
    pub stats: BuildStats,
}

/// Partition `grid`, number dofs locally and build every rank's table.
pub fn build_all(
    grid: &StructuredGrid,
    owners: &[usize],
    n_ranks: usize,
    layer: GhostLayer,
    layout: DofLayout,
    config: DofTableConfig,
) -> Vec<RankOutcome> {
    let parts = grid.partition(owners, n_ranks, layer).unwrap();
    let parts = &parts;
    run_ranks(n_ranks, move |comm| {
        let part = parts[comm.rank()].clone();
        let local = InMemoryDofTable::build(&part, layout).unwrap();
        let (table, stats) = DofTableBuilder::new(&part, &local, comm)
            .with_config(config)
            .build_with_stats()
            .unwrap();
        RankOutcome {
            part,
            local,
            table,
            stats,
        }
    })
}

pub type DofKey = ([i64; 3], usize, usize);

/// Dof point (rounded), component and slot of a local dof.
pub fn key_of(local: &InMemoryDofTable, dof: DofId) -> DofKey {
    let p = local.dof_point(dof).unwrap().coords();
    let q = p.map(|x| (x * 1e6).round() as i64);
    (
        q,
        local.dof_component(dof).unwrap(),
        local.dof_slot(dof).unwrap(),
    )
}

/// Check that equal dof keys map to equal cluster indices on every rank,
/// distinct keys to distinct indices, that no rank maps two local dofs to
/// one index, and that every index is used.
pub fn assert_globally_consistent(outcomes: &[RankOutcome]) {
    let n_dofs = outcomes[0].table.n_dofs();
    let mut by_key: HashMap<DofKey, u64> = HashMap::new();
    let mut by_cluster: HashMap<u64, DofKey> = HashMap::new();
    for o in outcomes {
        assert_eq!(o.table.n_dofs(), n_dofs);
        o.table.validate_invariants().unwrap();
        let mut local_clusters = HashSet::new();
        for d in 0..o.local.n_local_dofs() {
            let dof = DofId::new(d);
            let key = key_of(&o.local, dof);
            let cluster = o.table.global_cluster(dof).unwrap();
            assert!(cluster < n_dofs);
            assert!(
                local_clusters.insert(cluster),
                "rank {}: cluster {cluster} is reached from two local dofs",
                o.table.rank()
            );
            if let Some(&seen) = by_key.get(&key) {
                assert_eq!(
                    seen, cluster,
                    "rank {}: {dof} at {key:?} disagrees with another rank",
                    o.table.rank()
                );
            }
            by_key.insert(key, cluster);
            if let Some(&seen) = by_cluster.get(&cluster) {
                assert_eq!(seen, key, "cluster {cluster} names two different dofs");
            }
            by_cluster.insert(cluster, key);
        }
    }
    assert_eq!(by_cluster.len() as u64, n_dofs);
}

pub fn owned_counts(outcomes: &[RankOutcome]) -> Vec<usize> {
    outcomes.iter().map(|o| o.table.n_owned()).collect()
}

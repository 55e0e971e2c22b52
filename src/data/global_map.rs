//! Global cluster numbering of dofs.
//!
//! [`ClusterRanges`] turns per-rank owned-dof counts into contiguous,
//! rank-ordered ranges of cluster indices. [`DofTable`] is the frozen result
//! of a build: for every local dof (owned or ghost) its cluster index, and for
//! every cluster index owned by this rank its local dof.

use crate::algs::communicator::Communicator;
use crate::debug_invariants::DebugInvariants;
use crate::dof_error::DofMapError;
use crate::topology::ids::DofId;
use std::collections::BTreeSet;
use std::ops::Range;

/// Contiguous per-rank ranges `[first[r], last[r]]` of cluster indices.
///
/// A rank owning nothing gets the degenerate range `first[r] == last[r]`
/// placed at the start of the next rank's range, so no two non-empty
/// ranges ever overlap.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ClusterRanges {
    counts: Vec<u64>,
    first: Vec<u64>,
    last: Vec<u64>,
    n_dofs: u64,
}

impl ClusterRanges {
    /// Compute the ranges from the owned-dof count of every rank.
    pub fn from_counts(counts: &[u64]) -> Self {
        let n = counts.len();
        let mut first = vec![0u64; n];
        let mut last = vec![0u64; n];
        for r in 0..n {
            if r > 0 {
                first[r] = if counts[r - 1] > 0 {
                    last[r - 1] + 1
                } else {
                    last[r - 1]
                };
            }
            last[r] = if counts[r] > 0 {
                first[r] + counts[r] - 1
            } else {
                first[r]
            };
        }
        Self {
            counts: counts.to_vec(),
            first,
            last,
            n_dofs: counts.iter().sum(),
        }
    }

    /// All-gather `owned` across the communicator and compute the ranges.
    pub fn gather<C: Communicator>(comm: &C, owned: u64) -> Result<Self, DofMapError> {
        let counts = comm.allgather_u64(owned)?;
        if counts.len() != comm.size() {
            return Err(DofMapError::MissingRankCounts {
                expected: comm.size(),
                got: counts.len(),
            });
        }
        if owned == 0 {
            log::warn!("rank {} owns no dofs", comm.rank());
        }
        Ok(Self::from_counts(&counts))
    }

    pub fn n_ranks(&self) -> usize {
        self.counts.len()
    }

    /// Total number of dofs across all ranks.
    pub fn n_dofs(&self) -> u64 {
        self.n_dofs
    }

    pub fn owned_count(&self, rank: usize) -> u64 {
        self.counts.get(rank).copied().unwrap_or(0)
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn first(&self, rank: usize) -> Option<u64> {
        self.first.get(rank).copied()
    }

    pub fn last(&self, rank: usize) -> Option<u64> {
        self.last.get(rank).copied()
    }

    pub fn firsts(&self) -> &[u64] {
        &self.first
    }

    pub fn lasts(&self) -> &[u64] {
        &self.last
    }

    /// Half-open range of cluster indices owned by `rank` (empty for ranks owning nothing).
    pub fn range(&self, rank: usize) -> Range<u64> {
        match self.first(rank) {
            Some(first) => first..first + self.owned_count(rank),
            None => 0..0,
        }
    }

    /// Rank owning a cluster index.
    pub fn rank_of(&self, cluster: u64) -> Option<usize> {
        if cluster >= self.n_dofs {
            return None;
        }
        let r = self.first.partition_point(|&f| f <= cluster);
        (0..r).rev().find(|&rank| self.range(rank).contains(&cluster))
    }
}

impl DebugInvariants for ClusterRanges {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "ClusterRanges");
    }

    fn validate_invariants(&self) -> Result<(), DofMapError> {
        if self.first.len() != self.counts.len() || self.last.len() != self.counts.len() {
            return Err(DofMapError::InvariantViolation(
                "range arrays and counts differ in length".into(),
            ));
        }
        let mut next = 0u64;
        for r in 0..self.counts.len() {
            let range = self.range(r);
            if self.counts[r] > 0 {
                if range.start != next {
                    return Err(DofMapError::InvariantViolation(format!(
                        "rank {r} starts at {} instead of {next}",
                        range.start
                    )));
                }
                if self.last[r] + 1 != range.end {
                    return Err(DofMapError::InvariantViolation(format!(
                        "rank {r}: last {} inconsistent with count {}",
                        self.last[r], self.counts[r]
                    )));
                }
                next = range.end;
            }
        }
        if next != self.n_dofs {
            return Err(DofMapError::InvariantViolation(format!(
                "ranges cover [0, {next}) but {} dofs exist",
                self.n_dofs
            )));
        }
        Ok(())
    }
}

/// Frozen distributed dof table of one rank.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DofTable {
    rank: usize,
    ranges: ClusterRanges,
    process_to_cluster: Vec<u64>,
    cluster_to_process: Vec<DofId>,
    owners: Vec<usize>,
}

impl DofTable {
    pub(crate) fn new(
        rank: usize,
        ranges: ClusterRanges,
        process_to_cluster: Vec<u64>,
        cluster_to_process: Vec<DofId>,
        owners: Vec<usize>,
    ) -> Self {
        Self {
            rank,
            ranges,
            process_to_cluster,
            cluster_to_process,
            owners,
        }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn ranges(&self) -> &ClusterRanges {
        &self.ranges
    }

    /// Total number of dofs across all ranks.
    pub fn n_dofs(&self) -> u64 {
        self.ranges.n_dofs()
    }

    /// Number of local dofs, ghosts included.
    pub fn n_local_dofs(&self) -> usize {
        self.process_to_cluster.len()
    }

    /// Number of dofs owned by this rank.
    pub fn n_owned(&self) -> usize {
        self.cluster_to_process.len()
    }

    pub fn first_df(&self, rank: usize) -> Option<u64> {
        self.ranges.first(rank)
    }

    pub fn last_df(&self, rank: usize) -> Option<u64> {
        self.ranges.last(rank)
    }

    /// Cluster index of a local dof.
    pub fn global_cluster(&self, dof: DofId) -> Option<u64> {
        self.process_to_cluster.get(dof.get()).copied()
    }

    /// Local dof of a cluster index owned by this rank.
    pub fn local_of_cluster(&self, cluster: u64) -> Option<DofId> {
        let first = self.ranges.range(self.rank).start;
        let offset = cluster.checked_sub(first)?;
        self.cluster_to_process.get(offset as usize).copied()
    }

    pub fn owner(&self, dof: DofId) -> Option<usize> {
        self.owners.get(dof.get()).copied()
    }

    pub fn is_owned(&self, dof: DofId) -> bool {
        self.owner(dof) == Some(self.rank)
    }

    /// Local dofs owned by another rank.
    pub fn ghost_dofs(&self) -> impl Iterator<Item = DofId> + '_ {
        self.owners
            .iter()
            .enumerate()
            .filter(move |&(_, &o)| o != self.rank)
            .map(|(i, _)| DofId::new(i))
    }

    /// Ranks owning at least one of this rank's ghost dofs.
    pub fn neighbor_ranks(&self) -> BTreeSet<usize> {
        self.owners
            .iter()
            .copied()
            .filter(|&o| o != self.rank)
            .collect()
    }

    /// Local dof → cluster index, indexed by local dof.
    pub fn process_to_cluster(&self) -> &[u64] {
        &self.process_to_cluster
    }

    /// Owned cluster index minus `first_df(rank)` → local dof.
    pub fn cluster_to_process(&self) -> &[DofId] {
        &self.cluster_to_process
    }
}

impl DebugInvariants for DofTable {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "DofTable");
    }

    fn validate_invariants(&self) -> Result<(), DofMapError> {
        self.ranges.validate_invariants()?;
        let owned_range = self.ranges.range(self.rank);
        if self.cluster_to_process.len() as u64 != owned_range.end - owned_range.start {
            return Err(DofMapError::InvariantViolation(format!(
                "rank {}: {} owned dofs for a range of {}",
                self.rank,
                self.cluster_to_process.len(),
                owned_range.end - owned_range.start
            )));
        }
        if self.owners.len() != self.process_to_cluster.len() {
            return Err(DofMapError::InvariantViolation(format!(
                "rank {}: owner table has {} entries for {} dofs",
                self.rank,
                self.owners.len(),
                self.process_to_cluster.len()
            )));
        }
        for (dof, &cluster) in self.process_to_cluster.iter().enumerate() {
            if cluster >= self.ranges.n_dofs() {
                return Err(DofMapError::InvariantViolation(format!(
                    "rank {}: dof {dof} maps to {cluster} outside [0, {})",
                    self.rank,
                    self.ranges.n_dofs()
                )));
            }
            let in_own_range = owned_range.contains(&cluster);
            if in_own_range != (self.owners[dof] == self.rank) {
                return Err(DofMapError::InvariantViolation(format!(
                    "rank {}: dof {dof} (owner {}) maps to {cluster}, own range {owned_range:?}",
                    self.rank, self.owners[dof]
                )));
            }
        }
        for (offset, &dof) in self.cluster_to_process.iter().enumerate() {
            let cluster = owned_range.start + offset as u64;
            if self.global_cluster(dof) != Some(cluster) {
                return Err(DofMapError::InvariantViolation(format!(
                    "rank {}: cluster {cluster} maps to {dof} which maps back to {:?}",
                    self.rank,
                    self.global_cluster(dof)
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ranges_follow_counts() {
        let r = ClusterRanges::from_counts(&[3, 2]);
        assert_eq!(r.firsts(), &[0, 3]);
        assert_eq!(r.lasts(), &[2, 4]);
        assert_eq!(r.n_dofs(), 5);
        assert!(r.validate_invariants().is_ok());
    }

    #[test]
    fn zero_count_ranks_are_degenerate() {
        let r = ClusterRanges::from_counts(&[0, 4, 0, 0, 2]);
        assert_eq!(r.firsts(), &[0, 0, 4, 4, 4]);
        assert_eq!(r.lasts(), &[0, 3, 4, 4, 5]);
        assert_eq!(r.range(0), 0..0);
        assert_eq!(r.range(2), 4..4);
        assert_eq!(r.range(4), 4..6);
        assert_eq!(r.rank_of(4), Some(4));
        assert_eq!(r.rank_of(0), Some(1));
        assert_eq!(r.rank_of(6), None);
        assert!(r.validate_invariants().is_ok());
    }

    #[test]
    fn all_empty() {
        let r = ClusterRanges::from_counts(&[0, 0]);
        assert_eq!(r.n_dofs(), 0);
        assert!(r.validate_invariants().is_ok());
    }

    proptest! {
        #[test]
        fn ranges_partition_the_cluster(counts in proptest::collection::vec(0u64..20, 1..12)) {
            let r = ClusterRanges::from_counts(&counts);
            prop_assert_eq!(r.n_dofs(), counts.iter().sum::<u64>());
            prop_assert!(r.validate_invariants().is_ok());
            let mut covered = vec![0u32; r.n_dofs() as usize];
            for rank in 0..counts.len() {
                for c in r.range(rank) {
                    covered[c as usize] += 1;
                    prop_assert_eq!(r.rank_of(c), Some(rank));
                }
            }
            prop_assert!(covered.iter().all(|&n| n == 1));
        }
    }

    #[test]
    fn table_lookups() {
        let ranges = ClusterRanges::from_counts(&[2, 1]);
        let table = DofTable::new(
            1,
            ranges,
            vec![1, 2],
            vec![DofId::new(1)],
            vec![0, 1],
        );
        assert!(table.validate_invariants().is_ok());
        assert_eq!(table.local_of_cluster(2), Some(DofId::new(1)));
        assert_eq!(table.local_of_cluster(1), None);
        assert_eq!(table.ghost_dofs().collect::<Vec<_>>(), vec![DofId::new(0)]);
        assert_eq!(table.neighbor_ranks().into_iter().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn table_with_ghost_in_own_range_is_rejected() {
        let ranges = ClusterRanges::from_counts(&[1, 1]);
        let table = DofTable::new(1, ranges, vec![1, 1], vec![DofId::new(1)], vec![0, 1]);
        assert!(table.validate_invariants().is_err());
    }
}

//! Ownership metadata for local dofs.
//!
//! The [`DofOwnership`] map records, for every dof that is *not* owned by the
//! current rank, which rank owns it and which entity to address when asking
//! that rank for the dof's cluster index. Dofs without an entry are owned
//! locally.

use crate::dof_error::DofMapError;
use crate::topology::ids::DofId;
use crate::topology::remote::RemoteTarget;

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DofOwnership {
    my_rank: usize,
    entries: Vec<Option<RemoteTarget>>,
}

impl DofOwnership {
    /// Create an ownership map for `n_dofs` local dofs, all owned by `my_rank`.
    pub fn new(n_dofs: usize, my_rank: usize) -> Self {
        Self {
            my_rank,
            entries: vec![None; n_dofs],
        }
    }

    /// Number of tracked dofs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn slot(&mut self, dof: DofId) -> Result<&mut Option<RemoteTarget>, DofMapError> {
        let len = self.entries.len();
        let rank = self.my_rank;
        self.entries
            .get_mut(dof.get())
            .ok_or(DofMapError::DofOutOfRange {
                rank,
                dof: dof.get(),
                len,
            })
    }

    /// Record a remote owner candidate, keeping the smallest target when repeated.
    ///
    /// Candidates whose rank is not below `my_rank` leave the dof owned locally.
    pub fn set_owner_min(&mut self, dof: DofId, target: RemoteTarget) -> Result<(), DofMapError> {
        if target.rank >= self.my_rank {
            self.slot(dof)?;
            return Ok(());
        }
        let slot = self.slot(dof)?;
        *slot = Some(match *slot {
            Some(existing) => existing.min(target),
            None => target,
        });
        Ok(())
    }

    /// Record a remote owner candidate for a dof no owned element touches.
    ///
    /// Such a dof is never owned locally, whatever the candidate's rank.
    pub fn set_ghost_owner_min(
        &mut self,
        dof: DofId,
        target: RemoteTarget,
    ) -> Result<(), DofMapError> {
        if target.rank == self.my_rank {
            return Err(DofMapError::InvariantViolation(format!(
                "rank {}: ghost {dof} cannot be owned by its own rank",
                self.my_rank
            )));
        }
        let slot = self.slot(dof)?;
        *slot = Some(match *slot {
            Some(existing) => existing.min(target),
            None => target,
        });
        Ok(())
    }

    /// Where to ask about a dof owned elsewhere.
    pub fn remote(&self, dof: DofId) -> Option<RemoteTarget> {
        self.entries.get(dof.get()).copied().flatten()
    }

    /// Owning rank of a tracked dof.
    pub fn owner(&self, dof: DofId) -> Option<usize> {
        self.entries
            .get(dof.get())
            .map(|e| e.map_or(self.my_rank, |t| t.rank))
    }

    pub fn is_owned(&self, dof: DofId) -> bool {
        matches!(self.entries.get(dof.get()), Some(None))
    }

    /// Iterate over owned dofs in increasing local order.
    pub fn owned_dofs(&self) -> impl Iterator<Item = DofId> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(idx, entry)| entry.is_none().then_some(DofId::new(idx)))
    }

    /// Iterate over dofs owned elsewhere, with their owner target.
    pub fn ghost_dofs(&self) -> impl Iterator<Item = (DofId, RemoteTarget)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(idx, entry)| entry.map(|t| (DofId::new(idx), t)))
    }

    pub fn n_owned(&self) -> usize {
        self.entries.iter().filter(|e| e.is_none()).count()
    }
}

//! Metadata that identifies a remote copy of a local entity.

use crate::topology::ids::{ElementId, FaceId};
use std::fmt;

/// An element mirrored on this rank whose owner is another rank.
///
/// `element` is the *local* id of the mirrored copy, so its faces can be
/// inspected without communication.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct GhostElement {
    pub rank: usize,
    pub element: ElementId,
}

/// An entity addressed in some rank's local numbering.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum RemoteEntity {
    Face(FaceId),
    Element(ElementId),
}

impl fmt::Display for RemoteEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteEntity::Face(id) => id.fmt(f),
            RemoteEntity::Element(id) => id.fmt(f),
        }
    }
}

/// Where to ask about a dof: an entity in the numbering of `rank`.
///
/// Ordering is by rank first, which is what ownership resolution relies on.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct RemoteTarget {
    pub rank: usize,
    pub entity: RemoteEntity,
}

impl RemoteTarget {
    pub fn face(rank: usize, face: FaceId) -> Self {
        Self {
            rank,
            entity: RemoteEntity::Face(face),
        }
    }

    pub fn element(rank: usize, element: ElementId) -> Self {
        Self {
            rank,
            entity: RemoteEntity::Element(element),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_order_by_rank_first() {
        let a = RemoteTarget::element(0, ElementId::new(50));
        let b = RemoteTarget::face(1, FaceId::new(0));
        assert!(a < b);
        assert!(RemoteTarget::face(2, FaceId::new(1)) < RemoteTarget::face(2, FaceId::new(4)));
    }
}

//! The mesh-side contract consumed by the dof-table builder.
//!
//! A [`PartitionedMesh`] is one rank's view of a partitioned mesh: the
//! elements it owns, a layer of ghost elements mirrored from neighbouring
//! ranks, and the facets/edges/vertices of all of them in a local numbering.
//!
//! Ghost lists of vertices and edges must name, for every entity touched by
//! an owned element, the ranks of the ghost elements touching it. When a rank
//! is not the lowest rank touching an entity, the list must contain at least
//! one lower rank; vertex-connected ghost layers always satisfy this.

use crate::dof_error::DofMapError;
use crate::topology::ids::{EdgeId, ElementId, FaceId, VertexId};
use crate::topology::remote::GhostElement;

/// One element adjacent to a facet, with the facet's position in
/// [`PartitionedMesh::element_faces`] of that element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FaceSide {
    pub element: ElementId,
    pub local_face: usize,
}

/// The two sides of an inter-process face.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InterProcessSides {
    /// The locally owned element.
    pub owned: FaceSide,
    /// The mirrored element; its owner is the neighbour rank of the face.
    pub ghost: GhostElement,
}

pub trait PartitionedMesh {
    /// Rank whose partition this is.
    fn rank(&self) -> usize;
    /// Topological dimension of the cells (1, 2 or 3).
    fn dimension(&self) -> usize;

    fn n_elements(&self) -> usize;
    fn n_faces(&self) -> usize;
    fn element_owner(&self, element: ElementId) -> Result<usize, DofMapError>;
    fn element_vertices(&self, element: ElementId) -> Result<&[VertexId], DofMapError>;
    /// True edges of the element; empty below 3-D.
    fn element_edges(&self, element: ElementId) -> Result<&[EdgeId], DofMapError>;
    fn element_faces(&self, element: ElementId) -> Result<&[FaceId], DofMapError>;

    /// Elements adjacent to a facet (one on the domain boundary, two inside).
    fn face_sides(&self, face: FaceId) -> Result<&[FaceSide], DofMapError>;
    /// Facet vertices in face-local order.
    fn face_vertices(&self, face: FaceId) -> Result<&[VertexId], DofMapError>;
    /// Facet edges in face-local order; empty below 3-D.
    fn face_edges(&self, face: FaceId) -> Result<&[EdgeId], DofMapError>;
    fn edge_vertices(&self, edge: EdgeId) -> Result<[VertexId; 2], DofMapError>;

    fn vertex_ghosts(&self, vertex: VertexId) -> Result<&[GhostElement], DofMapError>;
    fn edge_ghosts(&self, edge: EdgeId) -> Result<&[GhostElement], DofMapError>;
    fn vertex_coordinates(&self, vertex: VertexId) -> Result<[f64; 3], DofMapError>;

    /// Id of a local facet in the numbering of `rank`, if that rank stores it.
    fn face_id_in_partition(&self, face: FaceId, rank: usize) -> Option<FaceId>;
    /// Id of a local element in the numbering of `rank`, if that rank stores it.
    fn element_id_in_partition(&self, element: ElementId, rank: usize) -> Option<ElementId>;

    fn is_ghost_element(&self, element: ElementId) -> Result<bool, DofMapError> {
        Ok(self.element_owner(element)? != self.rank())
    }

    fn elements(&self) -> impl Iterator<Item = ElementId> + '_ {
        (0..self.n_elements()).map(ElementId::new)
    }

    fn owned_elements(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.elements()
            .filter(|&e| matches!(self.element_owner(e), Ok(owner) if owner == self.rank()))
    }

    fn ghost_elements(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.elements()
            .filter(|&e| matches!(self.element_owner(e), Ok(owner) if owner != self.rank()))
    }

    /// Facets shared by exactly one owned element and one ghost element.
    fn inter_process_faces(&self) -> impl Iterator<Item = FaceId> + '_ {
        (0..self.n_faces())
            .map(FaceId::new)
            .filter(|&f| self.inter_process_sides(f).is_ok())
    }

    /// Split an inter-process face into its owned and ghost sides.
    fn inter_process_sides(&self, face: FaceId) -> Result<InterProcessSides, DofMapError> {
        let rank = self.rank();
        let invalid = |reason: String| DofMapError::InvalidInterProcessFace {
            rank,
            face: face.get(),
            reason,
        };
        let sides = self.face_sides(face)?;
        if sides.len() != 2 {
            return Err(invalid(format!("{} adjacent elements", sides.len())));
        }
        let owners = [
            self.element_owner(sides[0].element)?,
            self.element_owner(sides[1].element)?,
        ];
        match (owners[0] == rank, owners[1] == rank) {
            (true, false) => Ok(InterProcessSides {
                owned: sides[0],
                ghost: GhostElement {
                    rank: owners[1],
                    element: sides[1].element,
                },
            }),
            (false, true) => Ok(InterProcessSides {
                owned: sides[1],
                ghost: GhostElement {
                    rank: owners[0],
                    element: sides[0].element,
                },
            }),
            (true, true) => Err(invalid("both sides are owned".into())),
            (false, false) => Err(invalid("both sides are ghosts".into())),
        }
    }
}

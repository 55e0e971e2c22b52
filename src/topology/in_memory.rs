//! In-memory [`PartitionedMesh`] built by the structured generators.

use crate::dof_error::DofMapError;
use crate::topology::ids::{EdgeId, ElementId, FaceId, VertexId};
use crate::topology::mesh::{FaceSide, PartitionedMesh};
use crate::topology::remote::GhostElement;

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ElementRecord {
    pub owner: usize,
    pub vertices: Vec<VertexId>,
    pub edges: Vec<EdgeId>,
    pub faces: Vec<FaceId>,
    /// `(rank, id)` pairs sorted by rank, this rank excluded.
    pub ids_elsewhere: Vec<(usize, ElementId)>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FaceRecord {
    pub vertices: Vec<VertexId>,
    pub edges: Vec<EdgeId>,
    pub sides: Vec<FaceSide>,
    /// `(rank, id)` pairs sorted by rank, this rank excluded.
    pub ids_elsewhere: Vec<(usize, FaceId)>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VertexRecord {
    pub coords: [f64; 3],
    pub ghosts: Vec<GhostElement>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EdgeRecord {
    pub vertices: [VertexId; 2],
    pub ghosts: Vec<GhostElement>,
}

/// One rank's partition with its ghost layer, stored as flat entity tables.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InMemoryPartition {
    pub(crate) rank: usize,
    pub(crate) dimension: usize,
    pub(crate) elements: Vec<ElementRecord>,
    pub(crate) faces: Vec<FaceRecord>,
    pub(crate) edges: Vec<EdgeRecord>,
    pub(crate) vertices: Vec<VertexRecord>,
}

impl InMemoryPartition {
    pub(crate) fn empty(rank: usize, dimension: usize) -> Self {
        Self {
            rank,
            dimension,
            elements: Vec::new(),
            faces: Vec::new(),
            edges: Vec::new(),
            vertices: Vec::new(),
        }
    }

    pub fn n_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn n_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn n_owned_elements(&self) -> usize {
        self.elements.iter().filter(|e| e.owner == self.rank).count()
    }

    fn element(&self, element: ElementId) -> Result<&ElementRecord, DofMapError> {
        self.elements
            .get(element.get())
            .ok_or(DofMapError::ElementNotFound {
                rank: self.rank,
                element: element.get(),
            })
    }

    fn face(&self, face: FaceId) -> Result<&FaceRecord, DofMapError> {
        self.faces.get(face.get()).ok_or(DofMapError::FaceNotFound {
            rank: self.rank,
            face: face.get(),
        })
    }

    fn edge(&self, edge: EdgeId) -> Result<&EdgeRecord, DofMapError> {
        self.edges.get(edge.get()).ok_or(DofMapError::EdgeNotFound {
            rank: self.rank,
            edge: edge.get(),
        })
    }

    fn vertex(&self, vertex: VertexId) -> Result<&VertexRecord, DofMapError> {
        self.vertices
            .get(vertex.get())
            .ok_or(DofMapError::VertexNotFound {
                rank: self.rank,
                vertex: vertex.get(),
            })
    }
}

fn lookup<T: Copy>(table: &[(usize, T)], rank: usize) -> Option<T> {
    table
        .binary_search_by_key(&rank, |&(r, _)| r)
        .ok()
        .map(|idx| table[idx].1)
}

impl PartitionedMesh for InMemoryPartition {
    fn rank(&self) -> usize {
        self.rank
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn n_elements(&self) -> usize {
        self.elements.len()
    }

    fn n_faces(&self) -> usize {
        self.faces.len()
    }

    fn element_owner(&self, element: ElementId) -> Result<usize, DofMapError> {
        self.element(element).map(|e| e.owner)
    }

    fn element_vertices(&self, element: ElementId) -> Result<&[VertexId], DofMapError> {
        self.element(element).map(|e| e.vertices.as_slice())
    }

    fn element_edges(&self, element: ElementId) -> Result<&[EdgeId], DofMapError> {
        self.element(element).map(|e| e.edges.as_slice())
    }

    fn element_faces(&self, element: ElementId) -> Result<&[FaceId], DofMapError> {
        self.element(element).map(|e| e.faces.as_slice())
    }

    fn face_sides(&self, face: FaceId) -> Result<&[FaceSide], DofMapError> {
        self.face(face).map(|f| f.sides.as_slice())
    }

    fn face_vertices(&self, face: FaceId) -> Result<&[VertexId], DofMapError> {
        self.face(face).map(|f| f.vertices.as_slice())
    }

    fn face_edges(&self, face: FaceId) -> Result<&[EdgeId], DofMapError> {
        self.face(face).map(|f| f.edges.as_slice())
    }

    fn edge_vertices(&self, edge: EdgeId) -> Result<[VertexId; 2], DofMapError> {
        self.edge(edge).map(|e| e.vertices)
    }

    fn vertex_ghosts(&self, vertex: VertexId) -> Result<&[GhostElement], DofMapError> {
        self.vertex(vertex).map(|v| v.ghosts.as_slice())
    }

    fn edge_ghosts(&self, edge: EdgeId) -> Result<&[GhostElement], DofMapError> {
        self.edge(edge).map(|e| e.ghosts.as_slice())
    }

    fn vertex_coordinates(&self, vertex: VertexId) -> Result<[f64; 3], DofMapError> {
        self.vertex(vertex).map(|v| v.coords)
    }

    fn face_id_in_partition(&self, face: FaceId, rank: usize) -> Option<FaceId> {
        if rank == self.rank {
            return Some(face);
        }
        self.faces
            .get(face.get())
            .and_then(|f| lookup(&f.ids_elsewhere, rank))
    }

    fn element_id_in_partition(&self, element: ElementId, rank: usize) -> Option<ElementId> {
        if rank == self.rank {
            return Some(element);
        }
        self.elements
            .get(element.get())
            .and_then(|e| lookup(&e.ids_elsewhere, rank))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_uses_sorted_rank_table() {
        let table = [(0, FaceId::new(4)), (2, FaceId::new(9)), (5, FaceId::new(1))];
        assert_eq!(lookup(&table, 2), Some(FaceId::new(9)));
        assert_eq!(lookup(&table, 3), None);
    }

    #[test]
    fn missing_entities_are_errors() {
        let part = InMemoryPartition::empty(3, 2);
        assert_eq!(
            part.face_vertices(FaceId::new(0)),
            Err(DofMapError::FaceNotFound { rank: 3, face: 0 })
        );
        assert!(part.element_owner(ElementId::new(1)).is_err());
        assert_eq!(part.inter_process_faces().count(), 0);
    }
}

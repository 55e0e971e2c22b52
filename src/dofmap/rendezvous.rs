//! Lowest-rank owner discovery for dofs on inter-process faces.
//!
//! A vertex or edge can be touched by more ranks than the two sharing one
//! face. Starting from the face's neighbour rank, the matcher scans the
//! entity's ghost list and, for every lower rank, finds a face of that rank's
//! ghost element containing the entity and translates it into that rank's
//! numbering. No messages are exchanged here.

use crate::dof_error::DofMapError;
use crate::topology::ids::{EdgeId, FaceId, VertexId};
use crate::topology::mesh::PartitionedMesh;
use crate::topology::remote::GhostElement;

/// Lowest rank found for a dof and a face containing the dof in that rank's numbering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RendezvousWinner {
    pub rank: usize,
    pub face: FaceId,
}

pub struct Rendezvous<'m, M: PartitionedMesh> {
    mesh: &'m M,
}

impl<'m, M: PartitionedMesh> Rendezvous<'m, M> {
    pub fn new(mesh: &'m M) -> Self {
        Self { mesh }
    }

    fn remote_face(&self, face: FaceId, rank: usize) -> Result<FaceId, DofMapError> {
        self.mesh
            .face_id_in_partition(face, rank)
            .ok_or_else(|| DofMapError::MissingRemoteId {
                rank: self.mesh.rank(),
                other: rank,
                entity: face.to_string(),
            })
    }

    /// The face's own neighbour, before any ghost list is consulted.
    pub fn face_interior(&self, face: FaceId, neighbor: usize) -> Result<RendezvousWinner, DofMapError> {
        Ok(RendezvousWinner {
            rank: neighbor,
            face: self.remote_face(face, neighbor)?,
        })
    }

    fn scan(
        &self,
        mut best: RendezvousWinner,
        ghosts: &[GhostElement],
        describe: impl Fn() -> String,
        contains: impl Fn(FaceId) -> Result<bool, DofMapError>,
    ) -> Result<RendezvousWinner, DofMapError> {
        for ghost in ghosts {
            if ghost.rank >= best.rank {
                continue;
            }
            let mut found = None;
            for &f in self.mesh.element_faces(ghost.element)? {
                if contains(f)? {
                    found = Some(f);
                    break;
                }
            }
            let Some(face) = found else {
                let err = DofMapError::NoMatchingGhostFace {
                    rank: self.mesh.rank(),
                    ghost_rank: ghost.rank,
                    element: ghost.element.get(),
                    entity: describe(),
                };
                log::error!("{err}");
                return Err(err);
            };
            best = RendezvousWinner {
                rank: ghost.rank,
                face: self.remote_face(face, ghost.rank)?,
            };
            log::trace!(
                "rank {}: {} now resolves on rank {} ({})",
                self.mesh.rank(),
                describe(),
                best.rank,
                best.face
            );
        }
        Ok(best)
    }

    /// Winner for a dof located on `vertex` of the inter-process `face`.
    pub fn vertex(
        &self,
        face: FaceId,
        neighbor: usize,
        vertex: VertexId,
    ) -> Result<RendezvousWinner, DofMapError> {
        let start = self.face_interior(face, neighbor)?;
        self.scan(
            start,
            self.mesh.vertex_ghosts(vertex)?,
            || vertex.to_string(),
            |f| Ok(self.mesh.face_vertices(f)?.contains(&vertex)),
        )
    }

    /// Winner for a dof located on `edge` of the inter-process `face`.
    /// Below 3-D edges carry no dofs of their own and the neighbour wins.
    pub fn edge(
        &self,
        face: FaceId,
        neighbor: usize,
        edge: EdgeId,
    ) -> Result<RendezvousWinner, DofMapError> {
        let start = self.face_interior(face, neighbor)?;
        if self.mesh.dimension() < 3 {
            return Ok(start);
        }
        self.scan(
            start,
            self.mesh.edge_ghosts(edge)?,
            || edge.to_string(),
            |f| Ok(self.mesh.face_edges(f)?.contains(&edge)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::meshgen::{GhostLayer, StructuredGrid};
    use crate::topology::in_memory::InMemoryPartition;

    fn centre_vertex(part: &InMemoryPartition) -> VertexId {
        (0..part.n_vertices())
            .map(VertexId::new)
            .find(|&v| part.vertex_coordinates(v).unwrap() == [0.5, 0.5, 0.0])
            .unwrap()
    }

    fn winner_for_centre(part: &InMemoryPartition) -> RendezvousWinner {
        let v = centre_vertex(part);
        let face = part
            .inter_process_faces()
            .find(|&f| part.face_vertices(f).unwrap().contains(&v))
            .unwrap();
        let neighbor = part.inter_process_sides(face).unwrap().ghost.rank;
        Rendezvous::new(part).vertex(face, neighbor, v).unwrap()
    }

    #[test]
    fn vertex_layer_finds_diagonal_owner() {
        let grid = StructuredGrid::unit_square(2, 2).unwrap();
        let parts = grid.partition(&[0, 1, 1, 2], 3, GhostLayer::Vertices).unwrap();
        let w = winner_for_centre(&parts[2]);
        assert_eq!(w.rank, 0);
        let on_owner = parts[0].face_vertices(w.face).unwrap();
        assert!(on_owner.contains(&centre_vertex(&parts[0])));
    }

    #[test]
    fn face_layer_stops_at_face_neighbour() {
        let grid = StructuredGrid::unit_square(2, 2).unwrap();
        let parts = grid.partition(&[0, 1, 1, 2], 3, GhostLayer::Faces).unwrap();
        assert_eq!(winner_for_centre(&parts[2]).rank, 1);
        assert_eq!(winner_for_centre(&parts[1]).rank, 0);
    }

    #[test]
    fn edges_below_three_dimensions_keep_the_neighbour() {
        let grid = StructuredGrid::unit_square(2, 1).unwrap();
        let parts = grid.partition(&[0, 1], 2, GhostLayer::Faces).unwrap();
        let face = parts[1].inter_process_faces().next().unwrap();
        let w = Rendezvous::new(&parts[1])
            .edge(face, 0, EdgeId::new(0))
            .unwrap();
        assert_eq!(w.rank, 0);
        assert_eq!(Some(w.face), parts[1].face_id_in_partition(face, 0));
    }

    #[test]
    fn ghost_without_matching_face_is_an_error() {
        let grid = StructuredGrid::unit_square(2, 2).unwrap();
        let mut parts = grid.partition(&[0, 1, 1, 2], 3, GhostLayer::Vertices).unwrap();
        let part = &mut parts[2];
        let v = centre_vertex(part);
        let far = (0..part.n_vertices())
            .map(VertexId::new)
            .find(|&u| part.vertex_coordinates(u).unwrap() == [1.0, 0.5, 0.0])
            .unwrap();
        // Claim rank 0's diagonal cell touches a vertex it does not reach.
        let ghost = part.vertex_ghosts(v).unwrap()[0];
        part.vertices[far.get()].ghosts = vec![ghost];
        let face = part
            .inter_process_faces()
            .find(|&f| part.face_vertices(f).unwrap().contains(&far))
            .unwrap();
        let err = Rendezvous::new(&*part).vertex(face, 1, far).unwrap_err();
        assert!(matches!(err, DofMapError::NoMatchingGhostFace { ghost_rank: 0, .. }));
    }
}

//! Which sub-entity of a facet carries a given face-local dof.
//!
//! Face-local numbering (per component) lists the vertex dofs first, vertex
//! by vertex, then the edge dofs (3-D only), then the facet interior.

use crate::data::layout::DofLayout;
use crate::dof_error::DofMapError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FaceDofKind {
    Vertex,
    Edge,
    FaceInterior,
}

/// Classification of one face-local dof.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaceDofClass {
    pub kind: FaceDofKind,
    /// Face-local vertex or edge index; zero for interior dofs.
    pub entity: usize,
    /// Position within the sub-entity's dofs.
    pub position: usize,
}

/// Dof counts of one facet, per component.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaceDofShape {
    pub n_vertices: usize,
    pub n_edges: usize,
    pub per_vertex: usize,
    pub per_edge: usize,
    pub per_interior: usize,
}

impl FaceDofShape {
    /// Shape of a facet with `n_vertices` vertices and `n_edges` edges in a
    /// mesh of dimension `dim`. Modal layouts lump edge dofs into the interior.
    pub fn for_face(layout: &DofLayout, dim: usize, n_vertices: usize, n_edges: usize) -> Self {
        let edges = if dim == 3 { n_edges } else { 0 };
        let per_edge = layout.edge_interior(dim);
        let per_interior = layout.facet_interior(dim);
        if layout.is_modal {
            Self {
                n_vertices,
                n_edges: edges,
                per_vertex: layout.n_dof_per_vertex,
                per_edge: 0,
                per_interior: per_interior + edges * per_edge,
            }
        } else {
            Self {
                n_vertices,
                n_edges: edges,
                per_vertex: layout.n_dof_per_vertex,
                per_edge,
                per_interior,
            }
        }
    }

    pub fn n_vertex_dofs(&self) -> usize {
        self.n_vertices * self.per_vertex
    }

    pub fn n_edge_dofs(&self) -> usize {
        self.n_edges * self.per_edge
    }

    pub fn n_dofs(&self) -> usize {
        self.n_vertex_dofs() + self.n_edge_dofs() + self.per_interior
    }
}

pub fn classify_face_dof(local: usize, shape: &FaceDofShape) -> Result<FaceDofClass, DofMapError> {
    let nv = shape.n_vertex_dofs();
    let ne = shape.n_edge_dofs();
    if local < nv {
        return Ok(FaceDofClass {
            kind: FaceDofKind::Vertex,
            entity: local / shape.per_vertex,
            position: local % shape.per_vertex,
        });
    }
    let rest = local - nv;
    if rest < ne {
        return Ok(FaceDofClass {
            kind: FaceDofKind::Edge,
            entity: rest / shape.per_edge,
            position: rest % shape.per_edge,
        });
    }
    let rest = rest - ne;
    if rest < shape.per_interior {
        return Ok(FaceDofClass {
            kind: FaceDofKind::FaceInterior,
            entity: 0,
            position: rest,
        });
    }
    Err(DofMapError::LocalDofOutOfBounds {
        index: local,
        len: shape.n_dofs(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_face_of_q2_hex() {
        let q2 = DofLayout::lagrange(1, 1, 1, 1);
        let shape = FaceDofShape::for_face(&q2, 3, 4, 4);
        assert_eq!(shape.n_dofs(), 9);
        let kinds: Vec<_> = (0..9)
            .map(|i| classify_face_dof(i, &shape).unwrap())
            .collect();
        assert_eq!(kinds[3], FaceDofClass { kind: FaceDofKind::Vertex, entity: 3, position: 0 });
        assert_eq!(kinds[5], FaceDofClass { kind: FaceDofKind::Edge, entity: 1, position: 0 });
        assert_eq!(kinds[8].kind, FaceDofKind::FaceInterior);
        assert!(classify_face_dof(9, &shape).is_err());
    }

    #[test]
    fn two_dimensional_faces_have_no_edges() {
        let layout = DofLayout::lagrange(2, 3, 0, 0);
        let shape = FaceDofShape::for_face(&layout, 2, 2, 5);
        assert_eq!(shape.n_edges, 0);
        assert_eq!(shape.n_dofs(), 7);
        let c = classify_face_dof(3, &shape).unwrap();
        assert_eq!((c.kind, c.entity, c.position), (FaceDofKind::Vertex, 1, 1));
        let c = classify_face_dof(6, &shape).unwrap();
        assert_eq!((c.kind, c.position), (FaceDofKind::FaceInterior, 2));
    }

    #[test]
    fn modal_lumps_edges_into_interior() {
        let layout = DofLayout::lagrange(1, 2, 1, 0).modal();
        let shape = FaceDofShape::for_face(&layout, 3, 4, 4);
        assert_eq!(shape.n_dofs(), 4 + 8 + 1);
        let c = classify_face_dof(4, &shape).unwrap();
        assert_eq!((c.kind, c.position), (FaceDofKind::FaceInterior, 0));
    }

    #[test]
    fn point_faces_in_one_dimension() {
        let shape = FaceDofShape::for_face(&DofLayout::p1(), 1, 1, 0);
        assert_eq!(shape.n_dofs(), 1);
        assert_eq!(classify_face_dof(0, &shape).unwrap().kind, FaceDofKind::Vertex);
        assert!(classify_face_dof(1, &shape).is_err());
    }
}

//! Local (per-rank) dof numbering.
//!
//! A [`LocalDofTable`] numbers every dof a rank touches, owned and ghost
//! alike, and attaches a dof point to each of them. Face-local numbering
//! lists the dofs of the face vertices first, then those of the face edges
//! (3-D only), then the face interior; the scalar layout is repeated for
//! every component.
//!
//! A dof is identified across ranks by its dof point, its component and its
//! slot, the position of the dof within the entity carrying it. Several dofs
//! per vertex share one point and differ only by slot.

use crate::data::layout::DofLayout;
use crate::dof_error::DofMapError;
use crate::topology::ids::{DofId, EdgeId, ElementId, FaceId, VertexId};
use crate::topology::mesh::PartitionedMesh;
use std::collections::HashMap;
use std::ops::Range;

/// Physical location attached to a dof.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DofPoint([f64; 3]);

impl DofPoint {
    pub const fn new(coords: [f64; 3]) -> Self {
        Self(coords)
    }

    pub const fn coords(&self) -> [f64; 3] {
        self.0
    }

    /// True if every coordinate differs by at most `tol`.
    pub fn matches(&self, other: &DofPoint, tol: f64) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .all(|(a, b)| (a - b).abs() <= tol)
    }
}

/// Result of a local-to-global lookup: the local dof and its orientation sign.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocalDof {
    pub dof: DofId,
    pub sign: i8,
}

pub trait LocalDofTable {
    fn layout(&self) -> &DofLayout;
    /// Number of local dofs, ghosts included.
    fn n_local_dofs(&self) -> usize;
    /// Dofs per component carried by a face.
    fn n_face_dofs(&self, face: FaceId) -> Result<usize, DofMapError>;
    fn face_local_to_global(
        &self,
        face: FaceId,
        local: usize,
        component: usize,
    ) -> Result<LocalDof, DofMapError>;
    /// Dofs per component carried by an element (closure included).
    fn n_element_dofs(&self, element: ElementId) -> Result<usize, DofMapError>;
    fn element_local_to_global(
        &self,
        element: ElementId,
        local: usize,
        component: usize,
    ) -> Result<LocalDof, DofMapError>;
    fn dof_point(&self, dof: DofId) -> Result<DofPoint, DofMapError>;
    fn dof_component(&self, dof: DofId) -> Result<usize, DofMapError>;
    /// Position of the dof within its vertex, edge, face or cell. Must not
    /// depend on the rank-local numbering.
    fn dof_slot(&self, dof: DofId) -> Result<usize, DofMapError>;
}

fn lex_less(a: &[f64; 3], b: &[f64; 3]) -> bool {
    a.iter()
        .zip(b.iter())
        .find(|(x, y)| x != y)
        .is_some_and(|(x, y)| x < y)
}

/// Lexicographically smallest and largest of a set of points.
fn canonical_segment(points: &[[f64; 3]]) -> ([f64; 3], [f64; 3]) {
    let mut lo = points[0];
    let mut hi = points[0];
    for p in &points[1..] {
        if lex_less(p, &lo) {
            lo = *p;
        }
        if lex_less(&hi, p) {
            hi = *p;
        }
    }
    (lo, hi)
}

#[derive(Default)]
struct Numberer {
    points: Vec<DofPoint>,
    slots: Vec<usize>,
}

impl Numberer {
    /// Reserve `n` scalar dofs spread evenly strictly inside `a..b`
    /// (or all at `a` when the segment is degenerate).
    fn assign(&mut self, n: usize, (a, b): ([f64; 3], [f64; 3])) -> Range<usize> {
        let start = self.points.len();
        for k in 0..n {
            let t = (k + 1) as f64 / (n + 1) as f64;
            let mut p = [0.0; 3];
            for d in 0..3 {
                p[d] = a[d] + (b[d] - a[d]) * t;
            }
            if a == b {
                p = a;
            }
            self.points.push(DofPoint::new(p));
            self.slots.push(k);
        }
        start..self.points.len()
    }
}

fn range_of<K: std::hash::Hash + Eq + Copy>(
    map: &HashMap<K, Range<usize>>,
    key: K,
    rank: usize,
    describe: impl Fn(K) -> String,
) -> Result<Range<usize>, DofMapError> {
    map.get(&key)
        .cloned()
        .ok_or_else(|| DofMapError::InvariantViolation(format!(
            "rank {rank}: {} has no dofs assigned",
            describe(key)
        )))
}

/// Concrete [`LocalDofTable`] for any [`PartitionedMesh`].
///
/// Continuous layouts number entity dofs in first-seen order over owned then
/// ghost elements; discontinuous layouts number the interior dofs of owned
/// elements only. Dof points are independent of local vertex order, so the
/// same physical dof gets the same point on every rank.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InMemoryDofTable {
    rank: usize,
    layout: DofLayout,
    points: Vec<DofPoint>,
    slots: Vec<usize>,
    face_dofs: Vec<Vec<(usize, i8)>>,
    element_dofs: Vec<Vec<(usize, i8)>>,
}

impl InMemoryDofTable {
    pub fn build<M: PartitionedMesh>(mesh: &M, layout: DofLayout) -> Result<Self, DofMapError> {
        let dim = mesh.dimension();
        layout.validate(dim)?;
        if layout.is_continuous {
            Self::build_continuous(mesh, layout)
        } else {
            Self::build_discontinuous(mesh, layout)
        }
    }

    fn coords_of<M: PartitionedMesh>(
        mesh: &M,
        vertices: &[VertexId],
    ) -> Result<Vec<[f64; 3]>, DofMapError> {
        vertices
            .iter()
            .map(|&v| mesh.vertex_coordinates(v))
            .collect()
    }

    fn edge_sign<M: PartitionedMesh>(mesh: &M, edge: EdgeId) -> Result<i8, DofMapError> {
        let [a, b] = mesh.edge_vertices(edge)?;
        let (pa, pb) = (mesh.vertex_coordinates(a)?, mesh.vertex_coordinates(b)?);
        Ok(if lex_less(&pb, &pa) { -1 } else { 1 })
    }

    fn build_continuous<M: PartitionedMesh>(
        mesh: &M,
        layout: DofLayout,
    ) -> Result<Self, DofMapError> {
        let dim = mesh.dimension();
        let rank = mesh.rank();
        let mut numberer = Numberer::default();
        let mut vertex_range: HashMap<VertexId, Range<usize>> = HashMap::new();
        let mut edge_range: HashMap<EdgeId, Range<usize>> = HashMap::new();
        let mut facet_range: HashMap<FaceId, Range<usize>> = HashMap::new();
        let mut element_dofs = vec![Vec::new(); mesh.n_elements()];

        let order: Vec<ElementId> = mesh.owned_elements().chain(mesh.ghost_elements()).collect();
        for e in order {
            let mut dofs = Vec::with_capacity(layout.n_local_dof_per_element(dim));
            for &v in mesh.element_vertices(e)? {
                if !vertex_range.contains_key(&v) {
                    let p = mesh.vertex_coordinates(v)?;
                    let r = numberer.assign(layout.n_dof_per_vertex, (p, p));
                    vertex_range.insert(v, r);
                }
                dofs.extend(vertex_range[&v].clone().map(|s| (s, 1)));
            }
            for &edge in mesh.element_edges(e)? {
                if !edge_range.contains_key(&edge) {
                    let [a, b] = mesh.edge_vertices(edge)?;
                    let seg = canonical_segment(&Self::coords_of(mesh, &[a, b])?);
                    let r = numberer.assign(layout.edge_interior(dim), seg);
                    edge_range.insert(edge, r);
                }
                let sign = Self::edge_sign(mesh, edge)?;
                dofs.extend(edge_range[&edge].clone().map(|s| (s, sign)));
            }
            if layout.facet_interior(dim) > 0 {
                for &f in mesh.element_faces(e)? {
                    if !facet_range.contains_key(&f) {
                        let seg = canonical_segment(&Self::coords_of(mesh, mesh.face_vertices(f)?)?);
                        let r = numberer.assign(layout.facet_interior(dim), seg);
                        facet_range.insert(f, r);
                    }
                    dofs.extend(facet_range[&f].clone().map(|s| (s, 1)));
                }
            }
            let seg = canonical_segment(&Self::coords_of(mesh, mesh.element_vertices(e)?)?);
            let interior = numberer.assign(layout.cell_interior(dim), seg);
            dofs.extend(interior.map(|s| (s, 1)));
            element_dofs[e.get()] = dofs;
        }

        let mut face_dofs = Vec::with_capacity(mesh.n_faces());
        for f in (0..mesh.n_faces()).map(FaceId::new) {
            let mut dofs = Vec::new();
            for &v in mesh.face_vertices(f)? {
                let r = range_of(&vertex_range, v, rank, |v| v.to_string())?;
                dofs.extend(r.map(|s| (s, 1)));
            }
            for &edge in mesh.face_edges(f)? {
                let r = range_of(&edge_range, edge, rank, |e| e.to_string())?;
                let sign = Self::edge_sign(mesh, edge)?;
                dofs.extend(r.map(|s| (s, sign)));
            }
            if layout.facet_interior(dim) > 0 {
                let r = range_of(&facet_range, f, rank, |f| f.to_string())?;
                dofs.extend(r.map(|s| (s, 1)));
            }
            face_dofs.push(dofs);
        }

        Ok(Self {
            rank,
            layout,
            points: numberer.points,
            slots: numberer.slots,
            face_dofs,
            element_dofs,
        })
    }

    fn build_discontinuous<M: PartitionedMesh>(
        mesh: &M,
        layout: DofLayout,
    ) -> Result<Self, DofMapError> {
        let dim = mesh.dimension();
        let mut numberer = Numberer::default();
        let mut element_dofs = vec![Vec::new(); mesh.n_elements()];
        let owned: Vec<ElementId> = mesh.owned_elements().collect();
        for e in owned {
            let seg = canonical_segment(&Self::coords_of(mesh, mesh.element_vertices(e)?)?);
            let r = numberer.assign(layout.cell_interior(dim), seg);
            element_dofs[e.get()] = r.map(|s| (s, 1)).collect();
        }
        Ok(Self {
            rank: mesh.rank(),
            layout,
            points: numberer.points,
            slots: numberer.slots,
            face_dofs: vec![Vec::new(); mesh.n_faces()],
            element_dofs,
        })
    }

    pub fn n_scalar_dofs(&self) -> usize {
        self.points.len()
    }

    fn component_ok(&self, component: usize) -> Result<(), DofMapError> {
        if component >= self.layout.n_components {
            return Err(DofMapError::ComponentOutOfBounds {
                component,
                n_components: self.layout.n_components,
            });
        }
        Ok(())
    }

    fn to_local(&self, (scalar, sign): (usize, i8), component: usize) -> LocalDof {
        LocalDof {
            dof: DofId::new(scalar * self.layout.n_components + component),
            sign,
        }
    }
}

impl LocalDofTable for InMemoryDofTable {
    fn layout(&self) -> &DofLayout {
        &self.layout
    }

    fn n_local_dofs(&self) -> usize {
        self.points.len() * self.layout.n_components
    }

    fn n_face_dofs(&self, face: FaceId) -> Result<usize, DofMapError> {
        self.face_dofs
            .get(face.get())
            .map(Vec::len)
            .ok_or(DofMapError::FaceNotFound {
                rank: self.rank,
                face: face.get(),
            })
    }

    fn face_local_to_global(
        &self,
        face: FaceId,
        local: usize,
        component: usize,
    ) -> Result<LocalDof, DofMapError> {
        self.component_ok(component)?;
        let dofs = self.face_dofs.get(face.get()).ok_or(DofMapError::FaceNotFound {
            rank: self.rank,
            face: face.get(),
        })?;
        let entry = dofs.get(local).ok_or(DofMapError::LocalDofOutOfBounds {
            index: local,
            len: dofs.len(),
        })?;
        Ok(self.to_local(*entry, component))
    }

    fn n_element_dofs(&self, element: ElementId) -> Result<usize, DofMapError> {
        self.element_dofs
            .get(element.get())
            .map(Vec::len)
            .ok_or(DofMapError::ElementNotFound {
                rank: self.rank,
                element: element.get(),
            })
    }

    fn element_local_to_global(
        &self,
        element: ElementId,
        local: usize,
        component: usize,
    ) -> Result<LocalDof, DofMapError> {
        self.component_ok(component)?;
        let dofs = self
            .element_dofs
            .get(element.get())
            .ok_or(DofMapError::ElementNotFound {
                rank: self.rank,
                element: element.get(),
            })?;
        let entry = dofs.get(local).ok_or(DofMapError::LocalDofOutOfBounds {
            index: local,
            len: dofs.len(),
        })?;
        Ok(self.to_local(*entry, component))
    }

    fn dof_point(&self, dof: DofId) -> Result<DofPoint, DofMapError> {
        self.points
            .get(dof.get() / self.layout.n_components)
            .copied()
            .ok_or(DofMapError::DofOutOfRange {
                rank: self.rank,
                dof: dof.get(),
                len: self.n_local_dofs(),
            })
    }

    fn dof_component(&self, dof: DofId) -> Result<usize, DofMapError> {
        if dof.get() >= self.n_local_dofs() {
            return Err(DofMapError::DofOutOfRange {
                rank: self.rank,
                dof: dof.get(),
                len: self.n_local_dofs(),
            });
        }
        Ok(dof.get() % self.layout.n_components)
    }

    fn dof_slot(&self, dof: DofId) -> Result<usize, DofMapError> {
        self.slots
            .get(dof.get() / self.layout.n_components)
            .copied()
            .ok_or(DofMapError::DofOutOfRange {
                rank: self.rank,
                dof: dof.get(),
                len: self.n_local_dofs(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_match_within_tolerance() {
        let a = DofPoint::new([1.0, 2.0, 3.0]);
        let b = DofPoint::new([1.0 + 5e-10, 2.0, 3.0 - 5e-10]);
        assert!(a.matches(&b, 1e-9));
        assert!(!a.matches(&DofPoint::new([1.0, 2.0 + 1e-6, 3.0]), 1e-9));
    }

    #[test]
    fn canonical_segment_ignores_input_order() {
        let pts = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 0.0], [1.0, 1.0, 0.0]];
        let mut rev = pts;
        rev.reverse();
        assert_eq!(canonical_segment(&pts), canonical_segment(&rev));
        assert_eq!(canonical_segment(&pts), ([0.0, 0.0, 0.0], [1.0, 1.0, 0.0]));
    }

    #[test]
    fn numberer_spreads_points_inside_segment() {
        let mut n = Numberer::default();
        let r = n.assign(3, ([0.0; 3], [4.0, 0.0, 0.0]));
        assert_eq!(r, 0..3);
        let xs: Vec<f64> = n.points.iter().map(|p| p.coords()[0]).collect();
        assert_eq!(xs, vec![1.0, 2.0, 3.0]);
        assert_eq!(n.slots, vec![0, 1, 2]);
    }

    #[test]
    fn dofs_sharing_a_vertex_differ_by_slot() {
        use crate::algs::meshgen::{GhostLayer, StructuredGrid};
        let grid = StructuredGrid::interval(2).unwrap();
        let parts = grid.partition(&[0, 0], 1, GhostLayer::Faces).unwrap();
        let table = InMemoryDofTable::build(&parts[0], DofLayout::lagrange(2, 0, 0, 0)).unwrap();
        assert_eq!(table.n_local_dofs(), 6);
        let a = DofId::new(0);
        let b = DofId::new(1);
        assert_eq!(table.dof_point(a).unwrap(), table.dof_point(b).unwrap());
        assert_eq!(table.dof_slot(a).unwrap(), 0);
        assert_eq!(table.dof_slot(b).unwrap(), 1);
        assert!(table.dof_slot(DofId::new(6)).is_err());
    }
}

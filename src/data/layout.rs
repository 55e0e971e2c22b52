//! Basis description: how many dofs live on each kind of mesh entity.

use crate::dof_error::DofMapError;

/// Dof counts per topological entity for one scalar component.
///
/// Vector-valued fields replicate the scalar layout `n_components` times.
/// Counts are indexed by entity dimension, so in a 2-D mesh the facet
/// interior dofs are `n_dof_per_edge` and the cell interior dofs are
/// `n_dof_per_face`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DofLayout {
    pub n_dof_per_vertex: usize,
    pub n_dof_per_edge: usize,
    pub n_dof_per_face: usize,
    pub n_dof_per_volume: usize,
    pub n_components: usize,
    /// Modal bases do not split facet dofs by sub-entity.
    pub is_modal: bool,
    /// Continuous bases share dofs between neighbouring elements.
    pub is_continuous: bool,
}

impl DofLayout {
    /// Continuous nodal layout of order 1 (one dof per vertex).
    pub fn p1() -> Self {
        Self::lagrange(1, 0, 0, 0)
    }

    /// Continuous nodal layout with the given per-entity counts.
    pub fn lagrange(vertex: usize, edge: usize, face: usize, volume: usize) -> Self {
        Self {
            n_dof_per_vertex: vertex,
            n_dof_per_edge: edge,
            n_dof_per_face: face,
            n_dof_per_volume: volume,
            n_components: 1,
            is_modal: false,
            is_continuous: true,
        }
    }

    /// Discontinuous layout: every dof lives in the cell interior.
    pub fn discontinuous(dim: usize, n_local_dof_per_element: usize) -> Self {
        let mut layout = Self::lagrange(0, 0, 0, 0);
        match dim {
            1 => layout.n_dof_per_edge = n_local_dof_per_element,
            2 => layout.n_dof_per_face = n_local_dof_per_element,
            _ => layout.n_dof_per_volume = n_local_dof_per_element,
        }
        layout.is_continuous = false;
        layout
    }

    pub fn with_components(mut self, n_components: usize) -> Self {
        self.n_components = n_components;
        self
    }

    pub fn modal(mut self) -> Self {
        self.is_modal = true;
        self
    }

    /// Dofs on the interior of a true edge. Below 3-D edges are facets or
    /// cells and their dofs are counted there instead.
    pub fn edge_interior(&self, dim: usize) -> usize {
        if dim == 3 { self.n_dof_per_edge } else { 0 }
    }

    /// Dofs on the interior of a facet (codimension-one entity).
    pub fn facet_interior(&self, dim: usize) -> usize {
        match dim {
            2 => self.n_dof_per_edge,
            3 => self.n_dof_per_face,
            _ => 0,
        }
    }

    /// Dofs on the interior of a cell.
    pub fn cell_interior(&self, dim: usize) -> usize {
        match dim {
            1 => self.n_dof_per_edge,
            2 => self.n_dof_per_face,
            _ => self.n_dof_per_volume,
        }
    }

    /// Scalar dofs carried by one facet with the given sub-entity counts.
    pub fn n_face_dofs(&self, dim: usize, n_vertices: usize, n_edges: usize) -> usize {
        n_vertices * self.n_dof_per_vertex
            + n_edges * self.edge_interior(dim)
            + self.facet_interior(dim)
    }

    /// Scalar dofs carried by one element with the given sub-entity counts.
    pub fn n_element_dofs(
        &self,
        dim: usize,
        n_vertices: usize,
        n_edges: usize,
        n_faces: usize,
    ) -> usize {
        n_vertices * self.n_dof_per_vertex
            + n_edges * self.edge_interior(dim)
            + n_faces * self.facet_interior(dim)
            + self.cell_interior(dim)
    }

    /// Dofs per element over all components, for a tensor-product cell.
    pub fn n_local_dof_per_element(&self, dim: usize) -> usize {
        let (nv, ne, nf) = match dim {
            1 => (2, 0, 2),
            2 => (4, 0, 4),
            _ => (8, 12, 6),
        };
        self.n_element_dofs(dim, nv, ne, nf) * self.n_components
    }

    /// Reject layouts no dof table can be built from.
    pub fn validate(&self, dim: usize) -> Result<(), DofMapError> {
        if !(1..=3).contains(&dim) {
            return Err(DofMapError::InvalidLayout(format!(
                "mesh dimension {dim} is not supported"
            )));
        }
        if self.n_components == 0 {
            return Err(DofMapError::InvalidLayout(
                "at least one component is required".into(),
            ));
        }
        if self.n_local_dof_per_element(dim) == 0 {
            return Err(DofMapError::InvalidLayout(format!(
                "no local dofs per element in dimension {dim}"
            )));
        }
        if !self.is_continuous
            && (self.n_dof_per_vertex > 0
                || self.edge_interior(dim) > 0
                || self.facet_interior(dim) > 0)
        {
            return Err(DofMapError::InvalidLayout(
                "discontinuous layouts carry cell-interior dofs only".into(),
            ));
        }
        Ok(())
    }
}

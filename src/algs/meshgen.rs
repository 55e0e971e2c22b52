//! Structured tensor-product grids and their partitioning into per-rank meshes.
//!
//! [`StructuredGrid`] builds the global topology of an interval, a quad grid
//! or a hex grid. [`StructuredGrid::partition`] then cuts it by a per-cell
//! owner array into one [`InMemoryPartition`] per rank, with a ghost layer,
//! rank-local numbering and the cross-partition id tables the dof builder
//! relies on. Local ids are assigned in first-seen order starting from each
//! rank's own cells, so the same entity generally has different ids on
//! different ranks.

use crate::dof_error::DofMapError;
use crate::topology::ids::{EdgeId, ElementId, FaceId, VertexId};
use crate::topology::in_memory::{
    EdgeRecord, ElementRecord, FaceRecord, InMemoryPartition, VertexRecord,
};
use crate::topology::mesh::FaceSide;
use crate::topology::remote::GhostElement;
use itertools::Itertools;
use std::collections::{BTreeSet, HashMap};

/// Which neighbours of owned cells each rank mirrors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum GhostLayer {
    /// Cells sharing a facet with an owned cell. Where a vertex or edge of an
    /// owned cell is touched by a lower rank but no such facet neighbour is
    /// mirrored, one cell of the lowest touching rank is mirrored as well, so
    /// a rank never takes a shared dof some lower rank also touches.
    Faces,
    /// Cells sharing at least a vertex with an owned cell.
    Vertices,
}

// Reference topology of the tensor cells, in cell-local vertex indices.
const SEGMENT_FACES: [&[usize]; 2] = [&[0], &[1]];
const QUAD_FACES: [&[usize]; 4] = [&[0, 1], &[1, 2], &[2, 3], &[3, 0]];
const HEX_FACES: [&[usize]; 6] = [
    &[0, 1, 2, 3],
    &[4, 5, 6, 7],
    &[0, 1, 5, 4],
    &[1, 2, 6, 5],
    &[2, 3, 7, 6],
    &[3, 0, 4, 7],
];
const HEX_EDGES: [[usize; 2]; 12] = [
    [0, 1],
    [1, 2],
    [2, 3],
    [3, 0],
    [4, 5],
    [5, 6],
    [6, 7],
    [7, 4],
    [0, 4],
    [1, 5],
    [2, 6],
    [3, 7],
];

fn invalid(message: impl Into<String>) -> DofMapError {
    DofMapError::InvalidGrid(message.into())
}

#[derive(Clone, Debug, PartialEq)]
struct GlobalFace {
    vertices: Vec<usize>,
    edges: Vec<usize>,
    cells: Vec<usize>,
}

/// Global topology of a structured grid.
#[derive(Clone, Debug, PartialEq)]
pub struct StructuredGrid {
    dimension: usize,
    shape: [usize; 3],
    coords: Vec<[f64; 3]>,
    cell_vertices: Vec<Vec<usize>>,
    cell_faces: Vec<Vec<usize>>,
    cell_edges: Vec<Vec<usize>>,
    faces: Vec<GlobalFace>,
    edges: Vec<[usize; 2]>,
    vertex_cells: Vec<Vec<usize>>,
    edge_cells: Vec<Vec<usize>>,
}

impl StructuredGrid {
    /// `shape[d]` cells along axis `d` over the box `[min, max]`; axes beyond
    /// `dimension` are ignored.
    pub fn new(
        dimension: usize,
        shape: [usize; 3],
        min: [f64; 3],
        max: [f64; 3],
    ) -> Result<Self, DofMapError> {
        if !(1..=3).contains(&dimension) {
            return Err(invalid(format!("dimension {dimension} is not supported")));
        }
        let mut n = [1usize; 3];
        let mut h = [0.0f64; 3];
        for d in 0..dimension {
            if shape[d] == 0 {
                return Err(invalid(format!("axis {d} has no cells")));
            }
            if max[d] <= min[d] {
                return Err(invalid(format!("axis {d} has an empty extent")));
            }
            n[d] = shape[d];
            h[d] = (max[d] - min[d]) / shape[d] as f64;
        }
        let nv = [
            n[0] + 1,
            if dimension > 1 { n[1] + 1 } else { 1 },
            if dimension > 2 { n[2] + 1 } else { 1 },
        ];
        let vid = |i: usize, j: usize, k: usize| i + nv[0] * (j + nv[1] * k);

        let mut coords = Vec::with_capacity(nv[0] * nv[1] * nv[2]);
        for k in 0..nv[2] {
            for j in 0..nv[1] {
                for i in 0..nv[0] {
                    let mut p = [0.0; 3];
                    for (d, idx) in [i, j, k].into_iter().enumerate().take(dimension) {
                        p[d] = min[d] + h[d] * idx as f64;
                    }
                    coords.push(p);
                }
            }
        }

        let (nx, ny, nz) = match dimension {
            1 => (n[0], 1, 1),
            2 => (n[0], n[1], 1),
            _ => (n[0], n[1], n[2]),
        };
        let mut cell_vertices = Vec::with_capacity(nx * ny * nz);
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    cell_vertices.push(match dimension {
                        1 => vec![vid(i, 0, 0), vid(i + 1, 0, 0)],
                        2 => vec![
                            vid(i, j, 0),
                            vid(i + 1, j, 0),
                            vid(i + 1, j + 1, 0),
                            vid(i, j + 1, 0),
                        ],
                        _ => vec![
                            vid(i, j, k),
                            vid(i + 1, j, k),
                            vid(i + 1, j + 1, k),
                            vid(i, j + 1, k),
                            vid(i, j, k + 1),
                            vid(i + 1, j, k + 1),
                            vid(i + 1, j + 1, k + 1),
                            vid(i, j + 1, k + 1),
                        ],
                    });
                }
            }
        }

        let face_refs: &[&[usize]] = match dimension {
            1 => &SEGMENT_FACES,
            2 => &QUAD_FACES,
            _ => &HEX_FACES,
        };
        let edge_refs: &[[usize; 2]] = if dimension == 3 { &HEX_EDGES } else { &[] };

        let mut edge_index: HashMap<(usize, usize), usize> = HashMap::new();
        let mut edges: Vec<[usize; 2]> = Vec::new();
        let mut cell_edges = Vec::with_capacity(cell_vertices.len());
        for cv in &cell_vertices {
            let mut ids = Vec::with_capacity(edge_refs.len());
            for &[a, b] in edge_refs {
                let (ga, gb) = (cv[a], cv[b]);
                let key = (ga.min(gb), ga.max(gb));
                let id = *edge_index.entry(key).or_insert_with(|| {
                    edges.push([ga, gb]);
                    edges.len() - 1
                });
                ids.push(id);
            }
            cell_edges.push(ids);
        }

        let mut face_index: HashMap<Vec<usize>, usize> = HashMap::new();
        let mut faces: Vec<GlobalFace> = Vec::new();
        let mut cell_faces = Vec::with_capacity(cell_vertices.len());
        for (c, cv) in cell_vertices.iter().enumerate() {
            let mut ids = Vec::with_capacity(face_refs.len());
            for local in face_refs {
                let vertices: Vec<usize> = local.iter().map(|&l| cv[l]).collect();
                let key: Vec<usize> = vertices.iter().copied().sorted().collect();
                let id = match face_index.get(&key) {
                    Some(&id) => id,
                    None => {
                        let face_edges = if dimension == 3 {
                            vertices
                                .iter()
                                .circular_tuple_windows()
                                .map(|(&a, &b)| {
                                    edge_index
                                        .get(&(a.min(b), a.max(b)))
                                        .copied()
                                        .ok_or_else(|| invalid("face edge missing from cell"))
                                })
                                .collect::<Result<Vec<_>, _>>()?
                        } else {
                            Vec::new()
                        };
                        faces.push(GlobalFace {
                            vertices,
                            edges: face_edges,
                            cells: Vec::new(),
                        });
                        face_index.insert(key, faces.len() - 1);
                        faces.len() - 1
                    }
                };
                faces[id].cells.push(c);
                ids.push(id);
            }
            cell_faces.push(ids);
        }

        let mut vertex_cells = vec![Vec::new(); coords.len()];
        for (c, cv) in cell_vertices.iter().enumerate() {
            for &v in cv {
                vertex_cells[v].push(c);
            }
        }
        let mut edge_cells = vec![Vec::new(); edges.len()];
        for (c, ce) in cell_edges.iter().enumerate() {
            for &e in ce {
                edge_cells[e].push(c);
            }
        }

        Ok(Self {
            dimension,
            shape: n,
            coords,
            cell_vertices,
            cell_faces,
            cell_edges,
            faces,
            edges,
            vertex_cells,
            edge_cells,
        })
    }

    /// `n` unit cells on `[0, n]`.
    pub fn interval(n: usize) -> Result<Self, DofMapError> {
        Self::new(1, [n, 1, 1], [0.0; 3], [n as f64, 0.0, 0.0])
    }

    /// `nx` x `ny` cells on the unit square.
    pub fn unit_square(nx: usize, ny: usize) -> Result<Self, DofMapError> {
        Self::new(2, [nx, ny, 1], [0.0; 3], [1.0, 1.0, 0.0])
    }

    /// `nx` x `ny` x `nz` cells on the unit cube.
    pub fn unit_cube(nx: usize, ny: usize, nz: usize) -> Result<Self, DofMapError> {
        Self::new(3, [nx, ny, nz], [0.0; 3], [1.0; 3])
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn n_cells(&self) -> usize {
        self.cell_vertices.len()
    }

    pub fn n_vertices(&self) -> usize {
        self.coords.len()
    }

    pub fn n_faces(&self) -> usize {
        self.faces.len()
    }

    pub fn n_edges(&self) -> usize {
        self.edges.len()
    }

    /// Cell index of the tensor position `(i, j, k)`.
    pub fn cell_at(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.shape[0] * (j + self.shape[1] * k)
    }

    /// Cells sharing at least a vertex with `cell`, `cell` excluded.
    fn vertex_neighbours(&self, cell: usize) -> impl Iterator<Item = usize> + '_ {
        self.cell_vertices[cell]
            .iter()
            .flat_map(move |&v| self.vertex_cells[v].iter().copied())
            .filter(move |&c| c != cell)
    }

    fn face_neighbours(&self, cell: usize) -> impl Iterator<Item = usize> + '_ {
        self.cell_faces[cell]
            .iter()
            .flat_map(move |&f| self.faces[f].cells.iter().copied())
            .filter(move |&c| c != cell)
    }

    /// Split the grid into one partition per rank.
    ///
    /// `owners[c]` is the rank owning cell `c`; ranks without cells get an
    /// empty partition.
    pub fn partition(
        &self,
        owners: &[usize],
        n_ranks: usize,
        layer: GhostLayer,
    ) -> Result<Vec<InMemoryPartition>, DofMapError> {
        if owners.len() != self.n_cells() {
            return Err(invalid(format!(
                "{} owners for {} cells",
                owners.len(),
                self.n_cells()
            )));
        }
        if let Some(&bad) = owners.iter().find(|&&o| o >= n_ranks) {
            return Err(invalid(format!("owner {bad} outside a world of {n_ranks}")));
        }

        let numberings: Vec<LocalNumbering> = (0..n_ranks)
            .map(|rank| self.local_numbering(owners, rank, layer))
            .collect();

        let mut parts = Vec::with_capacity(n_ranks);
        for (rank, numbering) in numberings.iter().enumerate() {
            let elsewhere = |pick: &dyn Fn(&LocalNumbering) -> Option<usize>| -> Vec<(usize, usize)> {
                numberings
                    .iter()
                    .enumerate()
                    .filter(|&(r, _)| r != rank)
                    .filter_map(|(r, n)| pick(n).map(|id| (r, id)))
                    .collect()
            };
            let mut part = InMemoryPartition::empty(rank, self.dimension);

            for &gv in &numbering.vertices {
                let ghosts = self.ghosts_of(&self.vertex_cells[gv], owners, numbering, rank);
                part.vertices.push(VertexRecord {
                    coords: self.coords[gv],
                    ghosts,
                });
            }
            for &ge in &numbering.edges {
                let [a, b] = self.edges[ge];
                part.edges.push(EdgeRecord {
                    vertices: [
                        VertexId::new(numbering.vertex_id[&a]),
                        VertexId::new(numbering.vertex_id[&b]),
                    ],
                    ghosts: self.ghosts_of(&self.edge_cells[ge], owners, numbering, rank),
                });
            }
            for &gf in &numbering.faces {
                let face = &self.faces[gf];
                let sides = face
                    .cells
                    .iter()
                    .filter_map(|c| {
                        let element = *numbering.cell_id.get(c)?;
                        let local_face = self.cell_faces[*c].iter().position(|&f| f == gf)?;
                        Some(FaceSide {
                            element: ElementId::new(element),
                            local_face,
                        })
                    })
                    .collect();
                part.faces.push(FaceRecord {
                    vertices: face
                        .vertices
                        .iter()
                        .map(|v| VertexId::new(numbering.vertex_id[v]))
                        .collect(),
                    edges: face
                        .edges
                        .iter()
                        .map(|e| EdgeId::new(numbering.edge_id[e]))
                        .collect(),
                    sides,
                    ids_elsewhere: elsewhere(&|n: &LocalNumbering| n.face_id.get(&gf).copied())
                        .into_iter()
                        .map(|(r, id)| (r, FaceId::new(id)))
                        .collect(),
                });
            }
            for &gc in &numbering.cells {
                part.elements.push(ElementRecord {
                    owner: owners[gc],
                    vertices: self.cell_vertices[gc]
                        .iter()
                        .map(|v| VertexId::new(numbering.vertex_id[v]))
                        .collect(),
                    edges: self.cell_edges[gc]
                        .iter()
                        .map(|e| EdgeId::new(numbering.edge_id[e]))
                        .collect(),
                    faces: self.cell_faces[gc]
                        .iter()
                        .map(|f| FaceId::new(numbering.face_id[f]))
                        .collect(),
                    ids_elsewhere: elsewhere(&|n: &LocalNumbering| n.cell_id.get(&gc).copied())
                        .into_iter()
                        .map(|(r, id)| (r, ElementId::new(id)))
                        .collect(),
                });
            }
            log::debug!(
                "rank {rank}: {} owned + {} ghost cells, {} faces, {} vertices",
                part.n_owned_elements(),
                part.elements.len() - part.n_owned_elements(),
                part.faces.len(),
                part.vertices.len()
            );
            parts.push(part);
        }
        Ok(parts)
    }

    fn ghosts_of(
        &self,
        cells: &[usize],
        owners: &[usize],
        numbering: &LocalNumbering,
        rank: usize,
    ) -> Vec<GhostElement> {
        cells
            .iter()
            .filter(|&&c| owners[c] != rank)
            .filter_map(|c| {
                numbering.cell_id.get(c).map(|&id| GhostElement {
                    rank: owners[*c],
                    element: ElementId::new(id),
                })
            })
            .sorted()
            .collect()
    }

    fn local_numbering(&self, owners: &[usize], rank: usize, layer: GhostLayer) -> LocalNumbering {
        let owned: Vec<usize> = (0..self.n_cells()).filter(|&c| owners[c] == rank).collect();
        let mut ghosts: BTreeSet<usize> = BTreeSet::new();
        for &c in &owned {
            match layer {
                GhostLayer::Faces => ghosts.extend(self.face_neighbours(c)),
                GhostLayer::Vertices => ghosts.extend(self.vertex_neighbours(c)),
            }
        }
        ghosts.retain(|&c| owners[c] != rank);
        if layer == GhostLayer::Faces {
            for &c in &owned {
                let shared = self.cell_vertices[c]
                    .iter()
                    .map(|&v| &self.vertex_cells[v])
                    .chain(self.cell_edges[c].iter().map(|&e| &self.edge_cells[e]));
                for cells in shared {
                    if cells.iter().any(|n| owners[*n] < rank && ghosts.contains(n)) {
                        continue;
                    }
                    let lowest = cells
                        .iter()
                        .copied()
                        .filter(|&n| owners[n] < rank)
                        .min_by_key(|&n| (owners[n], n));
                    if let Some(cell) = lowest {
                        ghosts.insert(cell);
                    }
                }
            }
        }

        let mut n = LocalNumbering::default();
        for c in owned.into_iter().chain(ghosts) {
            n.cell_id.insert(c, n.cells.len());
            n.cells.push(c);
            for &v in &self.cell_vertices[c] {
                if !n.vertex_id.contains_key(&v) {
                    n.vertex_id.insert(v, n.vertices.len());
                    n.vertices.push(v);
                }
            }
            for &e in &self.cell_edges[c] {
                if !n.edge_id.contains_key(&e) {
                    n.edge_id.insert(e, n.edges.len());
                    n.edges.push(e);
                }
            }
            for &f in &self.cell_faces[c] {
                if !n.face_id.contains_key(&f) {
                    n.face_id.insert(f, n.faces.len());
                    n.faces.push(f);
                }
            }
        }
        n
    }
}

/// Global → local maps of one rank.
#[derive(Default)]
struct LocalNumbering {
    cells: Vec<usize>,
    vertices: Vec<usize>,
    edges: Vec<usize>,
    faces: Vec<usize>,
    cell_id: HashMap<usize, usize>,
    vertex_id: HashMap<usize, usize>,
    edge_id: HashMap<usize, usize>,
    face_id: HashMap<usize, usize>,
}

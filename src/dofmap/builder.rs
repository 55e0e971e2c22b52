//! The distributed dof-table builder state machine.
//!
//! ```text
//! Init ─┬─> ContinuousActive ──> ContinuousGhost ─┬─> LocalClusterTable ──> Done
//!       └─> Discontinuous ────────────────────────┘
//! ```
//!
//! The builder owns every in-progress map; callers only ever see the frozen
//! [`DofTable`] handed out once `Done` is reached.

use crate::algs::communicator::Communicator;
use crate::algs::wire::DofQuery;
use crate::data::dof_table::LocalDofTable;
use crate::data::global_map::{ClusterRanges, DofTable};
use crate::debug_invariants::DebugInvariants;
use crate::dof_error::DofMapError;
use crate::dofmap::classify::{FaceDofKind, FaceDofShape, classify_face_dof};
use crate::dofmap::config::DofTableConfig;
use crate::dofmap::protocol::{GhostPass, PendingDof};
use crate::dofmap::rendezvous::Rendezvous;
use crate::topology::ids::{DofId, ElementId};
use crate::topology::mesh::PartitionedMesh;
use crate::topology::ownership::DofOwnership;
use crate::topology::remote::RemoteTarget;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuildPhase {
    Init,
    ContinuousActive,
    ContinuousGhost,
    Discontinuous,
    LocalClusterTable,
    Done,
}

/// What a build did, for diagnostics and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BuildStats {
    pub n_local_dofs: usize,
    pub n_owned: usize,
    /// Local dofs lying on at least one inter-process face.
    pub interface_dofs: usize,
    /// Local dofs reached only through ghost elements.
    pub pure_ghost_dofs: usize,
    pub ghost_rounds: usize,
    pub requests_sent: usize,
    pub queries_sent: usize,
    pub requests_answered: usize,
    pub redirects_followed: usize,
}

pub struct DofTableBuilder<'a, M, T, C> {
    mesh: &'a M,
    table: &'a T,
    comm: &'a C,
    config: DofTableConfig,
    phase: BuildPhase,
    ownership: DofOwnership,
    clusters: Vec<Option<u64>>,
    ranges: ClusterRanges,
    owned: Vec<DofId>,
    pending: Vec<PendingDof>,
    stats: BuildStats,
    frozen: Option<DofTable>,
}

fn mark(flags: &mut [bool], dof: DofId, rank: usize) -> Result<(), DofMapError> {
    let len = flags.len();
    let slot = flags.get_mut(dof.get()).ok_or(DofMapError::DofOutOfRange {
        rank,
        dof: dof.get(),
        len,
    })?;
    *slot = true;
    Ok(())
}

impl<'a, M, T, C> DofTableBuilder<'a, M, T, C>
where
    M: PartitionedMesh,
    T: LocalDofTable,
    C: Communicator,
{
    pub fn new(mesh: &'a M, table: &'a T, comm: &'a C) -> Self {
        Self {
            mesh,
            table,
            comm,
            config: DofTableConfig::default(),
            phase: BuildPhase::Init,
            ownership: DofOwnership::default(),
            clusters: Vec::new(),
            ranges: ClusterRanges::default(),
            owned: Vec::new(),
            pending: Vec::new(),
            stats: BuildStats::default(),
            frozen: None,
        }
    }

    pub fn with_config(mut self, config: DofTableConfig) -> Self {
        self.config = config;
        self
    }

    pub fn phase(&self) -> BuildPhase {
        self.phase
    }

    /// Run the state machine to completion and return the frozen table.
    pub fn build(self) -> Result<DofTable, DofMapError> {
        self.build_with_stats().map(|(table, _)| table)
    }

    pub fn build_with_stats(mut self) -> Result<(DofTable, BuildStats), DofMapError> {
        while self.phase != BuildPhase::Done {
            self.step()?;
        }
        let table = self.frozen.take().ok_or_else(|| {
            DofMapError::InvariantViolation("build finished without a table".into())
        })?;
        Ok((table, self.stats))
    }

    /// Advance by one phase.
    pub fn step(&mut self) -> Result<BuildPhase, DofMapError> {
        let next = match self.phase {
            BuildPhase::Init => self.init()?,
            BuildPhase::ContinuousActive => self.continuous_active()?,
            BuildPhase::ContinuousGhost => self.continuous_ghost()?,
            BuildPhase::Discontinuous => self.discontinuous()?,
            BuildPhase::LocalClusterTable => self.local_cluster_table()?,
            BuildPhase::Done => BuildPhase::Done,
        };
        log::debug!("rank {}: {:?} -> {next:?}", self.comm.rank(), self.phase);
        self.phase = next;
        Ok(next)
    }

    /// Sum local failures over all ranks so that every rank fails together.
    /// Ranks without a local error return [`DofMapError::PeerFailure`].
    fn agree<R>(&self, local: Result<R, DofMapError>) -> Result<R, DofMapError> {
        let me = self.comm.rank();
        let failed = self.comm.allreduce_sum_u64(u64::from(local.is_err()))?;
        match local {
            Err(err) => {
                log::error!("rank {me}: {:?} failed: {err}", self.phase);
                Err(err)
            }
            Ok(_) if failed > 0 => {
                let err = DofMapError::PeerFailure { rank: me, failed };
                log::error!("rank {me}: {:?} failed: {err}", self.phase);
                Err(err)
            }
            ok => ok,
        }
    }

    fn check_inputs(&self) -> Result<(), DofMapError> {
        if self.mesh.rank() != self.comm.rank() {
            return Err(DofMapError::RankMismatch {
                mesh: self.mesh.rank(),
                comm: self.comm.rank(),
            });
        }
        self.config.validate()?;
        self.table.layout().validate(self.mesh.dimension())
    }

    fn init(&mut self) -> Result<BuildPhase, DofMapError> {
        self.agree(self.check_inputs())?;
        let layout = self.table.layout();
        let n = self.table.n_local_dofs();
        self.ownership = DofOwnership::new(n, self.comm.rank());
        self.clusters = vec![None; n];
        self.stats.n_local_dofs = n;
        Ok(if layout.is_continuous {
            BuildPhase::ContinuousActive
        } else {
            BuildPhase::Discontinuous
        })
    }

    /// Record the lowest-rank owner of every dof on an inter-process face.
    fn resolve_interface_owners(&mut self) -> Result<(), DofMapError> {
        let mesh = self.mesh;
        let table = self.table;
        let me = self.comm.rank();
        let dim = mesh.dimension();
        let n_components = table.layout().n_components;
        let rendezvous = Rendezvous::new(mesh);
        let mut on_interface = vec![false; self.clusters.len()];

        let faces: Vec<_> = mesh.inter_process_faces().collect();
        for face in faces {
            let neighbor = mesh.inter_process_sides(face)?.ghost.rank;
            let vertices = mesh.face_vertices(face)?;
            let edges = mesh.face_edges(face)?;
            let shape = FaceDofShape::for_face(table.layout(), dim, vertices.len(), edges.len());
            let n_face = table.n_face_dofs(face)?;
            if n_face != shape.n_dofs() {
                let err = DofMapError::InvariantViolation(format!(
                    "rank {me}: {face} carries {n_face} dofs, layout expects {}",
                    shape.n_dofs()
                ));
                log::error!("{err}");
                return Err(err);
            }
            for local in 0..n_face {
                let class = classify_face_dof(local, &shape)?;
                let winner = match class.kind {
                    FaceDofKind::Vertex => {
                        rendezvous.vertex(face, neighbor, vertices[class.entity])?
                    }
                    FaceDofKind::Edge => rendezvous.edge(face, neighbor, edges[class.entity])?,
                    FaceDofKind::FaceInterior => rendezvous.face_interior(face, neighbor)?,
                };
                let target = RemoteTarget::face(winner.rank, winner.face);
                for component in 0..n_components {
                    let dof = table.face_local_to_global(face, local, component)?.dof;
                    mark(&mut on_interface, dof, me)?;
                    self.ownership.set_owner_min(dof, target)?;
                }
            }
        }
        self.stats.interface_dofs = on_interface.iter().filter(|&&b| b).count();
        Ok(())
    }

    /// Dofs touched only by ghost elements belong to the ghost element's owner
    /// (or whoever that rank redirects to).
    fn resolve_pure_ghost_owners(&mut self) -> Result<(), DofMapError> {
        let mesh = self.mesh;
        let table = self.table;
        let me = self.comm.rank();
        let n_components = table.layout().n_components;
        let mut touched = vec![false; self.clusters.len()];

        let owned: Vec<ElementId> = mesh.owned_elements().collect();
        for e in owned {
            for local in 0..table.n_element_dofs(e)? {
                for component in 0..n_components {
                    let dof = table.element_local_to_global(e, local, component)?.dof;
                    mark(&mut touched, dof, me)?;
                }
            }
        }

        let mut pure = vec![false; touched.len()];
        let ghosts: Vec<ElementId> = mesh.ghost_elements().collect();
        for e in ghosts {
            let owner = mesh.element_owner(e)?;
            let remote = mesh
                .element_id_in_partition(e, owner)
                .ok_or_else(|| DofMapError::MissingRemoteId {
                    rank: me,
                    other: owner,
                    entity: e.to_string(),
                })?;
            let target = RemoteTarget::element(owner, remote);
            for local in 0..table.n_element_dofs(e)? {
                for component in 0..n_components {
                    let dof = table.element_local_to_global(e, local, component)?.dof;
                    if !touched.get(dof.get()).copied().unwrap_or(false) {
                        mark(&mut pure, dof, me)?;
                        self.ownership.set_ghost_owner_min(dof, target)?;
                    }
                }
            }
        }
        self.stats.pure_ghost_dofs = pure.iter().filter(|&&b| b).count();
        Ok(())
    }

    fn queue_ghosts(&mut self) -> Result<(), DofMapError> {
        let me = self.comm.rank();
        let size = self.comm.size();
        let mut pending = Vec::new();
        for (dof, target) in self.ownership.ghost_dofs() {
            if target.rank >= size {
                return Err(DofMapError::InvariantViolation(format!(
                    "rank {me}: {dof} is owned by rank {} in a world of {size}",
                    target.rank
                )));
            }
            let query = DofQuery {
                component: self.table.dof_component(dof)? as u32,
                slot: self.table.dof_slot(dof)? as u32,
                point: self.table.dof_point(dof)?,
            };
            pending.push(PendingDof::new(dof, target, query, me));
        }
        self.pending = pending;
        Ok(())
    }

    fn continuous_active(&mut self) -> Result<BuildPhase, DofMapError> {
        let local = self
            .resolve_interface_owners()
            .and_then(|()| self.resolve_pure_ghost_owners())
            .and_then(|()| self.queue_ghosts());
        self.agree(local)?;

        self.owned = self.ownership.owned_dofs().collect();
        self.ranges = ClusterRanges::gather(self.comm, self.owned.len() as u64)?;
        let first = self.ranges.range(self.comm.rank()).start;
        for (k, dof) in self.owned.iter().enumerate() {
            self.clusters[dof.get()] = Some(first + k as u64);
        }
        self.stats.n_owned = self.owned.len();
        log::debug!(
            "rank {}: owns {} of {} local dofs, {} ghosts pending",
            self.comm.rank(),
            self.owned.len(),
            self.clusters.len(),
            self.pending.len()
        );
        Ok(BuildPhase::ContinuousGhost)
    }

    fn continuous_ghost(&mut self) -> Result<BuildPhase, DofMapError> {
        let pending = std::mem::take(&mut self.pending);
        let pass = GhostPass::new(self.comm, self.table, &self.ownership, &self.config);
        let stats = pass.run(&mut self.clusters, pending)?;
        self.stats.ghost_rounds = stats.rounds;
        self.stats.requests_sent = stats.requests_sent;
        self.stats.queries_sent = stats.queries_sent;
        self.stats.requests_answered = stats.requests_answered;
        self.stats.redirects_followed = stats.redirects_followed;
        Ok(BuildPhase::LocalClusterTable)
    }

    fn check_no_ghost_dofs(&self) -> Result<(), DofMapError> {
        let mut ghosts = 0;
        for e in self.mesh.ghost_elements() {
            ghosts += self.table.n_element_dofs(e)? * self.table.layout().n_components;
        }
        if ghosts > 0 {
            return Err(DofMapError::DiscontinuousWithGhosts {
                rank: self.comm.rank(),
                ghosts,
            });
        }
        Ok(())
    }

    fn discontinuous(&mut self) -> Result<BuildPhase, DofMapError> {
        self.agree(self.check_no_ghost_dofs())?;
        let n = self.clusters.len();
        self.ranges = ClusterRanges::gather(self.comm, n as u64)?;
        let first = self.ranges.range(self.comm.rank()).start;
        for (i, slot) in self.clusters.iter_mut().enumerate() {
            *slot = Some(first + i as u64);
        }
        self.owned = (0..n).map(DofId::new).collect();
        self.stats.n_owned = n;
        Ok(BuildPhase::LocalClusterTable)
    }

    fn local_cluster_table(&mut self) -> Result<BuildPhase, DofMapError> {
        let me = self.comm.rank();
        let mut process_to_cluster = Vec::with_capacity(self.clusters.len());
        let mut owners = Vec::with_capacity(self.clusters.len());
        for (dof, slot) in self.clusters.iter().enumerate() {
            let cluster = slot.ok_or_else(|| {
                let err = DofMapError::UnresolvedDof { rank: me, dof };
                log::error!("{err}");
                err
            })?;
            let owner = self.ranges.rank_of(cluster).ok_or_else(|| {
                DofMapError::InvariantViolation(format!(
                    "rank {me}: dof {dof} maps to {cluster} outside [0, {})",
                    self.ranges.n_dofs()
                ))
            })?;
            process_to_cluster.push(cluster);
            owners.push(owner);
        }
        let table = DofTable::new(
            me,
            std::mem::take(&mut self.ranges),
            process_to_cluster,
            std::mem::take(&mut self.owned),
            owners,
        );
        if self.config.check_invariants {
            if let Err(err) = table.validate_invariants() {
                log::error!("rank {me}: {err}");
                return Err(err);
            }
        }
        self.frozen = Some(table);
        Ok(BuildPhase::Done)
    }
}

/// Build the distributed dof table of this rank with the default configuration.
pub fn build_dof_table<M, T, C>(mesh: &M, table: &T, comm: &C) -> Result<DofTable, DofMapError>
where
    M: PartitionedMesh,
    T: LocalDofTable,
    C: Communicator,
{
    DofTableBuilder::new(mesh, table, comm).build()
}

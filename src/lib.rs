#![cfg_attr(docsrs, feature(doc_cfg))]
//! # dof-cluster
//!
//! dof-cluster builds the global ("cluster") numbering of the degrees of
//! freedom of a finite-element space whose mesh is partitioned across ranks.
//! Each rank brings its own partition (owned elements plus a ghost layer) and
//! a local dof numbering that includes ghost dofs; the builder decides which
//! rank owns every shared dof, numbers owned dofs contiguously per rank, and
//! reconciles ghost dofs with their owners by exchanging dof points.
//!
//! ## Features
//! - Continuous bases: lowest-rank ownership, geometric rendezvous over
//!   vertex/edge ghost lists, multi-hop request/redirect rounds
//! - Discontinuous bases: pure prefix-sum numbering
//! - Pluggable communication backends (serial, in-process threads, MPI)
//! - Structured grid generator and in-memory partitions for testing
//!
//! ## Usage
//! ```toml
//! [dependencies]
//! dof-cluster = "0.1"
//! # features = ["mpi-support"]
//! ```
//!
//! ```no_run
//! use dof_cluster::prelude::*;
//!
//! let grid = StructuredGrid::unit_square(4, 4)?;
//! let owners: Vec<usize> = (0..grid.n_cells()).map(|c| c % 2).collect();
//! let parts = grid.partition(&owners, 2, GhostLayer::Vertices)?;
//! let world = ThreadComm::world(2);
//! std::thread::scope(|s| {
//!     for (part, comm) in parts.iter().zip(&world) {
//!         s.spawn(move || {
//!             let local = InMemoryDofTable::build(part, DofLayout::p1())?;
//!             let table = DofTableBuilder::new(part, &local, comm).build()?;
//!             println!("rank {} owns {} of {} dofs", comm.rank(), table.n_owned(), table.n_dofs());
//!             Ok::<(), DofMapError>(())
//!         });
//!     }
//! });
//! # Ok::<(), DofMapError>(())
//! ```
//!
//! ## Determinism
//!
//! The frozen table depends only on the partition and the local numbering:
//! message arrival order can change the number of rounds, never the result.

pub mod algs;
pub mod data;
pub mod debug_invariants;
pub mod dof_error;
pub mod dofmap;
pub mod topology;

pub use debug_invariants::DebugInvariants;
pub use dof_error::DofMapError;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::communicator::{CommTag, Communicator, DofCommTags, NoComm, ThreadComm};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::meshgen::{GhostLayer, StructuredGrid};
    pub use crate::data::dof_table::{DofPoint, InMemoryDofTable, LocalDof, LocalDofTable};
    pub use crate::data::global_map::{ClusterRanges, DofTable};
    pub use crate::data::layout::DofLayout;
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::dof_error::DofMapError;
    pub use crate::dofmap::{BuildStats, DofTableBuilder, DofTableConfig, build_dof_table};
    pub use crate::topology::ids::{DofId, EdgeId, ElementId, FaceId, VertexId};
    pub use crate::topology::in_memory::InMemoryPartition;
    pub use crate::topology::mesh::PartitionedMesh;
}

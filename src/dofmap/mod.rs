//! Distributed dof-table construction.
//!
//! [`DofTableBuilder`] turns one rank's [`PartitionedMesh`](crate::topology::mesh::PartitionedMesh)
//! and [`LocalDofTable`](crate::data::dof_table::LocalDofTable) into a frozen
//! [`DofTable`](crate::data::global_map::DofTable). Every rank of the
//! communicator must build concurrently: the build performs collectives.

pub mod builder;
pub mod classify;
pub mod config;
pub mod protocol;
pub mod rendezvous;

pub use builder::{BuildPhase, BuildStats, DofTableBuilder, build_dof_table};
pub use classify::{FaceDofClass, FaceDofKind, FaceDofShape, classify_face_dof};
pub use config::DofTableConfig;
pub use protocol::{PendingDof, ProtocolStats, locate_dof};
pub use rendezvous::{Rendezvous, RendezvousWinner};

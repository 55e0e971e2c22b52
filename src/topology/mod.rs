//! Mesh-side types: entity handles, the partitioned-mesh contract, ghost
//! metadata and dof ownership records.
//!
//! Most users implement [`PartitionedMesh`] for their own mesh, or use
//! [`InMemoryPartition`] as produced by [`crate::algs::meshgen`].

pub mod ids;
pub mod in_memory;
pub mod mesh;
pub mod ownership;
pub mod remote;

pub use in_memory::InMemoryPartition;
pub use mesh::{FaceSide, InterProcessSides, PartitionedMesh};
pub use ownership::DofOwnership;
pub use remote::{GhostElement, RemoteEntity, RemoteTarget};

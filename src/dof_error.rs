//! DofMapError: unified error type for dof-cluster public APIs
//!
//! Configuration errors are detected before the first exchange of dof data.
//! Integrity violations mean the mesh or the local dof table handed to the
//! builder is internally inconsistent; the builder logs them and returns
//! without producing a table. Either kind is reported to the other ranks,
//! which return [`DofMapError::PeerFailure`].

use thiserror::Error;

/// Unified error type for dof-cluster operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DofMapError {
    // --- configuration ------------------------------------------------------
    /// The basis description cannot produce a dof table.
    #[error("Invalid dof layout: {0}")]
    InvalidLayout(String),
    /// Tolerance or message tags of a build configuration are unusable.
    #[error("Invalid dof table configuration: {0}")]
    InvalidConfig(String),
    /// An all-gather returned fewer per-rank counts than ranks in the communicator.
    #[error("Expected {expected} per-rank counts, got {got}")]
    MissingRankCounts { expected: usize, got: usize },
    /// A discontinuous dof table must not contain ghost dofs.
    #[error("Rank {rank}: discontinuous dof table carries {ghosts} ghost dofs")]
    DiscontinuousWithGhosts { rank: usize, ghosts: usize },
    /// Mesh, dof table and communicator disagree on the rank.
    #[error("Rank mismatch: mesh reports rank {mesh}, communicator reports rank {comm}")]
    RankMismatch { mesh: usize, comm: usize },
    /// Mesh generator input error.
    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    // --- lookups ------------------------------------------------------------
    #[error("Rank {rank}: face {face} does not exist")]
    FaceNotFound { rank: usize, face: usize },
    #[error("Rank {rank}: element {element} does not exist")]
    ElementNotFound { rank: usize, element: usize },
    #[error("Rank {rank}: vertex {vertex} does not exist")]
    VertexNotFound { rank: usize, vertex: usize },
    #[error("Rank {rank}: edge {edge} does not exist")]
    EdgeNotFound { rank: usize, edge: usize },
    #[error("Rank {rank}: dof {dof} is out of range (table holds {len} dofs)")]
    DofOutOfRange { rank: usize, dof: usize, len: usize },
    /// Local dof index within a face/element is beyond the basis description.
    #[error("Local dof {index} out of bounds for entity with {len} dofs per component")]
    LocalDofOutOfBounds { index: usize, len: usize },
    #[error("Component {component} out of bounds ({n_components} components)")]
    ComponentOutOfBounds { component: usize, n_components: usize },

    // --- integrity ----------------------------------------------------------
    /// A requested dof point is not on the addressed face or element.
    #[error(
        "Rank {rank}: dof point {coords:?} (component {component}, slot {slot}) not found on {entity}"
    )]
    DofPointNotFound {
        rank: usize,
        entity: String,
        component: usize,
        slot: usize,
        coords: [f64; 3],
    },
    /// Face is not an inter-process face or lacks its owned side.
    #[error("Rank {rank}: face {face} is not a valid inter-process face: {reason}")]
    InvalidInterProcessFace {
        rank: usize,
        face: usize,
        reason: String,
    },
    /// A ghost element listed for a vertex/edge has no face containing that entity.
    #[error(
        "Rank {rank}: ghost element {element} of rank {ghost_rank} has no face containing {entity}"
    )]
    NoMatchingGhostFace {
        rank: usize,
        ghost_rank: usize,
        element: usize,
        entity: String,
    },
    /// Entity exists locally but has no id in the given partition.
    #[error("Rank {rank}: {entity} has no id in the partition of rank {other}")]
    MissingRemoteId {
        rank: usize,
        other: usize,
        entity: String,
    },
    #[error("Buffer size mismatch with rank {neighbor}: expected {expected} bytes, got {got}")]
    BufferSizeMismatch {
        neighbor: usize,
        expected: usize,
        got: usize,
    },
    #[error("Message sequence mismatch from rank {neighbor}: expected {expected}, got {got}")]
    SequenceMismatch {
        neighbor: usize,
        expected: u32,
        got: u32,
    },
    #[error("Reply from rank {neighbor} has {got} answers for {expected} queries")]
    AnswerCountMismatch {
        neighbor: usize,
        expected: usize,
        got: usize,
    },
    #[error("Malformed message from rank {neighbor}: {reason}")]
    MalformedMessage { neighbor: usize, reason: String },
    #[error("Communication error with rank {neighbor}: {reason}")]
    CommError { neighbor: usize, reason: String },
    /// A ghost dof was redirected to ranks that were all queried already.
    #[error("Rank {rank}: no unvisited owner candidate left for dof {dof}")]
    RedirectExhausted { rank: usize, dof: usize },
    /// Ghost resolution did not converge.
    #[error("Rank {rank}: ghost resolution exceeded {rounds} rounds with {pending} dofs pending")]
    RoundLimitExceeded {
        rank: usize,
        rounds: usize,
        pending: u64,
    },
    /// Another rank hit an integrity violation during the same round.
    #[error("Rank {rank}: aborting, {failed} rank(s) reported a failure")]
    PeerFailure { rank: usize, failed: u64 },
    #[error("Rank {rank}: dof {dof} has no global cluster index")]
    UnresolvedDof { rank: usize, dof: usize },
    /// A cluster numbering or dof table invariant does not hold.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

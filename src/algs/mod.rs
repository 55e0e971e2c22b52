//! Communication, wire encoding and mesh generation.

pub mod communicator;
pub mod meshgen;
pub mod size_exchange;
pub mod wire;

pub use size_exchange::exchange_counts;

//! Dof-side types: basis layout, local dof numbering and the global cluster map.

pub mod dof_table;
pub mod global_map;
pub mod layout;

pub use dof_table::{DofPoint, InMemoryDofTable, LocalDof, LocalDofTable};
pub use global_map::{ClusterRanges, DofTable};
pub use layout::DofLayout;

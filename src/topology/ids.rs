//! Strong index handles for local mesh entities and dofs.
//!
//! All handles are dense, zero-based indices into one rank's local numbering
//! (ghost entities included). The same physical entity generally carries a
//! different handle on every rank that stores it.

use std::fmt;

macro_rules! local_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(
            Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
        )]
        #[repr(transparent)]
        pub struct $name(usize);

        impl $name {
            #[inline]
            pub const fn new(raw: usize) -> Self {
                Self(raw)
            }

            #[inline]
            pub const fn get(self) -> usize {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.0).finish()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, " {}"), self.0)
            }
        }

        impl From<$name> for usize {
            fn from(id: $name) -> usize {
                id.0
            }
        }
    };
}

local_id!(
    /// Local dof index (owned and ghost dofs share one dense range).
    DofId,
    "dof"
);
local_id!(
    /// Local element (cell) index; ghost elements included.
    ElementId,
    "element"
);
local_id!(
    /// Local facet index.
    FaceId,
    "face"
);
local_id!(
    /// Local edge index (only meaningful in 3-D).
    EdgeId,
    "edge"
);
local_id!(
    /// Local vertex index.
    VertexId,
    "vertex"
);

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_eq_size;

    assert_eq_size!(DofId, usize);
    assert_eq_size!(FaceId, usize);

    #[test]
    fn display_names_the_entity() {
        assert_eq!(FaceId::new(3).to_string(), "face 3");
        assert_eq!(format!("{:?}", DofId::new(7)), "DofId(7)");
    }

    #[test]
    fn ordering_follows_raw_index() {
        assert!(ElementId::new(1) < ElementId::new(2));
        assert_eq!(usize::from(VertexId::new(5)), 5);
    }
}

//! Strong, zero-cost handles for mesh entities.
//!
//! Every entity manipulated by the join (vertex, face, edge) carries a
//! process-wide-unique *global id*: a dense integer identity that stays the
//! same no matter which rank currently holds a copy of the entity. The ids
//! wrap a nonzero `u64` to enforce at compile- and runtime that 0 is reserved
//! as an invalid or sentinel value.
//!
//! Local (per-fragment) positions are plain `usize` indices into the owning
//! arrays; only the global identities get a newtype. Distributed reductions
//! and sorts key on these ids, never on arrival order or rank index, which is
//! what makes results invariant to rank count and message timing.

use std::{fmt, num::NonZeroU64};

use crate::join_error::JoinError;

/// Global id of a vertex.
///
/// # Memory layout
/// `repr(transparent)` over `NonZeroU64`: same ABI and alignment as a `u64`,
/// and `Option<VertexId>` is also 8 bytes.
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct VertexId(NonZeroU64);

impl VertexId {
    /// Creates a new `VertexId` from a raw `u64` value.
    ///
    /// Returns [`JoinError::InvalidGlobalId`] if `raw == 0`.
    #[inline]
    pub fn new(raw: u64) -> Result<Self, JoinError> {
        NonZeroU64::new(raw)
            .map(VertexId)
            .ok_or(JoinError::InvalidGlobalId)
    }

    /// Returns the inner `u64` value of this id.
    #[inline]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Debug for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("VertexId").field(&self.get()).finish()
    }
}

/// Prints the numeric id without any wrapper text.
impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// Global id of a face.
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct FaceId(NonZeroU64);

impl FaceId {
    /// Returns [`JoinError::InvalidGlobalId`] if `raw == 0`.
    #[inline]
    pub fn new(raw: u64) -> Result<Self, JoinError> {
        NonZeroU64::new(raw)
            .map(FaceId)
            .ok_or(JoinError::InvalidGlobalId)
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Debug for FaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FaceId").field(&self.get()).finish()
    }
}

impl fmt::Display for FaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// Global id of an edge. Edges are derived entities: the id is assigned from
/// the canonical (min-gid, max-gid) vertex pair by the dense numbering
/// primitive, so the same physical edge gets an identical id on every rank
/// that sees it.
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct EdgeId(NonZeroU64);

impl EdgeId {
    /// Returns [`JoinError::InvalidGlobalId`] if `raw == 0`.
    #[inline]
    pub fn new(raw: u64) -> Result<Self, JoinError> {
        NonZeroU64::new(raw)
            .map(EdgeId)
            .ok_or(JoinError::InvalidGlobalId)
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Debug for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EdgeId").field(&self.get()).finish()
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}



#[cfg(test)]
mod layout_tests {
    use super::*;
    use static_assertions::{assert_eq_align, assert_eq_size};

    assert_eq_size!(VertexId, u64);
    assert_eq_size!(FaceId, u64);
    assert_eq_size!(EdgeId, u64);

    #[test]
    fn alignment_matches_u64() {
        assert_eq_align!(VertexId, u64);
    }
}

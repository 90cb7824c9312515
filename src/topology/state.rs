//! Vertex lifecycle states for the join.
//!
//! A vertex is created `Origin` and only ever moves *forward* through the
//! merge passes; a state is never reverted. The numeric order of the variants
//! encodes that progression, so promotion is a `max`.

use std::fmt;

/// Lifecycle state of a join vertex.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
#[repr(u32)]
pub enum VertexState {
    /// Not yet assigned; only legal for scratch records.
    #[default]
    Undefined = 0,
    /// Created during the join (e.g. an intersection point on an edge).
    New = 1,
    /// Taken unchanged from the parent mesh.
    Origin = 2,
    /// Image of an origin vertex under a periodic transform.
    Periodic = 3,
    /// Result of merging at least two near-coincident vertices.
    Merged = 4,
    /// Result of merging where at least one input was periodic.
    PeriodicMerged = 5,
    /// Detached again when a merged face had to be split.
    Split = 6,
}

impl VertexState {
    /// Three-letter code used in tabular diagnostics.
    pub fn code(self) -> &'static str {
        match self {
            VertexState::Undefined => "UDF",
            VertexState::New => "NEW",
            VertexState::Origin => "ORI",
            VertexState::Periodic => "PER",
            VertexState::Merged => "MRG",
            VertexState::PeriodicMerged => "PMG",
            VertexState::Split => "SPL",
        }
    }

    /// Promote to `to` if it lies further along the lifecycle; states never
    /// move backwards.
    #[must_use]
    pub fn promote(self, to: VertexState) -> VertexState {
        self.max(to)
    }

    /// State resulting from merging two vertices with the given states.
    pub fn merged_with(self, other: VertexState) -> VertexState {
        if self >= VertexState::Periodic || other >= VertexState::Periodic {
            VertexState::PeriodicMerged
        } else {
            VertexState::Merged
        }
    }

    /// Numeric code carried on the wire.
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Decode a wire code; `None` for unknown codes.
    pub fn from_u32(raw: u32) -> Option<VertexState> {
        match raw {
            0 => Some(VertexState::Undefined),
            1 => Some(VertexState::New),
            2 => Some(VertexState::Origin),
            3 => Some(VertexState::Periodic),
            4 => Some(VertexState::Merged),
            5 => Some(VertexState::PeriodicMerged),
            6 => Some(VertexState::Split),
            _ => None,
        }
    }
}

impl fmt::Display for VertexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

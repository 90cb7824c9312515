//! JoinError: unified error type for mesh-join public APIs
//!
//! Every fallible public operation in this crate returns `Result<_, JoinError>`.
//! Configuration and consistency errors carry the implicated global ids so the
//! joining parameters (tolerance fraction, face selection) can be adjusted.
//! In a distributed run the caller is expected to abort the whole computation
//! on any error: a partially completed join leaves the mesh topologically
//! inconsistent across ranks.

use thiserror::Error;

use crate::topology::point::{FaceId, VertexId};

/// Unified error type for mesh-join operations.
#[derive(Debug, Error)]
pub enum JoinError {
    /// Attempted to construct a global id with a zero value (reserved as sentinel).
    #[error("global ids must be non-zero (0 is reserved as invalid/sentinel)")]
    InvalidGlobalId,
    /// The tolerance computation mode read from configuration is not defined.
    #[error("tolerance computation mode ({0}) is not defined")]
    UnknownToleranceMode(i32),
    /// A global id could not be resolved to an owning rank, or an owner
    /// received a request for an id outside its local range.
    #[error("global id {0} has no resolvable owner in the distribution index")]
    UnresolvedGlobalId(u64),
    /// A rank-index descriptor was not monotonically increasing.
    #[error("rank index is not monotone: entry {position} decreases")]
    RankIndexNotMonotone { position: usize },
    /// No edge joins the given couple of vertices.
    #[error("no edge is defined for the vertex couple ({v1}, {v2})")]
    MissingEdge { v1: VertexId, v2: VertexId },
    /// The given vertex has no incident edges at all.
    #[error("vertex {0} is not referenced by any edge")]
    IsolatedVertex(VertexId),
    /// A face was reduced below 3 vertices by cleaning or rebuilding.
    /// Excessive merging has occurred: reduce the tolerance fraction or
    /// narrow the face selection.
    #[error(
        "face {face} is defined by {n_vertices} vertices after simplification; \
         check the joining parameters"
    )]
    DegenerateFace { face: FaceId, n_vertices: usize },
    /// Two consecutive face vertices are identical where they must differ.
    #[error("face {face} traverses vertex {vertex} twice in a row")]
    ConsecutiveDuplicateVertex { face: FaceId, vertex: VertexId },
    /// Transport-level failure while exchanging with a peer rank.
    #[error("communication with rank {neighbor} failed: {source}")]
    Comm {
        neighbor: usize,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// A peer sent a different number of bytes than the size stage announced.
    #[error("rank {neighbor} sent {got} bytes, expected {expected}")]
    BufferSizeMismatch {
        neighbor: usize,
        expected: usize,
        got: usize,
    },
    /// A peer replied with a different record count than was requested.
    #[error("rank {neighbor} replied with {got} records, expected {expected}")]
    CountMismatch {
        neighbor: usize,
        expected: usize,
        got: usize,
    },
    /// A vertex state code received on the wire does not name a known state.
    #[error("unknown vertex state code {0} on the wire")]
    InvalidWireState(u32),
    /// The old→new vertex map left a new vertex slot with no record.
    #[error("no vertex record maps to new vertex slot {missing}")]
    IncompleteVertexMap { missing: usize },
}

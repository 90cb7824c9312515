//! # mesh-join
//!
//! mesh-join is a distributed mesh-join engine for unstructured volume
//! meshes: it stitches disjoint, non-conforming mesh fragments (from domain
//! partitioning, periodic boundaries, or independently meshed sub-regions)
//! into one topologically valid mesh. It matches near-coincident vertices
//! within a computed per-vertex tolerance, keeps a globally-unique numbering
//! consistent across cooperating compute ranks, and repairs the face/edge
//! topology left behind by merging.
//!
//! ## Subsystems
//! - [`fragment`]: the join-mesh fragment (compactly numbered face/vertex
//!   arrays), tolerance calculator, edge extractor, topology cleaner, and
//!   connectivity rebuilder.
//! - [`exchange`]: the distributed layer with a pluggable [`Communicator`]
//!   façade (serial, in-process mailbox, MPI behind `mpi-support`),
//!   block-distribution routing, the tolerance synchronizer, the dense
//!   global numbering primitive, and the face exchanger.
//! - [`topology`]: strong id handles ([`VertexId`], [`FaceId`], [`EdgeId`])
//!   and the per-vertex record with its lifecycle state.
//!
//! ## Determinism
//!
//! Every distributed reduction and sort keys on global ids, never on
//! arrival order or rank index, so results are invariant to rank count and
//! message timing. All communication primitives are collective: each rank
//! must invoke them the same number of times, in the same order.
//!
//! ## Error handling
//!
//! Configuration and consistency errors are fatal to the whole computation;
//! they surface as [`JoinError`] values carrying the implicated global ids
//! so the joining parameters (tolerance fraction, selection criteria) can be
//! adjusted. Partial distributed results are not recoverable.
//!
//! [`Communicator`]: exchange::communicator::Communicator
//! [`VertexId`]: topology::point::VertexId
//! [`FaceId`]: topology::point::FaceId
//! [`EdgeId`]: topology::point::EdgeId
//! [`JoinError`]: join_error::JoinError

pub mod exchange;
pub mod fragment;
pub mod join_error;
pub mod topology;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::exchange::block::{BlockDistribution, RankIndex};
    pub use crate::exchange::communicator::{CommTag, Communicator, MailboxComm, NoComm, Wait};
    #[cfg(feature = "mpi-support")]
    pub use crate::exchange::communicator::MpiComm;
    pub use crate::exchange::context::JoinContext;
    pub use crate::exchange::numbering::{
        DenseNumbering, dense_global_count, dense_numbering_pairs, dense_numbering_u64,
    };
    pub use crate::exchange::sync::sync_vertex_tolerances;
    pub use crate::fragment::clean::clean;
    pub use crate::fragment::edges::{EdgeDirection, EdgeRef, EdgeSet};
    pub use crate::fragment::mesh::{FaceSelection, JoinFragment, ParentMesh};
    pub use crate::fragment::rebuild::{EdgeInsertions, rebuild_connectivity};
    pub use crate::fragment::tolerance::{JoinParams, ToleranceMode};
    pub use crate::join_error::JoinError;
    pub use crate::topology::point::{EdgeId, FaceId, VertexId};
    pub use crate::topology::state::VertexState;
    pub use crate::topology::vertex::JoinVertex;
}

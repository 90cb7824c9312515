//! Distributed layer: communicator façade, deterministic routing, and the
//! collective protocols (tolerance sync, dense numbering, face exchange).

pub mod block;
pub mod communicator;
pub mod context;
pub mod data_exchange;
pub mod face_exchange;
pub mod numbering;
pub mod size_exchange;
pub mod sync;
pub mod wire;

pub use block::{BlockDistribution, RankIndex};
pub use communicator::{CommTag, Communicator, MailboxComm, NoComm, Wait};
pub use context::JoinContext;
pub use face_exchange::exchange_faces;
pub use numbering::{DenseNumbering, dense_global_count, dense_numbering_pairs, dense_numbering_u64};
pub use sync::sync_vertex_tolerances;

//! Local fragment representation and the passes that act on it: tolerance
//! computation, edge extraction, topology cleaning, connectivity rebuild.

pub mod clean;
pub mod edges;
pub mod geometry;
pub mod mesh;
pub mod rebuild;
pub mod tolerance;

pub use clean::clean;
pub use edges::{EdgeDirection, EdgeFaceAdjacency, EdgeRef, EdgeSet};
pub use mesh::{FaceSelection, JoinFragment, ParentMesh};
pub use rebuild::{EdgeInsertions, rebuild_connectivity};
pub use tolerance::{JoinParams, ToleranceMode, init_tolerances, update_tolerances};

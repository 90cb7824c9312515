//! The per-vertex record carried through every join pass.

use std::fmt;

use crate::topology::point::VertexId;
use crate::topology::state::VertexState;

/// A join vertex: global identity, position, merge radius, lifecycle state.
///
/// The tolerance is the radius of the sphere in which this vertex may be
/// fused with another vertex. It starts at the value derived from local edge
/// geometry and only ever shrinks (minimum across ranks, minimum across
/// repeated tolerance passes).
#[derive(Copy, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct JoinVertex {
    /// Global id, stable across ranks.
    pub gnum: VertexId,
    /// Position in the parent mesh frame.
    pub coord: [f64; 3],
    /// Merge radius.
    pub tolerance: f64,
    /// Lifecycle state; assigned at creation, promoted forward only.
    pub state: VertexState,
}

impl JoinVertex {
    /// A vertex taken unchanged from the parent mesh, with no merge radius
    /// assigned yet.
    pub fn origin(gnum: VertexId, coord: [f64; 3]) -> Self {
        JoinVertex {
            gnum,
            coord,
            tolerance: 0.0,
            state: VertexState::Origin,
        }
    }
}

/// Tabular form used by fragment dumps:
/// `gnum | tolerance | x y z | state`.
impl fmt::Display for JoinVertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            " {:>10} | {:11.6} | {:>12.10e} {:>12.10e} {:>12.10e} | {}",
            self.gnum, self.tolerance, self.coord[0], self.coord[1], self.coord[2], self.state
        )
    }
}

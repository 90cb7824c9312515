//! Fixed, little-endian wire records for the exchange paths.
//!
//! All multi-byte integers in these structs are **little-endian** on the
//! wire: stored pre-LE with `.to_le()` and decoded with `from_le`. Floating
//! point values travel as their IEEE-754 bit patterns in `u64`. Every record
//! is `bytemuck::Pod`, so buffers cast to and from byte slices without
//! copying.

use bytemuck::{Pod, Zeroable};
use std::mem::{align_of, size_of};

use crate::join_error::JoinError;
use crate::topology::point::VertexId;
use crate::topology::state::VertexState;
use crate::topology::vertex::JoinVertex;

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

/// Decode a received byte buffer into typed records. Receive buffers are
/// `Vec<u8>` with no alignment guarantee, so this copies instead of casting.
/// The byte length must be an exact multiple of the record size.
pub fn decode_vec<T: Pod>(bytes: &[u8]) -> Vec<T> {
    bytemuck::pod_collect_to_vec(bytes)
}

/// Record count header exchanged in the size stage.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u32,
}

impl WireCount {
    pub fn new(n: usize) -> Self {
        Self {
            n_le: (n as u32).to_le(),
        }
    }

    pub fn get(&self) -> usize {
        u32::from_le(self.n_le) as usize
    }
}

/// A bare global id (u64) carried on the wire.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireGid {
    pub id_le: u64,
}

impl WireGid {
    pub fn of(id: u64) -> Self {
        Self { id_le: id.to_le() }
    }

    pub fn get(&self) -> u64 {
        u64::from_le(self.id_le)
    }
}

/// An ordered (hi, lo) key pair: canonical edge keys and split u128 keys in
/// the dense numbering protocol.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WirePair {
    pub hi_le: u64,
    pub lo_le: u64,
}

impl WirePair {
    pub fn new(hi: u64, lo: u64) -> Self {
        Self {
            hi_le: hi.to_le(),
            lo_le: lo.to_le(),
        }
    }

    pub fn hi(&self) -> u64 {
        u64::from_le(self.hi_le)
    }

    pub fn lo(&self) -> u64 {
        u64::from_le(self.lo_le)
    }
}

/// (vertex gid, tentative tolerance) pair for the tolerance synchronizer.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireTolerance {
    pub gid_le: u64,
    pub tol_bits_le: u64,
}

impl WireTolerance {
    pub fn new(gid: u64, tolerance: f64) -> Self {
        Self {
            gid_le: gid.to_le(),
            tol_bits_le: tolerance.to_bits().to_le(),
        }
    }

    pub fn gid(&self) -> u64 {
        u64::from_le(self.gid_le)
    }

    pub fn tolerance(&self) -> f64 {
        f64::from_bits(u64::from_le(self.tol_bits_le))
    }
}

/// Per-face header in an exchange reply: global face id plus the number of
/// inlined vertex records that follow.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireFaceHead {
    pub gnum_le: u64,
    pub n_vertices_le: u32,
    pub _pad: u32, // keep 8-byte alignment explicit
}

impl WireFaceHead {
    pub fn new(gnum: u64, n_vertices: usize) -> Self {
        Self {
            gnum_le: gnum.to_le(),
            n_vertices_le: (n_vertices as u32).to_le(),
            _pad: 0,
        }
    }

    pub fn gnum(&self) -> u64 {
        u64::from_le(self.gnum_le)
    }

    pub fn n_vertices(&self) -> usize {
        u32::from_le(self.n_vertices_le) as usize
    }
}

/// A full vertex record, inlined in exchange replies. The requester has no
/// local numbering for the owner's vertices, so references would be useless;
/// the receiver deduplicates the inlined copies by global id afterwards.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireVertex {
    pub gnum_le: u64,
    pub coord_bits_le: [u64; 3],
    pub tol_bits_le: u64,
    pub state_le: u32,
    pub _pad: u32,
}

impl WireVertex {
    pub const SIZE: usize = 48; // 8 + 24 + 8 + 4 + 4

    pub fn encode(v: &JoinVertex) -> Self {
        Self {
            gnum_le: v.gnum.get().to_le(),
            coord_bits_le: [
                v.coord[0].to_bits().to_le(),
                v.coord[1].to_bits().to_le(),
                v.coord[2].to_bits().to_le(),
            ],
            tol_bits_le: v.tolerance.to_bits().to_le(),
            state_le: v.state.as_u32().to_le(),
            _pad: 0,
        }
    }

    pub fn decode(&self) -> Result<JoinVertex, JoinError> {
        let state_raw = u32::from_le(self.state_le);
        let state = VertexState::from_u32(state_raw).ok_or(JoinError::InvalidWireState(state_raw))?;
        Ok(JoinVertex {
            gnum: VertexId::new(u64::from_le(self.gnum_le))?,
            coord: [
                f64::from_bits(u64::from_le(self.coord_bits_le[0])),
                f64::from_bits(u64::from_le(self.coord_bits_le[1])),
                f64::from_bits(u64::from_le(self.coord_bits_le[2])),
            ],
            tolerance: f64::from_bits(u64::from_le(self.tol_bits_le)),
            state,
        })
    }
}

// ===== Compile-time sanity checks =========================================

const _: () = {
    // Pod/Zeroable ensures no padding contains uninit when cast to bytes.
    assert!(size_of::<WireCount>() == 4);
    assert!(size_of::<WireGid>() == 8);
    assert!(size_of::<WirePair>() == 16);
    assert!(size_of::<WireTolerance>() == 16);
    assert!(size_of::<WireFaceHead>() == 16);
    assert!(size_of::<WireVertex>() == WireVertex::SIZE);
    assert!(align_of::<WireVertex>() == 8);
};

//! Thin façade over intra-process (mailbox) or inter-process (MPI) message
//! passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees). All
//! handles are **waitable** but non-blocking: the exchange layers call
//! `.wait()` before they trust that a buffer is ready.
//!
//! Every operation built on this trait is collective: each rank must invoke
//! it the same number of times, in the same order, or the system deadlocks.
//! No operation is individually cancellable; transport failures surface as
//! fatal [`JoinError`](crate::join_error::JoinError) values at the call site.

use std::sync::atomic::{AtomicU16, Ordering::Relaxed};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use bytes::Bytes;
use dashmap::DashMap;
use once_cell::sync::Lazy;

/// Typed message tag. Each distributed operation owns a base tag and derives
/// per-stage tags from it with [`CommTag::offset`], so two operations never
/// share a mailbox slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommTag(u16);

impl CommTag {
    pub const fn new(raw: u16) -> Self {
        CommTag(raw)
    }

    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Tag for stage `n` of the owning operation.
    pub const fn offset(self, n: u16) -> Self {
        CommTag(self.0.wrapping_add(n))
    }
}

/// Non-blocking communication interface (minimal by design).
pub trait Communicator: Send + Sync + 'static {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    /// This rank's index in `0..size()`.
    fn rank(&self) -> usize;
    /// Number of cooperating ranks.
    fn size(&self) -> usize;

    /// Gather `send` from every rank into `recv`, concatenated by rank index.
    /// `recv.len()` must equal `size() * send.len()`, and every rank must pass
    /// the same `send.len()`.
    fn allgather(&self, send: &[u8], recv: &mut [u8]);
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Gather one `u64` per rank. Convenience wrapper used by the reductions that
/// only need a scalar from each peer (max global id, per-rank unique counts).
pub fn allgather_u64<C: Communicator>(comm: &C, value: u64) -> Vec<u64> {
    let n_ranks = comm.size().max(1);
    let mut recv = vec![0u8; n_ranks * 8];
    comm.allgather(&value.to_le_bytes(), &mut recv);
    recv.chunks_exact(8)
        .map(|chunk| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            u64::from_le_bytes(raw)
        })
        .collect()
}

/// Compile-time no-op comm for pure serial runs and unit tests.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn allgather(&self, send: &[u8], recv: &mut [u8]) {
        recv[..send.len()].copy_from_slice(send);
    }
}

// --- MailboxComm: intra-process multi-rank harness -------------------------

type Key = (usize, usize, u16); // (src, dst, tag)

static MAILBOX: Lazy<DashMap<Key, Bytes>> = Lazy::new(DashMap::new);

/// Collective tags live in their own window of the tag space so they cannot
/// collide with per-operation base tags.
const COLLECTIVE_TAG_BASE: u16 = 0xF000;

pub struct LocalHandle {
    buf: Arc<Mutex<Option<Vec<u8>>>>,
    handle: Option<JoinHandle<()>>,
}

impl Wait for LocalHandle {
    fn wait(mut self) -> Option<Vec<u8>> {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        let mut guard = self.buf.lock().unwrap();
        guard.take()
    }
}

/// In-process communicator: each simulated rank is a thread, messages travel
/// through a process-global mailbox. Tests sharing the mailbox must not run
/// concurrently (`serial_test`).
#[derive(Debug)]
pub struct MailboxComm {
    rank: usize,
    size: usize,
    coll_seq: AtomicU16,
}

impl MailboxComm {
    pub fn new(rank: usize, size: usize) -> Self {
        assert!(rank < size, "rank {rank} out of range for {size} ranks");
        Self {
            rank,
            size,
            coll_seq: AtomicU16::new(0),
        }
    }

    fn take_blocking(key: Key) -> Bytes {
        loop {
            if let Some((_, v)) = MAILBOX.remove(&key) {
                return v;
            }
            std::thread::yield_now();
        }
    }
}

impl Communicator for MailboxComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
        MAILBOX.insert((self.rank, peer, tag), Bytes::from(buf.to_vec()));
    }

    fn irecv(&self, peer: usize, tag: u16, _buf: &mut [u8]) -> LocalHandle {
        let key = (peer, self.rank, tag);
        let buf_arc = Arc::new(Mutex::new(None));
        let buf_arc_clone = buf_arc.clone();
        let handle = std::thread::spawn(move || {
            let bytes = Self::take_blocking(key);
            let mut guard = buf_arc_clone.lock().unwrap();
            *guard = Some(bytes.to_vec());
        });
        LocalHandle {
            buf: buf_arc,
            handle: Some(handle),
        }
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn allgather(&self, send: &[u8], recv: &mut [u8]) {
        let chunk = send.len();
        assert_eq!(recv.len(), chunk * self.size);

        // Every rank derives the same tag from its own collective counter;
        // collectives are invoked in the same order on all ranks.
        let seq = self.coll_seq.fetch_add(1, Relaxed);
        let tag = COLLECTIVE_TAG_BASE.wrapping_add(seq & 0x0FFF);

        for peer in 0..self.size {
            if peer != self.rank {
                MAILBOX.insert((self.rank, peer, tag), Bytes::from(send.to_vec()));
            }
        }
        recv[self.rank * chunk..(self.rank + 1) * chunk].copy_from_slice(send);
        for peer in 0..self.size {
            if peer == self.rank {
                continue;
            }
            let bytes = Self::take_blocking((peer, self.rank, tag));
            recv[peer * chunk..(peer + 1) * chunk].copy_from_slice(&bytes[..chunk]);
        }
    }
}

// --- MPI backend (feature = "mpi-support") ---------------------------------

#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{Communicator, Wait};
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;

    /// One MPI process per rank. Sends are eager (small join messages stay
    /// within the transport's eager limit); receives are matched lazily at
    /// `wait` time so that posting order cannot deadlock.
    pub struct MpiComm {
        world: SimpleCommunicator,
    }

    impl MpiComm {
        /// Attach to `MPI_COMM_WORLD`; MPI must already be initialized.
        pub fn world() -> Self {
            Self {
                world: SimpleCommunicator::world(),
            }
        }
    }

    pub struct MpiRecvHandle {
        peer: usize,
        tag: u16,
    }

    impl Wait for MpiRecvHandle {
        fn wait(self) -> Option<Vec<u8>> {
            let world = SimpleCommunicator::world();
            let (data, _status) = world
                .process_at_rank(self.peer as i32)
                .receive_vec_with_tag::<u8>(self.tag as i32);
            Some(data)
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = ();
        type RecvHandle = MpiRecvHandle;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
            self.world
                .process_at_rank(peer as i32)
                .send_with_tag(buf, tag as i32);
        }

        fn irecv(&self, peer: usize, tag: u16, _buf: &mut [u8]) -> MpiRecvHandle {
            MpiRecvHandle { peer, tag }
        }

        fn rank(&self) -> usize {
            self.world.rank() as usize
        }

        fn size(&self) -> usize {
            self.world.size() as usize
        }

        fn allgather(&self, send: &[u8], recv: &mut [u8]) {
            self.world.all_gather_into(send, recv);
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

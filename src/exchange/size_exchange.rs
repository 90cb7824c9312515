//! Stage 1 of every bulk exchange: announce byte counts to each peer.
//!
//! The pattern is symmetric: every rank posts a receive from and a send to
//! every peer in the set, so the collective contract of §concurrency holds
//! even for peers with nothing to say. Every send/receive handle is drained
//! before returning, even if an error occurs, so a failed stage cannot leave
//! a stale message in the transport for the next collective to trip over.

use std::collections::{BTreeSet, HashMap};

use crate::exchange::communicator::{CommTag, Communicator, Wait};
use crate::exchange::wire::{WireCount, cast_slice, cast_slice_mut};
use crate::join_error::JoinError;

/// Exchange the number of payload bytes each rank will send to each peer.
/// Returns `peer → incoming byte count` once all receives have completed.
pub fn exchange_sizes_symmetric<C>(
    send_sizes: &HashMap<usize, usize>,
    comm: &C,
    tag: CommTag,
    peers: &BTreeSet<usize>,
) -> Result<HashMap<usize, usize>, JoinError>
where
    C: Communicator + Sync,
{
    // 1) post all receives (storing each buffer in our map)
    let mut recv_size: HashMap<usize, (C::RecvHandle, WireCount)> = HashMap::new();
    for &nbr in peers {
        let mut cnt = WireCount::new(0);
        let h = comm.irecv(
            nbr,
            tag.as_u16(),
            cast_slice_mut(std::slice::from_mut(&mut cnt)),
        );
        recv_size.insert(nbr, (h, cnt));
    }

    // 2) post all sends and keep buffers alive until completion
    let mut pending_sends = Vec::with_capacity(peers.len());
    let mut send_bufs = Vec::with_capacity(peers.len());
    for &nbr in peers {
        let count = WireCount::new(send_sizes.get(&nbr).copied().unwrap_or(0));
        pending_sends.push(comm.isend(nbr, tag.as_u16(), cast_slice(std::slice::from_ref(&count))));
        send_bufs.push(count);
    }

    // 3) wait for all recvs, collect counts (but do not early-return)
    let mut sizes_in = HashMap::new();
    let mut maybe_err = None;
    for (nbr, (h, mut cnt)) in recv_size {
        match h.wait() {
            Some(data) if data.len() == std::mem::size_of::<WireCount>() => {
                if maybe_err.is_none() {
                    cast_slice_mut(std::slice::from_mut(&mut cnt)).copy_from_slice(&data);
                    sizes_in.insert(nbr, cnt.get());
                }
            }
            Some(data) if maybe_err.is_none() => {
                maybe_err = Some(JoinError::BufferSizeMismatch {
                    neighbor: nbr,
                    expected: std::mem::size_of::<WireCount>(),
                    got: data.len(),
                });
            }
            None if maybe_err.is_none() => {
                maybe_err = Some(JoinError::Comm {
                    neighbor: nbr,
                    source: format!("failed to receive size header from rank {nbr}").into(),
                });
            }
            _ => {} // already have an error; just drain
        }
    }

    // 4) always drain all send handles before returning
    for send in pending_sends {
        let _ = send.wait();
    }
    drop(send_bufs);

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(sizes_in),
    }
}

//! Tolerance synchronizer: reduce per-vertex merge radii to a global minimum
//! across every rank sharing a vertex.
//!
//! Each (global vertex id, tentative tolerance) pair is routed to the block
//! owner of its id; the owner reduces by minimum over all received copies of
//! the same id and sends the reduced value back to every original sender.
//! Because the reduction keys on global ids and `min` is commutative, every
//! rank ends with the same tolerance for any vertex it holds, independent of
//! replication count and arrival order. A vertex referenced by a single rank
//! reduces to itself; that is an ordinary no-op, not a failure.

use std::collections::{BTreeMap, HashMap};

use crate::exchange::block::BlockDistribution;
use crate::exchange::communicator::{CommTag, Communicator, Wait, allgather_u64};
use crate::exchange::context::JoinContext;
use crate::exchange::data_exchange::{all_peers, exchange_bytes_symmetric};
use crate::exchange::wire::{WireGid, WireTolerance, cast_slice, decode_vec};
use crate::join_error::JoinError;
use crate::topology::vertex::JoinVertex;

/// Base tag for the synchronizer's stages.
pub const TOLERANCE_SYNC_TAG: CommTag = CommTag::new(0x0A00);

/// Synchronize vertex tolerances over the ranks with the default tag.
pub fn sync_vertex_tolerances<C>(
    ctx: &JoinContext<C>,
    vertices: &mut [JoinVertex],
) -> Result<(), JoinError>
where
    C: Communicator + Sync,
{
    sync_vertex_tolerances_with_tags(ctx, TOLERANCE_SYNC_TAG, vertices)
}

/// Synchronize vertex tolerances over the ranks.
///
/// For a vertex with the same global id but a different tolerance on another
/// rank, every copy ends up with the minimum. Serial contexts return
/// immediately.
pub fn sync_vertex_tolerances_with_tags<C>(
    ctx: &JoinContext<C>,
    tag: CommTag,
    vertices: &mut [JoinVertex],
) -> Result<(), JoinError>
where
    C: Communicator + Sync,
{
    if !ctx.is_parallel() {
        return Ok(());
    }

    let comm = ctx.comm();
    let rank = ctx.rank();

    // Block partition over the highest global id in play.
    let l_max = vertices.iter().map(|v| v.gnum.get()).max().unwrap_or(0);
    let g_max = allgather_u64(comm, l_max).into_iter().max().unwrap_or(0);
    let blocks = BlockDistribution::new(ctx.n_ranks(), g_max);

    // Route each pair to its block owner, remembering the send order so the
    // owner's reply (same order) can be written back.
    let mut sent_order: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut sent_pairs: HashMap<usize, Vec<WireTolerance>> = HashMap::new();
    for (i, v) in vertices.iter().enumerate() {
        let owner = blocks.owner(v.gnum.get());
        sent_order.entry(owner).or_default().push(i);
        sent_pairs
            .entry(owner)
            .or_default()
            .push(WireTolerance::new(v.gnum.get(), v.tolerance));
    }

    let peers = all_peers(comm);
    let outgoing: HashMap<usize, Vec<u8>> = sent_pairs
        .iter()
        .filter(|(&owner, _)| owner != rank)
        .map(|(&owner, pairs)| (owner, cast_slice(pairs).to_vec()))
        .collect();
    let incoming = exchange_bytes_symmetric(comm, tag, &outgoing, &peers)?;

    // Collect every copy this block owns, keyed by sender for the reply.
    let mut received: BTreeMap<usize, Vec<WireTolerance>> = BTreeMap::new();
    for (&nbr, bytes) in &incoming {
        if bytes.len() % std::mem::size_of::<WireTolerance>() != 0 {
            return Err(JoinError::BufferSizeMismatch {
                neighbor: nbr,
                expected: bytes
                    .len()
                    .next_multiple_of(std::mem::size_of::<WireTolerance>()),
                got: bytes.len(),
            });
        }
        received.insert(nbr, decode_vec(bytes));
    }
    if let Some(own) = sent_pairs.get(&rank) {
        received.insert(rank, own.clone());
    }

    // Min-reduce per block-local id.
    let mut block_tol = vec![f64::MAX; blocks.block_size() as usize];
    for pairs in received.values() {
        for pair in pairs {
            let idx = blocks.local_index(pair.gid());
            block_tol[idx] = block_tol[idx].min(pair.tolerance());
        }
    }

    // Reply with the reduced value for every copy, in received order.
    let mut reply_out: HashMap<usize, Vec<u8>> = HashMap::new();
    let mut own_reply: Vec<f64> = Vec::new();
    for (&nbr, pairs) in &received {
        let reduced: Vec<WireGid> = pairs
            .iter()
            .map(|pair| WireGid::of(block_tol[blocks.local_index(pair.gid())].to_bits()))
            .collect();
        if nbr == rank {
            own_reply = reduced.iter().map(|w| f64::from_bits(w.get())).collect();
        } else {
            reply_out.insert(nbr, cast_slice(&reduced).to_vec());
        }
    }

    // Reply counts are known on both sides: exact-size receives, no size stage.
    let mut recv_data: HashMap<usize, (C::RecvHandle, Vec<u8>)> = HashMap::new();
    for (&owner, order) in &sent_order {
        if owner == rank {
            continue;
        }
        let mut buffer = vec![0u8; order.len() * std::mem::size_of::<WireGid>()];
        let h = comm.irecv(owner, tag.offset(2).as_u16(), &mut buffer);
        recv_data.insert(owner, (h, buffer));
    }
    let mut pending_sends = Vec::with_capacity(reply_out.len());
    for (&nbr, bytes) in &reply_out {
        pending_sends.push(comm.isend(nbr, tag.offset(2).as_u16(), bytes));
    }

    let mut maybe_err = None;
    let mut replies: HashMap<usize, Vec<f64>> = HashMap::new();
    for (nbr, (h, buffer)) in recv_data {
        match h.wait() {
            Some(data) if data.len() == buffer.len() => {
                if maybe_err.is_none() {
                    let values: Vec<WireGid> = decode_vec(&data);
                    replies.insert(nbr, values.iter().map(|w| f64::from_bits(w.get())).collect());
                }
            }
            Some(data) if maybe_err.is_none() => {
                maybe_err = Some(JoinError::BufferSizeMismatch {
                    neighbor: nbr,
                    expected: buffer.len(),
                    got: data.len(),
                });
            }
            None if maybe_err.is_none() => {
                maybe_err = Some(JoinError::Comm {
                    neighbor: nbr,
                    source: format!("no synchronized tolerances received from rank {nbr}").into(),
                });
            }
            _ => {}
        }
    }
    for send in pending_sends {
        let _ = send.wait();
    }
    if let Some(err) = maybe_err {
        return Err(err);
    }

    // Write the reduced tolerances back in the original send order.
    for (&owner, order) in &sent_order {
        let values = if owner == rank {
            &own_reply
        } else {
            replies.get(&owner).ok_or_else(|| JoinError::Comm {
                neighbor: owner,
                source: format!("missing tolerance reply from rank {owner}").into(),
            })?
        };
        if values.len() != order.len() {
            return Err(JoinError::CountMismatch {
                neighbor: owner,
                expected: order.len(),
                got: values.len(),
            });
        }
        for (&local, &tol) in order.iter().zip(values) {
            vertices[local].tolerance = tol;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::communicator::MailboxComm;
    use crate::topology::point::VertexId;
    use serial_test::serial;

    fn vertex(gid: u64, tol: f64) -> JoinVertex {
        let mut v = JoinVertex::origin(VertexId::new(gid).unwrap(), [0.0; 3]);
        v.tolerance = tol;
        v
    }

    #[test]
    fn serial_sync_is_a_no_op() {
        let ctx = JoinContext::serial();
        let mut vertices = vec![vertex(1, 0.5)];
        sync_vertex_tolerances(&ctx, &mut vertices).unwrap();
        assert_eq!(vertices[0].tolerance, 0.5);
    }

    #[test]
    #[serial]
    fn replicated_vertex_ends_at_minimum() {
        let handles: Vec<_> = (0..3)
            .map(|r| {
                std::thread::spawn(move || {
                    let ctx = JoinContext::new(MailboxComm::new(r, 3));
                    // gid 5 is on all three ranks with different tolerances;
                    // gid 10 + r is private to each rank.
                    let mut vertices =
                        vec![vertex(5, 0.3 + r as f64 * 0.1), vertex(10 + r as u64, 1.0)];
                    sync_vertex_tolerances(&ctx, &mut vertices).unwrap();
                    vertices
                })
            })
            .collect();
        for handle in handles {
            let vertices = handle.join().unwrap();
            assert_eq!(vertices[0].tolerance, 0.3);
            // Singly-referenced vertices reduce to themselves.
            assert_eq!(vertices[1].tolerance, 1.0);
        }
    }
}

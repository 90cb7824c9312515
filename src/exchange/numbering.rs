//! Dense global numbering.
//!
//! Assigns gap-free, 1-based global ids to an arbitrary, possibly-duplicated
//! distributed key set: the same key receives the same id on every rank that
//! presents it, ids are dense across all ranks, and their order follows the
//! key order (not arrival order, not rank index). Keys are either bare global
//! ids or canonical (min-gid, max-gid) pairs; the latter is how edges get a
//! rank-invariant identity.
//!
//! The distributed path routes each distinct key to a block owner determined
//! by a [`BlockDistribution`] over the key space, lets owners number their
//! sorted distinct keys, offsets each block by the unique counts of the
//! blocks below it (allgather), and ships the assigned ids back to every
//! requester.

use std::collections::{BTreeMap, HashMap};

use crate::exchange::block::BlockDistribution;
use crate::exchange::communicator::{CommTag, Communicator, Wait, allgather_u64};
use crate::exchange::context::JoinContext;
use crate::exchange::data_exchange::{all_peers, exchange_bytes_symmetric};
use crate::exchange::wire::{WireGid, WirePair, cast_slice, decode_vec};
use crate::join_error::JoinError;

/// Base tag for the numbering protocol's stages.
pub const NUMBERING_TAG: CommTag = CommTag::new(0x0B00);

/// Result of a dense numbering pass.
#[derive(Clone, Debug)]
pub struct DenseNumbering {
    /// New 1-based global id for each input key, in input order.
    pub ids: Vec<u64>,
    /// Total number of distinct keys across all ranks.
    pub n_global: u64,
}

/// Dense numbering over bare global ids.
pub fn dense_numbering_u64<C>(
    ctx: &JoinContext<C>,
    tag: CommTag,
    keys: &[u64],
) -> Result<DenseNumbering, JoinError>
where
    C: Communicator + Sync,
{
    let wide: Vec<(u64, u64)> = keys.iter().map(|&k| (k, 0)).collect();
    dense_numbering_impl(ctx, tag, &wide)
}

/// Dense numbering over canonical key pairs, ordered lexicographically.
pub fn dense_numbering_pairs<C>(
    ctx: &JoinContext<C>,
    tag: CommTag,
    keys: &[(u64, u64)],
) -> Result<DenseNumbering, JoinError>
where
    C: Communicator + Sync,
{
    dense_numbering_impl(ctx, tag, keys)
}

/// Total number of distinct keys across all ranks, without keeping the ids.
pub fn dense_global_count<C>(
    ctx: &JoinContext<C>,
    tag: CommTag,
    keys: &[u64],
) -> Result<u64, JoinError>
where
    C: Communicator + Sync,
{
    Ok(dense_numbering_u64(ctx, tag, keys)?.n_global)
}

fn dense_numbering_impl<C>(
    ctx: &JoinContext<C>,
    tag: CommTag,
    keys: &[(u64, u64)],
) -> Result<DenseNumbering, JoinError>
where
    C: Communicator + Sync,
{
    let mut distinct: Vec<(u64, u64)> = keys.to_vec();
    distinct.sort_unstable();
    distinct.dedup();

    if !ctx.is_parallel() {
        let ids = keys
            .iter()
            .map(|k| distinct.partition_point(|d| d < k) as u64 + 1)
            .collect();
        return Ok(DenseNumbering {
            ids,
            n_global: distinct.len() as u64,
        });
    }

    let comm = ctx.comm();
    let rank = ctx.rank();

    // Block routing over the leading key component.
    let l_max = distinct.last().map_or(0, |k| k.0);
    let g_max = allgather_u64(comm, l_max).into_iter().max().unwrap_or(0);
    let blocks = BlockDistribution::new(ctx.n_ranks(), g_max);

    // Route each distinct key to its block owner; self-addressed keys stay
    // local. Per-owner order is the sorted key order.
    let mut sent: HashMap<usize, Vec<(u64, u64)>> = HashMap::new();
    for &key in &distinct {
        sent.entry(blocks.owner(key.0)).or_default().push(key);
    }

    let peers = all_peers(comm);
    let outgoing: HashMap<usize, Vec<u8>> = sent
        .iter()
        .filter(|(&owner, _)| owner != rank)
        .map(|(&owner, block_keys)| {
            let wire: Vec<WirePair> = block_keys.iter().map(|k| WirePair::new(k.0, k.1)).collect();
            (owner, cast_slice(&wire).to_vec())
        })
        .collect();
    let incoming = exchange_bytes_symmetric(comm, tag, &outgoing, &peers)?;

    // Per-peer received key lists, replies must follow the same order.
    let mut received: BTreeMap<usize, Vec<(u64, u64)>> = BTreeMap::new();
    for (&nbr, bytes) in &incoming {
        if bytes.len() % std::mem::size_of::<WirePair>() != 0 {
            return Err(JoinError::BufferSizeMismatch {
                neighbor: nbr,
                expected: bytes.len().next_multiple_of(std::mem::size_of::<WirePair>()),
                got: bytes.len(),
            });
        }
        let pairs: Vec<WirePair> = decode_vec(bytes);
        received.insert(nbr, pairs.iter().map(|p| (p.hi(), p.lo())).collect());
    }
    if let Some(own) = sent.get(&rank) {
        received.insert(rank, own.clone());
    }

    // Number the distinct keys of this block.
    let mut block_keys: Vec<(u64, u64)> = received.values().flatten().copied().collect();
    block_keys.sort_unstable();
    block_keys.dedup();

    let counts = allgather_u64(comm, block_keys.len() as u64);
    let base: u64 = counts.iter().take(rank).sum();
    let n_global: u64 = counts.iter().sum();

    // Ship each requester its ids, aligned with the keys it sent.
    let mut reply_out: HashMap<usize, Vec<u8>> = HashMap::new();
    let mut own_reply: Vec<u64> = Vec::new();
    for (&nbr, nbr_keys) in &received {
        let ids: Vec<WireGid> = nbr_keys
            .iter()
            .map(|k| WireGid::of(base + block_keys.partition_point(|b| b < k) as u64 + 1))
            .collect();
        if nbr == rank {
            own_reply = ids.iter().map(WireGid::get).collect();
        } else {
            reply_out.insert(nbr, cast_slice(&ids).to_vec());
        }
    }
    let reply_in = exchange_reply(comm, tag.offset(2), &reply_out, &sent, rank)?;

    // Map each distinct key back to its assigned id.
    let mut assigned: HashMap<(u64, u64), u64> = HashMap::with_capacity(distinct.len());
    for (&owner, owner_keys) in &sent {
        let ids: Vec<u64> = if owner == rank {
            own_reply.clone()
        } else {
            let bytes = reply_in.get(&owner).ok_or_else(|| JoinError::Comm {
                neighbor: owner,
                source: format!("missing numbering reply from rank {owner}").into(),
            })?;
            decode_vec::<WireGid>(bytes).iter().map(WireGid::get).collect()
        };
        if ids.len() != owner_keys.len() {
            return Err(JoinError::CountMismatch {
                neighbor: owner,
                expected: owner_keys.len(),
                got: ids.len(),
            });
        }
        for (key, id) in owner_keys.iter().zip(ids) {
            assigned.insert(*key, id);
        }
    }

    let mut ids = Vec::with_capacity(keys.len());
    for key in keys {
        // Every input key was routed, so the lookup cannot miss.
        ids.push(*assigned.get(key).expect("key numbered above"));
    }
    Ok(DenseNumbering { ids, n_global })
}

/// Reply stage: counts are already known to both sides, so no size exchange
/// is needed: each requester posts exact-size receives from every owner it
/// contacted.
fn exchange_reply<C>(
    comm: &C,
    tag: CommTag,
    reply_out: &HashMap<usize, Vec<u8>>,
    sent: &HashMap<usize, Vec<(u64, u64)>>,
    rank: usize,
) -> Result<HashMap<usize, Vec<u8>>, JoinError>
where
    C: Communicator + Sync,
{
    let mut recv_data: HashMap<usize, (C::RecvHandle, Vec<u8>)> = HashMap::new();
    for (&owner, owner_keys) in sent {
        if owner == rank {
            continue;
        }
        let mut buffer = vec![0u8; owner_keys.len() * std::mem::size_of::<WireGid>()];
        let h = comm.irecv(owner, tag.as_u16(), &mut buffer);
        recv_data.insert(owner, (h, buffer));
    }

    let mut pending_sends = Vec::with_capacity(reply_out.len());
    for (&nbr, bytes) in reply_out {
        pending_sends.push(comm.isend(nbr, tag.as_u16(), bytes));
    }

    let mut incoming = HashMap::new();
    let mut maybe_err = None;
    for (nbr, (h, mut buffer)) in recv_data {
        match h.wait() {
            Some(data) if data.len() == buffer.len() => {
                if maybe_err.is_none() {
                    buffer.copy_from_slice(&data);
                    incoming.insert(nbr, buffer);
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
                    source: format!("no numbering reply received from rank {nbr}").into(),
                });
            }
            _ => {}
        }
    }
    for send in pending_sends {
        let _ = send.wait();
    }

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(incoming),
    }
}

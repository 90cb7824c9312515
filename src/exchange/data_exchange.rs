//! Stage 2 of every bulk exchange: move the payload bytes announced by the
//! size stage.
//!
//! [`exchange_bytes_symmetric`] runs both stages back to back using two tags
//! derived from the operation's base tag. A rank's message to itself never
//! touches the transport; callers keep self-addressed payloads local.

use std::collections::{BTreeSet, HashMap};

use crate::exchange::communicator::{CommTag, Communicator, Wait};
use crate::exchange::size_exchange::exchange_sizes_symmetric;
use crate::join_error::JoinError;

/// The set of all peer ranks (everyone except ourselves).
pub fn all_peers<C: Communicator>(comm: &C) -> BTreeSet<usize> {
    (0..comm.size()).filter(|&r| r != comm.rank()).collect()
}

/// Symmetric payload exchange: size stage on `tag`, data stage on
/// `tag.offset(1)`. Returns `peer → received bytes` for every peer that sent
/// a non-empty payload; peers with nothing to send are absent from the map.
pub fn exchange_bytes_symmetric<C>(
    comm: &C,
    tag: CommTag,
    outgoing: &HashMap<usize, Vec<u8>>,
    peers: &BTreeSet<usize>,
) -> Result<HashMap<usize, Vec<u8>>, JoinError>
where
    C: Communicator + Sync,
{
    let send_sizes: HashMap<usize, usize> =
        peers.iter().map(|&nbr| (nbr, outgoing.get(&nbr).map_or(0, Vec::len))).collect();
    let recv_sizes = exchange_sizes_symmetric(&send_sizes, comm, tag, peers)?;

    let data_tag = tag.offset(1);

    // Post receives for every peer announcing a non-empty payload.
    let mut recv_data: HashMap<usize, (C::RecvHandle, Vec<u8>)> = HashMap::new();
    for &nbr in peers {
        let n_bytes = recv_sizes.get(&nbr).copied().unwrap_or(0);
        if n_bytes == 0 {
            continue;
        }
        let mut buffer = vec![0u8; n_bytes];
        let h = comm.irecv(nbr, data_tag.as_u16(), &mut buffer);
        recv_data.insert(nbr, (h, buffer));
    }

    // Post sends, keeping buffers alive until completion.
    let mut pending_sends = Vec::new();
    for &nbr in peers {
        if let Some(bytes) = outgoing.get(&nbr)
            && !bytes.is_empty()
        {
            pending_sends.push(comm.isend(nbr, data_tag.as_u16(), bytes));
        }
    }

    // Wait for all recvs; collect results but drain everything regardless.
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
                    source: format!("no payload received from rank {nbr}").into(),
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

//! Mesh fragment exchanger: redistribute requested faces (and their
//! vertices) between ranks by global id.
//!
//! A requester resolves the owner of each wanted face id against the
//! monotone [`RankIndex`], ships the ids to the owners in one collective
//! exchange, and gets back, per face, its vertex count and fully *inlined*
//! vertex records (coordinates, tolerance, state) rather than references:
//! the requester has no local numbering for the owner's vertices. The
//! flattened reply legitimately duplicates vertices shared between faces;
//! the receiver deduplicates by global id with
//! [`vertex_clean`](JoinFragment::vertex_clean), which avoids a second
//! resolution round. A face id with no resolvable owner is a fatal
//! consistency error.

use std::collections::{BTreeMap, HashMap};

use crate::exchange::block::RankIndex;
use crate::exchange::communicator::{CommTag, Communicator};
use crate::exchange::context::JoinContext;
use crate::exchange::data_exchange::{all_peers, exchange_bytes_symmetric};
use crate::exchange::wire::{
    WireFaceHead, WireGid, WireVertex, cast_slice, decode_vec,
};
use crate::fragment::mesh::JoinFragment;
use crate::join_error::JoinError;
use crate::topology::point::FaceId;
use crate::topology::vertex::JoinVertex;

/// Base tag for the face exchange stages.
pub const FACE_EXCHANGE_TAG: CommTag = CommTag::new(0x0C00);

/// Fetch the faces named in `requests` (sorted global ids) from their owning
/// ranks, assembling them into a new fragment. The local fragment supplies
/// the faces this rank owns; its global counts carry over unchanged, since
/// the mesh does not change from a global point of view; the exchange only
/// redistributes elements.
///
/// The returned fragment has deduplicated vertices but unordered faces; run
/// [`JoinFragment::face_order`] once all requests are assembled (see
/// [`JoinFragment::from_global_selection`]).
pub fn exchange_faces<C>(
    ctx: &JoinContext<C>,
    tag: CommTag,
    name: &str,
    requests: &[FaceId],
    rank_index: &RankIndex,
    local: &JoinFragment,
) -> Result<JoinFragment, JoinError>
where
    C: Communicator + Sync,
{
    let comm = ctx.comm();
    let rank = ctx.rank();

    // (a) resolve each id's owner by range search.
    let request_gids: Vec<u64> = requests.iter().map(|f| f.get()).collect();
    let owners = rank_index.owners_of_sorted(&request_gids)?;

    let mut wanted: HashMap<usize, Vec<u64>> = HashMap::new();
    for (&gid, &owner) in request_gids.iter().zip(&owners) {
        wanted.entry(owner).or_default().push(gid);
    }

    // (b) one collective exchange ships requested ids to owners...
    let peers = all_peers(comm);
    let outgoing: HashMap<usize, Vec<u8>> = wanted
        .iter()
        .filter(|(&owner, _)| owner != rank)
        .map(|(&owner, gids)| {
            let wire: Vec<WireGid> = gids.iter().map(|&g| WireGid::of(g)).collect();
            (owner, cast_slice(&wire).to_vec())
        })
        .collect();
    let incoming = exchange_bytes_symmetric(comm, tag, &outgoing, &peers)?;

    // ...owners reply with each face's vertex count and inlined records.
    let mut reply_out: HashMap<usize, Vec<u8>> = HashMap::new();
    let mut own_reply: Vec<u8> = Vec::new();
    for (&nbr, bytes) in &incoming {
        if bytes.len() % std::mem::size_of::<WireGid>() != 0 {
            return Err(JoinError::BufferSizeMismatch {
                neighbor: nbr,
                expected: bytes.len().next_multiple_of(std::mem::size_of::<WireGid>()),
                got: bytes.len(),
            });
        }
        let gids: Vec<u64> = decode_vec::<WireGid>(bytes).iter().map(WireGid::get).collect();
        reply_out.insert(nbr, serve_faces(rank, &gids, rank_index, local)?);
    }
    if let Some(own) = wanted.get(&rank) {
        own_reply = serve_faces(rank, own, rank_index, local)?;
    }
    let replies = exchange_bytes_symmetric(comm, tag.offset(2), &reply_out, &peers)?;

    // (c) assemble and deduplicate. Peers are visited in rank order so the
    // assembly is deterministic; face order is restored by the caller.
    let mut parts: BTreeMap<usize, Vec<(FaceId, Vec<JoinVertex>)>> = BTreeMap::new();
    for (&owner, gids) in &wanted {
        let bytes = if owner == rank {
            &own_reply
        } else {
            replies.get(&owner).ok_or_else(|| JoinError::Comm {
                neighbor: owner,
                source: format!("no face reply received from rank {owner}").into(),
            })?
        };
        parts.insert(owner, decode_reply(owner, gids.len(), bytes)?);
    }

    let mut mesh = JoinFragment::from_flattened(name, parts.into_values().flatten());
    mesh.n_g_faces = local.n_g_faces;
    mesh.n_g_vertices = local.n_g_vertices;
    mesh.vertex_clean();
    Ok(mesh)
}

impl JoinFragment {
    /// Build the fragment holding the given global face selection, fetching
    /// remote faces over the exchange when the ids live on other ranks. The
    /// result is face-ordered and vertex-deduplicated.
    pub fn from_global_selection<C>(
        ctx: &JoinContext<C>,
        name: &str,
        requests: &[FaceId],
        rank_index: &RankIndex,
        local: &JoinFragment,
    ) -> Result<Self, JoinError>
    where
        C: Communicator + Sync,
    {
        if !ctx.is_parallel() {
            // Serial: global ids are local positions shifted by one.
            let subset: Vec<usize> = requests.iter().map(|f| f.get() as usize - 1).collect();
            return JoinFragment::from_subset(ctx, name, &subset, local);
        }

        let mut mesh = exchange_faces(ctx, FACE_EXCHANGE_TAG, name, requests, rank_index, local)?;
        mesh.face_order();
        Ok(mesh)
    }
}

/// Encode the reply for one requester: `[WireFaceHead, ...][WireVertex, ...]`
/// with the vertex records of all faces concatenated behind the headers.
fn serve_faces(
    rank: usize,
    gids: &[u64],
    rank_index: &RankIndex,
    local: &JoinFragment,
) -> Result<Vec<u8>, JoinError> {
    let first_gid = rank_index.first_gid(rank);

    let mut heads = Vec::with_capacity(gids.len());
    let mut vertices: Vec<WireVertex> = Vec::new();
    for &gid in gids {
        // Owned faces sit at contiguous compact positions: gid − first_gid.
        let face = gid
            .checked_sub(first_gid)
            .map(|offset| offset as usize)
            .filter(|&f| f < local.n_faces() && local.face_gnum[f].get() == gid)
            .ok_or(JoinError::UnresolvedGlobalId(gid))?;

        let verts = local.face_vertices(face);
        heads.push(WireFaceHead::new(gid, verts.len()));
        vertices.extend(verts.iter().map(|&v| WireVertex::encode(&local.vertices[v])));
    }

    let mut bytes = Vec::with_capacity(
        heads.len() * std::mem::size_of::<WireFaceHead>()
            + vertices.len() * std::mem::size_of::<WireVertex>(),
    );
    bytes.extend_from_slice(cast_slice(&heads));
    bytes.extend_from_slice(cast_slice(&vertices));
    Ok(bytes)
}

fn decode_reply(
    neighbor: usize,
    n_requested: usize,
    bytes: &[u8],
) -> Result<Vec<(FaceId, Vec<JoinVertex>)>, JoinError> {
    let head_bytes = n_requested * std::mem::size_of::<WireFaceHead>();
    if bytes.len() < head_bytes {
        return Err(JoinError::BufferSizeMismatch {
            neighbor,
            expected: head_bytes,
            got: bytes.len(),
        });
    }
    let heads: Vec<WireFaceHead> = decode_vec(&bytes[..head_bytes]);

    let n_vertices: usize = heads.iter().map(WireFaceHead::n_vertices).sum();
    let expected = head_bytes + n_vertices * std::mem::size_of::<WireVertex>();
    if bytes.len() != expected {
        return Err(JoinError::BufferSizeMismatch {
            neighbor,
            expected,
            got: bytes.len(),
        });
    }
    let vertices: Vec<WireVertex> = decode_vec(&bytes[head_bytes..]);

    let mut faces = Vec::with_capacity(n_requested);
    let mut cursor = 0;
    for head in heads {
        let face_vertices = vertices[cursor..cursor + head.n_vertices()]
            .iter()
            .map(WireVertex::decode)
            .collect::<Result<Vec<_>, _>>()?;
        cursor += head.n_vertices();
        faces.push((FaceId::new(head.gnum())?, face_vertices));
    }
    Ok(faces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::communicator::MailboxComm;
    use crate::topology::point::VertexId;
    use serial_test::serial;

    fn vtx(gid: u64, x: f64) -> JoinVertex {
        JoinVertex::origin(VertexId::new(gid).unwrap(), [x, 0.0, 0.0])
    }

    /// Rank-local fragment: rank 0 owns faces 1..=2, rank 1 owns face 3,
    /// compact global ids.
    fn local_fragment(rank: usize) -> JoinFragment {
        let fid = |raw: u64| FaceId::new(raw).unwrap();
        let mut mesh = if rank == 0 {
            JoinFragment::from_flattened(
                "local",
                vec![
                    (fid(1), vec![vtx(1, 0.0), vtx(2, 1.0), vtx(3, 0.5)]),
                    (fid(2), vec![vtx(2, 1.0), vtx(4, 2.0), vtx(3, 0.5)]),
                ],
            )
        } else {
            JoinFragment::from_flattened(
                "local",
                vec![(fid(3), vec![vtx(4, 2.0), vtx(5, 3.0), vtx(3, 0.5)])],
            )
        };
        mesh.vertex_clean();
        mesh.n_g_faces = 3;
        mesh.n_g_vertices = 5;
        mesh
    }

    #[test]
    #[serial]
    fn cross_rank_requests_are_served() {
        let handles: Vec<_> = (0..2)
            .map(|r| {
                std::thread::spawn(move || {
                    let ctx = JoinContext::new(MailboxComm::new(r, 2));
                    let rank_index = RankIndex::new(vec![0, 2, 3]).unwrap();
                    let local = local_fragment(r);
                    // Rank 0 wants faces 2 and 3; rank 1 wants faces 1 and 3.
                    let requests: Vec<FaceId> = if r == 0 {
                        vec![FaceId::new(2).unwrap(), FaceId::new(3).unwrap()]
                    } else {
                        vec![FaceId::new(1).unwrap(), FaceId::new(3).unwrap()]
                    };
                    JoinFragment::from_global_selection(
                        &ctx,
                        "wanted",
                        &requests,
                        &rank_index,
                        &local,
                    )
                    .unwrap()
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        // Both fragments are face-ordered and vertex-deduplicated.
        let gids0: Vec<u64> = results[0].face_gnum.iter().map(|f| f.get()).collect();
        assert_eq!(gids0, vec![2, 3]);
        let gids1: Vec<u64> = results[1].face_gnum.iter().map(|f| f.get()).collect();
        assert_eq!(gids1, vec![1, 3]);

        // Face 3's vertices arrived inlined with coordinates intact.
        let f3 = &results[0];
        let verts: Vec<u64> = f3
            .face_vertices(1)
            .iter()
            .map(|&v| f3.vertices[v].gnum.get())
            .collect();
        assert_eq!(verts, vec![4, 5, 3]);
        // Vertices 3 and 4 are shared between the two faces after dedup.
        assert_eq!(f3.n_vertices(), 4);
        assert_eq!(f3.n_g_faces, 3);
    }

    #[test]
    fn serial_selection_is_a_subset_extraction() {
        let ctx = JoinContext::serial();
        let local = local_fragment(0);
        let rank_index = RankIndex::new(vec![0, 2]).unwrap();
        let requests = vec![FaceId::new(2).unwrap()];
        let mesh =
            JoinFragment::from_global_selection(&ctx, "serial", &requests, &rank_index, &local)
                .unwrap();
        assert_eq!(mesh.n_faces(), 1);
        assert_eq!(mesh.face_gnum[0].get(), 2);
        assert_eq!(mesh.n_vertices(), 3);
    }

    #[test]
    fn serving_a_face_outside_the_owned_range_is_fatal() {
        let local = local_fragment(0);
        let rank_index = RankIndex::new(vec![0, 2, 3]).unwrap();
        // Rank 0 owns compact ids 1..=2; gid 3 belongs to rank 1.
        let err = serve_faces(0, &[3], &rank_index, &local).unwrap_err();
        assert!(matches!(err, JoinError::UnresolvedGlobalId(3)));
    }

    #[test]
    fn reply_with_wrong_byte_count_is_fatal() {
        let err = decode_reply(1, 2, &[0u8; 8]).unwrap_err();
        assert!(matches!(err, JoinError::BufferSizeMismatch { neighbor: 1, .. }));
    }
}

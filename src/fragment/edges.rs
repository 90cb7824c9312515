//! Edge extraction: derive a globally-numbered unique edge set from a
//! fragment's faces.
//!
//! One directed pair is emitted per consecutive face-vertex couple (with
//! wrap-around), canonicalized so the endpoint with the smaller global id
//! comes first, sorted lexicographically by (min-gid, max-gid) and collapsed
//! into one record per distinct pair. Each *directed* occurrence keeps an
//! [`EdgeRef`]: the edge index plus the traversal direction relative to the
//! canonical orientation. A vertex → incident-edge adjacency index answers
//! "which edge joins v1 and v2" in O(degree).
//!
//! Edge records are derived, never persisted independently: whenever the
//! face connectivity changes, the set is recomputed.

use crate::exchange::communicator::{CommTag, Communicator};
use crate::exchange::context::JoinContext;
use crate::exchange::numbering::dense_numbering_pairs;
use crate::fragment::mesh::JoinFragment;
use crate::join_error::JoinError;
use crate::topology::point::{EdgeId, VertexId};

/// Base tag for the edge numbering exchange.
pub const EDGE_NUMBERING_TAG: CommTag = CommTag::new(0x0D00);

/// Traversal direction of an edge occurrence relative to the canonical
/// (min-gid → max-gid) orientation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EdgeDirection {
    Forward,
    Reverse,
}

impl EdgeDirection {
    pub fn reversed(self) -> Self {
        match self {
            EdgeDirection::Forward => EdgeDirection::Reverse,
            EdgeDirection::Reverse => EdgeDirection::Forward,
        }
    }
}

/// A reference to an edge as traversed from a particular vertex couple.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EdgeRef {
    /// Index into the owning [`EdgeSet`].
    pub edge: usize,
    pub direction: EdgeDirection,
}

/// Edge → incident faces, CSR layout.
#[derive(Clone, Debug)]
pub struct EdgeFaceAdjacency {
    pub idx: Vec<usize>,
    pub faces: Vec<usize>,
}

impl EdgeFaceAdjacency {
    pub fn faces_of(&self, edge: usize) -> &[usize] {
        &self.faces[self.idx[edge]..self.idx[edge + 1]]
    }
}

/// The unique edge set of a fragment.
#[derive(Clone, Debug)]
pub struct EdgeSet {
    /// Canonical (v_lo, v_hi) local vertex pair per edge; the global id of
    /// `v_lo` is strictly smaller than that of `v_hi`.
    def: Vec<(usize, usize)>,
    /// Global edge ids, identical on every rank seeing the same pair.
    pub gnum: Vec<EdgeId>,
    /// Number of distinct edges across all ranks.
    pub n_g_edges: u64,
    /// Global vertex ids, copied from the fragment for id-based queries and
    /// error reporting.
    vtx_gnum: Vec<VertexId>,
    // vertex → incident edge adjacency (CSR)
    vtx_idx: Vec<usize>,
    adj_vtx: Vec<usize>,
    adj_edge: Vec<EdgeRef>,
}

impl EdgeSet {
    /// Extract the unique edge set of `fragment`. In a distributed run the
    /// global edge ids come from the dense numbering primitive keyed on the
    /// canonical global-id pair.
    pub fn from_fragment<C>(
        ctx: &JoinContext<C>,
        fragment: &JoinFragment,
    ) -> Result<Self, JoinError>
    where
        C: Communicator + Sync,
    {
        let n_vertices = fragment.n_vertices();
        let vtx_gnum: Vec<VertexId> = fragment.vertices.iter().map(|v| v.gnum).collect();

        // Directed pair per consecutive face couple, canonicalized on the fly.
        let mut canonical: Vec<((u64, u64), (usize, usize))> =
            Vec::with_capacity(fragment.face_vtx_lst.len());
        for face in 0..fragment.n_faces() {
            let verts = fragment.face_vertices(face);
            let n = verts.len();
            for j in 0..n {
                let v1 = verts[j];
                let v2 = verts[(j + 1) % n];
                let (g1, g2) = (vtx_gnum[v1].get(), vtx_gnum[v2].get());
                if g1 > g2 {
                    canonical.push(((g2, g1), (v2, v1)));
                } else {
                    canonical.push(((g1, g2), (v1, v2)));
                }
            }
        }

        canonical.sort_unstable_by_key(|&(gnum_pair, _)| gnum_pair);
        canonical.dedup_by_key(|&mut (gnum_pair, _)| gnum_pair);

        let def: Vec<(usize, usize)> = canonical.iter().map(|&(_, pair)| pair).collect();
        let gnum_pairs: Vec<(u64, u64)> = canonical.iter().map(|&(pair, _)| pair).collect();

        // Vertex → incident edge adjacency.
        let mut vtx_idx = vec![0usize; n_vertices + 1];
        for &(lo, hi) in &def {
            vtx_idx[lo + 1] += 1;
            vtx_idx[hi + 1] += 1;
        }
        for i in 0..n_vertices {
            vtx_idx[i + 1] += vtx_idx[i];
        }
        let mut cursor = vtx_idx.clone();
        let mut adj_vtx = vec![0usize; vtx_idx[n_vertices]];
        let mut adj_edge = vec![
            EdgeRef {
                edge: 0,
                direction: EdgeDirection::Forward
            };
            vtx_idx[n_vertices]
        ];
        for (edge, &(lo, hi)) in def.iter().enumerate() {
            adj_vtx[cursor[lo]] = hi;
            adj_edge[cursor[lo]] = EdgeRef {
                edge,
                direction: EdgeDirection::Forward,
            };
            cursor[lo] += 1;

            adj_vtx[cursor[hi]] = lo;
            adj_edge[cursor[hi]] = EdgeRef {
                edge,
                direction: EdgeDirection::Reverse,
            };
            cursor[hi] += 1;
        }

        // Global edge numbering keyed on the canonical pair.
        let (gnum, n_g_edges) = if ctx.is_parallel() {
            let numbering = dense_numbering_pairs(ctx, EDGE_NUMBERING_TAG, &gnum_pairs)?;
            let ids = numbering
                .ids
                .iter()
                .map(|&id| EdgeId::new(id))
                .collect::<Result<Vec<_>, _>>()?;
            (ids, numbering.n_global)
        } else {
            // Already in lexicographic canonical order: ids are positional.
            let ids = (1..=def.len() as u64)
                .map(EdgeId::new)
                .collect::<Result<Vec<_>, _>>()?;
            (ids, def.len() as u64)
        };

        Ok(EdgeSet {
            def,
            gnum,
            n_g_edges,
            vtx_gnum,
            vtx_idx,
            adj_vtx,
            adj_edge,
        })
    }

    pub fn n_edges(&self) -> usize {
        self.def.len()
    }

    /// Canonical (v_lo, v_hi) local vertex pair of an edge.
    pub fn vertices_of(&self, edge: usize) -> (usize, usize) {
        self.def[edge]
    }

    /// Edges incident to a vertex.
    pub fn incident_edges(&self, vertex: usize) -> impl Iterator<Item = EdgeRef> + '_ {
        self.adj_edge[self.vtx_idx[vertex]..self.vtx_idx[vertex + 1]]
            .iter()
            .copied()
    }

    /// The edge joining `v1` and `v2` (local indices), seen from the `v1 →
    /// v2` traversal. A vertex with no incident edges or a couple with no
    /// edge is a fatal consistency error.
    pub fn edge_between(&self, v1: usize, v2: usize) -> Result<EdgeRef, JoinError> {
        let range = self.vtx_idx[v1]..self.vtx_idx[v1 + 1];
        if range.is_empty() {
            return Err(JoinError::IsolatedVertex(self.vtx_gnum[v1]));
        }
        for i in range {
            if self.adj_vtx[i] == v2 {
                return Ok(self.adj_edge[i]);
            }
        }
        Err(JoinError::MissingEdge {
            v1: self.vtx_gnum[v1],
            v2: self.vtx_gnum[v2],
        })
    }

    /// Edge → face incidence for the fragment the set was extracted from.
    pub fn edge_face_adjacency(
        &self,
        fragment: &JoinFragment,
    ) -> Result<EdgeFaceAdjacency, JoinError> {
        let mut idx = vec![0usize; self.n_edges() + 1];
        for face in 0..fragment.n_faces() {
            let verts = fragment.face_vertices(face);
            let n = verts.len();
            for j in 0..n {
                let edge_ref = self.edge_between(verts[j], verts[(j + 1) % n])?;
                idx[edge_ref.edge + 1] += 1;
            }
        }
        for e in 0..self.n_edges() {
            idx[e + 1] += idx[e];
        }

        let mut cursor = idx.clone();
        let mut faces = vec![0usize; idx[self.n_edges()]];
        for face in 0..fragment.n_faces() {
            let verts = fragment.face_vertices(face);
            let n = verts.len();
            for j in 0..n {
                let edge_ref = self.edge_between(verts[j], verts[(j + 1) % n])?;
                faces[cursor[edge_ref.edge]] = face;
                cursor[edge_ref.edge] += 1;
            }
        }

        Ok(EdgeFaceAdjacency { idx, faces })
    }
}

/// Tabular dump: one line per edge with its global id and canonical couple.
impl std::fmt::Display for EdgeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} edges ({} global)", self.n_edges(), self.n_g_edges)?;
        for (edge, &(lo, hi)) in self.def.iter().enumerate() {
            writeln!(
                f,
                "  edge {:>8}: {} - {}",
                self.gnum[edge], self.vtx_gnum[lo], self.vtx_gnum[hi]
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::point::FaceId;
    use crate::topology::vertex::JoinVertex;

    fn fragment_two_triangles() -> JoinFragment {
        let vtx = |gid: u64| JoinVertex::origin(VertexId::new(gid).unwrap(), [0.0; 3]);
        let mut mesh = JoinFragment::from_flattened(
            "e",
            vec![
                (FaceId::new(10).unwrap(), vec![vtx(1), vtx(2), vtx(3)]),
                (FaceId::new(11).unwrap(), vec![vtx(2), vtx(4), vtx(3)]),
            ],
        );
        mesh.vertex_clean();
        mesh
    }

    #[test]
    fn shared_edge_is_collapsed() {
        let ctx = JoinContext::serial();
        let mesh = fragment_two_triangles();
        let edges = EdgeSet::from_fragment(&ctx, &mesh).unwrap();
        // 6 directed references, 5 distinct edges: (2,3) is shared.
        assert_eq!(edges.n_edges(), 5);
        assert_eq!(edges.n_g_edges, 5);
    }

    #[test]
    fn shared_edge_references_have_opposite_directions() {
        let ctx = JoinContext::serial();
        let mesh = fragment_two_triangles();
        let edges = EdgeSet::from_fragment(&ctx, &mesh).unwrap();
        // Face 10 traverses 2→3, face 11 traverses 3→2.
        let forward = edges.edge_between(1, 2).unwrap();
        let backward = edges.edge_between(2, 1).unwrap();
        assert_eq!(forward.edge, backward.edge);
        assert_eq!(forward.direction, backward.direction.reversed());
    }

    #[test]
    fn edge_ids_follow_canonical_order() {
        let ctx = JoinContext::serial();
        let mesh = fragment_two_triangles();
        let edges = EdgeSet::from_fragment(&ctx, &mesh).unwrap();
        // Lexicographic canonical pairs: (1,2) (1,3) (2,3) (2,4) (3,4).
        let pairs: Vec<(u64, u64)> = (0..edges.n_edges())
            .map(|e| {
                let (lo, hi) = edges.vertices_of(e);
                (mesh.vertices[lo].gnum.get(), mesh.vertices[hi].gnum.get())
            })
            .collect();
        assert_eq!(pairs, vec![(1, 2), (1, 3), (2, 3), (2, 4), (3, 4)]);
        let ids: Vec<u64> = edges.gnum.iter().map(|g| g.get()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn missing_couple_is_fatal() {
        let ctx = JoinContext::serial();
        let mesh = fragment_two_triangles();
        let edges = EdgeSet::from_fragment(&ctx, &mesh).unwrap();
        // Vertices 1 and 4 (local 0 and 3) share no edge.
        assert!(matches!(
            edges.edge_between(0, 3),
            Err(JoinError::MissingEdge { .. })
        ));
    }

    #[test]
    fn dump_lists_every_edge() {
        let ctx = JoinContext::serial();
        let mesh = fragment_two_triangles();
        let edges = EdgeSet::from_fragment(&ctx, &mesh).unwrap();
        let dump = edges.to_string();
        assert!(dump.starts_with("5 edges (5 global)"));
        assert_eq!(dump.lines().count(), 6);
    }

    #[test]
    fn face_adjacency_records_shared_edge_twice() {
        let ctx = JoinContext::serial();
        let mesh = fragment_two_triangles();
        let edges = EdgeSet::from_fragment(&ctx, &mesh).unwrap();
        let adj = edges.edge_face_adjacency(&mesh).unwrap();
        let shared = edges.edge_between(1, 2).unwrap().edge;
        assert_eq!(adj.faces_of(shared), &[0, 1]);
    }
}

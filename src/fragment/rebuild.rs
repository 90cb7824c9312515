//! Connectivity rebuilder: re-expand face connectivity once external merge
//! decisions are available.
//!
//! The merge step hands back an old→new vertex map and, per original edge,
//! the ordered list of vertices newly inserted on it (possibly empty). Each
//! face is rebuilt pair by pair: for every consecutive original couple
//! (v1, v2) the renamed v1 is emitted, followed by the edge's inserted
//! vertices, in forward or reversed order depending on whether the couple
//! traverses the edge along its canonical direction. Sizing runs as a first
//! pass so the connectivity arrays are written exactly once.

use crate::exchange::communicator::Communicator;
use crate::exchange::context::JoinContext;
use crate::exchange::numbering::{NUMBERING_TAG, dense_global_count};
use crate::fragment::edges::{EdgeDirection, EdgeSet};
use crate::fragment::mesh::JoinFragment;
use crate::join_error::JoinError;

/// Per-edge lists of newly inserted vertices, aligned with an [`EdgeSet`].
/// Entries are vertex indices in the *new* numbering.
#[derive(Clone, Debug)]
pub struct EdgeInsertions {
    idx: Vec<usize>,
    lst: Vec<usize>,
}

impl EdgeInsertions {
    /// No insertions on any of `n_edges` edges.
    pub fn none(n_edges: usize) -> Self {
        EdgeInsertions {
            idx: vec![0; n_edges + 1],
            lst: Vec::new(),
        }
    }

    /// Build from one ordered list per edge.
    pub fn from_lists(lists: &[Vec<usize>]) -> Self {
        let mut idx = Vec::with_capacity(lists.len() + 1);
        let mut lst = Vec::new();
        idx.push(0);
        for list in lists {
            lst.extend_from_slice(list);
            idx.push(lst.len());
        }
        EdgeInsertions { idx, lst }
    }

    pub fn n_edges(&self) -> usize {
        self.idx.len() - 1
    }

    /// Vertices inserted on an edge, in canonical (forward) order.
    pub fn inserted(&self, edge: usize) -> &[usize] {
        &self.lst[self.idx[edge]..self.idx[edge + 1]]
    }
}

/// Rebuild `mesh` in place from the merge decisions.
///
/// `old2new` maps every old local vertex index to its new index (merged
/// vertices share a slot); `n_new_vertices` is the new local vertex count.
/// Every new slot must be covered by at least one old vertex. Inserted
/// vertices equal to either renamed endpoint of their edge are skipped, both
/// when sizing and when writing. A face ending up below 3 vertices is fatal.
pub fn rebuild_connectivity<C>(
    ctx: &JoinContext<C>,
    mesh: &mut JoinFragment,
    edges: &EdgeSet,
    insertions: &EdgeInsertions,
    old2new: &[usize],
    n_new_vertices: usize,
) -> Result<(), JoinError>
where
    C: Communicator + Sync,
{
    // First pass: exact size of every rebuilt face.
    let mut new_idx = Vec::with_capacity(mesh.n_faces() + 1);
    new_idx.push(0);
    for face in 0..mesh.n_faces() {
        let verts = mesh.face_vertices(face);
        let n = verts.len();
        let mut n_face_vertices = 0;
        for j in 0..n {
            n_face_vertices += count_pair(
                mesh,
                face,
                verts[j],
                verts[(j + 1) % n],
                edges,
                insertions,
                old2new,
            )?;
        }
        if n_face_vertices < 3 {
            return Err(JoinError::DegenerateFace {
                face: mesh.face_gnum[face],
                n_vertices: n_face_vertices,
            });
        }
        new_idx.push(new_idx[face] + n_face_vertices);
    }

    // Second pass: write.
    let mut new_lst = Vec::with_capacity(*new_idx.last().unwrap());
    for face in 0..mesh.n_faces() {
        let verts = mesh.face_vertices(face);
        let n = verts.len();
        for j in 0..n {
            write_pair(
                verts[j],
                verts[(j + 1) % n],
                edges,
                insertions,
                old2new,
                &mut new_lst,
            )?;
        }
    }

    mesh.face_vtx_idx = new_idx;
    mesh.face_vtx_lst = new_lst;

    // Re-seat the vertex records under the new numbering. Merged vertices
    // collapse onto one slot; the surviving record is the last old copy.
    let mut new_vertices = vec![None; n_new_vertices];
    for (old, vertex) in mesh.vertices.iter().enumerate() {
        new_vertices[old2new[old]] = Some(*vertex);
    }
    mesh.vertices = new_vertices
        .into_iter()
        .enumerate()
        .map(|(slot, v)| v.ok_or(JoinError::IncompleteVertexMap { missing: slot }))
        .collect::<Result<_, _>>()?;

    if ctx.is_parallel() {
        let keys: Vec<u64> = mesh.vertices.iter().map(|v| v.gnum.get()).collect();
        mesh.n_g_vertices = dense_global_count(ctx, NUMBERING_TAG.offset(8), &keys)?;
    } else {
        mesh.n_g_vertices = mesh.n_vertices() as u64;
    }

    Ok(())
}

/// Number of vertices the rebuilt face gains from the couple (v1, v2):
/// the renamed v1 itself, plus the edge's inserted vertices that do not
/// coincide with either renamed endpoint.
fn count_pair(
    mesh: &JoinFragment,
    face: usize,
    v1: usize,
    v2: usize,
    edges: &EdgeSet,
    insertions: &EdgeInsertions,
    old2new: &[usize],
) -> Result<usize, JoinError> {
    if v1 == v2 {
        return Err(JoinError::ConsecutiveDuplicateVertex {
            face: mesh.face_gnum[face],
            vertex: mesh.vertices[v1].gnum,
        });
    }
    let edge_ref = edges.edge_between(v1, v2)?;
    let new_v1 = old2new[v1];
    let new_v2 = old2new[v2];

    let mut n_adds = 1;
    for &inserted in insertions.inserted(edge_ref.edge) {
        if inserted != new_v1 && inserted != new_v2 {
            n_adds += 1;
        }
    }
    Ok(n_adds)
}

fn write_pair(
    v1: usize,
    v2: usize,
    edges: &EdgeSet,
    insertions: &EdgeInsertions,
    old2new: &[usize],
    new_lst: &mut Vec<usize>,
) -> Result<(), JoinError> {
    let edge_ref = edges.edge_between(v1, v2)?;
    let new_v1 = old2new[v1];
    let new_v2 = old2new[v2];

    new_lst.push(new_v1);

    let inserted = insertions.inserted(edge_ref.edge);
    match edge_ref.direction {
        EdgeDirection::Forward => {
            for &w in inserted {
                if w != new_v1 && w != new_v2 {
                    new_lst.push(w);
                }
            }
        }
        EdgeDirection::Reverse => {
            for &w in inserted.iter().rev() {
                if w != new_v1 && w != new_v2 {
                    new_lst.push(w);
                }
            }
        }
    }
    Ok(())
}

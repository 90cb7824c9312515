//! The join-mesh fragment: canonical local representation of a distributed
//! mesh piece.
//!
//! A fragment holds a face selection with compact local vertex numbering and
//! the global identities of both. Faces are kept ordered by strictly
//! increasing global face id with duplicates removed; each face is a
//! variable-length cyclic vertex list addressed through an offset index.
//! Fragments are built either from a local subset of a larger mesh
//! (construction path a) or by assembling the flattened results of a
//! distributed exchange (path b), mutated in place by the dedup / cleaning /
//! rebuild passes, and dropped by the caller once merge decisions have been
//! applied to the parent mesh.

use std::fmt;

use itertools::Itertools;

use crate::exchange::communicator::Communicator;
use crate::exchange::context::JoinContext;
use crate::exchange::numbering::{
    NUMBERING_TAG, dense_global_count, dense_numbering_u64,
};
use crate::exchange::sync::sync_vertex_tolerances;
use crate::fragment::tolerance::{JoinParams, init_tolerances, update_tolerances};
use crate::join_error::JoinError;
use crate::topology::point::{FaceId, VertexId};
use crate::topology::vertex::JoinVertex;

/// Face selection handed in by an external selector (criteria- or
/// zone-based). Indices refer to the parent mesh arrays.
#[derive(Clone, Debug, Default)]
pub struct FaceSelection {
    /// Selected face indices (0-based, into the parent connectivity).
    pub faces: Vec<usize>,
    /// Sorted parent vertex indices referenced by the selected faces.
    pub vertices: Vec<usize>,
    /// Compact global face ids aligned with `faces`; absent in serial runs
    /// where `face index + 1` is already the identity.
    pub face_gnum: Option<Vec<FaceId>>,
}

/// Read-only view of the parent mesh arrays the selection refers to.
#[derive(Copy, Clone, Debug)]
pub struct ParentMesh<'a> {
    pub face_vtx_idx: &'a [usize],
    pub face_vtx_lst: &'a [usize],
    pub vtx_coord: &'a [[f64; 3]],
    /// Global vertex ids; absent in serial runs (`index + 1` applies).
    pub vtx_gnum: Option<&'a [u64]>,
}

/// A locally-held piece of the distributed join mesh.
#[derive(Clone, Debug, Default)]
pub struct JoinFragment {
    pub name: String,
    /// Global id per face, strictly increasing after [`face_order`].
    ///
    /// [`face_order`]: JoinFragment::face_order
    pub face_gnum: Vec<FaceId>,
    /// Face → vertex offset index, length `n_faces + 1`.
    pub face_vtx_idx: Vec<usize>,
    /// Concatenated per-face vertex lists (local indices into `vertices`).
    pub face_vtx_lst: Vec<usize>,
    /// Number of distinct faces across all ranks.
    pub n_g_faces: u64,
    pub vertices: Vec<JoinVertex>,
    /// Number of distinct vertices across all ranks.
    pub n_g_vertices: u64,
}

impl JoinFragment {
    pub fn new(name: &str) -> Self {
        JoinFragment {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn n_faces(&self) -> usize {
        self.face_gnum.len()
    }

    pub fn n_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Local vertex indices of one face, in cyclic order.
    pub fn face_vertices(&self, face: usize) -> &[usize] {
        &self.face_vtx_lst[self.face_vtx_idx[face]..self.face_vtx_idx[face + 1]]
    }

    /// Clear all faces and vertices, keeping the name and allocations.
    pub fn reset(&mut self) {
        self.face_gnum.clear();
        self.face_vtx_idx.clear();
        self.face_vtx_lst.clear();
        self.vertices.clear();
        self.n_g_faces = 0;
        self.n_g_vertices = 0;
    }

    /// Construction path (a): build a fragment from a selection of parent
    /// mesh faces, deriving each vertex's merge radius from the selected
    /// edge geometry and synchronizing it across ranks.
    pub fn from_selection<C>(
        ctx: &JoinContext<C>,
        name: &str,
        params: JoinParams,
        selection: &FaceSelection,
        parent: &ParentMesh<'_>,
    ) -> Result<Self, JoinError>
    where
        C: Communicator + Sync,
    {
        let mut mesh = JoinFragment::new(name);
        let n_faces = selection.faces.len();

        // Face connectivity, renumbered to the compact selection vertices.
        mesh.face_vtx_idx = Vec::with_capacity(n_faces + 1);
        mesh.face_vtx_idx.push(0);
        for &face in &selection.faces {
            let n_fv = parent.face_vtx_idx[face + 1] - parent.face_vtx_idx[face];
            mesh.face_vtx_idx.push(mesh.face_vtx_idx.last().unwrap() + n_fv);
        }

        mesh.face_vtx_lst = Vec::with_capacity(*mesh.face_vtx_idx.last().unwrap());
        for &face in &selection.faces {
            for j in parent.face_vtx_idx[face]..parent.face_vtx_idx[face + 1] {
                let parent_vid = parent.face_vtx_lst[j];
                let local = selection
                    .vertices
                    .binary_search(&parent_vid)
                    .map_err(|_| JoinError::UnresolvedGlobalId(vertex_gnum(parent, parent_vid)))?;
                mesh.face_vtx_lst.push(local);
            }
        }

        mesh.face_gnum = match &selection.face_gnum {
            Some(gnum) => gnum.clone(),
            None => selection
                .faces
                .iter()
                .map(|&face| FaceId::new(face as u64 + 1))
                .collect::<Result<_, _>>()?,
        };

        // Vertex records with tolerances from the local edge geometry.
        mesh.vertices = Vec::with_capacity(selection.vertices.len());
        for &parent_vid in &selection.vertices {
            let gnum = VertexId::new(vertex_gnum(parent, parent_vid))?;
            mesh.vertices
                .push(JoinVertex::origin(gnum, parent.vtx_coord[parent_vid]));
        }

        if params.fraction > 0.0 {
            let mut tolerances = init_tolerances(parent.vtx_coord.len());
            update_tolerances(
                params.mode,
                params.fraction,
                &selection.faces,
                parent.face_vtx_idx,
                parent.face_vtx_lst,
                parent.vtx_coord,
                &mut tolerances,
            );
            for (vertex, &parent_vid) in mesh.vertices.iter_mut().zip(&selection.vertices) {
                vertex.tolerance = tolerances[parent_vid];
            }
        }

        if ctx.is_parallel() {
            sync_vertex_tolerances(ctx, &mut mesh.vertices)?;
            let vtx_keys: Vec<u64> = mesh.vertices.iter().map(|v| v.gnum.get()).collect();
            mesh.n_g_vertices = dense_global_count(ctx, NUMBERING_TAG, &vtx_keys)?;
            let face_keys: Vec<u64> = mesh.face_gnum.iter().map(|f| f.get()).collect();
            mesh.n_g_faces = dense_global_count(ctx, NUMBERING_TAG.offset(4), &face_keys)?;
            log::debug!(
                "fragment `{}`: {} selected vertices globally",
                mesh.name,
                mesh.n_g_vertices
            );
        } else {
            mesh.n_g_vertices = mesh.n_vertices() as u64;
            mesh.n_g_faces = mesh.n_faces() as u64;
        }

        mesh.face_order();
        Ok(mesh)
    }

    /// Extract a fragment from a subset of another fragment's faces
    /// (0-based indices into `parent`). Referenced vertices are renumbered
    /// compactly; in parallel the vertex ids are replaced by a dense global
    /// numbering of the subset.
    pub fn from_subset<C>(
        ctx: &JoinContext<C>,
        name: &str,
        subset: &[usize],
        parent: &JoinFragment,
    ) -> Result<Self, JoinError>
    where
        C: Communicator + Sync,
    {
        let mut mesh = JoinFragment::new(name);

        // Compact renumbering of the vertices the subset touches.
        let mut select_vtx = vec![usize::MAX; parent.n_vertices()];
        for &face in subset {
            for &v in parent.face_vertices(face) {
                select_vtx[v] = 0;
            }
        }
        let mut n_select_vertices = 0;
        for slot in select_vtx.iter_mut() {
            if *slot != usize::MAX {
                *slot = n_select_vertices;
                n_select_vertices += 1;
            }
        }

        mesh.face_vtx_idx.push(0);
        for &face in subset {
            mesh.face_gnum.push(parent.face_gnum[face]);
            for &v in parent.face_vertices(face) {
                mesh.face_vtx_lst.push(select_vtx[v]);
            }
            mesh.face_vtx_idx.push(mesh.face_vtx_lst.len());
        }

        mesh.vertices = Vec::with_capacity(n_select_vertices);
        for (v, &slot) in select_vtx.iter().enumerate() {
            if slot != usize::MAX {
                mesh.vertices.push(parent.vertices[v]);
            }
        }

        if ctx.is_parallel() {
            let face_keys: Vec<u64> = mesh.face_gnum.iter().map(|f| f.get()).collect();
            mesh.n_g_faces = dense_global_count(ctx, NUMBERING_TAG, &face_keys)?;

            // Renumber the subset's vertices densely so downstream block
            // distributions stay gap-free.
            let vtx_keys: Vec<u64> = mesh.vertices.iter().map(|v| v.gnum.get()).collect();
            let numbering = dense_numbering_u64(ctx, NUMBERING_TAG.offset(4), &vtx_keys)?;
            for (vertex, id) in mesh.vertices.iter_mut().zip(&numbering.ids) {
                vertex.gnum = VertexId::new(*id)?;
            }
            mesh.n_g_vertices = numbering.n_global;
        } else {
            mesh.n_g_faces = mesh.n_faces() as u64;
            mesh.n_g_vertices = mesh.n_vertices() as u64;
        }

        mesh.face_order();
        Ok(mesh)
    }

    /// Construction path (b): assemble flattened exchange results. The
    /// vertex records arrive inlined per face and legitimately contain
    /// duplicates; run [`vertex_clean`](JoinFragment::vertex_clean) before
    /// using the fragment. Global counts are the caller's to set.
    pub fn from_flattened(
        name: &str,
        faces: impl IntoIterator<Item = (FaceId, Vec<JoinVertex>)>,
    ) -> Self {
        let mut mesh = JoinFragment::new(name);
        mesh.face_vtx_idx.push(0);
        for (gnum, face_vertices) in faces {
            mesh.face_gnum.push(gnum);
            for vertex in face_vertices {
                mesh.face_vtx_lst.push(mesh.vertices.len());
                mesh.vertices.push(vertex);
            }
            mesh.face_vtx_idx.push(mesh.face_vtx_lst.len());
        }
        mesh
    }

    /// Delete vertices that appear several times (same global id) or are
    /// unreferenced by any face, and remap the face connectivity in one
    /// pass. Keeps the first referenced record per global id, in global-id
    /// order. `O(n log n)`.
    pub fn vertex_clean(&mut self) {
        let n_init = self.n_vertices();
        if n_init < 2 {
            return;
        }

        let mut referenced = vec![false; n_init];
        for &v in &self.face_vtx_lst {
            referenced[v] = true;
        }

        let mut order: Vec<usize> = (0..n_init).collect();
        order.sort_unstable_by_key(|&i| (self.vertices[i].gnum, i));

        let mut kept: Vec<JoinVertex> = Vec::with_capacity(n_init);
        let mut old2new = vec![usize::MAX; n_init];

        {
            let groups = order.iter().chunk_by(|&&i| self.vertices[i].gnum);
            for (_, group) in &groups {
                let group: Vec<usize> = group.copied().collect();
                if let Some(&keep) = group.iter().find(|&&i| referenced[i]) {
                    kept.push(self.vertices[keep]);
                    let slot = kept.len() - 1;
                    for &i in &group {
                        old2new[i] = slot;
                    }
                }
            }
        }

        for v in &mut self.face_vtx_lst {
            *v = old2new[*v];
        }
        self.vertices = kept;
    }

    /// Order faces by increasing global id and delete redundancies (keep the
    /// first copy). Used after construction and after exchanges that can
    /// legitimately produce the same face via two request paths.
    pub fn face_order(&mut self) {
        let n_faces = self.n_faces();
        if n_faces == 0 {
            return;
        }

        let mut order: Vec<usize> = (0..n_faces).collect();
        order.sort_unstable_by_key(|&i| (self.face_gnum[i], i));

        let mut new_gnum = Vec::with_capacity(n_faces);
        let mut new_idx = Vec::with_capacity(n_faces + 1);
        let mut new_lst = Vec::with_capacity(self.face_vtx_lst.len());
        new_idx.push(0);

        let mut prev: Option<FaceId> = None;
        for &face in &order {
            let gnum = self.face_gnum[face];
            if prev == Some(gnum) {
                continue;
            }
            prev = Some(gnum);
            new_gnum.push(gnum);
            new_lst.extend_from_slice(self.face_vertices(face));
            new_idx.push(new_lst.len());
        }

        self.face_gnum = new_gnum;
        self.face_vtx_idx = new_idx;
        self.face_vtx_lst = new_lst;
    }

    /// Global min/max tolerance vertices, reduced over all ranks. Ties on
    /// tolerance resolve to the smaller global id so the result is
    /// rank-count invariant. `None` when no rank holds a vertex.
    pub fn tolerance_extrema<C>(&self, ctx: &JoinContext<C>) -> Option<(JoinVertex, JoinVertex)>
    where
        C: Communicator + Sync,
    {
        use crate::exchange::wire::{WireVertex, cast_slice, decode_vec};

        let mut local: Option<(JoinVertex, JoinVertex)> = None;
        for v in &self.vertices {
            local = Some(match local {
                None => (*v, *v),
                Some((min, max)) => (tol_min(min, *v), tol_max(max, *v)),
            });
        }

        if !ctx.is_parallel() {
            return local;
        }

        // Gather every rank's candidates; ranks without vertices contribute
        // zeroed records which decode to gnum 0 and are skipped.
        let pair = match local {
            Some((min, max)) => [WireVertex::encode(&min), WireVertex::encode(&max)],
            None => [bytemuck::Zeroable::zeroed(); 2],
        };
        let mut recv = vec![0u8; ctx.n_ranks() * std::mem::size_of_val(&pair)];
        ctx.comm().allgather(cast_slice(&pair), &mut recv);

        let mut global: Option<(JoinVertex, JoinVertex)> = None;
        for wire in decode_vec::<WireVertex>(&recv) {
            if u64::from_le(wire.gnum_le) == 0 {
                continue;
            }
            let Ok(v) = wire.decode() else { continue };
            global = Some(match global {
                None => (v, v),
                Some((min, max)) => (tol_min(min, v), tol_max(max, v)),
            });
        }

        if let Some((min, max)) = &global {
            log::debug!(
                "fragment `{}` global min/max tolerance:\n{min}\n{max}",
                self.name
            );
        }
        global
    }
}

fn vertex_gnum(parent: &ParentMesh<'_>, vid: usize) -> u64 {
    match parent.vtx_gnum {
        Some(gnum) => gnum[vid],
        None => vid as u64 + 1,
    }
}

fn tol_min(best: JoinVertex, candidate: JoinVertex) -> JoinVertex {
    if candidate.tolerance < best.tolerance
        || (candidate.tolerance == best.tolerance && candidate.gnum < best.gnum)
    {
        candidate
    } else {
        best
    }
}

fn tol_max(best: JoinVertex, candidate: JoinVertex) -> JoinVertex {
    if candidate.tolerance > best.tolerance
        || (candidate.tolerance == best.tolerance && candidate.gnum < best.gnum)
    {
        candidate
    } else {
        best
    }
}

/// Tabular dump: face table with global ids, then the vertex table.
impl fmt::Display for JoinFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "fragment `{}`: {} faces ({} global), {} vertices ({} global)",
            self.name,
            self.n_faces(),
            self.n_g_faces,
            self.n_vertices(),
            self.n_g_vertices
        )?;
        for face in 0..self.n_faces() {
            write!(f, "  face {:>8}:", self.face_gnum[face])?;
            for &v in self.face_vertices(face) {
                write!(f, " {}", self.vertices[v].gnum)?;
            }
            writeln!(f)?;
        }
        writeln!(f, " Glob. Num. |  Tolerance  |  Coordinates | State")?;
        for v in &self.vertices {
            writeln!(f, "{v}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fid(raw: u64) -> FaceId {
        FaceId::new(raw).unwrap()
    }

    fn vtx(gid: u64) -> JoinVertex {
        JoinVertex::origin(VertexId::new(gid).unwrap(), [gid as f64, 0.0, 0.0])
    }

    fn two_triangles() -> JoinFragment {
        // F1 = [V1, V2, V3], F2 = [V2, V3, V4] with duplicated inlined
        // vertices, as an exchange would produce.
        JoinFragment::from_flattened(
            "t",
            vec![
                (fid(10), vec![vtx(1), vtx(2), vtx(3)]),
                (fid(11), vec![vtx(2), vtx(3), vtx(4)]),
            ],
        )
    }

    #[test]
    fn flattened_is_identity_connectivity() {
        let mesh = two_triangles();
        assert_eq!(mesh.n_faces(), 2);
        assert_eq!(mesh.n_vertices(), 6);
        assert_eq!(mesh.face_vertices(1), &[3, 4, 5]);
    }

    #[test]
    fn vertex_clean_drops_duplicates_and_remaps() {
        let mut mesh = two_triangles();
        mesh.vertex_clean();
        assert_eq!(mesh.n_vertices(), 4);
        // All surviving ids are distinct and every face vertex resolves.
        let mut gids: Vec<u64> = mesh.vertices.iter().map(|v| v.gnum.get()).collect();
        gids.sort_unstable();
        assert_eq!(gids, vec![1, 2, 3, 4]);
        assert_eq!(mesh.face_vertices(0), &[0, 1, 2]);
        assert_eq!(mesh.face_vertices(1), &[1, 2, 3]);
    }

    #[test]
    fn vertex_clean_drops_unreferenced() {
        let mut mesh = two_triangles();
        // An extra vertex never referenced by any face.
        mesh.vertices.push(vtx(99));
        mesh.vertex_clean();
        assert!(mesh.vertices.iter().all(|v| v.gnum.get() != 99));
    }

    #[test]
    fn face_order_sorts_and_dedups() {
        let mut mesh = JoinFragment::from_flattened(
            "t",
            vec![
                (fid(11), vec![vtx(2), vtx(3), vtx(4)]),
                (fid(10), vec![vtx(1), vtx(2), vtx(3)]),
                (fid(11), vec![vtx(2), vtx(3), vtx(4)]),
            ],
        );
        mesh.face_order();
        assert_eq!(mesh.n_faces(), 2);
        assert_eq!(mesh.face_gnum, vec![fid(10), fid(11)]);
        // First copy of face 11 survives: its vertices are the originals.
        assert_eq!(mesh.face_vertices(1), &[0, 1, 2]);
    }

    #[test]
    fn reset_keeps_name() {
        let mut mesh = two_triangles();
        mesh.reset();
        assert_eq!(mesh.name, "t");
        assert_eq!(mesh.n_faces(), 0);
        assert_eq!(mesh.n_vertices(), 0);
    }

    #[test]
    fn subset_extraction_renumbers_compactly() {
        let ctx = JoinContext::serial();
        let mut parent = two_triangles();
        parent.vertex_clean();
        let sub = JoinFragment::from_subset(&ctx, "sub", &[1], &parent).unwrap();
        assert_eq!(sub.n_faces(), 1);
        assert_eq!(sub.n_vertices(), 3);
        assert_eq!(sub.face_vertices(0), &[0, 1, 2]);
        let gids: Vec<u64> = sub.vertices.iter().map(|v| v.gnum.get()).collect();
        assert_eq!(gids, vec![2, 3, 4]);
        assert_eq!(sub.n_g_faces, 1);
    }

    #[test]
    fn extrema_prefers_smaller_gid_on_ties() {
        let ctx = JoinContext::serial();
        let mut mesh = two_triangles();
        mesh.vertex_clean();
        for v in &mut mesh.vertices {
            v.tolerance = 0.5;
        }
        let (min, max) = mesh.tolerance_extrema(&ctx).unwrap();
        assert_eq!(min.gnum.get(), 1);
        assert_eq!(max.gnum.get(), 1);
    }
}

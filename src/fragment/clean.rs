//! Topology cleaner: remove the empty and degenerate edges that vertex
//! merging leaves in face definitions.
//!
//! Two idempotent passes run in order:
//!
//! 1. **Empty-edge removal**: a face vertex identical to its immediate
//!    cyclic predecessor is an artifact of two formerly distinct, now merged
//!    vertices becoming adjacent; the repeat is dropped.
//! 2. **Degenerate-edge removal**: a face that traverses the same edge
//!    forward then immediately backward (`vertex[i] == vertex[i + 2]`) loses
//!    the middle vertex and one of the paired vertices. Removing one pair
//!    can expose another, so each face iterates to a fixed point:
//!
//!    ```text
//!       x                                      x
//!       |\                                     |
//!       | \                                    |
//!     a2|  \a3                               A2|
//!       |   \                Merge of          |
//!       |    \      a4       vertices          x
//!    ---s1----s2------       s1 and s2        / \
//!       |      \                             /   \
//!     a1|        \a4                      A1/     \A3
//!       |          \                       /       \
//!       x-----------x                     x---------x
//!            a5                                A4
//!
//!    Face: a1 a2 a3 a4 a5            Face: A1 A2 -A2 A3 A4
//!    ```
//!
//! A face reduced below 3 distinct vertices by either pass is fatal: the
//! tolerance or selection was too aggressive, and the implicated global face
//! id is reported so the configuration can be adjusted.

use crate::fragment::mesh::JoinFragment;
use crate::join_error::JoinError;

/// Run both cleaning passes.
pub fn clean(mesh: &mut JoinFragment) -> Result<(), JoinError> {
    let simplified = remove_empty_edges(mesh)?;
    let modified = remove_degenerate_edges(mesh)?;
    log::debug!(
        "fragment `{}`: {simplified} faces simplified, {modified} degenerate faces repaired",
        mesh.name
    );
    Ok(())
}

/// Drop face vertices identical to their cyclic predecessor. Returns the
/// number of simplified faces.
pub fn remove_empty_edges(mesh: &mut JoinFragment) -> Result<usize, JoinError> {
    let mut new_idx = Vec::with_capacity(mesh.n_faces() + 1);
    let mut new_lst = Vec::with_capacity(mesh.face_vtx_lst.len());
    new_idx.push(0);

    let mut n_simplified_faces = 0;

    for face in 0..mesh.n_faces() {
        let verts = mesh.face_vertices(face);
        let n_init = verts.len();

        // Keep each vertex that differs from its cyclic predecessor.
        if verts[n_init - 1] != verts[0] {
            new_lst.push(verts[0]);
        }
        for j in 0..n_init - 1 {
            if verts[j] != verts[j + 1] {
                new_lst.push(verts[j + 1]);
            }
        }
        new_idx.push(new_lst.len());

        let n_kept = new_idx[face + 1] - new_idx[face];
        if n_kept < n_init {
            n_simplified_faces += 1;
            log::trace!(
                "simplified face {} ({})",
                face + 1,
                mesh.face_gnum[face]
            );
            if n_kept < 3 {
                return Err(JoinError::DegenerateFace {
                    face: mesh.face_gnum[face],
                    n_vertices: n_kept,
                });
            }
        }
    }

    mesh.face_vtx_idx = new_idx;
    mesh.face_vtx_lst = new_lst;
    Ok(n_simplified_faces)
}

/// Remove forward-then-backward edge traversals from each face, iterating
/// per face until none remain. Returns the number of modified faces.
pub fn remove_degenerate_edges(mesh: &mut JoinFragment) -> Result<usize, JoinError> {
    let mut new_idx = Vec::with_capacity(mesh.n_faces() + 1);
    let mut new_lst = Vec::with_capacity(mesh.face_vtx_lst.len());
    new_idx.push(0);

    let mut n_modified_faces = 0;

    // Scratch list extended by the two leading vertices so the cyclic triple
    // scan needs no index wrapping.
    let mut tmp: Vec<usize> = Vec::new();
    let mut kill: Vec<bool> = Vec::new();

    for face in 0..mesh.n_faces() {
        let verts = mesh.face_vertices(face);
        let n_init = verts.len();

        if n_init < 3 {
            return Err(JoinError::DegenerateFace {
                face: mesh.face_gnum[face],
                n_vertices: n_init,
            });
        }

        tmp.clear();
        tmp.extend_from_slice(verts);
        tmp.push(verts[0]);
        tmp.push(verts[1]);

        let mut n_face_vertices = n_init;
        loop {
            kill.clear();
            kill.resize(tmp.len(), false);

            let mut count = 0;
            for j in 0..n_face_vertices {
                if tmp[j] == tmp[j + 2] {
                    count += 1;
                    kill[j] = true;
                    kill[(j + 1) % n_face_vertices] = true;
                }
            }
            if count == 0 {
                break;
            }

            let mut survivors = Vec::with_capacity(n_face_vertices);
            for j in 0..n_face_vertices {
                if !kill[j] {
                    survivors.push(tmp[j]);
                }
            }
            n_face_vertices = survivors.len();
            if n_face_vertices < 3 {
                return Err(JoinError::DegenerateFace {
                    face: mesh.face_gnum[face],
                    n_vertices: n_face_vertices,
                });
            }
            tmp.clear();
            tmp.extend_from_slice(&survivors);
            tmp.push(survivors[0]);
            tmp.push(survivors[1]);
        }

        if n_face_vertices != n_init {
            n_modified_faces += 1;
            log::trace!(
                "removed degenerate edge(s) from face {} ({})",
                face + 1,
                mesh.face_gnum[face]
            );
        }

        new_lst.extend_from_slice(&tmp[..n_face_vertices]);
        new_idx.push(new_lst.len());
    }

    mesh.face_vtx_idx = new_idx;
    mesh.face_vtx_lst = new_lst;
    Ok(n_modified_faces)
}

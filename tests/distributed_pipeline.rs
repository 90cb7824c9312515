//! Multi-rank scenarios over the in-process mailbox communicator: tolerance
//! synchronization, rank-invariant edge numbering, and fragment construction
//! across ranks. Tests share the process-global mailbox and run serially.

use serial_test::serial;

use mesh_join::exchange::communicator::MailboxComm;
use mesh_join::exchange::context::JoinContext;
use mesh_join::exchange::sync::sync_vertex_tolerances;
use mesh_join::fragment::edges::EdgeSet;
use mesh_join::fragment::mesh::{FaceSelection, JoinFragment, ParentMesh};
use mesh_join::fragment::tolerance::{JoinParams, ToleranceMode};
use mesh_join::topology::point::{FaceId, VertexId};
use mesh_join::topology::vertex::JoinVertex;

fn vtx(gid: u64, tolerance: f64) -> JoinVertex {
    let mut v = JoinVertex::origin(VertexId::new(gid).unwrap(), [gid as f64, 0.0, 0.0]);
    v.tolerance = tolerance;
    v
}

/// Each rank holds one triangle; the edge between gids 2 and 3 exists on
/// both. After synchronization the shared vertices carry the global minimum
/// tolerance, and the dense pair numbering gives the shared edge the same
/// global id on both ranks.
#[test]
#[serial]
fn shared_edge_gets_one_global_id() {
    let handles: Vec<_> = (0..2)
        .map(|r| {
            std::thread::spawn(move || {
                let ctx = JoinContext::new(MailboxComm::new(r, 2));
                let mut mesh = if r == 0 {
                    JoinFragment::from_flattened(
                        "rank0",
                        vec![(
                            FaceId::new(1).unwrap(),
                            vec![vtx(1, 0.10), vtx(2, 0.20), vtx(3, 0.30)],
                        )],
                    )
                } else {
                    JoinFragment::from_flattened(
                        "rank1",
                        vec![(
                            FaceId::new(2).unwrap(),
                            vec![vtx(2, 0.05), vtx(3, 0.40), vtx(4, 0.25)],
                        )],
                    )
                };
                mesh.vertex_clean();

                sync_vertex_tolerances(&ctx, &mut mesh.vertices).unwrap();
                let edges = EdgeSet::from_fragment(&ctx, &mesh).unwrap();
                (mesh, edges)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // min(0.20, 0.05) for gid 2, min(0.30, 0.40) for gid 3.
    let tol_of = |mesh: &JoinFragment, gid: u64| {
        mesh.vertices
            .iter()
            .find(|v| v.gnum.get() == gid)
            .unwrap()
            .tolerance
    };
    for (mesh, _) in &results {
        assert_eq!(tol_of(mesh, 2), 0.05);
        assert_eq!(tol_of(mesh, 3), 0.30);
    }
    assert_eq!(tol_of(&results[0].0, 1), 0.10);
    assert_eq!(tol_of(&results[1].0, 4), 0.25);

    // Global distinct canonical pairs, in order:
    // (1,2) (1,3) (2,3) (2,4) (3,4) → the shared (2,3) is edge 3 everywhere.
    let (mesh0, edges0) = &results[0];
    let (mesh1, edges1) = &results[1];
    assert_eq!(edges0.n_g_edges, 5);
    assert_eq!(edges1.n_g_edges, 5);

    let shared_id = |mesh: &JoinFragment, edges: &EdgeSet| {
        let local_of = |gid: u64| {
            mesh.vertices
                .iter()
                .position(|v| v.gnum.get() == gid)
                .unwrap()
        };
        let edge_ref = edges.edge_between(local_of(2), local_of(3)).unwrap();
        edges.gnum[edge_ref.edge].get()
    };
    assert_eq!(shared_id(mesh0, edges0), 3);
    assert_eq!(shared_id(mesh1, edges1), 3);
}

/// Construction path (a) across two ranks: each rank selects its own faces
/// from its slice of the parent mesh; tolerances synchronize through the
/// block reduction and the global counts deduplicate the seam vertices.
#[test]
#[serial]
fn selection_construction_across_ranks() {
    const COORDS: [[f64; 3]; 4] = [
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [1.0, 1.0, 0.0],
        [2.0, 1.0, 0.0],
    ];

    let handles: Vec<_> = (0..2)
        .map(|r| {
            std::thread::spawn(move || {
                let ctx = JoinContext::new(MailboxComm::new(r, 2));

                // Rank 0 holds F1 = gids (1,2,3); rank 1 holds F2 = (2,3,4).
                let (face_vtx_idx, face_vtx_lst, coords, gnum): (
                    Vec<usize>,
                    Vec<usize>,
                    Vec<[f64; 3]>,
                    Vec<u64>,
                ) = if r == 0 {
                    (
                        vec![0, 3],
                        vec![0, 1, 2],
                        vec![COORDS[0], COORDS[1], COORDS[2]],
                        vec![1, 2, 3],
                    )
                } else {
                    (
                        vec![0, 3],
                        vec![0, 1, 2],
                        vec![COORDS[1], COORDS[2], COORDS[3]],
                        vec![2, 3, 4],
                    )
                };
                let selection = FaceSelection {
                    faces: vec![0],
                    vertices: vec![0, 1, 2],
                    face_gnum: Some(vec![FaceId::new(r as u64 + 1).unwrap()]),
                };
                let parent = ParentMesh {
                    face_vtx_idx: &face_vtx_idx,
                    face_vtx_lst: &face_vtx_lst,
                    vtx_coord: &coords,
                    vtx_gnum: Some(&gnum),
                };
                let params = JoinParams::new(ToleranceMode::EdgeLength, 0.1);
                JoinFragment::from_selection(&ctx, "sel", params, &selection, &parent).unwrap()
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for mesh in &results {
        assert_eq!(mesh.n_g_faces, 2);
        // Seam vertices (gids 2, 3) count once globally.
        assert_eq!(mesh.n_g_vertices, 4);
    }

    // Both ranks agree on the synchronized tolerance of the seam vertices.
    let tol_of = |mesh: &JoinFragment, gid: u64| {
        mesh.vertices
            .iter()
            .find(|v| v.gnum.get() == gid)
            .unwrap()
            .tolerance
    };
    assert_eq!(tol_of(&results[0], 2), tol_of(&results[1], 2));
    assert_eq!(tol_of(&results[0], 3), tol_of(&results[1], 3));
}

/// Three ranks, arrival order scrambled by thread scheduling: the reduced
/// tolerance is the same minimum everywhere, run after run.
#[test]
#[serial]
fn sync_is_arrival_order_independent() {
    for _ in 0..5 {
        let handles: Vec<_> = (0..3)
            .map(|r| {
                std::thread::spawn(move || {
                    let ctx = JoinContext::new(MailboxComm::new(r, 3));
                    let mut vertices = vec![vtx(7, [0.9, 0.6, 0.3][r])];
                    sync_vertex_tolerances(&ctx, &mut vertices).unwrap();
                    vertices[0].tolerance
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 0.3);
        }
    }
}

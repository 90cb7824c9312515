//! Vertex tolerance calculator.
//!
//! The tolerance of a vertex is the radius of the sphere in which it may be
//! fused with another vertex, derived from the local edge geometry of a face
//! selection. Two modes exist:
//!
//! - [`ToleranceMode::EdgeLength`]: `tol(v) = min over incident selected-face
//!   edges of (edge length * fraction)`.
//! - [`ToleranceMode::SineWeighted`]: additionally weighted by the sine of
//!   the angle between the two edges meeting at the vertex, which tightens
//!   the radius at sliver corners. Only the two face-adjacent edges at each
//!   vertex participate; geometric neighbors elsewhere on a non-convex face
//!   do not. That is an intentional heuristic kept from long practice, not an
//!   oversight.
//!
//! The calculator updates a *caller-owned* tolerance slice and always keeps
//! the running minimum, so repeating a pass (or re-running it with a
//! superset of faces) never increases a stored tolerance.

use crate::fragment::geometry::{cross, edge_length, norm, sub};
use crate::join_error::JoinError;

/// How the per-vertex merge radius is derived from edge geometry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ToleranceMode {
    /// `min(edge length) * fraction` over incident edges.
    EdgeLength,
    /// `min(edge length * sin(angle at vertex)) * fraction`.
    SineWeighted,
}

impl ToleranceMode {
    /// Decode the mode digit of a raw configuration value. Unknown modes are
    /// a fatal configuration error.
    pub fn from_raw(raw: i32) -> Result<Self, JoinError> {
        match raw.rem_euclid(10) {
            1 => Ok(ToleranceMode::EdgeLength),
            2 => Ok(ToleranceMode::SineWeighted),
            _ => Err(JoinError::UnknownToleranceMode(raw)),
        }
    }
}

/// User-facing joining parameters consumed by the fragment constructors.
#[derive(Copy, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct JoinParams {
    pub mode: ToleranceMode,
    /// Fraction of the relevant edge length used as merge radius. Zero
    /// disables merging: every tolerance stays exactly 0.
    pub fraction: f64,
}

impl JoinParams {
    pub fn new(mode: ToleranceMode, fraction: f64) -> Self {
        JoinParams { mode, fraction }
    }
}

/// A fresh caller-owned tolerance array, ready for minimum updates.
pub fn init_tolerances(n_vertices: usize) -> Vec<f64> {
    vec![f64::MAX; n_vertices]
}

/// Update `tolerances` in place from the edges of the selected faces.
///
/// `faces` holds face indices into the connectivity arrays; `coords` and
/// `tolerances` are indexed by the vertex ids appearing in `face_vtx_lst`.
/// Only the minimum survives, so the call is idempotent and may be repeated
/// with adjacent face sets to tighten boundary vertices.
pub fn update_tolerances(
    mode: ToleranceMode,
    fraction: f64,
    faces: &[usize],
    face_vtx_idx: &[usize],
    face_vtx_lst: &[usize],
    coords: &[[f64; 3]],
    tolerances: &mut [f64],
) {
    match mode {
        ToleranceMode::EdgeLength => {
            edge_length_tolerance(fraction, faces, face_vtx_idx, face_vtx_lst, coords, tolerances)
        }
        ToleranceMode::SineWeighted => {
            sine_weighted_tolerance(fraction, faces, face_vtx_idx, face_vtx_lst, coords, tolerances)
        }
    }
}

fn edge_length_tolerance(
    fraction: f64,
    faces: &[usize],
    face_vtx_idx: &[usize],
    face_vtx_lst: &[usize],
    coords: &[[f64; 3]],
    tolerances: &mut [f64],
) {
    for &face in faces {
        let verts = &face_vtx_lst[face_vtx_idx[face]..face_vtx_idx[face + 1]];
        let n = verts.len();
        for j in 0..n {
            let v1 = verts[j];
            let v2 = verts[(j + 1) % n];
            let tolerance = edge_length(coords[v1], coords[v2]) * fraction;
            tolerances[v1] = tolerances[v1].min(tolerance);
            tolerances[v2] = tolerances[v2].min(tolerance);
        }
    }
}

fn sine_weighted_tolerance(
    fraction: f64,
    faces: &[usize],
    face_vtx_idx: &[usize],
    face_vtx_lst: &[usize],
    coords: &[[f64; 3]],
    tolerances: &mut [f64],
) {
    // (edge vector, edge length) for each face edge; entry k + 1 is the edge
    // leaving vertex k, entry 0 wraps around from the last vertex.
    let mut quantities: Vec<([f64; 3], f64)> = Vec::new();

    for &face in faces {
        let verts = &face_vtx_lst[face_vtx_idx[face]..face_vtx_idx[face + 1]];
        let n = verts.len();

        quantities.clear();
        quantities.resize(n + 1, ([0.0; 3], 0.0));
        for k in 0..n {
            let a = coords[verts[k]];
            let b = coords[verts[(k + 1) % n]];
            quantities[k + 1] = (sub(b, a), edge_length(a, b));
        }
        quantities[0] = quantities[n];

        for (k, &v) in verts.iter().enumerate() {
            let (prev_vec, prev_len) = quantities[k];
            let (next_vec, next_len) = quantities[k + 1];

            let incoming = [-prev_vec[0], -prev_vec[1], -prev_vec[2]];
            let sine = norm(cross(incoming, next_vec)) / (prev_len * next_len);

            let tolerance = fraction * prev_len.min(next_len);
            tolerances[v] = tolerances[v].min(sine * tolerance);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_mode_is_fatal() {
        assert!(matches!(
            ToleranceMode::from_raw(13),
            Err(JoinError::UnknownToleranceMode(13))
        ));
        assert_eq!(ToleranceMode::from_raw(1).unwrap(), ToleranceMode::EdgeLength);
        assert_eq!(
            ToleranceMode::from_raw(12).unwrap(),
            ToleranceMode::SineWeighted
        );
    }

    #[test]
    fn square_edge_length_mode() {
        // Unit square: every edge has length 1.
        let coords = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ];
        let idx = [0usize, 4];
        let lst = [0usize, 1, 2, 3];
        let mut tol = init_tolerances(4);
        update_tolerances(
            ToleranceMode::EdgeLength,
            0.1,
            &[0],
            &idx,
            &lst,
            &coords,
            &mut tol,
        );
        for t in tol {
            assert!((t - 0.1).abs() < 1e-15);
        }
    }

    #[test]
    fn right_angle_sine_equals_edge_length_mode() {
        // All corners of a square are right angles: sine weight is exactly 1.
        let coords = [
            [0.0, 0.0, 0.0],
            [2.0, 0.0, 0.0],
            [2.0, 2.0, 0.0],
            [0.0, 2.0, 0.0],
        ];
        let idx = [0usize, 4];
        let lst = [0usize, 1, 2, 3];
        let mut plain = init_tolerances(4);
        let mut weighted = init_tolerances(4);
        update_tolerances(
            ToleranceMode::EdgeLength,
            0.25,
            &[0],
            &idx,
            &lst,
            &coords,
            &mut plain,
        );
        update_tolerances(
            ToleranceMode::SineWeighted,
            0.25,
            &[0],
            &idx,
            &lst,
            &coords,
            &mut weighted,
        );
        for (p, w) in plain.iter().zip(&weighted) {
            assert!((p - w).abs() < 1e-14);
        }
    }

    #[test]
    fn sliver_corner_tightens_radius() {
        // A thin triangle: the sine weight at the sharp corner shrinks the
        // tolerance well below the plain edge-length value.
        let coords = [[0.0, 0.0, 0.0], [10.0, 0.0, 0.0], [10.0, 0.1, 0.0]];
        let idx = [0usize, 3];
        let lst = [0usize, 1, 2];
        let mut plain = init_tolerances(3);
        let mut weighted = init_tolerances(3);
        update_tolerances(
            ToleranceMode::EdgeLength,
            0.1,
            &[0],
            &idx,
            &lst,
            &coords,
            &mut plain,
        );
        update_tolerances(
            ToleranceMode::SineWeighted,
            0.1,
            &[0],
            &idx,
            &lst,
            &coords,
            &mut weighted,
        );
        assert!(weighted[0] < plain[0] * 0.5);
    }
}

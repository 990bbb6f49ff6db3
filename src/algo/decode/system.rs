//! Assembly of the sparse constraint system `A·X ≈ B`.
//!
//! The unknown `X` stacks one 3×3 block per face (rows `[3i, 3i+3)`), each
//! the transpose of the face's absolute rotation. Every undirected edge
//! `(i, n)` with `n > i` and relative rotation `Δ` contributes the rows
//! `Δᵗ·X_i - X_n = 0`; one final anchor block `X_0 = R(direction)ᵗ` removes the
//! global rotation freedom.

use nalgebra::{DMatrix, Matrix3, Vector3};
use rayon::prelude::*;

use crate::algo::sparse::CsrMatrix;
use crate::encoding::{Adjacency, RelativeEncoding};
use crate::error::{DecodeError, Result};
use crate::rotation::vector_to_rotation;

/// Linear least-squares problem assembled from the adjacency graph.
#[derive(Debug, Clone)]
pub struct ConstraintSystem {
    /// Constraint matrix, `3 * used_edges + 3` rows by `3N` columns.
    pub a: CsrMatrix,
    /// Right-hand side with three columns, zero except for the anchor block.
    pub rhs: DMatrix<f64>,
    /// Number of undirected edges that produced constraint rows.
    pub used_edges: usize,
    /// First face with no chain of constraints to face 0. Such a face is
    /// free to rotate, so the system is singular.
    pub unanchored_face: Option<usize>,
}

impl ConstraintSystem {
    /// Number of faces (unknown 3×3 blocks).
    #[inline]
    pub fn num_faces(&self) -> usize {
        self.a.ncols() / 3
    }

    /// First row of the anchor block.
    #[inline]
    pub fn anchor_row(&self) -> usize {
        3 * self.used_edges
    }
}

type Triplet = (usize, usize, f64);

/// Append the nonzero entries of a 3×3 block at (`row`, `col`).
fn push_block(triplets: &mut Vec<Triplet>, row: usize, col: usize, block: &Matrix3<f64>) {
    for r in 0..3 {
        for c in 0..3 {
            let v = block[(r, c)];
            if v != 0.0 {
                triplets.push((row + r, col + c, v));
            }
        }
    }
}

/// Entries contributed by `face`, starting at constraint row `first_row`.
fn face_triplets(
    encoding: &RelativeEncoding<'_>,
    adjacency: &Adjacency,
    face: usize,
    first_row: usize,
) -> Vec<Triplet> {
    let neg_identity = -Matrix3::identity();
    let mut triplets = Vec::with_capacity(18 * 3);
    let mut row = first_row;

    for (slot, n) in adjacency.forward_slots(face) {
        let delta = vector_to_rotation(&encoding.relative_rotation(face, slot));
        push_block(&mut triplets, row, 3 * n, &neg_identity);
        push_block(&mut triplets, row, 3 * face, &delta.transpose());
        row += 3;
    }

    triplets
}

/// Build the constraint system for a relative encoding.
///
/// Faces are walked in index order and slots in order 0, 1, 2. A slot
/// contributes only when its neighbour index is larger than the face's own,
/// so each undirected edge is constrained exactly once. With `parallel` set,
/// faces are processed on the rayon pool; each face writes into a row range
/// fixed in advance, so the result is identical to the sequential walk.
///
/// # Errors
///
/// Returns [`DecodeError::InvalidNeighbour`] if any slot names a face outside
/// the mesh, and [`DecodeError::FaceCountMismatch`] if the buffer and the
/// table disagree on the number of faces.
pub fn build_constraint_system(
    encoding: &RelativeEncoding<'_>,
    adjacency: &Adjacency,
    direction: &Vector3<f64>,
    parallel: bool,
) -> Result<ConstraintSystem> {
    let num_faces = adjacency.num_faces();
    if encoding.num_faces() != num_faces {
        return Err(DecodeError::FaceCountMismatch {
            features: encoding.num_faces(),
            adjacency: num_faces,
        });
    }
    adjacency.validate()?;

    // Row offset of each face's first block
    let mut first_rows = Vec::with_capacity(num_faces);
    let mut used_edges = 0;
    for face in 0..num_faces {
        first_rows.push(3 * used_edges);
        used_edges += adjacency.forward_slots(face).count();
    }

    let mut triplets: Vec<Triplet> = if parallel {
        (0..num_faces)
            .into_par_iter()
            .flat_map_iter(|face| face_triplets(encoding, adjacency, face, first_rows[face]))
            .collect()
    } else {
        (0..num_faces)
            .flat_map(|face| face_triplets(encoding, adjacency, face, first_rows[face]))
            .collect()
    };

    let anchor_row = 3 * used_edges;
    let rows = anchor_row + 3;
    push_block(&mut triplets, anchor_row, 0, &Matrix3::identity());

    let mut rhs = DMatrix::<f64>::zeros(rows, 3);
    rhs.fixed_view_mut::<3, 3>(anchor_row, 0)
        .copy_from(&vector_to_rotation(direction).transpose());

    let a = CsrMatrix::from_triplets(rows, 3 * num_faces, triplets);
    let unanchored_face = adjacency.first_unanchored_face();

    tracing::debug!(
        faces = num_faces,
        edges = used_edges,
        rows,
        nnz = a.nnz(),
        ?unanchored_face,
        "assembled constraint system"
    );

    Ok(ConstraintSystem {
        a,
        rhs,
        used_edges,
        unanchored_face,
    })
}

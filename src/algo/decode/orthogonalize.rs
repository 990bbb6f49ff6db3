//! Projection of solved blocks onto the rotation group.

use nalgebra::{DMatrix, Matrix3};
use rayon::prelude::*;

use crate::encoding::{OutputLayout, RelativeEncoding};
use crate::error::{DecodeError, Result};
use crate::rotation::rotation_to_vector;

use super::Orthogonalization;

/// Outcome of projecting one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Projected {
    /// `U·Vᵗ` was already a proper rotation.
    Rotation,
    /// `U·Vᵗ` was a reflection and was flipped into a rotation.
    Corrected,
    /// `U·Vᵗ` was a reflection and was kept; the record holds `-U·Vᵗ`.
    Reflection,
}

/// Find the orthogonal matrix closest to `m` in the Frobenius norm.
///
/// With [`Orthogonalization::Proper`], a reflection is turned into the
/// closest proper rotation by negating the left singular vector of the
/// smallest singular value. Returns `None` if the SVD does not converge.
pub fn closest_orthogonal(
    m: &Matrix3<f64>,
    policy: Orthogonalization,
) -> Option<(Matrix3<f64>, bool)> {
    let svd = (*m).try_svd(true, true, f64::EPSILON, 0)?;
    let mut u = svd.u?;
    let v_t = svd.v_t?;

    let r = u * v_t;
    if r.determinant() >= 0.0 {
        return Some((r, false));
    }

    match policy {
        Orthogonalization::Nearest => Some((r, true)),
        Orthogonalization::Proper => {
            let k = svd.singular_values.imin();
            for x in u.column_mut(k).iter_mut() {
                *x = -*x;
            }
            Some((u * v_t, true))
        }
    }
}

/// Write the output record of one face.
fn project_face(
    face: usize,
    record: &mut [f64],
    blocks: &DMatrix<f64>,
    encoding: &RelativeEncoding<'_>,
    layout: OutputLayout,
    policy: Orthogonalization,
) -> Result<Projected> {
    // Undo the transpose used in the constraint rows
    let m: Matrix3<f64> = blocks.fixed_view::<3, 3>(3 * face, 0).transpose();
    if m.iter().any(|x| !x.is_finite()) {
        return Err(DecodeError::NonFiniteSolution { face });
    }

    let (r, reflected) =
        closest_orthogonal(&m, policy).ok_or(DecodeError::SvdFailed { face })?;

    let (rotation, outcome) = match (reflected, policy) {
        (false, _) => (r, Projected::Rotation),
        (true, Orthogonalization::Proper) => (r, Projected::Corrected),
        // det(-R) = -det(R) in 3D, so the negated reflection is a rotation
        (true, Orthogonalization::Nearest) => (-r, Projected::Reflection),
    };

    layout.write_record(record, &rotation_to_vector(&rotation), encoding.shape(face));
    Ok(outcome)
}

/// Project every solved block and assemble the output buffer.
///
/// Returns the flat buffer and the per-face outcomes.
pub(crate) fn orthogonalize(
    blocks: &DMatrix<f64>,
    encoding: &RelativeEncoding<'_>,
    layout: OutputLayout,
    policy: Orthogonalization,
    parallel: bool,
) -> Result<(Vec<f64>, Vec<Projected>)> {
    let stride = layout.stride();
    let mut out = vec![0.0; encoding.num_faces() * stride];

    let outcomes = if parallel {
        out.par_chunks_mut(stride)
            .enumerate()
            .map(|(face, record)| project_face(face, record, blocks, encoding, layout, policy))
            .collect::<Result<Vec<_>>>()?
    } else {
        out.chunks_mut(stride)
            .enumerate()
            .map(|(face, record)| project_face(face, record, blocks, encoding, layout, policy))
            .collect::<Result<Vec<_>>>()?
    };

    Ok((out, outcomes))
}

//! Conversion between rotation vectors and rotation matrices.
//!
//! A rotation vector (axis-angle) stores the rotation axis as its direction
//! and the rotation angle in radians as its length.

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};

/// Convert a rotation vector to a 3×3 rotation matrix (Rodrigues' formula).
///
/// The zero vector maps to the identity.
///
/// # Example
///
/// ```
/// use deltarot::rotation::vector_to_rotation;
/// use nalgebra::{Matrix3, Vector3};
///
/// assert_eq!(vector_to_rotation(&Vector3::zeros()), Matrix3::identity());
/// ```
#[inline]
pub fn vector_to_rotation(v: &Vector3<f64>) -> Matrix3<f64> {
    Rotation3::new(*v).into_inner()
}

/// Convert a rotation matrix back to its rotation vector.
///
/// `r` must be a proper rotation (orthogonal, determinant +1) up to
/// floating-point error. The returned angle lies in `[0, π]`.
///
/// Goes through a unit quaternion and `atan2` so that both tiny angles and
/// half turns keep full precision.
pub fn rotation_to_vector(r: &Matrix3<f64>) -> Vector3<f64> {
    let q = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(*r));
    let (w, v) = if q.scalar() < 0.0 {
        (-q.scalar(), -q.vector().clone_owned())
    } else {
        (q.scalar(), q.vector().clone_owned())
    };

    let s = v.norm();
    if s == 0.0 {
        return Vector3::zeros();
    }
    v * (2.0 * s.atan2(w) / s)
}

/// Frobenius norm of `mᵗm - I`.
pub(crate) fn orthogonality_error(m: &Matrix3<f64>) -> f64 {
    (m.transpose() * m - Matrix3::identity()).norm()
}

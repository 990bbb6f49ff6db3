//! Least-squares solve of the constraint system via the normal equations.

use nalgebra::DMatrix;

use crate::algo::ldl::LdlFactorization;
use crate::algo::sparse::{conjugate_gradient, CsrMatrix};
use crate::error::{DecodeError, Result};

use super::system::ConstraintSystem;
use super::{DecodeOptions, SolverKind};

/// Least-squares estimate of the stacked rotation blocks.
#[derive(Debug, Clone)]
pub struct Solution {
    /// `3N × 3` matrix; block `i` is rows `[3i, 3i+3)`.
    pub blocks: DMatrix<f64>,
    /// Off-diagonal nonzeros of the LDLᵀ factor (zero for conjugate gradient).
    pub factor_nnz: usize,
    /// Frobenius norm of `A·X - B`.
    pub residual: f64,
}

/// Solve `min ‖A·X - B‖` by factorizing `AᵗA` and solving `AᵗA·X = AᵗB`.
///
/// # Errors
///
/// Returns [`DecodeError::SingularSystem`] for any solver when some face is
/// not connected to the anchored face 0, and for LDLᵀ additionally when the
/// factorization meets a vanishing pivot. Returns
/// [`DecodeError::ConvergenceFailed`] when the conjugate gradient solver does
/// not reach its tolerance.
pub fn solve_normal_equations(
    system: &ConstraintSystem,
    options: &DecodeOptions,
) -> Result<Solution> {
    // CG happily converges on a singular system, so catch free faces up front
    if let Some(face) = system.unanchored_face {
        tracing::debug!(face, "face not connected to the anchor");
        return Err(DecodeError::SingularSystem {
            column: 3 * face,
            face,
        });
    }

    let at = system.a.transpose();
    let ata = at.mul(&system.a);
    let atb = at.mul_dense(&system.rhs);

    tracing::debug!(dim = ata.nrows(), nnz = ata.nnz(), "formed normal equations");

    let (blocks, factor_nnz) = match options.solver {
        SolverKind::Ldlt => {
            let ldl = LdlFactorization::factor(&ata, options.pivot_tolerance).map_err(|e| {
                tracing::debug!(column = e.column, pivot = e.pivot, "vanishing pivot");
                DecodeError::SingularSystem {
                    column: e.column,
                    face: e.column / 3,
                }
            })?;
            tracing::debug!(nnz = ldl.nnz(), "factorized normal equations");
            (ldl.solve_matrix(&atb), ldl.nnz())
        }
        SolverKind::ConjugateGradient => (solve_cg(&ata, &atb, options)?, 0),
    };

    let residual = (system.a.mul_dense(&blocks) - &system.rhs).norm();
    tracing::debug!(residual, "solved normal equations");

    Ok(Solution {
        blocks,
        factor_nnz,
        residual,
    })
}

fn solve_cg(ata: &CsrMatrix, atb: &DMatrix<f64>, options: &DecodeOptions) -> Result<DMatrix<f64>> {
    let mut x = DMatrix::<f64>::zeros(atb.nrows(), atb.ncols());
    for j in 0..atb.ncols() {
        let col = conjugate_gradient(
            ata,
            &atb.column(j).into_owned(),
            options.max_cg_iterations,
            options.cg_tolerance,
        )?;
        x.set_column(j, &col);
    }
    Ok(x)
}

//! Relative-to-absolute rotation decoding.
//!
//! The decoder turns a relative rotation encoding (per-face delta rotations
//! towards each adjacent face, plus six shape scalars) into an absolute one
//! (one rotation per face, plus the same shape scalars). It runs in three
//! stages:
//!
//! 1. **Assembly** ([`build_constraint_system`]): one block of linear
//!    constraints per undirected edge, plus an anchor block pinning face 0 to
//!    the requested global direction.
//! 2. **Solve** ([`solve_normal_equations`]): least squares through the
//!    normal equations with a sparse LDLᵀ factorization.
//! 3. **Projection**: every solved 3×3 block is replaced by the closest
//!    rotation (SVD) and converted back to a rotation vector.
//!
//! # Example
//!
//! ```
//! use deltarot::algo::decode::{decode_relative_rotation, DecodeOptions};
//! use deltarot::encoding::{Adjacency, RELATIVE_STRIDE};
//!
//! // Two faces sharing an edge, no relative rotation
//! let features = vec![0.0; 2 * RELATIVE_STRIDE];
//! let adjacency = Adjacency::from_signed(&[[1, -1, -1], [0, -1, -1]]);
//!
//! let decoded = decode_relative_rotation(&features, &adjacency, &DecodeOptions::default()).unwrap();
//! assert_eq!(decoded.num_faces(), 2);
//! assert!(decoded.rotation(1).norm() < 1e-12);
//! ```

mod orthogonalize;
mod solve;
mod system;

use nalgebra::Vector3;

use crate::encoding::{AbsoluteEncoding, Adjacency, DecodeReport, OutputLayout, RelativeEncoding};
use crate::error::{DecodeError, Result};

use super::Progress;

use orthogonalize::{orthogonalize, Projected};

pub use orthogonalize::closest_orthogonal;
pub use solve::{solve_normal_equations, Solution};
pub use system::{build_constraint_system, ConstraintSystem};

/// Linear solver used for the normal equations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverKind {
    /// Sparse LDLᵀ factorization (direct).
    #[default]
    Ldlt,
    /// Conjugate gradient (iterative).
    ConjugateGradient,
}

/// How solved blocks are projected onto orthogonal matrices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orthogonalization {
    /// Closest proper rotation (determinant +1). Reflections are corrected by
    /// flipping the singular vector of the smallest singular value.
    #[default]
    Proper,
    /// Closest orthogonal matrix `U·Vᵗ`, reflections included. A reflection
    /// `M` has no rotation vector, so its face records the rotation `-M` and
    /// is listed in [`AbsoluteEncoding::reflected_faces`].
    Nearest,
}

/// Options for decoding.
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Rotation vector that face 0 is anchored to (default: identity).
    pub direction: Vector3<f64>,

    /// Solver for the normal equations.
    pub solver: SolverKind,

    /// Projection policy for solved blocks.
    pub orthogonalization: Orthogonalization,

    /// Record layout of the output buffer.
    pub layout: OutputLayout,

    /// Whether to use parallel execution (default: true).
    pub parallel: bool,

    /// Relative pivot threshold below which the LDLᵀ factorization reports a
    /// singular system.
    pub pivot_tolerance: f64,

    /// Maximum iterations for the conjugate gradient solver (per column).
    pub max_cg_iterations: usize,

    /// Convergence tolerance for the CG solver.
    pub cg_tolerance: f64,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            direction: Vector3::zeros(),
            solver: SolverKind::default(),
            orthogonalization: Orthogonalization::default(),
            layout: OutputLayout::default(),
            parallel: true,
            pivot_tolerance: 1e-10,
            max_cg_iterations: 10_000,
            cg_tolerance: 1e-12,
        }
    }
}

impl DecodeOptions {
    /// Set the global direction (rotation vector) of face 0.
    pub fn with_direction(mut self, direction: Vector3<f64>) -> Self {
        self.direction = direction;
        self
    }

    /// Set the solver for the normal equations.
    pub fn with_solver(mut self, solver: SolverKind) -> Self {
        self.solver = solver;
        self
    }

    /// Set the projection policy.
    pub fn with_orthogonalization(mut self, policy: Orthogonalization) -> Self {
        self.orthogonalization = policy;
        self
    }

    /// Set the output record layout.
    pub fn with_layout(mut self, layout: OutputLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Set whether to use parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Create options for single-threaded execution.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Set the relative pivot tolerance of the LDLᵀ factorization.
    pub fn with_pivot_tolerance(mut self, tol: f64) -> Self {
        self.pivot_tolerance = tol;
        self
    }

    /// Set the maximum CG iterations per column.
    pub fn with_max_cg_iterations(mut self, max_iter: usize) -> Self {
        self.max_cg_iterations = max_iter;
        self
    }

    /// Set the CG convergence tolerance.
    pub fn with_cg_tolerance(mut self, tol: f64) -> Self {
        self.cg_tolerance = tol;
        self
    }

    fn validate(&self) -> Result<()> {
        if !self.direction.iter().all(|x| x.is_finite()) {
            return Err(DecodeError::invalid_param(
                "direction",
                format!("{:?}", self.direction.as_slice()),
                "must be finite",
            ));
        }
        if !(self.pivot_tolerance >= 0.0 && self.pivot_tolerance < 1.0) {
            return Err(DecodeError::invalid_param(
                "pivot_tolerance",
                self.pivot_tolerance,
                "must be in [0, 1)",
            ));
        }
        if self.solver == SolverKind::ConjugateGradient && self.max_cg_iterations == 0 {
            return Err(DecodeError::invalid_param(
                "max_cg_iterations",
                self.max_cg_iterations,
                "must be positive",
            ));
        }
        if self.solver == SolverKind::ConjugateGradient && !(self.cg_tolerance > 0.0) {
            return Err(DecodeError::invalid_param(
                "cg_tolerance",
                self.cg_tolerance,
                "must be positive",
            ));
        }
        Ok(())
    }
}

const NUM_STAGES: usize = 3;

/// Decode a relative rotation encoding into absolute rotations.
///
/// `features` holds [`RELATIVE_STRIDE`](crate::encoding::RELATIVE_STRIDE)
/// values per face; `adjacency` has one row per face. Face 0 is anchored to
/// `options.direction`.
///
/// # Errors
///
/// Fails before assembly on malformed input (empty buffer, bad length,
/// non-finite values, face-count mismatch), at assembly on out-of-range
/// neighbours, and at the solve when the system is singular, e.g. when part
/// of the adjacency graph is not connected to face 0. No partial result is
/// returned.
pub fn decode_relative_rotation(
    features: &[f64],
    adjacency: &Adjacency,
    options: &DecodeOptions,
) -> Result<AbsoluteEncoding> {
    decode_relative_rotation_with_progress(features, adjacency, options, &Progress::none())
}

/// Decode a relative rotation encoding, reporting progress per stage.
///
/// See [`decode_relative_rotation`].
pub fn decode_relative_rotation_with_progress(
    features: &[f64],
    adjacency: &Adjacency,
    options: &DecodeOptions,
    progress: &Progress,
) -> Result<AbsoluteEncoding> {
    options.validate()?;
    let encoding = RelativeEncoding::new(features)?;
    if encoding.num_faces() != adjacency.num_faces() {
        return Err(DecodeError::FaceCountMismatch {
            features: encoding.num_faces(),
            adjacency: adjacency.num_faces(),
        });
    }

    progress.report(0, NUM_STAGES, "Building constraint system");
    let system =
        build_constraint_system(&encoding, adjacency, &options.direction, options.parallel)?;

    progress.report(1, NUM_STAGES, "Solving normal equations");
    let solution = solve_normal_equations(&system, options)?;

    progress.report(2, NUM_STAGES, "Projecting rotations");
    let (data, outcomes) = orthogonalize(
        &solution.blocks,
        &encoding,
        options.layout,
        options.orthogonalization,
        options.parallel,
    )?;

    let count = |kind: Projected| outcomes.iter().filter(|&&o| o == kind).count();
    let reflected: Vec<usize> = outcomes
        .iter()
        .enumerate()
        .filter(|&(_, &o)| o == Projected::Reflection)
        .map(|(face, _)| face)
        .collect();
    let report = DecodeReport {
        num_faces: encoding.num_faces(),
        used_edges: system.used_edges,
        constraint_rows: system.a.nrows(),
        constraint_nnz: system.a.nnz(),
        factor_nnz: solution.factor_nnz,
        residual: solution.residual,
        reflections_corrected: count(Projected::Corrected),
        reflections_kept: count(Projected::Reflection),
    };

    if report.reflections_corrected > 0 {
        tracing::warn!(
            faces = report.reflections_corrected,
            "corrected reflections in the least-squares solution"
        );
    }
    if report.reflections_kept > 0 {
        tracing::warn!(
            faces = report.reflections_kept,
            "output contains reflections, written as negated rotations"
        );
    }

    progress.report(NUM_STAGES, NUM_STAGES, "Done");
    tracing::debug!(?report, "decoded relative rotations");

    Ok(AbsoluteEncoding::new(data, options.layout, report, reflected))
}

//! Error types for deltarot.
//!
//! This module defines all error types used throughout the library.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`DecodeError`].
pub type Result<T> = std::result::Result<T, DecodeError>;

/// Errors that can occur while decoding a relative rotation encoding.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The input has no faces.
    #[error("input has no faces")]
    EmptyInput,

    /// The feature buffer length is not a multiple of the per-face stride.
    #[error("feature buffer of length {len} is not a multiple of the per-face stride {stride}")]
    MalformedFeatures {
        /// Length of the feature buffer.
        len: usize,
        /// Expected per-face stride.
        stride: usize,
    },

    /// The feature buffer and the adjacency table describe different face counts.
    #[error("feature buffer holds {features} faces but adjacency table has {adjacency} rows")]
    FaceCountMismatch {
        /// Number of faces in the feature buffer.
        features: usize,
        /// Number of rows in the adjacency table.
        adjacency: usize,
    },

    /// A feature value is NaN or infinite.
    #[error("feature value at index {index} is not finite")]
    NonFiniteInput {
        /// Index into the flat feature buffer.
        index: usize,
    },

    /// An adjacency slot references a face outside the mesh.
    #[error("face {face} slot {slot} references neighbour {neighbour}, but the mesh has {num_faces} faces")]
    InvalidNeighbour {
        /// The face whose slot is invalid.
        face: usize,
        /// Adjacency slot (0, 1 or 2).
        slot: usize,
        /// The out-of-range neighbour index.
        neighbour: usize,
        /// Number of faces in the mesh.
        num_faces: usize,
    },

    /// The normal equations could not be factorized.
    ///
    /// Usually caused by an adjacency graph with components that the anchor
    /// does not reach.
    #[error("constraint system is singular at unknown {column} (face {face})")]
    SingularSystem {
        /// Column of `AᵗA` whose pivot vanished.
        column: usize,
        /// Face owning that column.
        face: usize,
    },

    /// Iterative solver failed to converge.
    #[error("solver failed to converge after {iterations} iterations")]
    ConvergenceFailed {
        /// Number of iterations attempted.
        iterations: usize,
    },

    /// The singular value decomposition of a solved block did not converge.
    #[error("SVD of the solved block for face {face} did not converge")]
    SvdFailed {
        /// The face index.
        face: usize,
    },

    /// A solved block contains NaN or infinite values.
    #[error("solved block for face {face} is not finite")]
    NonFiniteSolution {
        /// The face index.
        face: usize,
    },

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error parsing a text file.
    #[error("failed to parse {path} at line {line}: {message}")]
    Parse {
        /// The file path.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// Error message.
        message: String,
    },

    /// Unsupported file format.
    #[error("unsupported file format: {extension}")]
    UnsupportedFormat {
        /// The file extension.
        extension: String,
    },

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },
}

impl DecodeError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        DecodeError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }
}

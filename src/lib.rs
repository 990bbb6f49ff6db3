//! # Deltarot
//!
//! Decoding of relative per-face rotation encodings of triangle meshes.
//!
//! A relative rotation encoding describes a deformed mesh face by face: for
//! each face, the rotation (as a rotation vector) from the face to each of up
//! to three edge-adjacent faces, followed by six shape scalars. Deltarot
//! recovers one absolute rotation per face by solving a sparse linear
//! least-squares system over the adjacency graph and projecting each solved
//! block back onto the rotation group.
//!
//! ## Features
//!
//! - **Sparse assembly**: one constraint block per undirected edge, assembled in parallel
//! - **Direct solve**: sparse LDLᵀ of the normal equations, with conjugate gradient as an alternative
//! - **Proper rotations**: SVD projection with a determinant fix for reflected solutions
//! - **Flat buffers**: JSON and plain text I/O for feature buffers and adjacency tables
//!
//! ## Quick Start
//!
//! ```no_run
//! use deltarot::prelude::*;
//!
//! let features = deltarot::io::load_features("model_rr.txt").unwrap();
//! let adjacency = deltarot::io::load_adjacency("neigh.txt").unwrap();
//!
//! let decoded = decode_relative_rotation(&features, &adjacency, &DecodeOptions::default()).unwrap();
//! println!("Faces: {}", decoded.num_faces());
//! println!("Residual: {:.3e}", decoded.report().residual);
//!
//! deltarot::io::save_features(decoded.as_slice(), "model_ar.txt").unwrap();
//! ```
//!
//! ## Decoding In Memory
//!
//! ```
//! use deltarot::prelude::*;
//! use nalgebra::Vector3;
//!
//! // Face 0 rotates to face 1 by a quarter turn about z
//! let quarter = std::f64::consts::FRAC_PI_2;
//! let mut features = vec![0.0; 2 * RELATIVE_STRIDE];
//! features[2] = quarter;
//! features[RELATIVE_STRIDE + 2] = -quarter;
//!
//! let adjacency = Adjacency::from_signed(&[[1, -1, -1], [0, -1, -1]]);
//! let decoded = decode_relative_rotation(&features, &adjacency, &DecodeOptions::default()).unwrap();
//!
//! assert!(decoded.rotation(0).norm() < 1e-9);
//! assert!((decoded.rotation(1) - Vector3::new(0.0, 0.0, quarter)).norm() < 1e-9);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod encoding;
pub mod error;
pub mod io;
pub mod rotation;

/// Prelude module for convenient imports.
///
/// ```
/// use deltarot::prelude::*;
/// ```
pub mod prelude {
    pub use crate::algo::decode::{
        decode_relative_rotation, decode_relative_rotation_with_progress, DecodeOptions,
        Orthogonalization, SolverKind,
    };
    pub use crate::algo::Progress;
    pub use crate::encoding::{
        AbsoluteEncoding, Adjacency, DecodeReport, OutputLayout, RelativeEncoding,
        RELATIVE_STRIDE,
    };
    pub use crate::error::{DecodeError, Result};
    pub use crate::rotation::{rotation_to_vector, vector_to_rotation};
}

// Re-export nalgebra types for convenience
pub use nalgebra;

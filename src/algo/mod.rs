//! Decoding algorithms and the sparse linear algebra behind them.
//!
//! - **Decode**: relative-to-absolute rotation recovery ([`decode`])
//! - **Sparse matrices**: CSR storage, products and conjugate gradient ([`sparse`])
//! - **Factorization**: sparse LDLᵀ for the normal equations ([`ldl`])

pub mod decode;
pub mod ldl;
pub mod progress;
pub mod sparse;

pub use progress::Progress;

//! Feature buffer and adjacency table I/O.
//!
//! Mesh files themselves are out of scope; this module reads and writes the
//! flat buffers that the encoder produces and the reconstruction consumes.
//!
//! # Supported Formats
//!
//! | Format | Extension | Features | Adjacency |
//! |--------|-----------|----------|-----------|
//! | JSON | `.json` | flat number array | array of `[a, b, c]` rows, `-1` or `null` = none |
//! | Text | `.txt`, `.csv`, `.dat` | numbers separated by whitespace or commas | one face per line, negative = none |
//!
//! # Usage
//!
//! ```no_run
//! use deltarot::io::{load_adjacency, load_features, save_features};
//!
//! let features = load_features("model_rr.txt").unwrap();
//! let adjacency = load_adjacency("neigh.txt").unwrap();
//! save_features(&features, "copy.json").unwrap();
//! ```

pub mod json;
pub mod text;

use std::path::Path;

use crate::encoding::Adjacency;
use crate::error::{DecodeError, Result};

/// Supported file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// JSON arrays.
    Json,
    /// Whitespace- or comma-separated numbers.
    Text,
}

impl Format {
    /// Detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Format> {
        match ext.to_lowercase().as_str() {
            "json" => Some(Format::Json),
            "txt" | "csv" | "dat" => Some(Format::Text),
            _ => None,
        }
    }

    /// Detect format from file path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Format> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Format::from_extension)
    }
}

fn detect(path: &Path) -> Result<Format> {
    Format::from_path(path).ok_or_else(|| DecodeError::UnsupportedFormat {
        extension: path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("(none)")
            .to_string(),
    })
}

/// Load a flat feature buffer with automatic format detection.
pub fn load_features<P: AsRef<Path>>(path: P) -> Result<Vec<f64>> {
    let path = path.as_ref();
    match detect(path)? {
        Format::Json => json::load_features(path),
        Format::Text => text::load_features(path),
    }
}

/// Load an adjacency table with automatic format detection.
pub fn load_adjacency<P: AsRef<Path>>(path: P) -> Result<Adjacency> {
    let path = path.as_ref();
    match detect(path)? {
        Format::Json => json::load_adjacency(path),
        Format::Text => text::load_adjacency(path),
    }
}

/// Save a flat feature buffer with automatic format detection.
pub fn save_features<P: AsRef<Path>>(features: &[f64], path: P) -> Result<()> {
    let path = path.as_ref();
    match detect(path)? {
        Format::Json => json::save_features(features, path),
        Format::Text => text::save_features(features, path),
    }
}

/// Save a flat feature buffer, writing text output `stride` values per line.
///
/// JSON output is always a single flat array.
pub fn save_features_with_stride<P: AsRef<Path>>(
    features: &[f64],
    stride: usize,
    path: P,
) -> Result<()> {
    let path = path.as_ref();
    match detect(path)? {
        Format::Json => json::save_features(features, path),
        Format::Text => text::save_features_with_stride(features, stride, path),
    }
}

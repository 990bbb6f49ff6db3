//! JSON format support.
//!
//! Features are a flat array of numbers. Adjacency is an array of
//! three-element rows whose entries are face indices, `null`, or a negative
//! number for an empty slot.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::encoding::{Adjacency, NUM_SLOTS};
use crate::error::{DecodeError, Result};

/// Load a flat feature buffer from a JSON file.
pub fn load_features<P: AsRef<Path>>(path: P) -> Result<Vec<f64>> {
    let file = File::open(path.as_ref())?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Load an adjacency table from a JSON file.
pub fn load_adjacency<P: AsRef<Path>>(path: P) -> Result<Adjacency> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let rows: Vec<Vec<Option<i64>>> = serde_json::from_reader(BufReader::new(file))?;
    parse_rows(path, rows)
}

fn parse_rows(path: &Path, rows: Vec<Vec<Option<i64>>>) -> Result<Adjacency> {
    let mut signed = Vec::with_capacity(rows.len());
    for (i, row) in rows.into_iter().enumerate() {
        if row.len() != NUM_SLOTS {
            return Err(DecodeError::Parse {
                path: path.to_path_buf(),
                line: i + 1,
                message: format!("expected {} neighbours, found {}", NUM_SLOTS, row.len()),
            });
        }
        signed.push([
            row[0].unwrap_or(-1),
            row[1].unwrap_or(-1),
            row[2].unwrap_or(-1),
        ]);
    }
    Ok(Adjacency::from_signed(&signed))
}

/// Save a flat feature buffer as a JSON array.
pub fn save_features<P: AsRef<Path>>(features: &[f64], path: P) -> Result<()> {
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, features)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_adjacency_with_null_and_negative() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("neigh.json");
        std::fs::write(&path, "[[1, null, -1], [0, 2, null], [1, -1, -1]]").unwrap();

        let adj = load_adjacency(&path).unwrap();
        assert_eq!(adj.num_faces(), 3);
        assert_eq!(adj.neighbours(0), [Some(1), None, None]);
        assert_eq!(adj.neighbours(1), [Some(0), Some(2), None]);
    }

    #[test]
    fn test_load_adjacency_wrong_row_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("neigh.json");
        std::fs::write(&path, "[[1, -1, -1], [0, 2]]").unwrap();

        assert!(matches!(
            load_adjacency(&path),
            Err(DecodeError::Parse { line: 2, .. })
        ));
    }

    #[test]
    fn test_load_features_rejects_non_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("features.json");
        std::fs::write(&path, "[1.0, \"two\"]").unwrap();

        assert!(matches!(load_features(&path), Err(DecodeError::Json(_))));
    }
}

//! Plain text format support.
//!
//! Numbers are separated by whitespace and/or commas; lines starting with `#`
//! are comments. A feature file may spread its values over any number of
//! lines. An adjacency file has one face per line with exactly three
//! integers, where a negative value marks an empty slot (the encoder writes
//! `-1`).

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::encoding::{Adjacency, NUM_SLOTS, RELATIVE_STRIDE};
use crate::error::{DecodeError, Result};

fn tokens(line: &str) -> impl Iterator<Item = &str> {
    line.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
}

fn is_blank_or_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.is_empty() || trimmed.starts_with('#')
}

fn parse_error(path: &Path, line: usize, message: String) -> DecodeError {
    DecodeError::Parse {
        path: path.to_path_buf(),
        line,
        message,
    }
}

/// Load a flat feature buffer from a text file.
pub fn load_features<P: AsRef<Path>>(path: P) -> Result<Vec<f64>> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let mut features = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if is_blank_or_comment(&line) {
            continue;
        }
        for token in tokens(&line) {
            let value: f64 = token
                .parse()
                .map_err(|_| parse_error(path, i + 1, format!("invalid number '{}'", token)))?;
            features.push(value);
        }
    }

    Ok(features)
}

/// Load an adjacency table from a text file.
pub fn load_adjacency<P: AsRef<Path>>(path: P) -> Result<Adjacency> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let mut rows = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if is_blank_or_comment(&line) {
            continue;
        }

        let mut row = [-1i64; NUM_SLOTS];
        let mut count = 0;
        for token in tokens(&line) {
            if count == NUM_SLOTS {
                return Err(parse_error(
                    path,
                    i + 1,
                    format!("more than {} neighbours", NUM_SLOTS),
                ));
            }
            row[count] = token
                .parse()
                .map_err(|_| parse_error(path, i + 1, format!("invalid index '{}'", token)))?;
            count += 1;
        }
        if count != NUM_SLOTS {
            return Err(parse_error(
                path,
                i + 1,
                format!("expected {} neighbours, found {}", NUM_SLOTS, count),
            ));
        }
        rows.push(row);
    }

    Ok(Adjacency::from_signed(&rows))
}

/// Save a flat feature buffer, one face record per line.
///
/// Records are split every [`RELATIVE_STRIDE`] values; the split is cosmetic
/// since loading ignores line structure.
pub fn save_features<P: AsRef<Path>>(features: &[f64], path: P) -> Result<()> {
    save_features_with_stride(features, RELATIVE_STRIDE, path)
}

/// Save a flat feature buffer with `stride` values per line.
pub fn save_features_with_stride<P: AsRef<Path>>(
    features: &[f64],
    stride: usize,
    path: P,
) -> Result<()> {
    if stride == 0 {
        return Err(DecodeError::invalid_param("stride", stride, "must be positive"));
    }
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);

    for record in features.chunks(stride) {
        let line: Vec<String> = record.iter().map(|x| format!("{:?}", x)).collect();
        writeln!(writer, "{}", line.join(" "))?;
    }

    writer.flush()?;
    Ok(())
}

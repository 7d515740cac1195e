//! Writers for membership results.
//!
//! This module provides functions for persisting estimator output:
//! - Probability tables: identifier plus one column per tested `min_samples`
//! - Member lists: the accepted catalog rows above a probability cut
//!
//! Tables are space separated with a header row, the same layout the
//! catalog loader reads.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter};
use std::path::Path;

use thiserror::Error;

use super::catalog::Catalog;
use crate::processors::membership::MembershipTable;

/// Name of the optional averaged column.
pub const MEAN_COLUMN: &str = "probs_mean";

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to read or write file data.
    #[error("failed to access file '{path}': {source}")]
    FileAccess {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// Mismatched array lengths.
    #[error("array length mismatch: {rows} rows, {values} values")]
    LengthMismatch { rows: usize, values: usize },

    /// A probability table could not be interpreted.
    #[error("invalid probability table '{path}': {reason}")]
    InvalidTable { path: String, reason: String },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Creates a space-delimited CSV writer for the given path.
fn create_table_writer(path: &Path) -> Result<csv::Writer<BufWriter<File>>> {
    ensure_parent_dirs(path)?;
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(csv::WriterBuilder::new()
        .delimiter(b' ')
        .from_writer(BufWriter::new(file)))
}

/// Write a probability table.
///
/// Columns are `ID`, one column per tested `min_samples` (the header is the
/// value itself), and, when `write_mean` is set, `probs_mean` averaged over
/// those columns. Every catalog row is written; rows excluded upstream carry
/// probability 0.
///
/// # Errors
///
/// Returns an error if a column length disagrees with the identifiers or the
/// file cannot be written.
///
/// # Example
///
/// ```no_run
/// use membership_pipeline::core::writers::write_probabilities;
/// use membership_pipeline::processors::MembershipTable;
/// use std::path::Path;
///
/// let table = MembershipTable { ids: vec![], columns: vec![] };
/// write_probabilities(Path::new("cluster_probs.dat"), &table, true).unwrap();
/// ```
pub fn write_probabilities(path: &Path, table: &MembershipTable, write_mean: bool) -> Result<()> {
    for column in &table.columns {
        if column.probabilities.len() != table.ids.len() {
            return Err(WriteError::LengthMismatch {
                rows: table.ids.len(),
                values: column.probabilities.len(),
            });
        }
    }

    let mut writer = create_table_writer(path)?;
    let path_str = path.display().to_string();
    let csv_err = |e| WriteError::CsvError {
        path: path_str.clone(),
        source: e,
    };

    let mut header = vec!["ID".to_string()];
    header.extend(table.columns.iter().map(|c| c.min_samples.to_string()));
    if write_mean {
        header.push(MEAN_COLUMN.to_string());
    }
    writer.write_record(&header).map_err(csv_err)?;

    let means = table.mean_probabilities();
    for (i, id) in table.ids.iter().enumerate() {
        let mut record = Vec::with_capacity(header.len());
        record.push(id.clone());
        record.extend(
            table
                .columns
                .iter()
                .map(|c| format!("{:.6}", c.probabilities[i])),
        );
        if write_mean {
            record.push(format!("{:.6}", means[i]));
        }
        writer.write_record(&record).map_err(csv_err)?;
    }

    writer.flush().map_err(|e| WriteError::FileAccess {
        path: path_str.clone(),
        source: e,
    })?;

    Ok(())
}

/// Probabilities read back from a table written by [`write_probabilities`].
#[derive(Debug, Clone)]
pub struct ProbabilityRecords {
    pub ids: Vec<String>,
    /// `probs_mean` if present, otherwise the mean of all numeric columns.
    pub probabilities: Vec<f64>,
}

/// Load identifiers and the averaged probability from a probability table.
pub fn load_probabilities(path: &Path) -> Result<ProbabilityRecords> {
    let path_str = path.display().to_string();
    let invalid = |reason: String| WriteError::InvalidTable {
        path: path_str.clone(),
        reason,
    };
    let access = |e| WriteError::FileAccess {
        path: path_str.clone(),
        source: e,
    };

    let file = File::open(path).map_err(access)?;
    let mut lines = BufReader::new(file).lines();

    let header_line = lines
        .next()
        .ok_or_else(|| invalid("missing header".to_string()))?
        .map_err(access)?;
    let header: Vec<&str> = header_line.split_whitespace().collect();
    if header.first() != Some(&"ID") || header.len() < 2 {
        return Err(invalid(format!("unexpected header '{}'", header_line)));
    }
    let mean_idx = header.iter().position(|&h| h == MEAN_COLUMN);

    let mut ids = Vec::new();
    let mut probabilities = Vec::new();
    for line in lines {
        let line = line.map_err(access)?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() != header.len() {
            return Err(invalid(format!(
                "row '{}' has {} fields, header has {}",
                fields[0],
                fields.len(),
                header.len()
            )));
        }

        let values: Vec<f64> = fields[1..]
            .iter()
            .map(|v| v.parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| invalid(format!("row '{}': {}", fields[0], e)))?;

        let probability = match mean_idx {
            Some(idx) => values[idx - 1],
            None => values.iter().sum::<f64>() / values.len() as f64,
        };

        ids.push(fields[0].to_string());
        probabilities.push(probability);
    }

    Ok(ProbabilityRecords { ids, probabilities })
}

/// Write the selected catalog rows with their membership probability.
///
/// # Arguments
///
/// * `path` - Output file path (parent directories will be created if needed)
/// * `catalog` - Catalog the probabilities were computed for
/// * `probabilities` - One probability per catalog row
/// * `rows` - Catalog row indices to write; each must be an accepted row
///
/// # Errors
///
/// Returns an error if the probabilities do not match the catalog, a row is
/// not accepted, or the file cannot be written.
pub fn write_members(
    path: &Path,
    catalog: &Catalog,
    probabilities: &[f64],
    rows: &[usize],
) -> Result<()> {
    if probabilities.len() != catalog.len() {
        return Err(WriteError::LengthMismatch {
            rows: catalog.len(),
            values: probabilities.len(),
        });
    }

    // Catalog row -> feature matrix row
    let mut feature_row = vec![None; catalog.len()];
    for (j, i) in catalog.accepted_rows().into_iter().enumerate() {
        feature_row[i] = Some(j);
    }

    let path_str = path.display().to_string();
    let selected: Vec<(usize, usize)> = rows
        .iter()
        .map(|&i| {
            feature_row
                .get(i)
                .copied()
                .flatten()
                .map(|j| (i, j))
                .ok_or_else(|| WriteError::InvalidTable {
                    path: path_str.clone(),
                    reason: format!("row {} is not an accepted catalog row", i),
                })
        })
        .collect::<Result<_>>()?;

    let mut writer = create_table_writer(path)?;
    let csv_err = |e| WriteError::CsvError {
        path: path_str.clone(),
        source: e,
    };

    let mut header = vec!["ID".to_string()];
    header.extend(catalog.data_cols.iter().cloned());
    header.extend(catalog.err_cols.iter().cloned());
    header.push("prob".to_string());
    writer.write_record(&header).map_err(csv_err)?;

    for (i, j) in selected {
        let mut record = Vec::with_capacity(header.len());
        record.push(catalog.ids[i].clone());
        record.extend(catalog.features.row(j).iter().map(|v| format!("{:.6}", v)));
        record.extend(catalog.uncertainties.row(j).iter().map(|v| format!("{:.6}", v)));
        record.push(format!("{:.6}", probabilities[i]));
        writer.write_record(&record).map_err(csv_err)?;
    }

    writer.flush().map_err(|e| WriteError::FileAccess {
        path: path_str.clone(),
        source: e,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::membership::ProbabilityColumn;
    use nalgebra::DMatrix;
    use std::fs;
    use tempfile::tempdir;

    fn create_test_table() -> MembershipTable {
        MembershipTable {
            ids: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            columns: vec![
                ProbabilityColumn {
                    min_samples: 10,
                    probabilities: vec![1.0, 0.0, 0.5],
                },
                ProbabilityColumn {
                    min_samples: 12,
                    probabilities: vec![0.8, 0.0, 0.5],
                },
            ],
        }
    }

    fn create_test_catalog() -> Catalog {
        Catalog::from_parts(
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            vec![true, false, true],
            DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]),
            DMatrix::from_row_slice(2, 2, &[0.1, 0.1, 0.2, 0.2]),
        )
    }

    #[test]
    fn test_write_probabilities_with_mean() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cluster_probs.dat");

        write_probabilities(&path, &create_test_table(), true).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();

        assert_eq!(lines[0], "ID 10 12 probs_mean");
        assert_eq!(lines.len(), 4); // header + 3 data rows
        assert_eq!(lines[1], "a 1.000000 0.800000 0.900000");
        assert_eq!(lines[2], "b 0.000000 0.000000 0.000000");
    }

    #[test]
    fn test_write_probabilities_without_mean() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("probs.dat");

        write_probabilities(&path, &create_test_table(), false).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().next(), Some("ID 10 12"));
    }

    #[test]
    fn test_write_probabilities_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("nested").join("probs.dat");

        write_probabilities(&path, &create_test_table(), true).unwrap();

        assert!(path.exists());
    }

    #[test]
    fn test_write_probabilities_length_mismatch() {
        let dir = tempdir().unwrap();
        let mut table = create_test_table();
        table.columns[1].probabilities.pop();

        let result = write_probabilities(&dir.path().join("p.dat"), &table, true);

        match result.unwrap_err() {
            WriteError::LengthMismatch { rows, values } => {
                assert_eq!(rows, 3);
                assert_eq!(values, 2);
            }
            _ => panic!("Expected LengthMismatch error"),
        }
    }

    #[test]
    fn test_load_probabilities_prefers_mean_column() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("probs.dat");
        write_probabilities(&path, &create_test_table(), true).unwrap();

        let records = load_probabilities(&path).unwrap();

        assert_eq!(records.ids, vec!["a", "b", "c"]);
        assert!((records.probabilities[0] - 0.9).abs() < 1e-9);
        assert!((records.probabilities[2] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_load_probabilities_averages_without_mean_column() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("probs.dat");
        write_probabilities(&path, &create_test_table(), false).unwrap();

        let records = load_probabilities(&path).unwrap();

        assert!((records.probabilities[0] - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_load_probabilities_rejects_bad_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.dat");
        fs::write(&path, "name value\nx 1\n").unwrap();

        assert!(matches!(
            load_probabilities(&path),
            Err(WriteError::InvalidTable { .. })
        ));
    }

    #[test]
    fn test_write_members() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("members.dat");
        let catalog = create_test_catalog();

        write_members(&path, &catalog, &[0.9, 0.0, 0.8], &[0, 2]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "ID f0 f1 e_f0 e_f1 prob");
        assert_eq!(lines.len(), 3);
        assert!(lines[2].starts_with("c 3.000000 4.000000"));
        assert!(lines[2].ends_with("0.800000"));
    }

    #[test]
    fn test_write_members_rejects_excluded_row() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("members.dat");
        let catalog = create_test_catalog();

        let result = write_members(&path, &catalog, &[0.9, 0.0, 0.8], &[1]);

        assert!(matches!(result, Err(WriteError::InvalidTable { .. })));
    }

    #[test]
    fn test_write_members_leaves_no_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("members.dat");
        let catalog = create_test_catalog();

        // Row 0 is valid, row 1 was excluded by the accept mask
        let result = write_members(&path, &catalog, &[0.9, 0.0, 0.8], &[0, 1, 2]);

        assert!(matches!(result, Err(WriteError::InvalidTable { .. })));
        assert!(!path.exists());
    }
}

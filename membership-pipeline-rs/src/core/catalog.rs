//! Astrometric catalog loading.
//!
//! Catalogs are ASCII tables with a header row, either whitespace separated
//! (the astropy "basic" layout) or comma separated. Rows with a missing or
//! non-numeric feature value are kept in the identifier list but excluded
//! from the feature matrices through the accept mask.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use nalgebra::DMatrix;
use thiserror::Error;

use crate::config::CatalogConfig;

/// Errors that can occur during catalog loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Missing required columns: {0}")]
    MissingColumns(String),

    #[error("Column configuration error: {0}")]
    ColumnConfig(String),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Field separator detected from the header line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    /// Columns separated by runs of whitespace
    Whitespace,
    /// Comma separated values
    Comma,
}

/// A star catalog reduced to the columns the estimator needs.
#[derive(Debug, Clone)]
pub struct Catalog {
    /// Identifier of every row in the file, accepted or not.
    pub ids: Vec<String>,
    /// `true` for rows whose features are all valid.
    pub accept_mask: Vec<bool>,
    /// Accepted rows only, N_accepted×D.
    pub features: DMatrix<f64>,
    /// Uncertainties of the accepted rows, same shape as `features`.
    pub uncertainties: DMatrix<f64>,
    /// Names of the feature columns.
    pub data_cols: Vec<String>,
    /// Names of the uncertainty columns.
    pub err_cols: Vec<String>,
}

impl Catalog {
    /// Build a catalog from already-parsed parts.
    ///
    /// Feature rows must be given for accepted rows only. Column names default
    /// to `f0, f1, ...` and `e_f0, ...`.
    pub fn from_parts(
        ids: Vec<String>,
        accept_mask: Vec<bool>,
        features: DMatrix<f64>,
        uncertainties: DMatrix<f64>,
    ) -> Self {
        let d = features.ncols();
        Self {
            ids,
            accept_mask,
            features,
            uncertainties,
            data_cols: (0..d).map(|j| format!("f{}", j)).collect(),
            err_cols: (0..d).map(|j| format!("e_f{}", j)).collect(),
        }
    }

    /// Total number of rows, accepted or not.
    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Number of rows that passed the validity filter.
    #[inline]
    pub fn n_accepted(&self) -> usize {
        self.features.nrows()
    }

    /// Number of rows excluded by the validity filter.
    #[inline]
    pub fn n_rejected(&self) -> usize {
        self.len() - self.n_accepted()
    }

    /// Catalog row index of every accepted row, in feature-matrix order.
    pub fn accepted_rows(&self) -> Vec<usize> {
        self.accept_mask
            .iter()
            .enumerate()
            .filter(|(_, accepted)| **accepted)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Detect the field separator from a header line.
pub fn detect_format(header: &str) -> TableFormat {
    if header.contains(',') {
        TableFormat::Comma
    } else {
        TableFormat::Whitespace
    }
}

/// Parse a feature value; missing markers and non-finite numbers give `None`.
fn parse_value(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    match trimmed {
        "" | "--" => None,
        _ => trimmed.parse::<f64>().ok().filter(|v| v.is_finite()),
    }
}

/// Read header and data rows, skipping blank lines and `#` comments.
fn read_rows(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>)> {
    let file = File::open(path)?;
    let mut lines = BufReader::new(file).lines();

    let mut header_line = None;
    for line in &mut lines {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        header_line = Some(line);
        break;
    }
    let header_line = header_line.ok_or_else(|| LoaderError::EmptyFile(path.to_path_buf()))?;

    match detect_format(&header_line) {
        TableFormat::Whitespace => {
            let header = header_line
                .split_whitespace()
                .map(str::to_string)
                .collect();
            let mut rows = Vec::new();
            for line in lines {
                let line = line?;
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    continue;
                }
                rows.push(trimmed.split_whitespace().map(str::to_string).collect());
            }
            Ok((header, rows))
        }
        TableFormat::Comma => {
            let file = File::open(path)?;
            let mut reader = ReaderBuilder::new()
                .has_headers(true)
                .flexible(true)
                .comment(Some(b'#'))
                .trim(csv::Trim::All)
                .from_reader(BufReader::new(file));

            let header = reader.headers()?.iter().map(str::to_string).collect();
            let mut rows = Vec::new();
            for result in reader.records() {
                let record = result?;
                rows.push(record.iter().map(str::to_string).collect());
            }
            Ok((header, rows))
        }
    }
}

/// Load a catalog, building the accept mask from the feature columns.
///
/// # Arguments
///
/// * `path` - Path to the catalog table
/// * `config` - Column names to extract
///
/// # Returns
///
/// A `Catalog` whose matrices hold the accepted rows only. Missing
/// uncertainty values are read as 0, i.e. exact measurements.
///
/// # Errors
///
/// Returns an error if the file cannot be read, has no data rows, or lacks a
/// configured column.
pub fn load_catalog<P: AsRef<Path>>(path: P, config: &CatalogConfig) -> Result<Catalog> {
    let path = path.as_ref();

    if config.data_cols.is_empty() || config.data_cols.len() != config.err_cols.len() {
        return Err(LoaderError::ColumnConfig(format!(
            "{} data columns but {} error columns",
            config.data_cols.len(),
            config.err_cols.len()
        )));
    }

    let (header, rows) = read_rows(path)?;
    if rows.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    let col_map: HashMap<&str, usize> = header
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    let lookup = |name: &String| col_map.get(name.as_str()).copied();
    let missing: Vec<&str> = std::iter::once(&config.id_col)
        .chain(&config.data_cols)
        .chain(&config.err_cols)
        .filter(|name| lookup(name).is_none())
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(LoaderError::MissingColumns(missing.join(", ")));
    }

    let id_idx = col_map[config.id_col.as_str()];
    let data_idx: Vec<usize> = config.data_cols.iter().filter_map(lookup).collect();
    let err_idx: Vec<usize> = config.err_cols.iter().filter_map(lookup).collect();

    let d = data_idx.len();
    let mut ids = Vec::with_capacity(rows.len());
    let mut accept_mask = Vec::with_capacity(rows.len());
    let mut feature_values = Vec::with_capacity(rows.len() * d);
    let mut error_values = Vec::with_capacity(rows.len() * d);

    for row in &rows {
        ids.push(row.get(id_idx).cloned().unwrap_or_default());

        let features: Option<Vec<f64>> = data_idx
            .iter()
            .map(|&i| row.get(i).and_then(|raw| parse_value(raw)))
            .collect();

        match features {
            Some(values) => {
                accept_mask.push(true);
                feature_values.extend(values);
                error_values.extend(
                    err_idx
                        .iter()
                        .map(|&i| row.get(i).and_then(|raw| parse_value(raw)).unwrap_or(0.0)),
                );
            }
            None => accept_mask.push(false),
        }
    }

    let n_accepted = feature_values.len() / d;

    Ok(Catalog {
        ids,
        accept_mask,
        features: DMatrix::from_row_slice(n_accepted, d, &feature_values),
        uncertainties: DMatrix::from_row_slice(n_accepted, d, &error_values),
        data_cols: config.data_cols.clone(),
        err_cols: config.err_cols.clone(),
    })
}

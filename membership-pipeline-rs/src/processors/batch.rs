//! Whole-file processing: catalog in, probability table out.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};

use super::membership::estimate_membership;
use crate::config::{CatalogConfig, PipelineConfig};
use crate::core::catalog::load_catalog;
use crate::core::writers::write_probabilities;

/// Summary of one processed catalog.
#[derive(Debug, Clone)]
pub struct CatalogReport {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Rows in the input table.
    pub stars_read: usize,
    /// Rows excluded for missing or invalid features.
    pub stars_removed: usize,
    /// Expected member count (sum of probabilities) per `min_samples`.
    pub expected_members: Vec<(usize, f64)>,
}

/// Find catalog files in `directory`.
///
/// A file qualifies when its name ends with `input_suffix` and not with
/// `exclude_suffix`. Paths are returned sorted.
pub fn find_catalogs(directory: &Path, input_suffix: &str, exclude_suffix: &str) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(directory)
        .with_context(|| format!("Failed to read directory: {}", directory.display()))?;

    let mut catalogs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| {
                    name.ends_with(input_suffix)
                        && (exclude_suffix.is_empty() || !name.ends_with(exclude_suffix))
                })
                .unwrap_or(false)
        })
        .collect();

    catalogs.sort();
    Ok(catalogs)
}

/// Output table path for an input catalog.
///
/// `input_suffix` is replaced by `output_suffix` in the file name, or
/// `output_suffix` is appended when the name lacks it. The file goes to
/// `output_dir` when given, next to the input otherwise.
pub fn output_path_for(input: &Path, config: &CatalogConfig, output_dir: Option<&Path>) -> PathBuf {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let out_name = match name.strip_suffix(config.input_suffix.as_str()) {
        Some(stem) if !config.input_suffix.is_empty() => format!("{}{}", stem, config.output_suffix),
        _ => format!("{}{}", name, config.output_suffix),
    };

    let dir = output_dir
        .map(Path::to_path_buf)
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    dir.join(out_name)
}

/// Estimate membership for one catalog file and write its probability table.
///
/// Nothing is written unless the estimate succeeds.
pub fn process_catalog(input: &Path, output_dir: Option<&Path>, config: &PipelineConfig) -> Result<CatalogReport> {
    let catalog = load_catalog(input, &config.catalog)
        .with_context(|| format!("Failed to load catalog: {}", input.display()))?;

    info!(
        "{}: {} stars read, {} removed",
        input.display(),
        catalog.len(),
        catalog.n_rejected()
    );

    let table = estimate_membership(&catalog, &config.membership)
        .with_context(|| format!("Membership estimate failed for {}", input.display()))?;

    let output = output_path_for(input, &config.catalog, output_dir);
    write_probabilities(&output, &table, config.catalog.write_mean)
        .with_context(|| format!("Failed to write probabilities: {}", output.display()))?;

    let expected_members = table
        .columns
        .iter()
        .map(|c| (c.min_samples, c.probabilities.iter().sum()))
        .collect();

    Ok(CatalogReport {
        input: input.to_path_buf(),
        output,
        stars_read: catalog.len(),
        stars_removed: catalog.n_rejected(),
        expected_members,
    })
}

/// Process catalogs one after another.
///
/// A failing catalog is logged and recorded; the remaining catalogs still
/// run. Results are returned in input order.
pub fn process_batch(
    inputs: &[PathBuf],
    output_dir: Option<&Path>,
    config: &PipelineConfig,
) -> Vec<(PathBuf, Result<CatalogReport>)> {
    inputs
        .iter()
        .map(|input| {
            let result = process_catalog(input, output_dir, config);
            if let Err(e) = &result {
                warn!("Skipping {}: {:#}", input.display(), e);
            }
            (input.clone(), result)
        })
        .collect()
}

//! Configuration types for the membership pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::processors::MembershipError;

/// Configuration for the input catalog layout and output naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Column holding the star identifier
    #[serde(default = "default_id_col")]
    pub id_col: String,

    /// Feature columns (proper motions and parallax)
    #[serde(default = "default_data_cols")]
    pub data_cols: Vec<String>,

    /// Uncertainty columns, one per feature column and in the same order
    #[serde(default = "default_err_cols")]
    pub err_cols: Vec<String>,

    /// File name suffix identifying input catalogs in batch mode
    #[serde(default = "default_input_suffix")]
    pub input_suffix: String,

    /// File name suffix that disqualifies an otherwise matching catalog
    #[serde(default = "default_exclude_suffix")]
    pub exclude_suffix: String,

    /// Suffix substituted for `input_suffix` when naming the output table
    #[serde(default = "default_output_suffix")]
    pub output_suffix: String,

    /// Append a `probs_mean` column averaged over all min_samples columns
    #[serde(default = "default_write_mean")]
    pub write_mean: bool,
}

fn default_id_col() -> String {
    "ID".to_string()
}

fn default_data_cols() -> Vec<String> {
    vec!["pmRA".to_string(), "pmDE".to_string(), "Plx".to_string()]
}

fn default_err_cols() -> Vec<String> {
    vec![
        "e_pmRA".to_string(),
        "e_pmDE".to_string(),
        "e_Plx".to_string(),
    ]
}

fn default_input_suffix() -> String {
    "_match.dat".to_string()
}

fn default_exclude_suffix() -> String {
    "no_match.dat".to_string()
}

fn default_output_suffix() -> String {
    "_probs.dat".to_string()
}

fn default_write_mean() -> bool {
    true
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            id_col: default_id_col(),
            data_cols: default_data_cols(),
            err_cols: default_err_cols(),
            input_suffix: default_input_suffix(),
            exclude_suffix: default_exclude_suffix(),
            output_suffix: default_output_suffix(),
            write_mean: default_write_mean(),
        }
    }
}

/// Arithmetic range of `min_samples` values, `stop` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinSamplesRange {
    pub start: usize,
    pub stop: usize,
    pub step: usize,
}

impl MinSamplesRange {
    pub fn new(start: usize, stop: usize, step: usize) -> Self {
        Self { start, stop, step }
    }

    /// Range holding a single value.
    pub fn single(min_samples: usize) -> Self {
        Self::new(min_samples, min_samples + 1, 1)
    }

    /// Every tested value, in ascending order.
    pub fn values(&self) -> Vec<usize> {
        if self.step == 0 {
            return Vec::new();
        }
        (self.start..self.stop).step_by(self.step).collect()
    }
}

impl Default for MinSamplesRange {
    fn default() -> Self {
        Self::new(10, 60, 2)
    }
}

/// Configuration for the Monte-Carlo membership estimator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipConfig {
    /// Number of principal components kept before clustering
    #[serde(default = "default_pca_dims")]
    pub pca_dims: usize,

    /// Density sensitivity values to sweep
    #[serde(default)]
    pub min_samples: MinSamplesRange,

    /// Monte-Carlo trials per min_samples value
    #[serde(default = "default_n_runs")]
    pub n_runs: usize,

    /// Percentile of member distances compared against the farthest member
    #[serde(default = "default_perc_cut")]
    pub perc_cut: f64,

    /// Base seed for the trial RNG streams (random when absent)
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_pca_dims() -> usize {
    3
}

fn default_n_runs() -> usize {
    10
}

fn default_perc_cut() -> f64 {
    75.0
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            pca_dims: default_pca_dims(),
            min_samples: MinSamplesRange::default(),
            n_runs: default_n_runs(),
            perc_cut: default_perc_cut(),
            seed: None,
        }
    }
}

impl MembershipConfig {
    /// Check every parameter against a catalog of `n_rows` accepted stars with
    /// `n_features` columns. Runs before any trial.
    pub fn validate(&self, n_rows: usize, n_features: usize) -> Result<(), MembershipError> {
        if self.pca_dims == 0 || self.pca_dims > n_features {
            return Err(MembershipError::ParameterRange(format!(
                "pca_dims must be in [1, {}], got {}",
                n_features, self.pca_dims
            )));
        }
        if n_rows < self.pca_dims + 1 {
            return Err(MembershipError::InputShape(format!(
                "{} stars is too few for {} principal components",
                n_rows, self.pca_dims
            )));
        }

        let range = self.min_samples;
        if range.step == 0 || range.start >= range.stop {
            return Err(MembershipError::ParameterRange(format!(
                "empty min_samples range {}..{} step {}",
                range.start, range.stop, range.step
            )));
        }
        for min_samples in range.values() {
            if min_samples < 2 || min_samples > n_rows {
                return Err(MembershipError::ParameterRange(format!(
                    "min_samples must be in [2, {}], got {}",
                    n_rows, min_samples
                )));
            }
        }

        if self.n_runs == 0 {
            return Err(MembershipError::ParameterRange(
                "n_runs must be at least 1".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.perc_cut) {
            return Err(MembershipError::ParameterRange(format!(
                "perc_cut must be in [0, 100], got {}",
                self.perc_cut
            )));
        }

        Ok(())
    }
}

/// Configuration for member selection from finished probability tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Probability at or above which a star is reported as a member
    #[serde(default = "default_prob_cut")]
    pub prob_cut: f64,
}

fn default_prob_cut() -> f64 {
    0.75
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            prob_cut: default_prob_cut(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub membership: MembershipConfig,

    #[serde(default)]
    pub selection: SelectionConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

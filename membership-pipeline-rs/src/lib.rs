//! Monte-Carlo membership probabilities for star clusters.
//!
//! This crate provides tools for:
//! - Loading astrometric catalogs (proper motions, parallax and their errors)
//! - Resampling stars within their uncertainties and projecting with PCA
//! - OPTICS reachability profiles with automatic eps selection
//! - Aggregating DBSCAN-style labels over many trials into probabilities
//!
//! # Example
//!
//! ```no_run
//! use membership_pipeline::{core::load_catalog, processors::estimate_membership, PipelineConfig};
//!
//! let config = PipelineConfig::default();
//! let catalog = load_catalog("ngc2516_match.dat", &config.catalog).unwrap();
//! let table = estimate_membership(&catalog, &config.membership).unwrap();
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;

pub use config::{CatalogConfig, MembershipConfig, MinSamplesRange, PipelineConfig, SelectionConfig};
pub use core::catalog::Catalog;
pub use processors::{MembershipError, MembershipTable};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

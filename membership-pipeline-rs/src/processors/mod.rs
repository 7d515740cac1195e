//! Estimator stages and the drivers that chain them.
//!
//! Each trial runs resample → reduce → reachability profile → eps
//! selection → extraction; `membership` aggregates trials into
//! probabilities and `batch` applies that to whole catalog files.

use thiserror::Error;

pub mod batch;
pub mod extraction;
pub mod membership;
pub mod optics;
pub mod reduction;
pub mod resample;
pub mod selection;
pub mod threshold;

/// Errors raised by the membership estimator.
///
/// All of them are structural: retrying the same catalog cannot succeed.
#[derive(Debug, Error)]
pub enum MembershipError {
    /// Matrix shapes disagree or there are too few rows for the model.
    #[error("input shape error: {0}")]
    InputShape(String),

    /// No star was labeled a member at the conservative eps used to anchor
    /// the cluster center, or at an eps tried by the sweep.
    #[error("no members at eps = {eps}, member distances are undefined")]
    DegenerateCenter { eps: f64 },

    /// A configuration value is outside its valid range.
    #[error("parameter out of range: {0}")]
    ParameterRange(String),
}

/// Result type for estimator operations.
pub type Result<T> = std::result::Result<T, MembershipError>;

// Re-export key types for convenience
pub use batch::{find_catalogs, output_path_for, process_batch, process_catalog, CatalogReport};
pub use extraction::{extract_dbscan_labels, member_mask};
pub use membership::{estimate_membership, MembershipTable, ProbabilityColumn};
pub use optics::{build_reachability_profile, ReachabilityProfile};
pub use reduction::{reduce, Pca};
pub use resample::resample;
pub use selection::{effective_cut, select_members};
pub use threshold::select_eps;

//! Monte-Carlo membership probabilities.
//!
//! For every tested `min_samples` value, `n_runs` independent trials each
//! resample the catalog, project it, build a reachability profile, pick an
//! eps and label members. A trial's labels are scattered back onto the full
//! catalog (excluded rows count as non-members) and the trials are averaged
//! into one probability column.
//!
//! Trials and columns run in parallel with `rayon`. Each trial draws from
//! its own ChaCha stream keyed by (column, trial), and contributions are
//! summed in trial order, so a seeded run is reproducible on any number of
//! threads.

use log::{debug, info};
use nalgebra::DMatrix;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use super::extraction::member_mask;
use super::optics::build_reachability_profile;
use super::reduction::reduce;
use super::resample::resample;
use super::threshold::select_eps;
use super::{MembershipError, Result};
use crate::config::MembershipConfig;
use crate::core::catalog::Catalog;
use crate::core::stats::matrix_rows;

/// Membership probabilities for one `min_samples` value.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityColumn {
    pub min_samples: usize,
    /// One probability in [0, 1] per catalog row.
    pub probabilities: Vec<f64>,
}

/// Per-star probabilities for every tested `min_samples` value.
#[derive(Debug, Clone, PartialEq)]
pub struct MembershipTable {
    /// Identifier of every catalog row, accepted or not.
    pub ids: Vec<String>,
    pub columns: Vec<ProbabilityColumn>,
}

impl MembershipTable {
    /// Number of catalog rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Column for a given `min_samples`, if it was tested.
    pub fn column(&self, min_samples: usize) -> Option<&ProbabilityColumn> {
        self.columns.iter().find(|c| c.min_samples == min_samples)
    }

    /// Row-wise mean across all columns.
    ///
    /// The estimator never combines columns itself; this is for callers that
    /// want a single probability per star.
    pub fn mean_probabilities(&self) -> Vec<f64> {
        if self.columns.is_empty() {
            return vec![0.0; self.ids.len()];
        }
        let n_cols = self.columns.len() as f64;
        (0..self.ids.len())
            .map(|i| self.columns.iter().map(|c| c.probabilities[i]).sum::<f64>() / n_cols)
            .collect()
    }
}

/// Outcome of a single trial, over accepted rows only.
#[derive(Debug, Clone)]
pub struct TrialOutcome {
    pub eps: f64,
    pub members: Vec<bool>,
}

impl TrialOutcome {
    pub fn member_count(&self) -> usize {
        self.members.iter().filter(|&&m| m).count()
    }
}

/// Run one resample → reduce → profile → eps → label trial.
pub fn run_trial<R: Rng>(
    features: &DMatrix<f64>,
    uncertainties: &DMatrix<f64>,
    min_samples: usize,
    config: &MembershipConfig,
    rng: &mut R,
) -> Result<TrialOutcome> {
    let sampled = resample(features, uncertainties, rng);
    let reduced = reduce(&sampled, config.pca_dims)?;
    let points = matrix_rows(&reduced);

    let profile = build_reachability_profile(&points, min_samples)?;
    let eps = select_eps(&points, &profile, config.perc_cut)?;

    Ok(TrialOutcome {
        eps,
        members: member_mask(&profile, eps),
    })
}

/// Spread labels of the accepted rows over the full catalog.
///
/// Members become 1.0; non-members and rows excluded by `accept_mask`
/// become 0.0.
pub fn scatter_members(accept_mask: &[bool], members: &[bool]) -> Result<Vec<f64>> {
    let n_accepted = accept_mask.iter().filter(|&&a| a).count();
    if n_accepted != members.len() {
        return Err(MembershipError::InputShape(format!(
            "accept mask selects {} rows but {} labels were given",
            n_accepted,
            members.len()
        )));
    }

    let mut labels = members.iter().copied();
    Ok(accept_mask
        .iter()
        .map(|&accepted| {
            let member = accepted && labels.next().unwrap_or(false);
            if member {
                1.0
            } else {
                0.0
            }
        })
        .collect())
}

/// Independent random stream for one trial.
fn trial_rng(base_seed: u64, column: usize, trial: usize) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(base_seed);
    rng.set_stream(((column as u64) << 32) | trial as u64);
    rng
}

/// Check the catalog against itself and the configuration.
fn validate_inputs(catalog: &Catalog, config: &MembershipConfig) -> Result<()> {
    if catalog.features.shape() != catalog.uncertainties.shape() {
        return Err(MembershipError::InputShape(format!(
            "features are {:?} but uncertainties are {:?}",
            catalog.features.shape(),
            catalog.uncertainties.shape()
        )));
    }
    if catalog.accept_mask.len() != catalog.ids.len() {
        return Err(MembershipError::InputShape(format!(
            "{} identifiers but accept mask of length {}",
            catalog.ids.len(),
            catalog.accept_mask.len()
        )));
    }
    let n_accepted = catalog.accept_mask.iter().filter(|&&a| a).count();
    if n_accepted != catalog.features.nrows() {
        return Err(MembershipError::InputShape(format!(
            "accept mask selects {} rows but features have {}",
            n_accepted,
            catalog.features.nrows()
        )));
    }
    if let Some(bad) = catalog.uncertainties.iter().find(|v| !(**v >= 0.0)) {
        return Err(MembershipError::ParameterRange(format!(
            "uncertainties must be non-negative, found {}",
            bad
        )));
    }

    config.validate(catalog.features.nrows(), catalog.features.ncols())
}

/// Estimate membership probabilities for every star in `catalog`.
///
/// # Arguments
///
/// * `catalog` - Identifiers, accept mask and accepted feature/uncertainty rows
/// * `config` - PCA dimension, `min_samples` range, trial count, `perc_cut`, seed
///
/// # Returns
///
/// One probability column per tested `min_samples`, each covering every
/// catalog row (excluded rows are 0).
///
/// # Errors
///
/// Configuration and shape problems are reported before any trial runs. A
/// failing trial aborts the whole estimate.
pub fn estimate_membership(catalog: &Catalog, config: &MembershipConfig) -> Result<MembershipTable> {
    validate_inputs(catalog, config)?;

    aggregate_trials(catalog, config, |min_samples, rng| {
        run_trial(
            &catalog.features,
            &catalog.uncertainties,
            min_samples,
            config,
            rng,
        )
    })
}

/// Average `trial` outcomes into one probability column per `min_samples`.
///
/// `trial` receives the `min_samples` value and the trial's own RNG stream.
/// An error from any trial is returned and no table is built.
fn aggregate_trials<F>(catalog: &Catalog, config: &MembershipConfig, trial: F) -> Result<MembershipTable>
where
    F: Fn(usize, &mut ChaCha8Rng) -> Result<TrialOutcome> + Sync,
{
    let base_seed = config.seed.unwrap_or_else(rand::random);
    let n_runs = config.n_runs;
    let n_total = catalog.len();
    let values = config.min_samples.values();

    info!(
        "estimating membership for {} stars ({} accepted), {} min_samples values x {} runs",
        n_total,
        catalog.n_accepted(),
        values.len(),
        n_runs
    );

    let columns = values
        .par_iter()
        .enumerate()
        .map(|(column, &min_samples)| -> Result<ProbabilityColumn> {
            let contributions = (0..n_runs)
                .into_par_iter()
                .map(|run| -> Result<Vec<f64>> {
                    let mut rng = trial_rng(base_seed, column, run);
                    let outcome = trial(min_samples, &mut rng)?;
                    debug!(
                        "min_samples={} run={}: eps={:.4}, {} members",
                        min_samples,
                        run,
                        outcome.eps,
                        outcome.member_count()
                    );
                    scatter_members(&catalog.accept_mask, &outcome.members)
                })
                .collect::<Result<Vec<Vec<f64>>>>()?;

            let mut sum = vec![0.0; n_total];
            for contribution in &contributions {
                for (s, v) in sum.iter_mut().zip(contribution) {
                    *s += v;
                }
            }
            let probabilities: Vec<f64> = sum.into_iter().map(|s| s / n_runs as f64).collect();

            info!(
                "min_samples={} done, mean probability {:.3}",
                min_samples,
                probabilities.iter().sum::<f64>() / n_total.max(1) as f64
            );

            Ok(ProbabilityColumn {
                min_samples,
                probabilities,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(MembershipTable {
        ids: catalog.ids.clone(),
        columns,
    })
}

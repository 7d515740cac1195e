//! Automatic eps selection for a single dominant overdensity.
//!
//! The member set at a very conservative eps (the 1st percentile of the
//! reachability plot) anchors a cluster center. Eps is then swept upward in
//! fixed steps; for each candidate the distances from the center to the
//! current members are measured, and the sweep stops at the first eps that
//! is smaller than the gap between the farthest member and the `perc_cut`
//! percentile member. If the sweep never stops, the maximum finite
//! reachability is returned and (nearly) every star becomes a member.
//!
//! The step, the percentiles and the stopping inequality are fixed; outputs
//! are compared across runs and must not drift.

use log::debug;

use super::extraction::member_mask;
use super::optics::ReachabilityProfile;
use super::{MembershipError, Result};
use crate::core::stats::{euclidean, masked_centroid, percentile};

/// Eps increment of the sweep, in reduced feature-space units.
pub const EPS_STEP: f64 = 0.005;

/// Reachability percentile whose members define the cluster center.
pub const CENTER_PERCENTILE: f64 = 1.0;

/// Reachability percentile bounding the sweep (exclusive).
pub const SWEEP_UPPER_PERCENTILE: f64 = 95.0;

/// Choose the eps at which to cut `profile`.
///
/// # Arguments
///
/// * `points` - Reduced points the profile was built from
/// * `profile` - Reachability profile of `points`
/// * `perc_cut` - Percentile (0..=100) of member distances compared against
///   the farthest member
///
/// # Returns
///
/// A finite, non-negative eps no larger than the maximum finite reachability.
///
/// # Errors
///
/// `DegenerateCenter` when nothing is a member at the 1st-percentile eps or
/// at a swept eps, `InputShape` when the profile has no finite reachability
/// at all.
pub fn select_eps(
    points: &[Vec<f64>],
    profile: &ReachabilityProfile,
    perc_cut: f64,
) -> Result<f64> {
    let finite = profile.finite_reachability();
    if finite.is_empty() {
        return Err(MembershipError::InputShape(
            "reachability profile has no finite values".to_string(),
        ));
    }

    let (min_reach, max_reach) = finite
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
            (lo.min(r), hi.max(r))
        });

    // Percentile ranks count the unreachable start of the plot, which sorts last
    let plot = profile.ordered_reachability();
    let bounded = |q: f64| {
        percentile(&plot, q)
            .filter(|v| v.is_finite())
            .unwrap_or(max_reach)
    };

    let eps_min = bounded(CENTER_PERCENTILE);
    let center = masked_centroid(points, &member_mask(profile, eps_min))
        .ok_or(MembershipError::DegenerateCenter { eps: eps_min })?;

    let start = min_reach + EPS_STEP;
    let stop = bounded(SWEEP_UPPER_PERCENTILE);
    let n_steps = ((stop - start) / EPS_STEP).ceil().max(0.0) as usize;

    for i in 0..n_steps {
        let eps = start + i as f64 * EPS_STEP;

        let distances: Vec<f64> = member_mask(profile, eps)
            .iter()
            .zip(points)
            .filter(|(member, _)| **member)
            .map(|(_, point)| euclidean(&center, point))
            .collect();

        let (Some(d_p), Some(d_max)) = (
            percentile(&distances, perc_cut),
            distances.iter().copied().reduce(f64::max),
        ) else {
            return Err(MembershipError::DegenerateCenter { eps });
        };

        if eps < d_max - d_p {
            debug!(
                "eps {:.4} accepted after {} steps ({} members, spread {:.4})",
                eps,
                i + 1,
                distances.len(),
                d_max - d_p
            );
            return Ok(eps);
        }
    }

    debug!(
        "eps sweep exhausted after {} steps, falling back to max reachability {:.4}",
        n_steps, max_reach
    );
    Ok(max_reach)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::optics::build_reachability_profile;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rand_distr::{Distribution, Normal, Uniform};

    /// Build a profile directly, bypassing OPTICS.
    fn manual_profile(reachability: Vec<f64>, core_distances: Vec<f64>) -> ReachabilityProfile {
        let n = reachability.len();
        ReachabilityProfile {
            ordering: (0..n).collect(),
            reachability,
            core_distances,
            predecessor: vec![None; n],
            min_samples: 2,
        }
    }

    fn cluster_and_field(seed: u64) -> Vec<Vec<f64>> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let tight = Normal::new(0.0, 0.01).unwrap();
        let wide = Uniform::new(-5.0, 5.0);

        let mut points: Vec<Vec<f64>> = (0..80)
            .map(|_| vec![tight.sample(&mut rng), tight.sample(&mut rng)])
            .collect();
        points.extend((0..20).map(|_| vec![wide.sample(&mut rng), wide.sample(&mut rng)]));
        points
    }

    #[test]
    fn test_equal_reachability_falls_back_to_max() {
        let n = 10;
        let mut reach = vec![0.5; n];
        reach[0] = f64::INFINITY;
        let profile = manual_profile(reach, vec![0.5; n]);
        let points: Vec<Vec<f64>> = (0..n).map(|i| vec![i as f64 * 0.1]).collect();

        let eps = select_eps(&points, &profile, 75.0).unwrap();

        assert_eq!(eps, 0.5);
    }

    #[test]
    fn test_degenerate_center_is_an_error() {
        // Core distances never clear the 1st-percentile eps
        let n = 5;
        let mut reach = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        reach[0] = f64::INFINITY;
        let profile = manual_profile(reach, vec![100.0; n]);
        let points: Vec<Vec<f64>> = (0..n).map(|i| vec![i as f64]).collect();

        let result = select_eps(&points, &profile, 75.0);

        assert!(matches!(result, Err(MembershipError::DegenerateCenter { .. })));
    }

    #[test]
    fn test_empty_sweep_step_is_an_error() {
        // Members exist at the 1st-percentile eps (1.04) but not at the
        // first swept eps (1.005), where the start point's core no longer fits
        let reach = vec![f64::INFINITY, 1.0, 2.0, 3.0, 4.0];
        let core = vec![1.02, 100.0, 100.0, 100.0, 100.0];
        let profile = manual_profile(reach, core);
        let points: Vec<Vec<f64>> = (0..5).map(|i| vec![i as f64]).collect();

        let result = select_eps(&points, &profile, 75.0);

        match result {
            Err(MembershipError::DegenerateCenter { eps }) => {
                assert!((eps - 1.005).abs() < 1e-12, "failed at eps {}", eps)
            }
            other => panic!("Expected DegenerateCenter, got {:?}", other),
        }
    }

    #[test]
    fn test_eps_is_finite_and_bounded() {
        let points = cluster_and_field(1);
        let profile = build_reachability_profile(&points, 10).unwrap();
        let max_reach = profile
            .finite_reachability()
            .into_iter()
            .fold(0.0f64, f64::max);

        let eps = select_eps(&points, &profile, 75.0).unwrap();

        assert!(eps.is_finite());
        assert!(eps >= 0.0);
        assert!(eps <= max_reach);
    }

    #[test]
    fn test_eps_isolates_tight_cluster() {
        let points = cluster_and_field(2);
        let profile = build_reachability_profile(&points, 10).unwrap();

        let eps = select_eps(&points, &profile, 75.0).unwrap();
        let mask = member_mask(&profile, eps);

        let cluster_members = mask[..80].iter().filter(|&&m| m).count();
        let field_members = mask[80..].iter().filter(|&&m| m).count();
        assert!(cluster_members > 60, "only {} cluster members", cluster_members);
        assert!(field_members <= 2, "{} field stars accepted", field_members);
    }

    #[test]
    fn test_accepted_eps_lies_on_sweep_grid() {
        let points = cluster_and_field(3);
        let profile = build_reachability_profile(&points, 10).unwrap();
        let reach = profile.finite_reachability();
        let min_reach = reach.iter().copied().fold(f64::INFINITY, f64::min);
        let max_reach = reach.iter().copied().fold(0.0f64, f64::max);

        let eps = select_eps(&points, &profile, 75.0).unwrap();

        if eps != max_reach {
            let steps = (eps - (min_reach + EPS_STEP)) / EPS_STEP;
            assert!((steps - steps.round()).abs() < 1e-6);
        }
    }
}

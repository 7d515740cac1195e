//! DBSCAN-equivalent cluster extraction from a reachability profile.

use super::optics::ReachabilityProfile;

/// Cut the reachability plot at height `eps`.
///
/// Walking the traversal order, a point whose reachability exceeds `eps` but
/// whose core distance clears it opens a new cluster; a point exceeding
/// `eps` on both counts is noise; every other point joins the cluster opened
/// most recently. Points reached before any cluster has opened stay noise.
///
/// # Returns
///
/// Labels indexed by original point index, `-1` for noise and `0..` for
/// cluster ids in order of appearance.
pub fn extract_dbscan_labels(profile: &ReachabilityProfile, eps: f64) -> Vec<i32> {
    let mut labels = vec![-1i32; profile.len()];
    let mut current: i32 = -1;

    for (point, reach, core) in profile.iter() {
        let far = reach > eps;
        let near_core = core <= eps;

        if far && near_core {
            current += 1;
        }
        labels[point] = if far && !near_core { -1 } else { current };
    }

    labels
}

/// Member/non-member mask at `eps`; all clusters count as members.
pub fn member_mask(profile: &ReachabilityProfile, eps: f64) -> Vec<bool> {
    extract_dbscan_labels(profile, eps)
        .into_iter()
        .map(|label| label != -1)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::optics::build_reachability_profile;

    fn line_with_outlier() -> Vec<Vec<f64>> {
        vec![
            vec![0.0],
            vec![0.1],
            vec![0.2],
            vec![0.3],
            vec![0.4],
            vec![10.0],
        ]
    }

    #[test]
    fn test_outlier_is_noise() {
        let profile = build_reachability_profile(&line_with_outlier(), 2).unwrap();
        let labels = extract_dbscan_labels(&profile, 0.5);

        assert!(labels[..5].iter().all(|&l| l == 0));
        assert_eq!(labels[5], -1);
    }

    #[test]
    fn test_two_clusters_get_distinct_ids() {
        let points = vec![
            vec![0.0, 0.0],
            vec![0.1, 0.0],
            vec![0.0, 0.1],
            vec![5.0, 5.0],
            vec![5.1, 5.0],
            vec![5.0, 5.1],
        ];
        let profile = build_reachability_profile(&points, 2).unwrap();
        let labels = extract_dbscan_labels(&profile, 0.5);

        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[0], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_ne!(labels[0], labels[3]);
        assert!(labels.iter().all(|&l| l >= 0));
    }

    #[test]
    fn test_tiny_eps_labels_everything_noise() {
        let profile = build_reachability_profile(&line_with_outlier(), 2).unwrap();
        let mask = member_mask(&profile, 0.01);
        assert!(mask.iter().all(|&m| !m));
    }

    #[test]
    fn test_large_eps_labels_everything_member() {
        let profile = build_reachability_profile(&line_with_outlier(), 2).unwrap();
        let mask = member_mask(&profile, 1e6);
        assert!(mask.iter().all(|&m| m));
    }

    #[test]
    fn test_start_point_is_noise_at_infinite_eps() {
        // Its unreachable marker never exceeds an infinite cut, so no cluster opens
        let profile = build_reachability_profile(&line_with_outlier(), 2).unwrap();
        let labels = extract_dbscan_labels(&profile, f64::INFINITY);
        assert_eq!(labels[profile.ordering[0]], -1);
    }

    #[test]
    fn test_member_count_is_monotone_in_eps() {
        let points: Vec<Vec<f64>> = (0..40)
            .map(|i| {
                let t = i as f64;
                vec![(t * 1.3).sin() * (1.0 + t * 0.1), (t * 0.7).cos() * (1.0 + t * 0.05)]
            })
            .collect();
        let profile = build_reachability_profile(&points, 4).unwrap();

        let mut previous = 0usize;
        for step in 0..200 {
            let eps = step as f64 * 0.02;
            let count = member_mask(&profile, eps).iter().filter(|&&m| m).count();
            assert!(count >= previous, "eps {} dropped members", eps);
            previous = count;
        }
    }
}

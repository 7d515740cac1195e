//! OPTICS reachability profiles.
//!
//! Core distances come from k-nearest-neighbour queries (a `kiddo` k-d tree
//! for up to three dimensions, brute force above that, both parallelised
//! with `rayon`). The traversal itself is the classic OPTICS expansion with
//! an unbounded neighbourhood radius: every processed core point relaxes the
//! reachability of all unprocessed points, and the next point is always the
//! unprocessed one with the lowest reachability (ties to the lowest index).

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use kiddo::{ImmutableKdTree, SquaredEuclidean};
use rayon::prelude::*;

use super::{MembershipError, Result};
use crate::core::stats::euclidean;

/// Reachability ordering of a point set for a fixed `min_samples`.
///
/// `reachability`, `core_distances` and `predecessor` are indexed by the
/// original point index; `ordering` lists point indices in traversal order.
/// The first point of the traversal has infinite reachability.
#[derive(Debug, Clone)]
pub struct ReachabilityProfile {
    pub ordering: Vec<usize>,
    pub reachability: Vec<f64>,
    pub core_distances: Vec<f64>,
    pub predecessor: Vec<Option<usize>>,
    pub min_samples: usize,
}

impl ReachabilityProfile {
    /// Number of points in the profile.
    #[inline]
    pub fn len(&self) -> usize {
        self.ordering.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ordering.is_empty()
    }

    /// `(point index, reachability, core distance)` in traversal order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64, f64)> + '_ {
        self.ordering
            .iter()
            .map(move |&p| (p, self.reachability[p], self.core_distances[p]))
    }

    /// Reachability values in traversal order (the reachability plot).
    pub fn ordered_reachability(&self) -> Vec<f64> {
        self.ordering.iter().map(|&p| self.reachability[p]).collect()
    }

    /// Finite reachability values in traversal order.
    pub fn finite_reachability(&self) -> Vec<f64> {
        self.iter()
            .map(|(_, r, _)| r)
            .filter(|r| r.is_finite())
            .collect()
    }
}

/// Frontier entry, ordered so the max-heap pops the lowest reachability
/// first and the lowest index among equal reachabilities.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    reachability: f64,
    index: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .reachability
            .total_cmp(&self.reachability)
            .then_with(|| other.index.cmp(&self.index))
    }
}

/// Build the reachability profile of `points` for `min_samples`.
///
/// # Arguments
///
/// * `points` - Row-major points, all of the same dimension
/// * `min_samples` - Neighbourhood size; the core distance of a point is the
///   distance to its `min_samples`-th nearest neighbour, counting the point
///   itself as the first
///
/// # Errors
///
/// `ParameterRange` if `min_samples` is outside `[2, N]`.
pub fn build_reachability_profile(
    points: &[Vec<f64>],
    min_samples: usize,
) -> Result<ReachabilityProfile> {
    let n = points.len();
    if min_samples < 2 || min_samples > n {
        return Err(MembershipError::ParameterRange(format!(
            "min_samples must be in [2, {}], got {}",
            n, min_samples
        )));
    }

    let core_distances = core_distances(points, min_samples);

    let mut reachability = vec![f64::INFINITY; n];
    let mut predecessor = vec![None; n];
    let mut processed = vec![false; n];
    let mut ordering = Vec::with_capacity(n);
    let mut frontier = BinaryHeap::new();
    let mut next_unvisited = 0usize;

    while ordering.len() < n {
        let point = match pop_frontier(&mut frontier, &processed, &reachability) {
            Some(p) => p,
            None => {
                // Frontier exhausted: restart from the lowest unprocessed index
                while processed[next_unvisited] {
                    next_unvisited += 1;
                }
                next_unvisited
            }
        };

        processed[point] = true;
        ordering.push(point);

        let core = core_distances[point];
        if !core.is_finite() {
            continue;
        }

        for (j, other) in points.iter().enumerate() {
            if processed[j] {
                continue;
            }
            let candidate = euclidean(&points[point], other).max(core);
            if candidate < reachability[j] {
                reachability[j] = candidate;
                predecessor[j] = Some(point);
                frontier.push(Candidate {
                    reachability: candidate,
                    index: j,
                });
            }
        }
    }

    Ok(ReachabilityProfile {
        ordering,
        reachability,
        core_distances,
        predecessor,
        min_samples,
    })
}

/// Pop the best live frontier entry, discarding stale ones.
fn pop_frontier(
    frontier: &mut BinaryHeap<Candidate>,
    processed: &[bool],
    reachability: &[f64],
) -> Option<usize> {
    while let Some(candidate) = frontier.pop() {
        if !processed[candidate.index] && candidate.reachability == reachability[candidate.index] {
            return Some(candidate.index);
        }
    }
    None
}

/// Distance from every point to its `k`-th nearest neighbour (self included).
pub fn core_distances(points: &[Vec<f64>], k: usize) -> Vec<f64> {
    let dim = points.first().map_or(0, |p| p.len());
    match dim {
        1 => kd_core_distances::<1>(points, k),
        2 => kd_core_distances::<2>(points, k),
        3 => kd_core_distances::<3>(points, k),
        _ => brute_force_core_distances(points, k),
    }
}

fn kd_core_distances<const K: usize>(points: &[Vec<f64>], k: usize) -> Vec<f64> {
    let coords: Vec<[f64; K]> = points
        .iter()
        .map(|p| {
            let mut c = [0.0; K];
            c.copy_from_slice(p);
            c
        })
        .collect();

    let tree: ImmutableKdTree<f64, K> = ImmutableKdTree::new_from_slice(&coords);

    coords
        .par_iter()
        .map(|query| {
            let neighbours = tree.nearest_n::<SquaredEuclidean>(query, k);
            if neighbours.len() < k {
                return f64::INFINITY;
            }
            neighbours
                .iter()
                .map(|nn| nn.distance)
                .fold(0.0f64, f64::max)
                .sqrt()
        })
        .collect()
}

fn brute_force_core_distances(points: &[Vec<f64>], k: usize) -> Vec<f64> {
    points
        .par_iter()
        .map(|query| {
            let mut dists: Vec<f64> = points.iter().map(|p| euclidean(query, p)).collect();
            if k == 0 || k > dists.len() {
                return f64::INFINITY;
            }
            let (_, kth, _) = dists.select_nth_unstable_by(k - 1, |a, b| a.total_cmp(b));
            *kth
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blobs() -> Vec<Vec<f64>> {
        vec![
            vec![0.0, 0.0],
            vec![0.1, 0.0],
            vec![0.0, 0.1],
            vec![0.1, 0.1],
            vec![5.0, 5.0],
            vec![5.1, 5.0],
            vec![5.0, 5.1],
            vec![5.1, 5.1],
        ]
    }

    #[test]
    fn test_ordering_is_a_permutation() {
        let profile = build_reachability_profile(&two_blobs(), 2).unwrap();

        let mut seen = profile.ordering.clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..8).collect::<Vec<_>>());
        assert_eq!(profile.len(), 8);
    }

    #[test]
    fn test_first_point_unreachable_rest_finite() {
        let profile = build_reachability_profile(&two_blobs(), 3).unwrap();

        assert_eq!(profile.ordering[0], 0);
        assert!(profile.reachability[0].is_infinite());
        assert_eq!(profile.finite_reachability().len(), 7);
        assert!(profile.predecessor[0].is_none());
    }

    #[test]
    fn test_blobs_are_contiguous_with_spike_between() {
        let profile = build_reachability_profile(&two_blobs(), 2).unwrap();

        // First blob is exhausted before the traversal jumps
        let first_four: Vec<usize> = profile.ordering[..4].to_vec();
        assert!(first_four.iter().all(|&p| p < 4));

        let plot = profile.ordered_reachability();
        let jump = plot[4];
        assert!(jump > 5.0);
        assert!(plot[1..4].iter().all(|&r| r < 0.2));
        assert!(plot[5..].iter().all(|&r| r < 0.2));
    }

    #[test]
    fn test_reachability_bounded_by_predecessor_core_distance() {
        let profile = build_reachability_profile(&two_blobs(), 3).unwrap();

        for (p, reach, _) in profile.iter().skip(1) {
            let pred = profile.predecessor[p].unwrap();
            assert!(reach >= profile.core_distances[pred]);
        }
    }

    #[test]
    fn test_core_distance_counts_self() {
        let points = vec![vec![0.0], vec![1.0], vec![3.0]];
        // k = 2: nearest is self (0), second nearest is the closest other point
        let core = core_distances(&points, 2);
        assert_eq!(core, vec![1.0, 1.0, 2.0]);
    }

    #[test]
    fn test_kd_tree_matches_brute_force() {
        let points: Vec<Vec<f64>> = (0..50)
            .map(|i| {
                let t = i as f64;
                vec![(t * 0.37).sin() * 3.0, (t * 0.71).cos() * 2.0, t * 0.05]
            })
            .collect();

        let fast = core_distances(&points, 5);
        let slow = brute_force_core_distances(&points, 5);
        for (a, b) in fast.iter().zip(slow.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_high_dimensional_points_use_brute_force() {
        let points = vec![
            vec![0.0, 0.0, 0.0, 0.0],
            vec![1.0, 0.0, 0.0, 0.0],
            vec![0.0, 2.0, 0.0, 0.0],
        ];
        let profile = build_reachability_profile(&points, 2).unwrap();
        assert_eq!(profile.core_distances, vec![1.0, 1.0, 2.0]);
    }

    #[test]
    fn test_deterministic() {
        let a = build_reachability_profile(&two_blobs(), 3).unwrap();
        let b = build_reachability_profile(&two_blobs(), 3).unwrap();
        assert_eq!(a.ordering, b.ordering);
        assert_eq!(a.reachability, b.reachability);
    }

    #[test]
    fn test_invalid_min_samples() {
        assert!(matches!(
            build_reachability_profile(&two_blobs(), 1),
            Err(MembershipError::ParameterRange(_))
        ));
        assert!(matches!(
            build_reachability_profile(&two_blobs(), 9),
            Err(MembershipError::ParameterRange(_))
        ));
    }
}

//! Per-label density clustering.
//!
//! A single label can cover several physical objects (two chairs, three
//! cups).  [`LabelClusterer`] splits each label's detections into spatial
//! sub-clusters with DBSCAN and emits one [`Centroid`] per sub-cluster.
//!
//! # DBSCAN
//!
//! 1. **Region query**: the neighbourhood of point `i` is every point `j`
//!    (including `i`) with `distance(i, j) <= eps`.
//! 2. **Core points**: a point is core when its neighbourhood holds at least
//!    `min_samples` points.
//! 3. **Expansion**: points are visited in ascending index order; every
//!    unassigned core point seeds a new cluster, which grows breadth-first
//!    through the neighbourhoods of its core members.
//! 4. **Noise**: points never reached from a core point get no cluster.
//!
//! Because seeds and neighbourhoods are both walked in index order, a border
//! point within `eps` of two clusters always joins the one that reaches it
//! first, so repeated runs on the same input give identical partitions.
//!
//! The algorithm is exposed through the [`DensityClusterer`] trait so a
//! spatial-index backed implementation can replace [`Dbscan`] without
//! touching [`LabelClusterer`] or its callers.

use std::collections::VecDeque;

use centroids_types::{Centroid, LabeledPoint, PipelineError, Point3};
use tracing::debug;

use crate::geometry::{check_finite, check_threshold, distance_sq, mean};
use crate::grouping::group_by_label;

// ────────────────────────────────────────────────────────────────────────────
// DensityClusterer
// ────────────────────────────────────────────────────────────────────────────

/// Common interface for hard density clustering over a point set.
pub trait DensityClusterer {
    /// Return one entry per input point: `Some(cluster_id)` or `None` for
    /// noise.  Cluster ids are dense and numbered in discovery order.
    fn fit(&self, points: &[Point3]) -> Vec<Option<usize>>;
}

// ────────────────────────────────────────────────────────────────────────────
// Dbscan
// ────────────────────────────────────────────────────────────────────────────

/// Brute-force DBSCAN with deterministic, index-ordered expansion.
#[derive(Debug, Clone, Copy)]
pub struct Dbscan {
    eps: f32,
    min_samples: usize,
}

impl Dbscan {
    /// # Errors
    ///
    /// [`PipelineError::MalformedInput`] if `eps` is negative or not finite,
    /// or if `min_samples` is zero.
    pub fn new(eps: f32, min_samples: usize) -> Result<Self, PipelineError> {
        check_threshold("eps", eps)?;
        if min_samples == 0 {
            return Err(PipelineError::MalformedInput(
                "min_samples must be at least 1".to_string(),
            ));
        }
        Ok(Self { eps, min_samples })
    }

    pub fn eps(&self) -> f32 {
        self.eps
    }

    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    /// Indices of every point within `eps` of each point, ascending.
    fn neighbourhoods(&self, points: &[Point3]) -> Vec<Vec<usize>> {
        let eps_sq = self.eps * self.eps;
        points
            .iter()
            .map(|&p| {
                points
                    .iter()
                    .enumerate()
                    .filter(|&(_, &q)| distance_sq(p, q) <= eps_sq)
                    .map(|(j, _)| j)
                    .collect()
            })
            .collect()
    }
}

impl DensityClusterer for Dbscan {
    fn fit(&self, points: &[Point3]) -> Vec<Option<usize>> {
        let n = points.len();
        let neighbours = self.neighbourhoods(points);
        let is_core: Vec<bool> = neighbours
            .iter()
            .map(|nb| nb.len() >= self.min_samples)
            .collect();

        let mut labels: Vec<Option<usize>> = vec![None; n];
        let mut next_cluster = 0usize;
        let mut queue = VecDeque::new();

        for seed in 0..n {
            if labels[seed].is_some() || !is_core[seed] {
                continue;
            }
            labels[seed] = Some(next_cluster);
            queue.push_back(seed);

            while let Some(i) = queue.pop_front() {
                if !is_core[i] {
                    continue;
                }
                for &j in &neighbours[i] {
                    if labels[j].is_none() {
                        labels[j] = Some(next_cluster);
                        queue.push_back(j);
                    }
                }
            }
            next_cluster += 1;
        }

        labels
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LabelClusterer
// ────────────────────────────────────────────────────────────────────────────

/// Groups detections by label and emits one centroid per density cluster.
#[derive(Debug, Clone)]
pub struct LabelClusterer<C = Dbscan> {
    clusterer: C,
}

impl LabelClusterer<Dbscan> {
    /// Convenience constructor for the default DBSCAN backend.
    pub fn dbscan(eps: f32, min_samples: usize) -> Result<Self, PipelineError> {
        Ok(Self::new(Dbscan::new(eps, min_samples)?))
    }
}

impl<C: DensityClusterer> LabelClusterer<C> {
    pub fn new(clusterer: C) -> Self {
        Self { clusterer }
    }

    /// Cluster `points` label by label.
    ///
    /// Labels appear in the output in first-seen order, and within a label
    /// centroids follow cluster discovery order.  Noise points contribute
    /// nothing; a label with no cluster yields no centroid.
    pub fn cluster(&self, points: &[LabeledPoint]) -> Result<Vec<Centroid>, PipelineError> {
        check_finite("labeled_points", points.iter().map(|p| &p.position))?;

        let mut centroids = Vec::new();
        for (label, group) in group_by_label(points, |p| (p.label, p.position)) {
            let assignments = self.clusterer.fit(&group);
            let n_clusters = assignments.iter().flatten().max().map_or(0, |&m| m + 1);

            let mut members: Vec<Vec<Point3>> = vec![Vec::new(); n_clusters];
            for (p, cluster) in group.iter().zip(&assignments) {
                if let Some(c) = cluster {
                    members[*c].push(*p);
                }
            }

            debug!(
                label,
                points = group.len(),
                clusters = n_clusters,
                noise = assignments.iter().filter(|a| a.is_none()).count(),
                "label clustered"
            );

            centroids.extend(
                members
                    .iter()
                    .filter_map(|m| mean(m))
                    .map(|position| Centroid::new(position, label)),
            );
        }
        Ok(centroids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dbscan(eps: f32, min_samples: usize) -> Dbscan {
        Dbscan::new(eps, min_samples).expect("valid parameters")
    }

    // ── Dbscan ──────────────────────────────────────────────────────────────

    #[test]
    fn two_separated_clusters() {
        let points = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(100.0, 100.0, 0.0),
            Point3::new(101.0, 100.0, 0.0),
            Point3::new(100.0, 101.0, 0.0),
        ];
        let labels = dbscan(1.5, 2).fit(&points);

        assert_eq!(labels[..3], [Some(0), Some(0), Some(0)]);
        assert_eq!(labels[3..], [Some(1), Some(1), Some(1)]);
    }

    #[test]
    fn isolated_point_is_noise() {
        let points = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.1, 0.0, 0.0),
            Point3::new(0.0, 0.1, 0.0),
            Point3::new(50.0, 50.0, 50.0),
        ];
        let labels = dbscan(0.5, 3).fit(&points);
        assert_eq!(labels, vec![Some(0), Some(0), Some(0), None]);
    }

    #[test]
    fn min_samples_counts_the_point_itself() {
        // Two points 0.2 apart: each neighbourhood holds 2 points.
        let points = [Point3::new(0.0, 0.0, 0.0), Point3::new(0.2, 0.0, 0.0)];
        assert_eq!(dbscan(0.3, 2).fit(&points), vec![Some(0), Some(0)]);
        assert_eq!(dbscan(0.3, 3).fit(&points), vec![None, None]);
    }

    #[test]
    fn min_samples_one_makes_singletons_clusters() {
        let points = [Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 0.0, 0.0)];
        assert_eq!(dbscan(0.3, 1).fit(&points), vec![Some(0), Some(1)]);
    }

    #[test]
    fn border_point_joins_first_cluster_in_index_order() {
        // With eps = 2 only x = 2 and x = 6 are core.  The point at x = 4 is
        // within reach of both but has three neighbours, so it is a border
        // point and goes to the cluster seeded first.
        let points = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(4.0, 0.0, 0.0),
            Point3::new(6.0, 0.0, 0.0),
            Point3::new(7.0, 0.0, 0.0),
            Point3::new(8.0, 0.0, 0.0),
        ];
        let labels = dbscan(2.0, 4).fit(&points);
        assert_eq!(labels[3], Some(0));
        assert_eq!(labels[4], Some(1));
    }

    #[test]
    fn empty_input() {
        assert!(dbscan(1.0, 2).fit(&[]).is_empty());
    }

    #[test]
    fn rejects_invalid_parameters() {
        assert!(matches!(
            Dbscan::new(0.3, 0),
            Err(PipelineError::MalformedInput(_))
        ));
        assert!(matches!(
            Dbscan::new(-1.0, 2),
            Err(PipelineError::MalformedInput(_))
        ));
    }

    // ── LabelClusterer ──────────────────────────────────────────────────────

    #[test]
    fn dense_group_yields_single_mean_centroid() {
        let points = [
            LabeledPoint::new(0.0, 0.0, 0.0, 5),
            LabeledPoint::new(0.1, 0.0, 0.0, 5),
            LabeledPoint::new(0.0, 0.1, 0.0, 5),
            LabeledPoint::new(0.1, 0.1, 0.2, 5),
        ];
        let centroids = LabelClusterer::dbscan(0.5, 4).unwrap().cluster(&points).unwrap();

        assert_eq!(centroids.len(), 1);
        let c = centroids[0];
        assert_eq!(c.label, 5);
        assert!((c.position.x - 0.05).abs() < 1e-6);
        assert!((c.position.y - 0.05).abs() < 1e-6);
        assert!((c.position.z - 0.05).abs() < 1e-6);
    }

    #[test]
    fn clustering_never_crosses_labels() {
        // Same location, different labels: one centroid per label.
        let points = [
            LabeledPoint::new(0.0, 0.0, 0.0, 1),
            LabeledPoint::new(0.0, 0.0, 0.0, 2),
            LabeledPoint::new(0.1, 0.0, 0.0, 1),
            LabeledPoint::new(0.1, 0.0, 0.0, 2),
        ];
        let centroids = LabelClusterer::dbscan(0.3, 2).unwrap().cluster(&points).unwrap();
        let labels: Vec<u32> = centroids.iter().map(|c| c.label).collect();
        assert_eq!(labels, vec![1, 2]);
    }

    #[test]
    fn sparse_label_produces_no_centroid() {
        let points = [
            LabeledPoint::new(0.0, 0.0, 0.0, 1),
            LabeledPoint::new(0.1, 0.0, 0.0, 1),
            LabeledPoint::new(4.0, 4.0, 4.0, 9),
        ];
        let centroids = LabelClusterer::dbscan(0.3, 2).unwrap().cluster(&points).unwrap();
        assert_eq!(centroids.len(), 1);
        assert_eq!(centroids[0].label, 1);
    }

    #[test]
    fn split_label_yields_one_centroid_per_cluster() {
        let points = [
            LabeledPoint::new(0.0, 0.0, 0.0, 3),
            LabeledPoint::new(0.2, 0.0, 0.0, 3),
            LabeledPoint::new(5.0, 0.0, 0.0, 3),
            LabeledPoint::new(5.2, 0.0, 0.0, 3),
        ];
        let centroids = LabelClusterer::dbscan(0.3, 2).unwrap().cluster(&points).unwrap();
        assert_eq!(centroids.len(), 2);
        assert!((centroids[0].position.x - 0.1).abs() < 1e-6);
        assert!((centroids[1].position.x - 5.1).abs() < 1e-5);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let points: Vec<LabeledPoint> = (0..40)
            .map(|i| {
                let f = i as f32;
                LabeledPoint::new((f * 0.37).sin() * 2.0, (f * 0.11).cos(), f * 0.01, i % 3)
            })
            .collect();
        let clusterer = LabelClusterer::dbscan(0.4, 2).unwrap();
        let first = clusterer.cluster(&points).unwrap();
        let second = clusterer.cluster(&points).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn rejects_non_finite_points() {
        let points = [LabeledPoint::new(0.0, f32::NAN, 0.0, 1)];
        let result = LabelClusterer::dbscan(0.3, 1).unwrap().cluster(&points);
        assert!(matches!(result, Err(PipelineError::MalformedInput(_))));
    }

    #[test]
    fn accepts_custom_backend() {
        struct AllOneCluster;
        impl DensityClusterer for AllOneCluster {
            fn fit(&self, points: &[Point3]) -> Vec<Option<usize>> {
                vec![Some(0); points.len()]
            }
        }

        let points = [
            LabeledPoint::new(0.0, 0.0, 0.0, 1),
            LabeledPoint::new(2.0, 0.0, 0.0, 1),
        ];
        let centroids = LabelClusterer::new(AllOneCluster).cluster(&points).unwrap();
        assert_eq!(centroids.len(), 1);
        assert!((centroids[0].position.x - 1.0).abs() < 1e-6);
    }
}

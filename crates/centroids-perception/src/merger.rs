//! Same-label centroid merging.
//!
//! DBSCAN can split one physical object into several sub-clusters when the
//! detections on it are patchy.  [`CentroidMerger`] greedily groups
//! same-label centroids that lie closer than `merge_threshold` to an anchor
//! and replaces the group with its mean, but only when that mean is itself
//! within `obstacle_threshold` of the obstacle cloud.  Otherwise every
//! member is kept unchanged.
//!
//! # Algorithm (per label, first-seen label order)
//!
//! ```text
//! remaining = centroids of the label, input order
//! while remaining not empty:
//!     anchor = remaining[0]
//!     group  = anchor + every other remaining c with |c - anchor| < merge_threshold
//!     avg    = mean(group)
//!     if some obstacle is closer than obstacle_threshold to avg:
//!         emit avg
//!     else:
//!         emit every member of group
//!     remaining -= group
//! ```
//!
//! The obstacle test looks only at `avg`, not at the individual members.

use centroids_types::{Centroid, PipelineError, Point3};
use tracing::debug;

use crate::geometry::{check_finite, check_threshold, distance, mean};
use crate::grouping::group_by_label;
use crate::octree::Octree;

/// Greedy obstacle-gated merge of nearby same-label centroids.
#[derive(Debug, Clone, Copy)]
pub struct CentroidMerger {
    merge_threshold: f32,
    obstacle_threshold: f32,
}

impl CentroidMerger {
    /// # Errors
    ///
    /// [`PipelineError::MalformedInput`] if either threshold is negative or
    /// not finite.
    pub fn new(merge_threshold: f32, obstacle_threshold: f32) -> Result<Self, PipelineError> {
        check_threshold("merge_threshold", merge_threshold)?;
        check_threshold("obstacle_threshold", obstacle_threshold)?;
        Ok(Self {
            merge_threshold,
            obstacle_threshold,
        })
    }

    pub fn merge_threshold(&self) -> f32 {
        self.merge_threshold
    }

    pub fn obstacle_threshold(&self) -> f32 {
        self.obstacle_threshold
    }

    /// Merge `centroids` against a raw obstacle batch.
    pub fn merge(
        &self,
        centroids: &[Centroid],
        obstacles: &[Point3],
    ) -> Result<Vec<Centroid>, PipelineError> {
        check_finite("obstacles", obstacles)?;
        self.merge_indexed(centroids, &Octree::from_points(obstacles))
    }

    /// Merge `centroids` against a prebuilt obstacle index.
    pub fn merge_indexed(
        &self,
        centroids: &[Centroid],
        obstacles: &Octree,
    ) -> Result<Vec<Centroid>, PipelineError> {
        check_finite("centroids", centroids.iter().map(|c| &c.position))?;

        let mut merged = Vec::with_capacity(centroids.len());
        for (label, group) in group_by_label(centroids, |c| (c.label, c.position)) {
            self.merge_group(label, group, obstacles, &mut merged);
        }
        Ok(merged)
    }

    fn merge_group(
        &self,
        label: u32,
        mut remaining: Vec<Point3>,
        obstacles: &Octree,
        out: &mut Vec<Centroid>,
    ) {
        while let Some((&anchor, rest)) = remaining.split_first() {
            let (close, far): (Vec<Point3>, Vec<Point3>) = rest
                .iter()
                .partition(|&&c| distance(c, anchor) < self.merge_threshold);

            let mut group = Vec::with_capacity(close.len() + 1);
            group.push(anchor);
            group.extend(close);

            // `group` always holds at least the anchor.
            let avg = mean(&group).unwrap_or(anchor);

            if obstacles.any_within(avg, self.obstacle_threshold) {
                if group.len() > 1 {
                    debug!(
                        label,
                        members = group.len(),
                        x = avg.x,
                        y = avg.y,
                        z = avg.z,
                        "merged centroids"
                    );
                }
                out.push(Centroid::new(avg, label));
            } else {
                if group.len() > 1 {
                    debug!(
                        label,
                        members = group.len(),
                        "merge rejected: no obstacle near merged position"
                    );
                }
                out.extend(group.into_iter().map(|p| Centroid::new(p, label)));
            }

            remaining = far;
        }
    }
}

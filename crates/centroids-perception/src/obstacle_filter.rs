//! Obstacle proximity filter.
//!
//! The object detector reports labeled points for everything it recognises,
//! including reflections, posters and other detections that do not
//! correspond to a physical object.  [`ObstacleFilter`] keeps only the
//! detections that sit within `distance_threshold` of at least one point of
//! the segmented obstacle cloud.
//!
//! An empty obstacle cloud filters everything out: no detection can be near
//! zero obstacles, so the caller simply waits for the next obstacle batch.

use centroids_types::{LabeledPoint, PipelineError, Point3};
use tracing::debug;

use crate::geometry::{check_finite, check_threshold};
use crate::octree::Octree;

/// Keeps labeled points that are close to the obstacle cloud.
#[derive(Debug, Clone, Copy)]
pub struct ObstacleFilter {
    distance_threshold: f32,
}

impl ObstacleFilter {
    /// Create a filter that keeps points strictly closer than
    /// `distance_threshold` (metres) to some obstacle.
    ///
    /// # Errors
    ///
    /// [`PipelineError::MalformedInput`] if the threshold is negative or not
    /// finite.
    pub fn new(distance_threshold: f32) -> Result<Self, PipelineError> {
        check_threshold("distance_threshold", distance_threshold)?;
        Ok(Self { distance_threshold })
    }

    pub fn distance_threshold(&self) -> f32 {
        self.distance_threshold
    }

    /// Filter `points` against a raw obstacle batch.
    ///
    /// Builds a throw-away [`Octree`] over `obstacles`; use
    /// [`filter_indexed`][Self::filter_indexed] when the same obstacle batch
    /// is queried by several stages.
    pub fn filter(
        &self,
        points: &[LabeledPoint],
        obstacles: &[Point3],
    ) -> Result<Vec<LabeledPoint>, PipelineError> {
        check_finite("obstacles", obstacles)?;
        self.filter_indexed(points, &Octree::from_points(obstacles))
    }

    /// Filter `points` against a prebuilt obstacle index.
    ///
    /// The relative order of the kept points is preserved.
    pub fn filter_indexed(
        &self,
        points: &[LabeledPoint],
        obstacles: &Octree,
    ) -> Result<Vec<LabeledPoint>, PipelineError> {
        check_finite("labeled_points", points.iter().map(|p| &p.position))?;

        if obstacles.is_empty() {
            return Ok(Vec::new());
        }

        let kept: Vec<LabeledPoint> = points
            .iter()
            .filter(|p| obstacles.any_within(p.position, self.distance_threshold))
            .copied()
            .collect();

        debug!(
            input = points.len(),
            kept = kept.len(),
            threshold = self.distance_threshold,
            "obstacle filter applied"
        );
        Ok(kept)
    }
}

//! Tuning parameters of a pipeline run.

use centroids_types::PipelineError;
use serde::{Deserialize, Serialize};

/// The five thresholds that drive filtering, clustering and merging.
///
/// None of them has a default: a deployment must state every value, and
/// [`validate`][Self::validate] rejects anything that is not strictly
/// positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineParams {
    /// Max distance (m) from a detection to the nearest obstacle point.
    pub distance_threshold: f32,
    /// DBSCAN neighbourhood radius (m).
    pub eps: f32,
    /// DBSCAN core-point neighbourhood size, the point itself included.
    pub min_samples: usize,
    /// Max distance (m) from the anchor for same-label centroids to merge.
    pub merge_threshold: f32,
    /// Max distance (m) from a merged centroid to the nearest obstacle point.
    pub obstacle_threshold: f32,
}

impl PipelineParams {
    /// # Errors
    ///
    /// [`PipelineError::Config`] naming the first offending key.
    pub fn validate(&self) -> Result<(), PipelineError> {
        for (key, value) in [
            ("distance_threshold", self.distance_threshold),
            ("eps", self.eps),
            ("merge_threshold", self.merge_threshold),
            ("obstacle_threshold", self.obstacle_threshold),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(PipelineError::Config(format!(
                    "pipeline.{key} must be a positive number, got {value}"
                )));
            }
        }
        if self.min_samples == 0 {
            return Err(PipelineError::Config(
                "pipeline.min_samples must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

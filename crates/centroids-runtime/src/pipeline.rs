//! One end-to-end run: filter, cluster, merge.

use centroids_perception::geometry::check_finite;
use centroids_perception::{CentroidMerger, LabelClusterer, ObstacleFilter, Octree};
use centroids_types::{Centroid, LabeledPoint, PipelineError, Point3};
use tracing::{info, info_span, warn};

use crate::params::PipelineParams;

/// The three perception stages wired with one parameter set.
#[derive(Debug, Clone)]
pub struct CentroidPipeline {
    filter: ObstacleFilter,
    clusterer: LabelClusterer,
    merger: CentroidMerger,
}

impl CentroidPipeline {
    pub fn new(params: &PipelineParams) -> Result<Self, PipelineError> {
        Ok(Self {
            filter: ObstacleFilter::new(params.distance_threshold)?,
            clusterer: LabelClusterer::dbscan(params.eps, params.min_samples)?,
            merger: CentroidMerger::new(params.merge_threshold, params.obstacle_threshold)?,
        })
    }

    /// Run every stage on one pair of input batches.
    ///
    /// The obstacle index is built once and shared by the filter and the
    /// merger.  An empty result is `Ok(vec![])`.
    pub fn run(
        &self,
        labeled: &[LabeledPoint],
        obstacles: &[Point3],
    ) -> Result<Vec<Centroid>, PipelineError> {
        let _span = info_span!(
            "centroid_pipeline",
            labeled = labeled.len(),
            obstacles = obstacles.len()
        )
        .entered();

        check_finite("obstacles", obstacles)?;
        let index = Octree::from_points(obstacles);

        let filtered = self.filter.filter_indexed(labeled, &index)?;
        info!(
            "from {} filtered down to {} points near obstacles",
            labeled.len(),
            filtered.len()
        );
        if filtered.is_empty() {
            warn!("no labeled points near obstacles");
            return Ok(Vec::new());
        }

        let clustered = self.clusterer.cluster(&filtered)?;
        let merged = self.merger.merge_indexed(&clustered, &index)?;
        info!(
            clusters = clustered.len(),
            centroids = merged.len(),
            "pipeline run complete"
        );
        Ok(merged)
    }
}

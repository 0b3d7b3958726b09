use centroids_types::{Centroid, CentroidBatch};
use chrono::Utc;

/// Packages pipeline output into publishable batches.
#[derive(Debug, Clone)]
pub struct CentroidSink {
    frame_id: String,
}

impl CentroidSink {
    pub fn new(frame_id: impl Into<String>) -> Self {
        Self {
            frame_id: frame_id.into(),
        }
    }

    pub fn frame_id(&self) -> &str {
        &self.frame_id
    }

    /// Wrap `centroids` in a batch stamped with the current time.
    ///
    /// Order is kept as is and an empty input yields an empty batch.
    pub fn package(&self, centroids: Vec<Centroid>) -> CentroidBatch {
        CentroidBatch {
            frame_id: self.frame_id.clone(),
            stamp: Utc::now(),
            points: centroids,
        }
    }
}

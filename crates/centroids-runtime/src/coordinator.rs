//! Two-slot coordinator that decides when a pipeline run happens.
//!
//! Labeled-point batches only refresh their slot.  Obstacle batches refresh
//! theirs and trigger a run against the latest labeled batch, provided both
//! slots have been filled at least once.
//!
//! ```text
//!   AwaitingBoth ──(both slots filled)──▶ Ready ──▶ Ready …
//! ```
//!
//! There is no way back to [`CoordinatorState::AwaitingBoth`]: a later empty
//! batch still counts as data.

use centroids_perception::geometry::check_finite;
use centroids_types::{CentroidBatch, LabeledPoint, PipelineError, Point3, WaitingFor};
use tracing::{debug, info, warn};

use crate::params::PipelineParams;
use crate::pipeline::CentroidPipeline;
use crate::sink::CentroidSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    AwaitingBoth,
    Ready,
}

/// What an obstacle arrival led to.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The run happened; `points` may be empty.
    Published(CentroidBatch),
    /// No run, an input stream has never delivered a batch.
    Skipped(WaitingFor),
}

pub struct PipelineCoordinator {
    pipeline: CentroidPipeline,
    sink: CentroidSink,
    state: CoordinatorState,
    latest_labeled: Option<Vec<LabeledPoint>>,
    latest_obstacles: Option<Vec<Point3>>,
}

impl PipelineCoordinator {
    pub fn new(pipeline: CentroidPipeline, sink: CentroidSink) -> Self {
        Self {
            pipeline,
            sink,
            state: CoordinatorState::AwaitingBoth,
            latest_labeled: None,
            latest_obstacles: None,
        }
    }

    /// Build the pipeline from `params` and publish in `frame_id`.
    pub fn from_params(params: &PipelineParams, frame_id: &str) -> Result<Self, PipelineError> {
        params.validate()?;
        Ok(Self::new(CentroidPipeline::new(params)?, CentroidSink::new(frame_id)))
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    /// Which streams have never delivered a batch, if any.
    pub fn waiting_for(&self) -> Option<WaitingFor> {
        match (&self.latest_labeled, &self.latest_obstacles) {
            (None, None) => Some(WaitingFor::Both),
            (None, Some(_)) => Some(WaitingFor::LabeledPoints),
            (Some(_), None) => Some(WaitingFor::ObstaclePoints),
            (Some(_), Some(_)) => None,
        }
    }

    /// Cache a labeled batch. Never triggers a run.
    ///
    /// # Errors
    ///
    /// [`PipelineError::MalformedInput`] for non-finite coordinates; the
    /// previous batch stays cached.
    pub fn on_labeled_points(&mut self, points: Vec<LabeledPoint>) -> Result<(), PipelineError> {
        check_finite("labeled_points", points.iter().map(|p| &p.position))?;
        debug!(count = points.len(), "cached labeled points");
        self.latest_labeled = Some(points);
        self.refresh_state();
        Ok(())
    }

    /// Cache an obstacle batch and run the pipeline when ready.
    ///
    /// # Errors
    ///
    /// [`PipelineError::MalformedInput`] for non-finite coordinates (the
    /// previous batch stays cached), or whatever the run itself returns.
    /// Nothing is published for a failed trigger.
    pub fn on_obstacle_points(&mut self, points: Vec<Point3>) -> Result<RunOutcome, PipelineError> {
        check_finite("obstacles", &points)?;
        debug!(count = points.len(), "cached obstacle points");
        self.latest_obstacles = Some(points);
        self.refresh_state();

        let (CoordinatorState::Ready, Some(labeled), Some(obstacles)) =
            (self.state, &self.latest_labeled, &self.latest_obstacles)
        else {
            let missing = self.waiting_for().unwrap_or(WaitingFor::Both);
            warn!("Waiting for data on {missing}");
            return Ok(RunOutcome::Skipped(missing));
        };

        let centroids = self.pipeline.run(labeled, obstacles)?;
        let batch = self.sink.package(centroids);
        info!(
            count = batch.points.len(),
            frame_id = %batch.frame_id,
            "published centroids"
        );
        Ok(RunOutcome::Published(batch))
    }

    fn refresh_state(&mut self) {
        if self.state == CoordinatorState::AwaitingBoth && self.waiting_for().is_none() {
            self.state = CoordinatorState::Ready;
        }
    }
}

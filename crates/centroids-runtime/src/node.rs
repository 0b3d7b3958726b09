//! The node's event loop.
//!
//! [`CentroidNode`] subscribes to the two input topics when it is built and
//! then processes one event at a time in a single task, so the coordinator's
//! slots are never touched concurrently and every run finishes before the
//! next event is looked at.
//!
//! Events are handled in publish order across both topics.  Each input lane
//! holds at most one received event; the node always handles the held event
//! with the lowest bus sequence number, after topping up the other lane from
//! its queue.
//!
//! | Input | Effect |
//! |---|---|
//! | [`Topic::TransformedPoints`] | refresh the labeled slot |
//! | [`Topic::CloudObstacles`] | refresh the obstacle slot, maybe run |
//!
//! | Output | When |
//! |---|---|
//! | [`Topic::Centroids`] | a run completed (possibly empty) |
//! | [`Topic::Diagnostics`] | a run was skipped or an input was rejected |

use std::sync::Arc;

use centroids_middleware::{EventBus, Topic, TopicReceiver};
use centroids_types::{Event, EventPayload, PipelineError};
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use crate::coordinator::{PipelineCoordinator, RunOutcome};

const SOURCE: &str = "centroids-runtime::node";

/// Counters returned when the node stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeStats {
    pub published: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// One input topic plus a single event of lookahead.
struct Lane {
    rx: TopicReceiver,
    pending: Option<Event>,
    closed: bool,
}

impl Lane {
    fn new(rx: TopicReceiver) -> Self {
        Self {
            rx,
            pending: None,
            closed: false,
        }
    }

    /// Move the next queued event into `pending` without waiting.
    fn fill(&mut self) {
        while self.pending.is_none() && !self.closed {
            match self.rx.try_recv() {
                Ok(event) => self.pending = Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(
                        lagged_by = n,
                        topic = ?self.rx.topic(),
                        "node input lagged; dropped batches"
                    );
                }
                Err(broadcast::error::TryRecvError::Empty) => break,
                Err(broadcast::error::TryRecvError::Closed) => self.closed = true,
            }
        }
    }

    fn park(&mut self, received: Result<Event, broadcast::error::RecvError>) {
        match received {
            Ok(event) => self.pending = Some(event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(
                    lagged_by = n,
                    topic = ?self.rx.topic(),
                    "node input lagged; dropped batches"
                );
            }
            Err(broadcast::error::RecvError::Closed) => self.closed = true,
        }
    }
}

pub struct CentroidNode {
    coordinator: PipelineCoordinator,
    bus: Arc<EventBus>,
    labeled: Lane,
    obstacles: Lane,
    stats: NodeStats,
}

impl CentroidNode {
    /// Subscribe to the input topics. Batches published after this call are
    /// seen by [`run`][Self::run].
    pub fn new(coordinator: PipelineCoordinator, bus: Arc<EventBus>) -> Self {
        let labeled = Lane::new(bus.subscribe_to(Topic::TransformedPoints));
        let obstacles = Lane::new(bus.subscribe_to(Topic::CloudObstacles));
        Self {
            coordinator,
            bus,
            labeled,
            obstacles,
            stats: NodeStats::default(),
        }
    }

    /// Process events until `shutdown` flips to `true` (or its sender is
    /// dropped), then drain whatever input is still queued.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> NodeStats {
        info!("centroid node started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            if let Some(event) = self.take_next() {
                self.handle(event);
                continue;
            }
            if self.labeled.closed && self.obstacles.closed {
                break;
            }
            // Both lanes are empty here; park whichever event shows up first.
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                received = self.labeled.rx.recv(), if !self.labeled.closed => {
                    self.labeled.park(received);
                }
                received = self.obstacles.rx.recv(), if !self.obstacles.closed => {
                    self.obstacles.park(received);
                }
            }
        }

        self.drain();
        info!(
            published = self.stats.published,
            skipped = self.stats.skipped,
            failed = self.stats.failed,
            "centroid node stopped"
        );
        self.stats
    }

    /// The held event with the lowest sequence number, if any.
    ///
    /// Both lanes are topped up first.  The bus numbers and sends under one
    /// lock, so any event older than a held one is already queued.
    fn take_next(&mut self) -> Option<Event> {
        self.labeled.fill();
        self.obstacles.fill();
        let obstacles_first = match (&self.labeled.pending, &self.obstacles.pending) {
            (Some(l), Some(o)) => o.seq < l.seq,
            (Some(_), None) => false,
            (None, _) => true,
        };
        if obstacles_first {
            self.obstacles.pending.take()
        } else {
            self.labeled.pending.take()
        }
    }

    fn drain(&mut self) {
        while let Some(event) = self.take_next() {
            self.handle(event);
        }
    }

    fn handle(&mut self, event: Event) {
        match event.payload {
            EventPayload::LabeledPoints(points) => {
                if let Err(e) = self.coordinator.on_labeled_points(points) {
                    self.report_failure(e);
                }
            }
            EventPayload::ObstaclePoints(points) => {
                match self.coordinator.on_obstacle_points(points) {
                    Ok(RunOutcome::Published(batch)) => {
                        self.stats.published += 1;
                        self.emit(Topic::Centroids, EventPayload::Centroids(batch));
                    }
                    Ok(RunOutcome::Skipped(missing)) => {
                        self.stats.skipped += 1;
                        self.emit(Topic::Diagnostics, EventPayload::WaitingForData(missing));
                    }
                    Err(e) => self.report_failure(e),
                }
            }
            other => {
                debug!(source = %event.source, payload = ?other, "ignoring unexpected payload");
            }
        }
    }

    fn report_failure(&mut self, e: PipelineError) {
        self.stats.failed += 1;
        error!(error = %e, "input rejected");
        self.emit(
            Topic::Diagnostics,
            EventPayload::RunFailed {
                reason: e.to_string(),
            },
        );
    }

    fn emit(&self, topic: Topic, payload: EventPayload) {
        if let Err(e) = self.bus.publish_to(topic, Event::new(SOURCE, payload)) {
            debug!(error = %e, "no listener for node output");
        }
    }
}

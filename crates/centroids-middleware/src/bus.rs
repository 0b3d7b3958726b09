//! Typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::TransformedPoints`] | Labeled detections in the map frame |
//! | [`Topic::CloudObstacles`] | Segmented obstacle points (the run trigger) |
//! | [`Topic::Centroids`] | Output batches of completed runs |
//! | [`Topic::Diagnostics`] | Skipped runs and rejected batches |
//!
//! # Ordering
//!
//! Every published event gets a bus-wide sequence number in [`Event::seq`].
//! Numbering and sending happen under one lock, so when a receiver holds an
//! event with sequence `n`, every event with a lower sequence is already
//! queued on its own topic.  Subscribers of several topics use this to
//! restore arrival order.

use std::sync::{Arc, Mutex};

use centroids_types::{Event, PipelineError};
use tokio::sync::broadcast;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
pub const DEFAULT_CAPACITY: usize = 256;

/// Routing lanes of the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// `/transformed_points`: labeled detection batches.
    TransformedPoints,
    /// `/cloud_obstacles`: obstacle batches.
    CloudObstacles,
    /// `/centroids`: published centroid batches.
    Centroids,
    /// "waiting for data" notices and rejected inputs.
    Diagnostics,
}

impl Topic {
    /// The ROS topic name the lane mirrors, if any.
    pub fn ros_name(self) -> Option<&'static str> {
        match self {
            Topic::TransformedPoints => Some("/transformed_points"),
            Topic::CloudObstacles => Some("/cloud_obstacles"),
            Topic::Centroids => Some("/centroids"),
            Topic::Diagnostics => None,
        }
    }
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    transformed_points: broadcast::Sender<Event>,
    cloud_obstacles: broadcast::Sender<Event>,
    centroids: broadcast::Sender<Event>,
    diagnostics: broadcast::Sender<Event>,
    // Last sequence number handed out.
    sequence: Arc<Mutex<u64>>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently and
    /// must be non-zero.
    pub fn new(capacity: usize) -> Self {
        let (transformed_points, _) = broadcast::channel(capacity);
        let (cloud_obstacles, _) = broadcast::channel(capacity);
        let (centroids, _) = broadcast::channel(capacity);
        let (diagnostics, _) = broadcast::channel(capacity);
        Self {
            transformed_points,
            cloud_obstacles,
            centroids,
            diagnostics,
            sequence: Arc::new(Mutex::new(0)),
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event.
    /// The event's [`seq`][Event::seq] is overwritten with the next bus-wide
    /// sequence number.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Channel`] when nobody is subscribed to the topic.
    pub fn publish_to(&self, topic: Topic, mut event: Event) -> Result<usize, PipelineError> {
        let mut last = self
            .sequence
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *last += 1;
        event.seq = *last;
        self.topic_sender(topic)
            .send(event)
            .map_err(|_| PipelineError::Channel(format!("No subscribers for topic {topic:?}")))
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Number of live subscribers on `topic`.
    pub fn receiver_count(&self, topic: Topic) -> usize {
        self.topic_sender(topic).receiver_count()
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::TransformedPoints => &self.transformed_points,
            Topic::CloudObstacles => &self.cloud_obstacles,
            Topic::Centroids => &self.centroids,
            Topic::Diagnostics => &self.diagnostics,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(RecvError::Lagged(n))` – the subscriber fell behind and `n`
    ///   messages were dropped.
    /// * `Err(RecvError::Closed)` – every sender is gone.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Non-blocking receive, used to drain pending events on shutdown.
    pub fn try_recv(&mut self) -> Result<Event, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

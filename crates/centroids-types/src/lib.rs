use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A point in 3-D space (metres, already in the map frame).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3 {
    /// Create a new point.
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// True when every coordinate is a finite number.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// A point tagged with the semantic class it was detected as.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabeledPoint {
    pub position: Point3,
    pub label: u32,
}

impl LabeledPoint {
    pub fn new(x: f32, y: f32, z: f32, label: u32) -> Self {
        Self {
            position: Point3::new(x, y, z),
            label,
        }
    }
}

/// Mean position of a group of same-label points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Centroid {
    pub position: Point3,
    pub label: u32,
}

impl Centroid {
    pub fn new(position: Point3, label: u32) -> Self {
        Self { position, label }
    }
}

/// The publishable result of one pipeline run.
///
/// An empty `points` vector is a valid batch: it means the run happened but
/// nothing survived filtering or clustering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CentroidBatch {
    /// Reference frame the centroids are expressed in (e.g. `"map"`).
    pub frame_id: String,
    /// Generation time, assigned when the batch is packaged.
    pub stamp: DateTime<Utc>,
    pub points: Vec<Centroid>,
}

/// Which input stream(s) a skipped run was still waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaitingFor {
    Both,
    LabeledPoints,
    ObstaclePoints,
}

impl std::fmt::Display for WaitingFor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaitingFor::Both => write!(f, "both topics"),
            WaitingFor::LabeledPoints => write!(f, "transformed_points"),
            WaitingFor::ObstaclePoints => write!(f, "cloud_obstacles"),
        }
    }
}

/// Unified event wrapper for the node's event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "centroids-middleware::ros2/cloud_obstacles"
    pub source: String,
    /// Publish order across every bus topic; 0 until the bus assigns it.
    #[serde(default)]
    pub seq: u64,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` in a freshly stamped event.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            seq: 0,
            payload,
        }
    }
}

/// Variants of data that can be routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// A batch of labeled detections from the object detector.
    LabeledPoints(Vec<LabeledPoint>),
    /// A batch of obstacle points from the segmentation stage.
    ObstaclePoints(Vec<Point3>),
    /// Output of a completed pipeline run.
    Centroids(CentroidBatch),
    /// A run was skipped because an input stream has never been received.
    WaitingForData(WaitingFor),
    /// A run or an input batch was rejected.
    RunFailed { reason: String },
}

/// Error type shared by every crate in the workspace.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parsing error: {0}")]
    Parsing(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Event bus error: {0}")]
    Channel(String),
}

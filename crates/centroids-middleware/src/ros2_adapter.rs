//! ROS 2 adapter speaking rosbridge JSON.
//!
//! [`Ros2Adapter`] bridges between the internal [`EventBus`] and rosbridge
//! frames of the form `{"op": "publish", "topic": .., "msg": ..}`:
//!
//! * **Inbound** – a `/transformed_points` cloud is decoded into labeled
//!   points and published on [`Topic::TransformedPoints`]; a
//!   `/cloud_obstacles` cloud is decoded into obstacle points and published
//!   on [`Topic::CloudObstacles`].
//!
//! * **Outbound** – a centroid batch becomes a `publish` frame on
//!   `/centroids` carrying a `sensor_msgs/PointCloud2`.

use std::sync::Arc;

use centroids_types::{CentroidBatch, Event, EventPayload, PipelineError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bus::{EventBus, Topic};
use crate::point_cloud2::{self, PointCloud2};

/// Maximum number of points accepted in a single inbound cloud.
///
/// Clouds declaring more points than this are rejected before their data
/// buffer is walked.
pub const MAX_CLOUD_POINTS: usize = 1 << 20;

pub const TRANSFORMED_POINTS_TOPIC: &str = "/transformed_points";
pub const CLOUD_OBSTACLES_TOPIC: &str = "/cloud_obstacles";
pub const CENTROIDS_TOPIC: &str = "/centroids";

const SOURCE_PREFIX: &str = "centroids-middleware::ros2";

/// A rosbridge protocol frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosbridgeFrame<M> {
    pub op: String,
    pub topic: String,
    pub msg: M,
}

impl<M> RosbridgeFrame<M> {
    pub fn publish(topic: &str, msg: M) -> Self {
        Self {
            op: "publish".to_string(),
            topic: topic.to_string(),
            msg,
        }
    }
}

/// Adapter that decodes inbound point clouds onto the bus and encodes
/// outbound centroid batches.
#[derive(Clone)]
pub struct Ros2Adapter {
    bus: Arc<EventBus>,
}

impl Ros2Adapter {
    /// Create a new [`Ros2Adapter`] backed by the given [`EventBus`].
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }

    /// Decode one rosbridge text frame and route it by topic.
    ///
    /// Returns the number of bus subscribers that received the batch.
    ///
    /// # Errors
    ///
    /// * [`PipelineError::Serialization`] – the text is not a valid frame.
    /// * [`PipelineError::Parsing`] – unsupported `op`, unknown topic, or a
    ///   cloud that cannot be decoded.
    /// * [`PipelineError::Channel`] – nobody listens on the target topic.
    pub fn ingest_frame(&self, text: &str) -> Result<usize, PipelineError> {
        let frame: RosbridgeFrame<serde_json::Value> = serde_json::from_str(text)
            .map_err(|e| PipelineError::Serialization(format!("invalid rosbridge frame: {e}")))?;

        if frame.op != "publish" {
            return Err(PipelineError::Parsing(format!(
                "unsupported rosbridge op '{}' on {}",
                frame.op, frame.topic
            )));
        }

        let cloud = match frame.topic.as_str() {
            TRANSFORMED_POINTS_TOPIC | CLOUD_OBSTACLES_TOPIC => {
                serde_json::from_value::<PointCloud2>(frame.msg).map_err(|e| {
                    PipelineError::Parsing(format!("{} is not a PointCloud2: {e}", frame.topic))
                })?
            }
            other => {
                return Err(PipelineError::Parsing(format!("unknown topic '{other}'")));
            }
        };

        if frame.topic == TRANSFORMED_POINTS_TOPIC {
            self.ingest_transformed_points(&cloud)
        } else {
            self.ingest_cloud_obstacles(&cloud)
        }
    }

    /// Decode a `/transformed_points` cloud and publish it on
    /// [`Topic::TransformedPoints`].
    pub fn ingest_transformed_points(&self, cloud: &PointCloud2) -> Result<usize, PipelineError> {
        check_size(TRANSFORMED_POINTS_TOPIC, cloud)?;
        let points = point_cloud2::read_labeled_points(cloud)?;
        debug!(count = points.len(), "received labeled points");
        self.bus.publish_to(
            Topic::TransformedPoints,
            Event::new(
                format!("{SOURCE_PREFIX}{TRANSFORMED_POINTS_TOPIC}"),
                EventPayload::LabeledPoints(points),
            ),
        )
    }

    /// Decode a `/cloud_obstacles` cloud and publish it on
    /// [`Topic::CloudObstacles`].
    pub fn ingest_cloud_obstacles(&self, cloud: &PointCloud2) -> Result<usize, PipelineError> {
        check_size(CLOUD_OBSTACLES_TOPIC, cloud)?;
        let points = point_cloud2::read_obstacle_points(cloud)?;
        debug!(count = points.len(), "received obstacle points");
        self.bus.publish_to(
            Topic::CloudObstacles,
            Event::new(
                format!("{SOURCE_PREFIX}{CLOUD_OBSTACLES_TOPIC}"),
                EventPayload::ObstaclePoints(points),
            ),
        )
    }

    /// Serialise `batch` as a rosbridge `publish` frame on `/centroids`.
    pub fn centroid_frame(batch: &CentroidBatch) -> Result<String, PipelineError> {
        let frame =
            RosbridgeFrame::publish(CENTROIDS_TOPIC, point_cloud2::create_centroid_cloud(batch));
        serde_json::to_string(&frame)
            .map_err(|e| PipelineError::Serialization(format!("centroid frame: {e}")))
    }
}

fn check_size(topic: &str, cloud: &PointCloud2) -> Result<(), PipelineError> {
    let count = cloud.point_count();
    if count > MAX_CLOUD_POINTS {
        return Err(PipelineError::Parsing(format!(
            "{topic} cloud has {count} points, exceeding the limit of {MAX_CLOUD_POINTS}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use centroids_types::{Centroid, LabeledPoint, Point3};
    use chrono::Utc;

    fn make_adapter() -> (Arc<EventBus>, Ros2Adapter) {
        let bus = Arc::new(EventBus::default());
        let adapter = Ros2Adapter::new(Arc::clone(&bus));
        (bus, adapter)
    }

    fn frame(topic: &str, cloud: &PointCloud2) -> String {
        serde_json::to_string(&RosbridgeFrame::publish(topic, cloud)).unwrap()
    }

    #[tokio::test]
    async fn transformed_points_frame_publishes_labeled_points()
    -> Result<(), Box<dyn std::error::Error>> {
        let (bus, adapter) = make_adapter();
        let mut rx = bus.subscribe_to(Topic::TransformedPoints);

        let points = [
            LabeledPoint::new(0.0, 0.0, 0.0, 1),
            LabeledPoint::new(5.0, 5.0, 5.0, 2),
        ];
        let cloud = point_cloud2::create_labeled_cloud("map", &points);
        adapter.ingest_frame(&frame(TRANSFORMED_POINTS_TOPIC, &cloud))?;

        let event = rx.recv().await?;
        assert_eq!(event.source, "centroids-middleware::ros2/transformed_points");
        match event.payload {
            EventPayload::LabeledPoints(received) => assert_eq!(received, points.to_vec()),
            other => panic!("expected LabeledPoints, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn cloud_obstacles_frame_publishes_obstacle_points()
    -> Result<(), Box<dyn std::error::Error>> {
        let (bus, adapter) = make_adapter();
        let mut rx = bus.subscribe_to(Topic::CloudObstacles);

        let cloud = point_cloud2::create_xyz_cloud("map", &[Point3::new(0.0, 0.0, 0.0)]);
        adapter.ingest_frame(&frame(CLOUD_OBSTACLES_TOPIC, &cloud))?;

        let event = rx.recv().await?;
        assert_eq!(event.source, "centroids-middleware::ros2/cloud_obstacles");
        assert!(matches!(
            event.payload,
            EventPayload::ObstaclePoints(ref p) if p == &vec![Point3::new(0.0, 0.0, 0.0)]
        ));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_topic_is_rejected() {
        let (bus, adapter) = make_adapter();
        let _rx = bus.subscribe_to(Topic::CloudObstacles);

        let cloud = point_cloud2::create_xyz_cloud("map", &[]);
        let result = adapter.ingest_frame(&frame("/scan", &cloud));
        assert!(matches!(result, Err(PipelineError::Parsing(_))));
    }

    #[tokio::test]
    async fn non_publish_op_is_rejected() {
        let (_, adapter) = make_adapter();
        let result =
            adapter.ingest_frame(r#"{"op":"subscribe","topic":"/cloud_obstacles","msg":{}}"#);
        assert!(matches!(result, Err(PipelineError::Parsing(_))));
    }

    #[tokio::test]
    async fn garbage_text_is_a_serialization_error() {
        let (_, adapter) = make_adapter();
        let result = adapter.ingest_frame("not json");
        assert!(matches!(result, Err(PipelineError::Serialization(_))));
    }

    #[tokio::test]
    async fn oversized_cloud_is_rejected() {
        let (bus, adapter) = make_adapter();
        let _rx = bus.subscribe_to(Topic::CloudObstacles);

        let mut cloud = point_cloud2::create_xyz_cloud("map", &[]);
        cloud.width = (MAX_CLOUD_POINTS + 1) as u32;
        let result = adapter.ingest_cloud_obstacles(&cloud);
        assert!(
            matches!(result, Err(PipelineError::Parsing(_))),
            "expected Parsing error for oversized cloud, got: {result:?}"
        );
    }

    #[test]
    fn centroid_frame_targets_centroids_topic() -> Result<(), Box<dyn std::error::Error>> {
        let batch = CentroidBatch {
            frame_id: "map".to_string(),
            stamp: Utc::now(),
            points: vec![Centroid::new(Point3::new(0.025, 0.0, 0.0), 1)],
        };
        let text = Ros2Adapter::centroid_frame(&batch)?;
        let decoded: RosbridgeFrame<PointCloud2> = serde_json::from_str(&text)?;

        assert_eq!(decoded.op, "publish");
        assert_eq!(decoded.topic, CENTROIDS_TOPIC);
        assert_eq!(decoded.msg.header.frame_id, "map");
        let labeled = point_cloud2::read_labeled_points(&decoded.msg)?;
        assert_eq!(labeled, vec![LabeledPoint::new(0.025, 0.0, 0.0, 1)]);
        Ok(())
    }
}

//! `centroids-middleware` – transport for the centroid node.
//!
//! Moves point batches between ROS-style wire frames and the node's internal
//! event bus without caring what the pipeline does with them.
//!
//! # Modules
//!
//! - [`bus`] – Typed, topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.
//! - [`point_cloud2`] – `sensor_msgs/PointCloud2` model and codec.
//! - [`ros2_adapter`] – rosbridge JSON frames in and out of the bus.

pub mod bus;
pub mod point_cloud2;
pub mod ros2_adapter;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use point_cloud2::PointCloud2;
pub use ros2_adapter::Ros2Adapter;

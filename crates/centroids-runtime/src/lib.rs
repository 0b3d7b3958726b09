//! `centroids-runtime` – runs the centroid pipeline as a node.
//!
//! # Modules
//!
//! - [`params`] – [`PipelineParams`][params::PipelineParams]: the five
//!   thresholds of a run, with validation.
//! - [`pipeline`] – [`CentroidPipeline`][pipeline::CentroidPipeline]:
//!   obstacle filter, per-label DBSCAN and centroid merge in sequence.
//! - [`sink`] – [`CentroidSink`][sink::CentroidSink]: frames and stamps the
//!   result.
//! - [`coordinator`] – [`PipelineCoordinator`][coordinator::PipelineCoordinator]:
//!   the two-slot `AwaitingBoth` / `Ready` state machine deciding when a run
//!   happens.
//! - [`node`] – [`CentroidNode`][node::CentroidNode]: single-task event loop
//!   between the event bus and the coordinator.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: `tracing`
//!   subscriber with an optional OTLP span exporter.

pub mod coordinator;
pub mod node;
pub mod params;
pub mod pipeline;
pub mod sink;
pub mod telemetry;

pub use coordinator::{CoordinatorState, PipelineCoordinator, RunOutcome};
pub use node::{CentroidNode, NodeStats};
pub use params::PipelineParams;
pub use pipeline::CentroidPipeline;
pub use sink::CentroidSink;
pub use telemetry::{TracerProviderGuard, init_tracing};

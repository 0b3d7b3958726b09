//! `centroids-perception` – the centroid extraction core.
//!
//! Turns a batch of labeled detections and a batch of obstacle points into a
//! stable set of per-label object centroids.  Everything in this crate is a
//! pure function of its inputs; transport, configuration and scheduling live
//! in `centroids-middleware` and `centroids-runtime`.
//!
//! # Modules
//!
//! - [`geometry`] – distances, proximity tests and means over [`Point3`].
//! - [`octree`] – [`Octree`][octree::Octree]: spatial index over the obstacle
//!   cloud that answers "is anything closer than `r`?" without scanning every
//!   obstacle.
//! - [`obstacle_filter`] – [`ObstacleFilter`][obstacle_filter::ObstacleFilter]:
//!   keeps only detections that sit next to a real obstacle.
//! - [`clustering`] – [`LabelClusterer`][clustering::LabelClusterer]:
//!   per-label DBSCAN producing one centroid per sub-cluster.
//! - [`merger`] – [`CentroidMerger`][merger::CentroidMerger]: collapses
//!   same-label centroids that are close together when the merged position is
//!   backed by an obstacle.
//!
//! [`Point3`]: centroids_types::Point3

pub mod clustering;
pub mod geometry;
pub mod merger;
pub mod obstacle_filter;
pub mod octree;

mod grouping;

pub use clustering::{Dbscan, DensityClusterer, LabelClusterer};
pub use merger::CentroidMerger;
pub use obstacle_filter::ObstacleFilter;
pub use octree::Octree;

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Spherical geometry and clustering for postal locations.
//!
//! - [`coords`]: geodetic degrees ⇄ unit-sphere Cartesian points, weighted
//!   averaging, bounding boxes.
//! - [`kmeans`]: weighted K-means over those points, producing
//!   [`ClusterResult`](postcode_cluster_models::ClusterResult)s labelled
//!   with their closest member.
//! - [`haversine`]: great-circle distances for reporting.
//!
//! Everything here is synchronous and allocation-local to a call, so it can
//! run on any worker thread.

pub mod coords;
pub mod haversine;
pub mod kmeans;

pub use coords::{CartesianPoint, CoordError, to_cartesian, to_geodetic, weighted_average};
pub use kmeans::{CancelFlag, Clustering, KMeans, KMeansError, cluster};

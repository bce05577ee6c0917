//! Weighted K-means on the unit sphere.
//!
//! Locations are clustered as 3D Cartesian points so that averages stay
//! meaningful near the poles and across the antimeridian. Each postal
//! location pulls its centroid proportionally to its weight (the number of
//! records sharing the code); assignment itself uses plain distance.
//!
//! Behaviour worth knowing about:
//!
//! - Centroids are seeded uniformly inside the longitude/latitude bounding
//!   box of the input. Nothing keeps them apart, so a seed may attract no
//!   locations at all.
//! - A centroid that ends an assignment step with no members is dropped
//!   for the rest of the run and never revived.
//! - Ties go to the lowest centroid index.
//! - Members that cancel out exactly (e.g. antipodal pairs of equal weight)
//!   average to the origin, which has no direction. Such a cluster reports
//!   its representative member's position as the centroid.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use postcode_cluster_models::{ClusterResult, Coordinate, PostalLocation};
use rand::Rng;
use thiserror::Error;

use crate::coords::{
    Bounds, CartesianPoint, coordinate_to_cartesian, random_in_bounds, to_geodetic,
    weighted_average,
};

/// Errors from a clustering run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KMeansError {
    /// `k` was zero or larger than the number of resolved locations.
    #[error(
        "Cluster count must be between 1 and the number of resolved locations ({locations}), got {k}"
    )]
    InvalidClusterCount {
        /// Requested cluster count.
        k: usize,
        /// Number of resolved locations available.
        locations: usize,
    },

    /// `max_iterations` was zero.
    #[error("Maximum iterations must be at least 1")]
    InvalidIterationCount,

    /// The run was cancelled through its [`CancelFlag`].
    #[error("Clustering cancelled after {iterations} iterations")]
    Cancelled {
        /// Iterations completed before the flag was seen.
        iterations: usize,
    },
}

/// Cooperative cancellation for long clustering runs.
///
/// Clones share the same flag. The engine checks it once per iteration.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates a flag that is not yet raised.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Output of a clustering run.
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    /// Surviving clusters, in centroid seed order.
    pub clusters: Vec<ClusterResult>,
    /// Number of assign/update rounds executed.
    pub iterations: usize,
    /// Whether the run stopped because no centroid moved.
    pub converged: bool,
}

/// Clustering parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KMeans {
    k: usize,
    max_iterations: usize,
}

impl KMeans {
    /// Creates a configuration seeding `k` centroids and running at most
    /// `max_iterations` rounds.
    #[must_use]
    pub const fn new(k: usize, max_iterations: usize) -> Self {
        Self { k, max_iterations }
    }

    /// Number of centroids seeded.
    #[must_use]
    pub const fn k(&self) -> usize {
        self.k
    }

    /// Upper bound on assign/update rounds.
    #[must_use]
    pub const fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Clusters the resolved entries of `locations`.
    ///
    /// Unresolved entries are ignored. `rng` only drives centroid seeding,
    /// so a seeded generator makes the run reproducible.
    ///
    /// # Errors
    ///
    /// Returns [`KMeansError::InvalidClusterCount`] if `k` is zero or
    /// exceeds the number of resolved locations, and
    /// [`KMeansError::InvalidIterationCount`] if `max_iterations` is zero.
    pub fn run<R: Rng + ?Sized>(
        &self,
        locations: &[PostalLocation],
        rng: &mut R,
    ) -> Result<Clustering, KMeansError> {
        self.run_cancellable(locations, rng, &CancelFlag::new())
    }

    /// Like [`Self::run`], checking `cancel` before every iteration.
    ///
    /// # Errors
    ///
    /// In addition to the errors of [`Self::run`], returns
    /// [`KMeansError::Cancelled`] once `cancel` is raised.
    pub fn run_cancellable<R: Rng + ?Sized>(
        &self,
        locations: &[PostalLocation],
        rng: &mut R,
        cancel: &CancelFlag,
    ) -> Result<Clustering, KMeansError> {
        let resolved: Vec<&PostalLocation> = locations.iter().filter(|l| l.resolved).collect();

        if self.k == 0 || self.k > resolved.len() {
            return Err(KMeansError::InvalidClusterCount {
                k: self.k,
                locations: resolved.len(),
            });
        }
        if self.max_iterations == 0 {
            return Err(KMeansError::InvalidIterationCount);
        }

        let mut engine = Engine::seeded(resolved, self.k, rng);

        let mut iterations = 0;
        let mut converged = false;
        while iterations < self.max_iterations {
            if cancel.is_cancelled() {
                log::info!("K-means cancelled after {iterations} iterations");
                return Err(KMeansError::Cancelled { iterations });
            }

            engine.assign();
            let moved = engine.update();
            iterations += 1;

            log::debug!(
                "K-means iteration {iterations}: {} live centroids, moved={moved}",
                engine.live_centroids()
            );

            if !moved {
                converged = true;
                break;
            }
        }

        if converged {
            log::debug!(
                "K-means converged after {iterations} of at most {} iterations",
                self.max_iterations
            );
        }

        let clusters = engine.finish();
        log::info!(
            "K-means produced {} clusters from {} seeds over {} locations \
             ({iterations} iterations, converged={converged})",
            clusters.len(),
            self.k,
            locations.len(),
        );

        Ok(Clustering {
            clusters,
            iterations,
            converged,
        })
    }
}

/// Clusters `locations` into at most `k` clusters.
///
/// Shorthand for [`KMeans::run`] when only the clusters are needed.
///
/// # Errors
///
/// See [`KMeans::run`].
pub fn cluster<R: Rng + ?Sized>(
    locations: &[PostalLocation],
    k: usize,
    max_iterations: usize,
    rng: &mut R,
) -> Result<Vec<ClusterResult>, KMeansError> {
    KMeans::new(k, max_iterations)
        .run(locations, rng)
        .map(|c| c.clusters)
}

/// Working set for one clustering run.
struct Engine<'a> {
    locations: Vec<&'a PostalLocation>,
    points: Vec<CartesianPoint>,
    /// `None` marks a centroid that lost all of its members.
    centroids: Vec<Option<CartesianPoint>>,
    assignments: Vec<Option<usize>>,
}

impl<'a> Engine<'a> {
    fn seeded<R: Rng + ?Sized>(locations: Vec<&'a PostalLocation>, k: usize, rng: &mut R) -> Self {
        let points: Vec<CartesianPoint> = locations
            .iter()
            .filter_map(|l| l.coordinate())
            .map(coordinate_to_cartesian)
            .collect();

        let bounds = Bounds::enclosing(locations.iter().filter_map(|l| l.coordinate()));
        let centroids = bounds.map_or_else(Vec::new, |bounds| {
            (0..k)
                .map(|_| Some(coordinate_to_cartesian(random_in_bounds(rng, &bounds))))
                .collect()
        });

        let assignments = vec![None; points.len()];

        Self {
            locations,
            points,
            centroids,
            assignments,
        }
    }

    fn live_centroids(&self) -> usize {
        self.centroids.iter().filter(|c| c.is_some()).count()
    }

    /// Assigns every point to its nearest live centroid.
    fn assign(&mut self) {
        for (point, slot) in self.points.iter().zip(self.assignments.iter_mut()) {
            *slot = nearest(point, &self.centroids);
        }
    }

    /// Moves every centroid to the weighted mean of its members.
    ///
    /// Returns whether any surviving centroid changed position. Dropping
    /// an empty centroid does not count as movement.
    #[allow(clippy::cast_precision_loss)]
    fn update(&mut self) -> bool {
        let mut moved = false;

        for (index, centroid) in self.centroids.iter_mut().enumerate() {
            if centroid.is_none() {
                continue;
            }

            let members: Vec<(CartesianPoint, f64)> = self
                .assignments
                .iter()
                .zip(&self.points)
                .zip(&self.locations)
                .filter(|((assigned, _), _)| **assigned == Some(index))
                .map(|((_, point), location)| (*point, location.weight as f64))
                .collect();

            match weighted_average(&members) {
                Ok(average) => {
                    if *centroid != Some(average) {
                        *centroid = Some(average);
                        moved = true;
                    }
                }
                Err(_) => {
                    log::debug!("Centroid {index} has no members, dropping it");
                    *centroid = None;
                }
            }
        }

        moved
    }

    fn members_of(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        self.assignments
            .iter()
            .enumerate()
            .filter(move |(_, assigned)| **assigned == Some(index))
            .map(|(i, _)| i)
    }

    fn finish(self) -> Vec<ClusterResult> {
        let mut results = Vec::new();

        for (index, centroid) in self.centroids.iter().enumerate() {
            let Some(centroid) = centroid else {
                continue;
            };

            let member_indices: Vec<usize> = self.members_of(index).collect();

            let mut representative: Option<(usize, f64)> = None;
            for &i in &member_indices {
                let d = self.points[i].distance_sq(centroid);
                if representative.is_none_or(|(_, best)| d < best) {
                    representative = Some((i, d));
                }
            }

            let Some((rep_index, _)) = representative else {
                continue;
            };

            let position = centroid_position(*centroid, self.points[rep_index]);
            results.push(ClusterResult {
                centroid_longitude: position.longitude,
                centroid_latitude: position.latitude,
                members: member_indices
                    .iter()
                    .map(|&i| self.locations[i].clone())
                    .collect(),
                representative_code: self.locations[rep_index].code.clone(),
                representative_place_name: None,
            });
        }

        results
    }
}

/// Geodetic position of `centroid`, or of `representative` when the
/// members cancel out and the centroid sits at the origin.
fn centroid_position(centroid: CartesianPoint, representative: CartesianPoint) -> Coordinate {
    let position = to_geodetic(centroid);
    if position.latitude.is_finite() && position.longitude.is_finite() {
        position
    } else {
        log::debug!("Centroid has no direction, reporting its representative's position");
        to_geodetic(representative)
    }
}

/// Index of the live centroid closest to `point`; the first wins ties.
fn nearest(point: &CartesianPoint, centroids: &[Option<CartesianPoint>]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, centroid) in centroids.iter().enumerate() {
        let Some(centroid) = centroid else {
            continue;
        };
        let d = point.distance_sq(centroid);
        if best.is_none_or(|(_, shortest)| d < shortest) {
            best = Some((index, d));
        }
    }
    best.map(|(index, _)| index)
}

//! End-to-end postcode clustering.
//!
//! Stages, in order:
//!
//! 1. Count records per postal code.
//! 2. Resolve every distinct code in batches.
//! 3. Cluster the resolved codes with spherical K-means, weighted by
//!    record count.
//! 4. Look up a place name for each cluster's representative code.
//!
//! A failed batch only loses its own codes, and a failed place-name lookup
//! only loses that cluster's name. Clustering errors abort the run but
//! still carry the lookup results (see [`AnalysisError::partial_result`]).

use std::collections::BTreeSet;
use std::sync::Arc;

use postcode_cluster_geocoder::{BatchFailure, PostcodeLocator, resolve_with_progress};
use postcode_cluster_models::{ClusterResult, PostalLocation, PostalRecord};
use postcode_cluster_spatial::{CancelFlag, KMeans};
use rand::SeedableRng as _;
use rand::rngs::StdRng;
use serde::Serialize;

use crate::AnalysisError;
use crate::count::{count_postal_codes, normalized_postal_code};
use crate::progress::ProgressCallback;

/// Configuration for [`run_pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Number of centroids to seed.
    pub cluster_count: usize,
    /// Upper bound on K-means iterations.
    pub max_iterations: usize,
    /// Seed for centroid placement. `None` seeds from entropy.
    pub seed: Option<u64>,
    /// Whether to look up a place name per cluster.
    pub resolve_place_names: bool,
    /// Number of lookup batches in flight at once.
    pub concurrent_batches: usize,
    /// Raised to abort clustering between iterations.
    pub cancel: CancelFlag,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            cluster_count: 5,
            max_iterations: 25,
            seed: None,
            resolve_place_names: true,
            concurrent_batches: 1,
            cancel: CancelFlag::new(),
        }
    }
}

/// Output of [`run_pipeline`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    /// Surviving clusters.
    pub clusters: Vec<ClusterResult>,
    /// Every distinct postal code, resolved or not, in sorted order.
    pub locations: Vec<PostalLocation>,
    /// Lookup batches that failed.
    pub failed_batches: Vec<BatchFailure>,
    /// K-means iterations executed (0 when nothing was clustered).
    pub iterations: usize,
    /// Whether K-means stopped because no centroid moved.
    pub converged: bool,
}

impl PipelineResult {
    /// Codes that could not be located.
    #[must_use]
    pub fn unresolved_codes(&self) -> Vec<&str> {
        self.locations
            .iter()
            .filter(|l| !l.resolved)
            .map(|l| l.code.as_str())
            .collect()
    }

    /// Number of distinct codes that were located.
    #[must_use]
    pub fn resolved_count(&self) -> usize {
        self.locations.iter().filter(|l| l.resolved).count()
    }

    /// Number of distinct codes that could not be located.
    #[must_use]
    pub fn unresolved_count(&self) -> usize {
        self.locations.len() - self.resolved_count()
    }
}

/// Runs the full pipeline over `records`.
///
/// Returns an empty cluster list when no code resolves.
///
/// # Errors
///
/// * [`AnalysisError::KMeans`] if the cluster or iteration count is invalid
///   for the resolved data, or if `options.cancel` is raised mid-run. The
///   error keeps the resolved and unresolved codes and failed batches.
/// * [`AnalysisError::Worker`] if the clustering task panics
pub async fn run_pipeline<R: PostalRecord>(
    records: &[R],
    locator: &dyn PostcodeLocator,
    options: &PipelineOptions,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<PipelineResult, AnalysisError> {
    let counts = count_postal_codes(records);
    let codes: Vec<String> = counts.keys().cloned().collect();
    log::info!(
        "{} records carry {} distinct postal codes",
        records.len(),
        codes.len()
    );

    progress.set_total(codes.len() as u64);
    progress.set_message(format!("Resolving via {}", locator.describe()));
    let resolution = resolve_with_progress(locator, &codes, options.concurrent_batches, &|n| {
        progress.inc(n as u64);
    })
    .await;
    progress.finish(format!(
        "Resolved {} of {} postcodes",
        resolution.found_count(),
        codes.len()
    ));

    let locations: Vec<PostalLocation> = resolution
        .entries()
        .iter()
        .map(|(code, lookup)| {
            let weight = counts.get(code).copied().unwrap_or(0);
            lookup.coordinate().map_or_else(
                || PostalLocation::unresolved(code.as_str(), weight),
                |c| PostalLocation::resolved_at(code.as_str(), weight, c),
            )
        })
        .collect();
    let failed_batches = resolution.failures().to_vec();

    if !locations.iter().any(|l| l.resolved) {
        log::warn!("No postal codes resolved; nothing to cluster");
        return Ok(PipelineResult {
            clusters: Vec::new(),
            locations,
            failed_batches,
            iterations: 0,
            converged: false,
        });
    }

    let kmeans = KMeans::new(options.cluster_count, options.max_iterations);
    let seed = options.seed;
    let cancel = options.cancel.clone();
    let (clustering, locations) = tokio::task::spawn_blocking(move || {
        let mut rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        let clustering = kmeans.run_cancellable(&locations, &mut rng, &cancel);
        (clustering, locations)
    })
    .await?;

    let clustering = match clustering {
        Ok(clustering) => clustering,
        Err(source) => {
            log::warn!(
                "Clustering failed after resolving {} of {} postcodes: {source}",
                resolution.found_count(),
                codes.len()
            );
            return Err(AnalysisError::KMeans {
                source,
                partial: Box::new(PipelineResult {
                    clusters: Vec::new(),
                    locations,
                    failed_batches,
                    iterations: 0,
                    converged: false,
                }),
            });
        }
    };

    let mut clusters = clustering.clusters;
    if options.resolve_place_names {
        attach_place_names(&mut clusters, locator).await;
    }

    Ok(PipelineResult {
        clusters,
        locations,
        failed_batches,
        iterations: clustering.iterations,
        converged: clustering.converged,
    })
}

async fn attach_place_names(clusters: &mut [ClusterResult], locator: &dyn PostcodeLocator) {
    for cluster in clusters {
        match locator.nearest_place(&cluster.representative_code).await {
            Ok(name) => {
                log::debug!(
                    "Cluster around {} is in {}",
                    cluster.representative_code,
                    name.as_deref().unwrap_or("<unknown>")
                );
                cluster.representative_place_name = name;
            }
            Err(e) => {
                log::warn!(
                    "Place lookup for {} failed: {e}",
                    cluster.representative_code
                );
            }
        }
    }
}

/// Records whose postal code was looked up but could not be located.
///
/// Records without a postal code are not included; they never reach the
/// lookup stage.
pub fn records_with_unresolved_codes<'a, R: PostalRecord>(
    records: &'a [R],
    result: &PipelineResult,
) -> Vec<&'a R> {
    let unresolved: BTreeSet<&str> = result.unresolved_codes().into_iter().collect();
    records
        .iter()
        .filter(|r| normalized_postal_code(*r).is_some_and(|code| unresolved.contains(code)))
        .collect()
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Postcode geocoding for the clustering pipeline.
//!
//! Resolves postal codes to longitude/latitude through a
//! [`PostcodeLocator`]. Two locators are provided, selected via the TOML
//! files in `services/`:
//!
//! 1. **postcodes.io** ([`postcodes_io`]): free UK postcode API, bulk
//!    lookups of up to 100 postcodes per request.
//! 2. **Fixed table** ([`fixed_table`]): an in-memory table with six known
//!    UK postcodes, for tests and offline runs.
//!
//! [`batch::resolve`] splits any number of codes into provider-sized
//! batches. A failed batch only affects its own codes; everything already
//! resolved is kept.

pub mod batch;
pub mod fixed_table;
pub mod postcodes_io;
pub mod service_registry;

use async_trait::async_trait;
use postcode_cluster_models::Coordinate;
use thiserror::Error;

pub use batch::{BatchFailure, Lookup, Resolution, resolve, resolve_with_progress};

/// Maximum number of postcodes per upstream request (postcodes.io limit).
pub const MAX_BATCH_SIZE: usize = 100;

/// Errors from geocoding operations.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("Provider returned status {status}")]
    Status {
        /// HTTP status code returned.
        status: reqwest::StatusCode,
    },

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },

    /// A service configuration is unusable.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },
}

/// Resolves postal codes to coordinates.
///
/// Implementations must answer [`Self::lookup_batch`] positionally: entry
/// `i` of the result belongs to `codes[i]`.
#[async_trait]
pub trait PostcodeLocator: Send + Sync {
    /// Where lookups go (URL or table description), for status output.
    fn describe(&self) -> String;

    /// Largest batch accepted by [`Self::lookup_batch`].
    fn max_batch_size(&self) -> usize {
        MAX_BATCH_SIZE
    }

    /// Looks up one batch of postcodes in a single upstream request.
    ///
    /// Codes without a location yield `None`.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the request fails or the response cannot
    /// be parsed. No partial results are returned in that case.
    async fn lookup_batch(&self, codes: &[String]) -> Result<Vec<Option<Coordinate>>, GeocodeError>;

    /// Looks up the administrative place name for one postcode.
    ///
    /// This is an individual request per postcode, so callers should only
    /// use it for a handful of codes (e.g. one per cluster).
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the request fails or the response cannot
    /// be parsed.
    async fn nearest_place(&self, code: &str) -> Result<Option<String>, GeocodeError>;
}

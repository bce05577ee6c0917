#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Postcode analysis over imported records.
//!
//! Counts records per postal code, resolves the codes through a
//! [`PostcodeLocator`](postcode_cluster_geocoder::PostcodeLocator) and groups
//! them into geographic clusters. [`run_pipeline`] drives all stages;
//! [`records`] loads input from CSV.

pub mod count;
pub mod pipeline;
pub mod progress;
pub mod records;

use postcode_cluster_spatial::KMeansError;
use thiserror::Error;

pub use count::count_postal_codes;
pub use pipeline::{PipelineOptions, PipelineResult, records_with_unresolved_codes, run_pipeline};
pub use progress::{NullProgress, ProgressCallback, null_progress};

/// Errors that can occur during analysis.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Clustering rejected its input or was cancelled.
    ///
    /// `partial` holds everything gathered before clustering: the
    /// resolution state of every code and the failed batches, with no
    /// clusters.
    #[error("{source}")]
    KMeans {
        /// Why clustering failed.
        source: KMeansError,
        /// Lookup results from the same run.
        partial: Box<PipelineResult>,
    },

    /// CSV parsing error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The clustering worker task failed.
    #[error("Worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl AnalysisError {
    /// Lookup results gathered before the run failed, when there are any.
    #[must_use]
    pub fn partial_result(&self) -> Option<&PipelineResult> {
        match self {
            Self::KMeans { partial, .. } => Some(&**partial),
            Self::Csv(_) | Self::Io(_) | Self::Worker(_) => None,
        }
    }
}

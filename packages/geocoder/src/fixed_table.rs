//! In-memory postcode table.
//!
//! Answers lookups from a fixed map instead of the network. Used for tests,
//! demos and offline runs; codes missing from the table are reported as not
//! found, exactly like an unknown postcode upstream.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use postcode_cluster_models::Coordinate;

use crate::{GeocodeError, MAX_BATCH_SIZE, PostcodeLocator};

/// Six UK postcodes with their published coordinates.
pub const UK_SAMPLE: &[(&str, f64, f64)] = &[
    ("AB25 3UZ", -2.10764, 57.154_592),
    ("B75 6HJ", -1.799_339, 52.574_142),
    ("EH49 7LS", -3.560_637, 55.982_662),
    ("FY8 3TF", -3.008_877, 53.753_436),
    ("HP21 8PP", -0.828_588, 51.806_57),
    ("TN22 9EF", 0.086_443, 50.967_863),
];

/// Place name returned for every code unless overridden.
pub const DEFAULT_PLACE_NAME: &str = "TestTown";

/// Locator answering from an in-memory table.
#[derive(Debug)]
pub struct FixedTableLocator {
    entries: BTreeMap<String, Coordinate>,
    place_name: String,
    failing_codes: BTreeSet<String>,
    max_batch_size: usize,
    batch_calls: AtomicUsize,
    place_calls: AtomicUsize,
}

impl FixedTableLocator {
    /// Creates a table from `(code, coordinate)` pairs.
    pub fn new<S: Into<String>>(entries: impl IntoIterator<Item = (S, Coordinate)>) -> Self {
        Self {
            entries: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            place_name: DEFAULT_PLACE_NAME.to_string(),
            failing_codes: BTreeSet::new(),
            max_batch_size: MAX_BATCH_SIZE,
            batch_calls: AtomicUsize::new(0),
            place_calls: AtomicUsize::new(0),
        }
    }

    /// The [`UK_SAMPLE`] table.
    #[must_use]
    pub fn uk_sample() -> Self {
        Self::new(
            UK_SAMPLE
                .iter()
                .map(|&(code, lon, lat)| (code, Coordinate::new(lon, lat))),
        )
    }

    /// Sets the place name returned by [`PostcodeLocator::nearest_place`]
    /// for codes in the table.
    #[must_use]
    pub fn with_place_name(mut self, place_name: impl Into<String>) -> Self {
        self.place_name = place_name.into();
        self
    }

    /// Makes any batch containing `code` fail as a whole, the way a
    /// malformed upstream response would.
    #[must_use]
    pub fn with_failing_code(mut self, code: impl Into<String>) -> Self {
        self.failing_codes.insert(code.into());
        self
    }

    /// Overrides the batch size.
    #[must_use]
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size.max(1);
        self
    }

    /// Number of entries in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of [`PostcodeLocator::lookup_batch`] calls so far.
    #[must_use]
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::Relaxed)
    }

    /// Number of [`PostcodeLocator::nearest_place`] calls so far.
    #[must_use]
    pub fn place_calls(&self) -> usize {
        self.place_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PostcodeLocator for FixedTableLocator {
    fn describe(&self) -> String {
        format!("<local test data set with {} entries>", self.entries.len())
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    async fn lookup_batch(&self, codes: &[String]) -> Result<Vec<Option<Coordinate>>, GeocodeError> {
        self.batch_calls.fetch_add(1, Ordering::Relaxed);

        if let Some(bad) = codes.iter().find(|c| self.failing_codes.contains(*c)) {
            return Err(GeocodeError::Parse {
                message: format!("Simulated failure for batch containing '{bad}'"),
            });
        }

        Ok(codes.iter().map(|c| self.entries.get(c).copied()).collect())
    }

    async fn nearest_place(&self, code: &str) -> Result<Option<String>, GeocodeError> {
        self.place_calls.fetch_add(1, Ordering::Relaxed);

        if self.failing_codes.contains(code) {
            return Err(GeocodeError::Parse {
                message: format!("Simulated place lookup failure for '{code}'"),
            });
        }

        if !self.entries.contains_key(code) {
            return Ok(None);
        }

        Ok(Some(self.place_name.clone()))
    }
}

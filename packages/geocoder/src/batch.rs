//! Batched resolution of many postcodes.
//!
//! Codes are split into [`PostcodeLocator::max_batch_size`] chunks and sent
//! one request per chunk. Chunks are independent: a transport or parse
//! failure marks that chunk's codes [`Lookup::Failed`] and the run carries
//! on with the next one. Results always line up with the input order, even
//! when several chunks are in flight at once.

use futures::stream::{self, StreamExt as _};
use postcode_cluster_models::Coordinate;
use serde::Serialize;

use crate::PostcodeLocator;

/// Outcome of looking up a single postcode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup {
    /// The provider returned a location.
    Found(Coordinate),
    /// The provider answered but has no location for this code.
    NotFound,
    /// The batch containing this code failed; its location is unknown.
    Failed,
}

impl Lookup {
    /// The coordinate, if found.
    #[must_use]
    pub const fn coordinate(&self) -> Option<Coordinate> {
        match self {
            Self::Found(c) => Some(*c),
            Self::NotFound | Self::Failed => None,
        }
    }
}

/// A batch that could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    /// Zero-based index of the batch within the run.
    pub batch_index: usize,
    /// Codes in the failed batch.
    pub codes: Vec<String>,
    /// Error description.
    pub message: String,
}

/// Per-code results of a [`resolve`] run, in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    entries: Vec<(String, Lookup)>,
    failures: Vec<BatchFailure>,
}

impl Resolution {
    /// Every input code with its outcome, in input order.
    #[must_use]
    pub fn entries(&self) -> &[(String, Lookup)] {
        &self.entries
    }

    /// Batches that failed.
    #[must_use]
    pub fn failures(&self) -> &[BatchFailure] {
        &self.failures
    }

    /// Outcome for `code`, if it was part of the input.
    #[must_use]
    pub fn lookup(&self, code: &str) -> Option<Lookup> {
        self.entries
            .iter()
            .find(|(c, _)| c == code)
            .map(|(_, lookup)| *lookup)
    }

    /// Codes that resolved, with their coordinates.
    pub fn found(&self) -> impl Iterator<Item = (&str, Coordinate)> {
        self.entries
            .iter()
            .filter_map(|(code, lookup)| lookup.coordinate().map(|c| (code.as_str(), c)))
    }

    /// Codes that did not resolve, whether not found or in a failed batch.
    #[must_use]
    pub fn unresolved_codes(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, lookup)| lookup.coordinate().is_none())
            .map(|(code, _)| code.as_str())
            .collect()
    }

    /// Number of codes that resolved.
    #[must_use]
    pub fn found_count(&self) -> usize {
        self.count(|l| matches!(l, Lookup::Found(_)))
    }

    /// Number of codes the provider did not know.
    #[must_use]
    pub fn not_found_count(&self) -> usize {
        self.count(|l| matches!(l, Lookup::NotFound))
    }

    /// Number of codes lost to failed batches.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.count(|l| matches!(l, Lookup::Failed))
    }

    fn count(&self, predicate: impl Fn(&Lookup) -> bool) -> usize {
        self.entries.iter().filter(|(_, l)| predicate(l)).count()
    }
}

/// Resolves `codes` in batches, running up to `concurrency` batches at once.
///
/// Never fails: batch errors are logged and recorded in
/// [`Resolution::failures`].
pub async fn resolve(
    locator: &dyn PostcodeLocator,
    codes: &[String],
    concurrency: usize,
) -> Resolution {
    resolve_with_progress(locator, codes, concurrency, &|_| {}).await
}

/// Like [`resolve`], calling `on_batch` with the number of codes in each
/// batch as it completes.
pub async fn resolve_with_progress(
    locator: &dyn PostcodeLocator,
    codes: &[String],
    concurrency: usize,
    on_batch: &(dyn Fn(usize) + Send + Sync),
) -> Resolution {
    let batch_size = locator.max_batch_size().max(1);
    let concurrency = concurrency.max(1);

    log::info!(
        "Resolving {} postcodes via {} (batch size {batch_size}, concurrency {concurrency})",
        codes.len(),
        locator.describe(),
    );

    let batches: Vec<_> = stream::iter(codes.chunks(batch_size).enumerate().map(
        |(batch_index, chunk)| async move {
            let result = locator.lookup_batch(chunk).await;
            on_batch(chunk.len());
            (batch_index, chunk, result)
        },
    ))
    .buffered(concurrency)
    .collect()
    .await;

    let mut resolution = Resolution {
        entries: Vec::with_capacity(codes.len()),
        failures: Vec::new(),
    };

    for (batch_index, chunk, result) in batches {
        let failure = match result {
            Ok(found) if found.len() == chunk.len() => {
                resolution.entries.extend(chunk.iter().zip(found).map(|(code, coord)| {
                    let lookup = coord.map_or_else(
                        || {
                            log::debug!("No location for postcode '{code}'");
                            Lookup::NotFound
                        },
                        Lookup::Found,
                    );
                    (code.clone(), lookup)
                }));
                None
            }
            Ok(found) => Some(format!(
                "Provider returned {} results for {} postcodes",
                found.len(),
                chunk.len()
            )),
            Err(e) => Some(e.to_string()),
        };

        if let Some(message) = failure {
            log::warn!(
                "Postcode batch {batch_index} ({} codes) failed: {message}",
                chunk.len()
            );
            resolution
                .entries
                .extend(chunk.iter().map(|code| (code.clone(), Lookup::Failed)));
            resolution.failures.push(BatchFailure {
                batch_index,
                codes: chunk.to_vec(),
                message,
            });
        }
    }

    log::info!(
        "Resolved {} of {} postcodes ({} not found, {} in {} failed batches)",
        resolution.found_count(),
        codes.len(),
        resolution.not_found_count(),
        resolution.failed_count(),
        resolution.failures.len(),
    );

    resolution
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::fixed_table::{FixedTableLocator, UK_SAMPLE};

    use super::*;

    fn generated_codes(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("ZZ{i} 1AA")).collect()
    }

    fn generated_table(n: usize) -> FixedTableLocator {
        FixedTableLocator::new((0..n).map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let offset = i as f64 * 0.001;
            (format!("ZZ{i} 1AA"), Coordinate::new(-1.0 - offset, 52.0 + offset))
        }))
    }

    #[tokio::test]
    async fn splits_into_batches_of_one_hundred() {
        let table = generated_table(250);
        let codes = generated_codes(250);

        let resolution = resolve(&table, &codes, 1).await;

        assert_eq!(table.batch_calls(), 3);
        assert_eq!(resolution.entries().len(), 250);
        assert_eq!(resolution.found_count(), 250);
        assert!(resolution.failures().is_empty());
    }

    #[tokio::test]
    async fn invalid_code_is_unresolved_without_affecting_siblings() {
        let table = FixedTableLocator::uk_sample();
        let codes = vec![
            "AB25 3UZ".to_string(),
            "THIS IS NOT A POSTCODE".to_string(),
            "TN22 9EF".to_string(),
        ];

        let resolution = resolve(&table, &codes, 1).await;

        assert_eq!(
            resolution.lookup("AB25 3UZ"),
            Some(Lookup::Found(Coordinate::new(-2.10764, 57.154_592)))
        );
        assert_eq!(
            resolution.lookup("THIS IS NOT A POSTCODE"),
            Some(Lookup::NotFound)
        );
        assert_eq!(
            resolution.lookup("TN22 9EF"),
            Some(Lookup::Found(Coordinate::new(0.086_443, 50.967_863)))
        );
        assert_eq!(resolution.unresolved_codes(), vec!["THIS IS NOT A POSTCODE"]);
        assert!(resolution.failures().is_empty());
    }

    #[tokio::test]
    async fn failed_batch_keeps_other_batches() {
        let table = generated_table(250).with_failing_code("ZZ150 1AA");
        let codes = generated_codes(250);

        let resolution = resolve(&table, &codes, 1).await;

        assert_eq!(resolution.failures().len(), 1);
        let failure = &resolution.failures()[0];
        assert_eq!(failure.batch_index, 1);
        assert_eq!(failure.codes.len(), 100);
        assert_eq!(failure.codes[0], "ZZ100 1AA");

        assert_eq!(resolution.found_count(), 150);
        assert_eq!(resolution.failed_count(), 100);
        assert_eq!(resolution.lookup("ZZ99 1AA").map(|l| l.coordinate().is_some()), Some(true));
        assert_eq!(resolution.lookup("ZZ120 1AA"), Some(Lookup::Failed));
        assert_eq!(resolution.lookup("ZZ200 1AA").map(|l| l.coordinate().is_some()), Some(true));
    }

    #[tokio::test]
    async fn failed_codes_are_never_defaulted_to_origin() {
        let table = FixedTableLocator::uk_sample().with_failing_code("AB25 3UZ");
        let codes: Vec<String> = UK_SAMPLE.iter().map(|(c, _, _)| (*c).to_string()).collect();

        let resolution = resolve(&table, &codes, 1).await;

        assert_eq!(resolution.found().count(), 0);
        assert_eq!(resolution.failed_count(), 6);
        assert!(
            resolution
                .entries()
                .iter()
                .all(|(_, l)| *l == Lookup::Failed)
        );
    }

    #[tokio::test]
    async fn concurrent_batches_keep_input_order() {
        let table = generated_table(530).with_max_batch_size(50);
        let codes = generated_codes(530);

        let resolution = resolve(&table, &codes, 4).await;

        assert_eq!(table.batch_calls(), 11);
        let resolved: Vec<&str> = resolution.entries().iter().map(|(c, _)| c.as_str()).collect();
        let expected: Vec<&str> = codes.iter().map(String::as_str).collect();
        assert_eq!(resolved, expected);
        for (i, (_, lookup)) in resolution.entries().iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let expected = Coordinate::new(-1.0 - i as f64 * 0.001, 52.0 + i as f64 * 0.001);
            assert_eq!(*lookup, Lookup::Found(expected));
        }
    }

    #[tokio::test]
    async fn reports_progress_per_batch() {
        let table = generated_table(120);
        let codes = generated_codes(120);
        let seen = AtomicUsize::new(0);

        resolve_with_progress(&table, &codes, 1, &|n| {
            seen.fetch_add(n, Ordering::Relaxed);
        })
        .await;

        assert_eq!(seen.load(Ordering::Relaxed), 120);
    }

    #[tokio::test]
    async fn empty_input_makes_no_requests() {
        let table = FixedTableLocator::uk_sample();
        let resolution = resolve(&table, &[], 1).await;
        assert!(resolution.entries().is_empty());
        assert_eq!(table.batch_calls(), 0);
    }
}

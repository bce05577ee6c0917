//! Grouping records by postal code.

use std::collections::BTreeMap;

use postcode_cluster_models::PostalRecord;

/// The record's postal code with surrounding whitespace removed, or `None`
/// if it is missing or blank.
pub fn normalized_postal_code<R: PostalRecord + ?Sized>(record: &R) -> Option<&str> {
    record
        .postal_code()
        .map(str::trim)
        .filter(|code| !code.is_empty())
}

/// Counts how many records carry each postal code.
///
/// Records without a postal code (missing, empty or whitespace only) are
/// skipped. Keys are sorted, which fixes the order codes are geocoded in.
pub fn count_postal_codes<R: PostalRecord>(records: &[R]) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    let mut skipped = 0_usize;

    for record in records {
        match normalized_postal_code(record) {
            Some(code) => *counts.entry(code.to_string()).or_insert(0) += 1,
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        log::debug!("Skipped {skipped} records without a postal code");
    }

    counts
}

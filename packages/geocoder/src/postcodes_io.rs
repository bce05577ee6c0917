//! postcodes.io client.
//!
//! - Bulk: `POST /postcodes?filter=postcode,longitude,latitude` with
//!   `{"postcodes": [...]}` (up to 100 per request)
//! - Single: `GET /postcodes/{postcode}` for the administrative district
//!
//! No API key required. Terminated postcodes and postcodes without a
//! published location come back with a `null` result (or `null`
//! coordinates) and are reported as not found.
//!
//! See <https://postcodes.io/docs>

use async_trait::async_trait;
use postcode_cluster_models::Coordinate;
use serde::{Deserialize, Serialize};

use crate::{GeocodeError, MAX_BATCH_SIZE, PostcodeLocator};

/// Public postcodes.io endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.postcodes.io";

/// Field of the single-postcode response used as the place name.
const PLACE_NAME_FIELD: &str = "admin_district";

/// Live locator backed by postcodes.io.
#[derive(Debug, Clone)]
pub struct PostcodesIoLocator {
    client: reqwest::Client,
    base_url: String,
    max_batch_size: usize,
}

impl PostcodesIoLocator {
    /// Creates a locator against `base_url` (without trailing slash).
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_batch_size: MAX_BATCH_SIZE,
        }
    }

    /// Overrides the batch size, capped at [`MAX_BATCH_SIZE`].
    #[must_use]
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    /// The configured base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Serialize)]
struct BulkRequest<'a> {
    postcodes: &'a [String],
}

#[derive(Deserialize)]
struct BulkResponse {
    result: Vec<BulkEntry>,
}

#[derive(Deserialize)]
struct BulkEntry {
    #[serde(default)]
    query: Option<String>,
    result: Option<PostcodeHit>,
}

#[derive(Deserialize)]
struct PostcodeHit {
    longitude: Option<f64>,
    latitude: Option<f64>,
}

#[async_trait]
impl PostcodeLocator for PostcodesIoLocator {
    fn describe(&self) -> String {
        format!("{}/postcodes", self.base_url)
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    async fn lookup_batch(&self, codes: &[String]) -> Result<Vec<Option<Coordinate>>, GeocodeError> {
        if codes.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/postcodes", self.base_url);
        let resp = self
            .client
            .post(&url)
            .query(&[("filter", "postcode,longitude,latitude")])
            .json(&BulkRequest { postcodes: codes })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(GeocodeError::Status { status });
        }

        let body = resp.text().await?;
        parse_bulk_response(codes, &body)
    }

    async fn nearest_place(&self, code: &str) -> Result<Option<String>, GeocodeError> {
        let url = format!("{}/postcodes/{}", self.base_url, encode_path_segment(code));
        let resp = self.client.get(&url).send().await?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(GeocodeError::Status { status });
        }

        let body: serde_json::Value = resp.json().await?;
        parse_place_response(&body)
    }
}

/// Parses a bulk lookup response, aligned with the requested `codes`.
fn parse_bulk_response(
    codes: &[String],
    body: &str,
) -> Result<Vec<Option<Coordinate>>, GeocodeError> {
    let parsed: BulkResponse = serde_json::from_str(body).map_err(|e| GeocodeError::Parse {
        message: format!("Invalid bulk response: {e}"),
    })?;

    if parsed.result.len() != codes.len() {
        return Err(GeocodeError::Parse {
            message: format!(
                "Bulk response has {} entries for {} postcodes",
                parsed.result.len(),
                codes.len()
            ),
        });
    }

    Ok(parsed
        .result
        .into_iter()
        .zip(codes)
        .map(|(entry, code)| {
            if let Some(query) = entry.query.as_deref().filter(|q| q != code) {
                log::debug!("postcodes.io echoed query '{query}' for '{code}'");
            }
            entry.result.and_then(|hit| match (hit.longitude, hit.latitude) {
                (Some(lon), Some(lat)) => Some(Coordinate::new(lon, lat)),
                _ => {
                    log::debug!("postcodes.io has no coordinates for '{code}'");
                    None
                }
            })
        })
        .collect())
}

/// Extracts the administrative district from a single-postcode response.
fn parse_place_response(body: &serde_json::Value) -> Result<Option<String>, GeocodeError> {
    let result = body
        .get("result")
        .and_then(serde_json::Value::as_object)
        .ok_or_else(|| GeocodeError::Parse {
            message: "Missing 'result' object".to_string(),
        })?;

    match result.get(PLACE_NAME_FIELD) {
        Some(serde_json::Value::String(name)) => Ok(Some(name.clone())),
        Some(serde_json::Value::Null) => Ok(None),
        Some(other) => Err(GeocodeError::Parse {
            message: format!("'{PLACE_NAME_FIELD}' is not a string: {other}"),
        }),
        None => Err(GeocodeError::Parse {
            message: format!("Missing '{PLACE_NAME_FIELD}'"),
        }),
    }
}

/// Percent-encodes a postcode for use as a URL path segment.
fn encode_path_segment(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.trim().bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(char::from(b));
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codes(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn parses_bulk_response_positionally() {
        let body = r#"{
            "status": 200,
            "result": [
                {"query": "AB25 3UZ", "result": {"postcode": "AB25 3UZ", "longitude": -2.10764, "latitude": 57.154592}},
                {"query": "NOTAPOSTCODE", "result": null},
                {"query": "TN22 9EF", "result": {"postcode": "TN22 9EF", "longitude": 0.086443, "latitude": 50.967863}}
            ]
        }"#;
        let result =
            parse_bulk_response(&codes(&["AB25 3UZ", "NOTAPOSTCODE", "TN22 9EF"]), body).unwrap();

        assert_eq!(result.len(), 3);
        assert_eq!(result[0], Some(Coordinate::new(-2.10764, 57.154_592)));
        assert_eq!(result[1], None);
        assert_eq!(result[2], Some(Coordinate::new(0.086_443, 50.967_863)));
    }

    #[test]
    fn null_coordinates_are_not_found() {
        let body = r#"{"status": 200, "result": [
            {"query": "BN27 1AJ", "result": {"postcode": "BN27 1AJ", "longitude": null, "latitude": null}}
        ]}"#;
        let result = parse_bulk_response(&codes(&["BN27 1AJ"]), body).unwrap();
        assert_eq!(result, vec![None]);
    }

    #[test]
    fn length_mismatch_is_a_parse_error() {
        let body = r#"{"status": 200, "result": [{"query": "A", "result": null}]}"#;
        let err = parse_bulk_response(&codes(&["A", "B"]), body).unwrap_err();
        assert!(matches!(err, GeocodeError::Parse { .. }));
    }

    #[test]
    fn malformed_body_is_a_parse_error() {
        let err = parse_bulk_response(&codes(&["A"]), "<html>oops</html>").unwrap_err();
        assert!(matches!(err, GeocodeError::Parse { .. }));
    }

    #[test]
    fn parses_place_name() {
        let body = serde_json::json!({
            "status": 200,
            "result": { "postcode": "AB25 3UZ", "admin_district": "Aberdeen City" }
        });
        assert_eq!(
            parse_place_response(&body).unwrap().as_deref(),
            Some("Aberdeen City")
        );
    }

    #[test]
    fn null_place_name_is_none() {
        let body = serde_json::json!({ "result": { "admin_district": null } });
        assert!(parse_place_response(&body).unwrap().is_none());
    }

    #[test]
    fn missing_place_fields_are_parse_errors() {
        let no_result = serde_json::json!({ "status": 200 });
        assert!(parse_place_response(&no_result).is_err());

        let no_district = serde_json::json!({ "result": { "postcode": "X" } });
        assert!(parse_place_response(&no_district).is_err());
    }

    #[test]
    fn encodes_postcode_path_segment() {
        assert_eq!(encode_path_segment("AB25 3UZ"), "AB25%203UZ");
        assert_eq!(encode_path_segment(" TN22 9EF "), "TN22%209EF");
        assert_eq!(encode_path_segment("a/b"), "a%2Fb");
    }

    #[test]
    fn trims_trailing_slash_and_caps_batch_size() {
        let locator = PostcodesIoLocator::new(reqwest::Client::new(), "http://localhost:8000/")
            .with_max_batch_size(500);
        assert_eq!(locator.base_url(), "http://localhost:8000");
        assert_eq!(locator.max_batch_size(), MAX_BATCH_SIZE);
        assert_eq!(locator.describe(), "http://localhost:8000/postcodes");
    }
}

//! Compile-time registry of postcode lookup service configurations.
//!
//! Each provider is defined in a TOML file under `services/`. The registry
//! embeds these at compile time and exposes them via [`all_services`] and
//! [`enabled_services`]. [`locator_for`] turns a configuration into a ready
//! [`PostcodeLocator`].

use std::time::Duration;

use serde::Deserialize;

use crate::fixed_table::FixedTableLocator;
use crate::postcodes_io::PostcodesIoLocator;
use crate::{GeocodeError, MAX_BATCH_SIZE, PostcodeLocator};

/// Environment variable overriding the postcodes.io base URL.
pub const BASE_URL_ENV: &str = "POSTCODES_IO_BASE_URL";

/// A postcode lookup service configuration loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct GeocodingService {
    /// Unique identifier (e.g., `"postcodes_io"`, `"fixed_table"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Whether this service can be selected.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Preference order when no service is named, lower values first.
    pub priority: u32,
    /// Provider-specific configuration.
    pub provider: ProviderConfig,
}

/// Provider-specific configuration, tagged by `type` in TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// postcodes.io bulk lookup API.
    PostcodesIo {
        /// API base URL (e.g., `"https://api.postcodes.io"`).
        base_url: String,
        /// Maximum postcodes per bulk request.
        max_batch_size: usize,
        /// Number of bulk requests in flight at once.
        #[serde(default = "default_concurrent")]
        concurrent_batches: usize,
        /// Per-request timeout in seconds.
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
    /// In-memory sample table.
    FixedTable {
        /// Place name returned for every representative postcode.
        #[serde(default = "default_place_name")]
        place_name: String,
    },
}

const fn default_true() -> bool {
    true
}

const fn default_concurrent() -> usize {
    1
}

const fn default_timeout_secs() -> u64 {
    30
}

fn default_place_name() -> String {
    crate::fixed_table::DEFAULT_PLACE_NAME.to_string()
}

impl GeocodingService {
    /// Returns the provider's base URL, or an empty string for local
    /// providers.
    #[must_use]
    pub fn base_url(&self) -> &str {
        match &self.provider {
            ProviderConfig::PostcodesIo { base_url, .. } => base_url,
            ProviderConfig::FixedTable { .. } => "",
        }
    }

    /// How many batches may be in flight at once.
    #[must_use]
    pub fn concurrent_batches(&self) -> usize {
        match &self.provider {
            ProviderConfig::PostcodesIo {
                concurrent_batches, ..
            } => (*concurrent_batches).max(1),
            ProviderConfig::FixedTable { .. } => 1,
        }
    }
}

// ── Compile-time embedded TOML files ────────────────────────────────

const SERVICE_TOMLS: &[(&str, &str)] = &[
    ("postcodes_io", include_str!("../services/postcodes_io.toml")),
    ("fixed_table", include_str!("../services/fixed_table.toml")),
];

#[cfg(test)]
const EXPECTED_SERVICE_COUNT: usize = 2;

/// Returns all service configurations (enabled and disabled).
///
/// # Panics
///
/// Panics if any TOML config is malformed (this is a compile-time guarantee
/// since the configs are embedded).
#[must_use]
pub fn all_services() -> Vec<GeocodingService> {
    SERVICE_TOMLS
        .iter()
        .map(|(name, toml_str)| {
            toml::de::from_str(toml_str)
                .unwrap_or_else(|e| panic!("Failed to parse geocoding service '{name}': {e}"))
        })
        .collect()
}

/// Returns only enabled services, sorted by priority (ascending).
#[must_use]
pub fn enabled_services() -> Vec<GeocodingService> {
    let mut services: Vec<GeocodingService> =
        all_services().into_iter().filter(|s| s.enabled).collect();
    services.sort_by_key(|s| s.priority);
    services
}

/// Finds an enabled service by id.
#[must_use]
pub fn find_service(id: &str) -> Option<GeocodingService> {
    enabled_services().into_iter().find(|s| s.id == id)
}

/// Builds the locator described by `service`.
///
/// For postcodes.io the `POSTCODES_IO_BASE_URL` environment variable, when
/// set and non-empty, replaces the configured base URL.
///
/// # Errors
///
/// Returns [`GeocodeError::Config`] if the batch size is out of range, or
/// [`GeocodeError::Http`] if the HTTP client cannot be built.
pub fn locator_for(service: &GeocodingService) -> Result<Box<dyn PostcodeLocator>, GeocodeError> {
    match &service.provider {
        ProviderConfig::PostcodesIo {
            base_url,
            max_batch_size,
            timeout_secs,
            ..
        } => {
            if *max_batch_size == 0 || *max_batch_size > MAX_BATCH_SIZE {
                return Err(GeocodeError::Config {
                    message: format!(
                        "Service '{}' max_batch_size must be 1..={MAX_BATCH_SIZE}, got {max_batch_size}",
                        service.id
                    ),
                });
            }

            let base_url = std::env::var(BASE_URL_ENV)
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| base_url.clone());

            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(*timeout_secs))
                .build()?;

            log::debug!("Using postcodes.io at {base_url}");
            Ok(Box::new(
                PostcodesIoLocator::new(client, base_url).with_max_batch_size(*max_batch_size),
            ))
        }
        ProviderConfig::FixedTable { place_name } => Ok(Box::new(
            FixedTableLocator::uk_sample().with_place_name(place_name.clone()),
        )),
    }
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared data types for postcode clustering.
//!
//! These types flow through every stage of the pipeline: imported records
//! are counted into [`PostalLocation`]s, the geocoder fills in their
//! coordinates, and the clustering engine produces [`ClusterResult`]s.

use serde::{Deserialize, Serialize};

/// A geodetic position in decimal degrees (WGS84).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinate {
    /// Longitude in degrees, east positive.
    pub longitude: f64,
    /// Latitude in degrees, north positive.
    pub latitude: f64,
}

impl Coordinate {
    /// Creates a coordinate from longitude and latitude in degrees.
    #[must_use]
    pub const fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }
}

/// A distinct postal code together with how many records carry it and,
/// once geocoded, where it is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostalLocation {
    /// The postal code, unique within a pipeline run.
    pub code: String,
    /// Longitude in degrees. Meaningless while `resolved` is `false`.
    pub longitude: f64,
    /// Latitude in degrees. Meaningless while `resolved` is `false`.
    pub latitude: f64,
    /// Number of imported records sharing this postal code.
    pub weight: u64,
    /// Whether a coordinate lookup succeeded for this code.
    pub resolved: bool,
}

impl PostalLocation {
    /// Creates an entry that has not been geocoded yet.
    #[must_use]
    pub fn unresolved(code: impl Into<String>, weight: u64) -> Self {
        Self {
            code: code.into(),
            longitude: 0.0,
            latitude: 0.0,
            weight,
            resolved: false,
        }
    }

    /// Creates an entry resolved to `coordinate`.
    #[must_use]
    pub fn resolved_at(code: impl Into<String>, weight: u64, coordinate: Coordinate) -> Self {
        Self {
            code: code.into(),
            longitude: coordinate.longitude,
            latitude: coordinate.latitude,
            weight,
            resolved: true,
        }
    }

    /// Returns the coordinate if this entry has been resolved.
    #[must_use]
    pub const fn coordinate(&self) -> Option<Coordinate> {
        if self.resolved {
            Some(Coordinate::new(self.longitude, self.latitude))
        } else {
            None
        }
    }
}

/// One cluster produced by a clustering run.
///
/// `members` is never empty: clusters that lose all of their members
/// during clustering are dropped instead of being reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterResult {
    /// Centroid longitude in degrees.
    pub centroid_longitude: f64,
    /// Centroid latitude in degrees.
    pub centroid_latitude: f64,
    /// Postal locations assigned to this cluster, in input order.
    pub members: Vec<PostalLocation>,
    /// Code of the member closest to the centroid.
    pub representative_code: String,
    /// Administrative place name of the representative code, when looked up.
    pub representative_place_name: Option<String>,
}

impl ClusterResult {
    /// The centroid as a [`Coordinate`].
    #[must_use]
    pub const fn centroid(&self) -> Coordinate {
        Coordinate::new(self.centroid_longitude, self.centroid_latitude)
    }

    /// Number of distinct postal codes in the cluster.
    #[must_use]
    pub fn postcode_count(&self) -> usize {
        self.members.len()
    }

    /// Number of underlying records in the cluster (sum of member weights).
    #[must_use]
    pub fn record_count(&self) -> u64 {
        self.members.iter().map(|m| m.weight).sum()
    }

    /// Whether `code` is one of this cluster's members.
    #[must_use]
    pub fn contains(&self, code: &str) -> bool {
        self.members.iter().any(|m| m.code == code)
    }
}

/// Anything that carries an optional postal code.
///
/// The pipeline only needs the postal code field, so callers can feed it
/// their own record types.
pub trait PostalRecord {
    /// The record's postal code, if any.
    fn postal_code(&self) -> Option<&str>;
}

/// An imported person/company record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataEntry {
    /// First name.
    pub first_name: Option<String>,
    /// Last name.
    pub last_name: Option<String>,
    /// Company name.
    pub company_name: Option<String>,
    /// Street address.
    pub address: Option<String>,
    /// City.
    pub city: Option<String>,
    /// County.
    pub county: Option<String>,
    /// Postal code.
    pub postal: Option<String>,
    /// Primary phone number.
    pub phone1: Option<String>,
    /// Secondary phone number.
    pub phone2: Option<String>,
    /// Email address.
    pub email: Option<String>,
    /// Website URL.
    #[serde(rename = "web")]
    pub website: Option<String>,
}

impl DataEntry {
    /// Creates an otherwise empty record with the given postal code.
    #[must_use]
    pub fn with_postal(postal: Option<&str>) -> Self {
        Self {
            postal: postal.map(String::from),
            ..Self::default()
        }
    }
}

impl PostalRecord for DataEntry {
    fn postal_code(&self) -> Option<&str> {
        self.postal.as_deref()
    }
}

impl<T: PostalRecord + ?Sized> PostalRecord for &T {
    fn postal_code(&self) -> Option<&str> {
        (**self).postal_code()
    }
}

//! Conversions between geodetic degrees and points on the unit sphere.
//!
//! Averaging longitudes and latitudes directly breaks down near the poles
//! and across the antimeridian, so clustering works on 3D Cartesian points
//! and converts back to degrees only for reporting.
//!
//! At exactly ±90° latitude the longitude is undefined: [`to_geodetic`]
//! returns whatever `atan2(0, 0)` yields (0°) for those points. The origin
//! itself has no latitude either: [`to_geodetic`] returns NaN for it.

use postcode_cluster_models::Coordinate;
use rand::Rng;
use thiserror::Error;

/// A point in 3D Cartesian space, normally on (or inside) the unit sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CartesianPoint {
    /// X component (towards lon 0°, lat 0°).
    pub x: f64,
    /// Y component (towards lon 90°E, lat 0°).
    pub y: f64,
    /// Z component (towards the north pole).
    pub z: f64,
}

impl CartesianPoint {
    /// Creates a point from its components.
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Squared Euclidean distance to `other`.
    ///
    /// On the unit sphere this orders points the same way as great-circle
    /// distance.
    #[must_use]
    pub fn distance_sq(&self, other: &Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dz.mul_add(dz, dx.mul_add(dx, dy * dy))
    }
}

/// Errors from coordinate arithmetic.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoordError {
    /// An average was requested over no points.
    #[error("Cannot average an empty set of points")]
    EmptyInput,
}

/// Converts degrees of longitude/latitude to a point on the unit sphere.
#[must_use]
pub fn to_cartesian(lon_deg: f64, lat_deg: f64) -> CartesianPoint {
    let lon = lon_deg.to_radians();
    let lat = lat_deg.to_radians();
    let lat_cos = lat.cos();
    CartesianPoint::new(lat_cos * lon.cos(), lat_cos * lon.sin(), lat.sin())
}

/// Converts a [`Coordinate`] to a point on the unit sphere.
#[must_use]
pub fn coordinate_to_cartesian(coordinate: Coordinate) -> CartesianPoint {
    to_cartesian(coordinate.longitude, coordinate.latitude)
}

/// Converts a Cartesian point back to degrees.
///
/// The point does not need unit length; it is projected radially onto the
/// sphere. The origin has no direction and yields NaN latitude; a
/// weighted average of members that cancel out lands there, so callers
/// reporting averages must handle it (see `kmeans`).
#[must_use]
pub fn to_geodetic(point: CartesianPoint) -> Coordinate {
    let CartesianPoint { x, y, z } = point;
    let r = z.mul_add(z, x.mul_add(x, y * y)).sqrt();
    let lon = y.atan2(x);
    let lat = (z / r).asin();
    Coordinate::new(lon.to_degrees(), lat.to_degrees())
}

/// Weighted component-wise mean of `points`.
///
/// If every weight is zero the plain mean is returned instead, so a group
/// of zero-weight points still has a position.
///
/// # Errors
///
/// Returns [`CoordError::EmptyInput`] if `points` is empty.
#[allow(clippy::cast_precision_loss)]
pub fn weighted_average(points: &[(CartesianPoint, f64)]) -> Result<CartesianPoint, CoordError> {
    if points.is_empty() {
        return Err(CoordError::EmptyInput);
    }

    let total: f64 = points.iter().map(|(_, w)| w).sum();
    if total <= 0.0 {
        let n = points.len() as f64;
        let (sx, sy, sz) = points.iter().fold((0.0, 0.0, 0.0), |(sx, sy, sz), (p, _)| {
            (sx + p.x, sy + p.y, sz + p.z)
        });
        return Ok(CartesianPoint::new(sx / n, sy / n, sz / n));
    }

    let (sx, sy, sz) = points
        .iter()
        .fold((0.0, 0.0, 0.0), |(sx, sy, sz), (p, w)| {
            (p.x.mul_add(*w, sx), p.y.mul_add(*w, sy), p.z.mul_add(*w, sz))
        });
    Ok(CartesianPoint::new(sx / total, sy / total, sz / total))
}

/// An axis-aligned longitude/latitude rectangle in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Westernmost longitude.
    pub min_longitude: f64,
    /// Easternmost longitude.
    pub max_longitude: f64,
    /// Southernmost latitude.
    pub min_latitude: f64,
    /// Northernmost latitude.
    pub max_latitude: f64,
}

impl Bounds {
    /// Smallest rectangle containing every coordinate, or `None` when the
    /// iterator is empty.
    ///
    /// Longitude and latitude extents are computed independently, so the
    /// box does not wrap across the antimeridian.
    pub fn enclosing(coordinates: impl IntoIterator<Item = Coordinate>) -> Option<Self> {
        coordinates.into_iter().fold(None, |acc, c| {
            Some(acc.map_or(
                Self {
                    min_longitude: c.longitude,
                    max_longitude: c.longitude,
                    min_latitude: c.latitude,
                    max_latitude: c.latitude,
                },
                |b: Self| Self {
                    min_longitude: b.min_longitude.min(c.longitude),
                    max_longitude: b.max_longitude.max(c.longitude),
                    min_latitude: b.min_latitude.min(c.latitude),
                    max_latitude: b.max_latitude.max(c.latitude),
                },
            ))
        })
    }
}

/// Draws a coordinate uniformly inside `bounds`.
///
/// Swapped min/max values are tolerated; a zero-width axis always yields
/// its single value.
pub fn random_in_bounds<R: Rng + ?Sized>(rng: &mut R, bounds: &Bounds) -> Coordinate {
    let lon_lo = bounds.min_longitude.min(bounds.max_longitude);
    let lon_hi = bounds.min_longitude.max(bounds.max_longitude);
    let lat_lo = bounds.min_latitude.min(bounds.max_latitude);
    let lat_hi = bounds.min_latitude.max(bounds.max_latitude);

    let lon = rng.r#gen::<f64>().mul_add(lon_hi - lon_lo, lon_lo);
    let lat = rng.r#gen::<f64>().mul_add(lat_hi - lat_lo, lat_lo);
    Coordinate::new(lon, lat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng as _, rngs::StdRng};

    fn assert_close(expected: Coordinate, actual: Coordinate, tolerance: f64) {
        assert!(
            (expected.longitude - actual.longitude).abs() < tolerance
                && (expected.latitude - actual.latitude).abs() < tolerance,
            "expected {expected:?}, got {actual:?}"
        );
    }

    #[test]
    fn equator_prime_meridian_is_x_axis() {
        let p = to_cartesian(0.0, 0.0);
        assert!((p.x - 1.0).abs() < 1e-12);
        assert!(p.y.abs() < 1e-12);
        assert!(p.z.abs() < 1e-12);
    }

    #[test]
    fn north_pole_is_z_axis() {
        let p = to_cartesian(123.0, 90.0);
        assert!(p.x.abs() < 1e-12);
        assert!(p.y.abs() < 1e-12);
        assert!((p.z - 1.0).abs() < 1e-12);
    }

    #[test]
    fn round_trips_uk_coordinate() {
        let c = Coordinate::new(-1.042_424_2, 53.535_353_5);
        let back = to_geodetic(coordinate_to_cartesian(c));
        assert_close(c, back, 1e-7);
    }

    #[test]
    fn round_trips_random_coordinates() {
        let mut rng = StdRng::seed_from_u64(7);
        let world = Bounds {
            min_longitude: -179.999,
            max_longitude: 179.999,
            min_latitude: -89.999,
            max_latitude: 89.999,
        };
        for _ in 0..500 {
            let c = random_in_bounds(&mut rng, &world);
            let back = to_geodetic(coordinate_to_cartesian(c));
            assert_close(c, back, 1e-5);
        }
    }

    #[test]
    fn round_trips_across_antimeridian() {
        for lon in [-179.9, 179.9] {
            let c = Coordinate::new(lon, -45.0);
            assert_close(c, to_geodetic(coordinate_to_cartesian(c)), 1e-9);
        }
    }

    #[test]
    fn exact_pole_has_no_longitude() {
        let back = to_geodetic(CartesianPoint::new(0.0, 0.0, 1.0));
        assert!((back.latitude - 90.0).abs() < 1e-9);
        assert!(back.longitude.abs() < f64::EPSILON);

        let south = to_geodetic(CartesianPoint::new(0.0, 0.0, -1.0));
        assert!((south.latitude + 90.0).abs() < 1e-9);
    }

    #[test]
    fn to_geodetic_projects_interior_points() {
        let p = to_cartesian(10.0, 20.0);
        let scaled = CartesianPoint::new(p.x * 0.3, p.y * 0.3, p.z * 0.3);
        assert_close(Coordinate::new(10.0, 20.0), to_geodetic(scaled), 1e-9);
    }

    #[test]
    fn weighted_average_rejects_empty_input() {
        assert_eq!(weighted_average(&[]), Err(CoordError::EmptyInput));
    }

    #[test]
    fn weighted_average_honours_weights() {
        let a = CartesianPoint::new(1.0, 0.0, 0.0);
        let b = CartesianPoint::new(0.0, 1.0, 0.0);
        let avg = weighted_average(&[(a, 3.0), (b, 1.0)]).unwrap();
        assert!((avg.x - 0.75).abs() < 1e-12);
        assert!((avg.y - 0.25).abs() < 1e-12);
        assert!(avg.z.abs() < 1e-12);
    }

    #[test]
    fn weighted_average_falls_back_to_plain_mean_for_zero_weights() {
        let a = CartesianPoint::new(1.0, 0.0, 0.0);
        let b = CartesianPoint::new(0.0, 1.0, 0.0);
        let avg = weighted_average(&[(a, 0.0), (b, 0.0)]).unwrap();
        assert!((avg.x - 0.5).abs() < 1e-12);
        assert!((avg.y - 0.5).abs() < 1e-12);
    }

    #[test]
    fn distance_sq_is_chord_length_squared() {
        let a = to_cartesian(0.0, 0.0);
        let b = to_cartesian(90.0, 0.0);
        assert!((a.distance_sq(&b) - 2.0).abs() < 1e-12);
        assert!(a.distance_sq(&a).abs() < 1e-12);
    }

    #[test]
    fn random_in_bounds_stays_inside() {
        let mut rng = StdRng::seed_from_u64(42);
        let bounds = Bounds {
            min_longitude: -10.0,
            max_longitude: 10.0,
            min_latitude: -10.0,
            max_latitude: 10.0,
        };
        for _ in 0..100 {
            let c = random_in_bounds(&mut rng, &bounds);
            assert!((-10.0..=10.0).contains(&c.longitude));
            assert!((-10.0..=10.0).contains(&c.latitude));
        }
    }

    #[test]
    fn random_in_bounds_tolerates_swapped_and_degenerate_axes() {
        let mut rng = StdRng::seed_from_u64(1);
        let bounds = Bounds {
            min_longitude: 10.0,
            max_longitude: -10.0,
            min_latitude: 5.0,
            max_latitude: 5.0,
        };
        for _ in 0..50 {
            let c = random_in_bounds(&mut rng, &bounds);
            assert!((-10.0..=10.0).contains(&c.longitude));
            assert!((c.latitude - 5.0).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn bounds_enclose_all_coordinates() {
        let b = Bounds::enclosing([
            Coordinate::new(-3.5, 55.9),
            Coordinate::new(0.08, 50.9),
            Coordinate::new(-2.1, 57.1),
        ])
        .unwrap();
        assert!((b.min_longitude - -3.5).abs() < f64::EPSILON);
        assert!((b.max_longitude - 0.08).abs() < f64::EPSILON);
        assert!((b.min_latitude - 50.9).abs() < f64::EPSILON);
        assert!((b.max_latitude - 57.1).abs() < f64::EPSILON);
        assert!(Bounds::enclosing(std::iter::empty()).is_none());
    }
}

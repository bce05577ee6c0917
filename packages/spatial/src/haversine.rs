//! Great-circle distance on a spherical Earth.

use postcode_cluster_models::{ClusterResult, Coordinate, PostalLocation};

/// Earth radius in kilometres used for distance reporting.
pub const EARTH_RADIUS_KM: f64 = 6378.16;

/// Haversine distance between two coordinates, in kilometres.
///
/// Treats the Earth as a sphere, which is accurate to about 0.5% and
/// plenty for describing how spread out a cluster is.
#[must_use]
pub fn distance_km(a: Coordinate, b: Coordinate) -> f64 {
    let d_lon = (b.longitude - a.longitude).to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();

    let sin_lat = (d_lat / 2.0).sin();
    let sin_lon = (d_lon / 2.0).sin();
    let h = (a.latitude.to_radians().cos() * b.latitude.to_radians().cos())
        .mul_add(sin_lon * sin_lon, sin_lat * sin_lat);

    let angle = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    angle * EARTH_RADIUS_KM
}

/// Distance from a cluster's centroid to its farthest member, in
/// kilometres.
#[must_use]
pub fn spread_km(cluster: &ClusterResult) -> f64 {
    let centroid = cluster.centroid();
    cluster
        .members
        .iter()
        .filter_map(PostalLocation::coordinate)
        .map(|c| distance_km(centroid, c))
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_point_is_zero() {
        let c = Coordinate::new(-2.10764, 57.154_592);
        assert!(distance_km(c, c).abs() < 1e-9);
    }

    #[test]
    fn quarter_meridian() {
        let d = distance_km(Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 90.0));
        let expected = std::f64::consts::FRAC_PI_2 * EARTH_RADIUS_KM;
        assert!((d - expected).abs() < 1e-6);
    }

    #[test]
    fn aberdeen_to_heathfield() {
        // AB25 3UZ to TN22 9EF, a little over 700 km apart.
        let d = distance_km(
            Coordinate::new(-2.10764, 57.154_592),
            Coordinate::new(0.086_443, 50.967_863),
        );
        assert!((700.0..707.0).contains(&d), "got {d}");
    }

    #[test]
    fn symmetric() {
        let a = Coordinate::new(-3.560_637, 55.982_662);
        let b = Coordinate::new(-0.828_588, 51.806_57);
        assert!((distance_km(a, b) - distance_km(b, a)).abs() < 1e-9);
    }

    #[test]
    fn spread_is_farthest_member() {
        let near = Coordinate::new(0.0, 1.0);
        let far = Coordinate::new(0.0, 2.0);
        let cluster = ClusterResult {
            centroid_longitude: 0.0,
            centroid_latitude: 0.0,
            members: vec![
                PostalLocation::resolved_at("NEAR", 1, near),
                PostalLocation::resolved_at("FAR", 1, far),
            ],
            representative_code: "NEAR".to_string(),
            representative_place_name: None,
        };
        let expected = distance_km(Coordinate::new(0.0, 0.0), far);
        assert!((spread_km(&cluster) - expected).abs() < 1e-9);
    }
}

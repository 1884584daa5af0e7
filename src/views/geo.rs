//! 球面距离

/// 地球半径（公里）
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine 大圆距离（公里）
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_degree_of_longitude_at_equator() {
        let d = distance_km(0.0, 0.0, 0.0, 1.0);
        assert!((d - 111.19).abs() < 0.05, "got {}", d);
    }

    #[test]
    fn same_point_is_zero() {
        assert_eq!(distance_km(48.8566, 2.3522, 48.8566, 2.3522), 0.0);
    }

    #[test]
    fn symmetric() {
        let a = distance_km(51.5074, -0.1278, 40.7128, -74.0060);
        let b = distance_km(40.7128, -74.0060, 51.5074, -0.1278);
        assert!((a - b).abs() < 1e-9);
        assert!((a - 5570.0).abs() < 10.0);
    }
}

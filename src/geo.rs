//! Great-circle distance on a spherical Earth approximation

/// Mean Earth radius in meters
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance in meters between two WGS84 coordinate pairs.
///
/// Returns `None` when any coordinate is non-finite or outside the valid
/// latitude/longitude range, so callers can reject garbage fixes instead of
/// propagating NaN through range checks.
pub fn haversine_distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> Option<f64> {
    for &v in &[lat1, lon1, lat2, lon2] {
        if !v.is_finite() {
            return None;
        }
    }
    if lat1.abs() > 90.0 || lat2.abs() > 90.0 || lon1.abs() > 180.0 || lon2.abs() > 180.0 {
        return None;
    }

    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    Some(EARTH_RADIUS_M * c)
}

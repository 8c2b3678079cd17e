use std::time::Duration;

/// Mean Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Great-circle distance in meters between two coordinates (haversine).
pub fn distance_m(from: Coordinates, to: Coordinates) -> f64 {
    let phi1 = from.latitude.to_radians();
    let phi2 = to.latitude.to_radians();
    let dphi = (to.latitude - from.latitude).to_radians();
    let dlambda = (to.longitude - from.longitude).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Estimated time to cover `distance_m` at `speed_mps`. A non-positive or
/// non-finite speed has no ETA and yields `Duration::MAX`.
pub fn eta(distance_m: f64, speed_mps: f64) -> Duration {
    if !(speed_mps > 0.0) || !distance_m.is_finite() {
        return Duration::MAX;
    }
    let secs = (distance_m / speed_mps).max(0.0);
    if secs >= u64::MAX as f64 {
        Duration::MAX
    } else {
        Duration::from_secs_f64(secs)
    }
}

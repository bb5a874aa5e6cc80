//! Geographic helpers shared by the declaration model and the drivers.

use serde::{Deserialize, Serialize};

/// A WGS-84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees, positive north.
    pub latitude: f64,
    /// Longitude in degrees, positive east.
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a new point.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check that both coordinates are finite and within range.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Initial great-circle bearing from `self` to `other`, in degrees `[0, 360)`.
    #[must_use]
    pub fn bearing_to(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();

        let y = dlon.sin() * lat2.cos();
        let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
        normalize_bearing(y.atan2(x).to_degrees())
    }
}

/// Wrap an angle in degrees into `[0, 360)`.
#[must_use]
pub fn normalize_bearing(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Direction halfway between two bearings, following the shorter arc.
#[must_use]
pub fn mean_bearing(a: f64, b: f64) -> f64 {
    let mut delta = normalize_bearing(b - a);
    if delta > 180.0 {
        delta -= 360.0;
    }
    normalize_bearing(a + delta / 2.0)
}

/// Direction the observation sector of an intermediate turn point opens,
/// opposite the mean of the two legs.
///
/// `to_previous` and `to_next` are the bearings from the turn point towards
/// its neighbours. Their mean points into the course, so it is rotated by
/// 180 degrees.
#[must_use]
pub fn sector_bisector(to_previous: f64, to_next: f64) -> f64 {
    normalize_bearing(mean_bearing(to_previous, to_next) + 180.0)
}

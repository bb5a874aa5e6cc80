//! GPS fixes as consumed by the logger.

use chrono::{DateTime, Utc};

use crate::geo::GeoPoint;

/// One position update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpsFix {
    /// UTC time of the fix.
    pub time: DateTime<Utc>,
    /// Position.
    pub location: GeoPoint,
    /// GPS altitude above the ellipsoid in metres.
    pub gps_altitude: f64,
    /// Pressure altitude in metres, if a sensor is connected.
    pub pressure_altitude: Option<f64>,
    /// The receiver flags the position as unreliable.
    pub nav_warning: bool,
    /// PRNs of the satellites used for the solution.
    pub satellites: Vec<u8>,
    /// Estimated position error in metres.
    pub position_error: Option<f64>,
    /// The fix comes from a simulator or a replay, not a real receiver.
    pub simulated: bool,
}

impl GpsFix {
    /// Create a valid fix with the given time, position and GPS altitude.
    #[must_use]
    pub fn new(time: DateTime<Utc>, location: GeoPoint, gps_altitude: f64) -> Self {
        Self {
            time,
            location,
            gps_altitude,
            ..Self::default()
        }
    }

    /// Set the pressure altitude.
    #[must_use]
    pub fn with_pressure_altitude(mut self, altitude: f64) -> Self {
        self.pressure_altitude = Some(altitude);
        self
    }

    /// Set the satellites in use.
    #[must_use]
    pub fn with_satellites(mut self, satellites: Vec<u8>) -> Self {
        self.satellites = satellites;
        self
    }

    /// Pressure altitude, falling back to GPS altitude.
    #[must_use]
    pub fn baro_or_gps_altitude(&self) -> f64 {
        self.pressure_altitude.unwrap_or(self.gps_altitude)
    }
}

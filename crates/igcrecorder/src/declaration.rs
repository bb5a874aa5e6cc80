//! Task declarations uploaded to flight recorders.
//!
//! A [`Declaration`] is the pilot's statement of the task before take-off:
//! who flies which aircraft, and the ordered list of turn points with their
//! observation zones. The first turn point is the start, the last one the
//! finish.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geo::{sector_bisector, GeoPoint};

/// A named location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    /// Display name.
    pub name: String,
    /// Position.
    pub location: GeoPoint,
    /// Elevation above mean sea level in metres, when known.
    #[serde(default)]
    pub elevation: Option<f64>,
}

impl Waypoint {
    /// Create a waypoint without elevation.
    #[must_use]
    pub fn new(name: impl Into<String>, location: GeoPoint) -> Self {
        Self {
            name: name.into(),
            location,
            elevation: None,
        }
    }

    /// Set the elevation.
    #[must_use]
    pub fn with_elevation(mut self, elevation: f64) -> Self {
        self.elevation = Some(elevation);
        self
    }
}

/// Observation zone geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneShape {
    /// Circle around the turn point.
    Cylinder,
    /// 90 degree FAI sector.
    Sector,
    /// Start or finish line perpendicular to the leg.
    Line,
    /// DAeC keyhole: 500 m cylinder plus a 90 degree sector.
    DaecKeyhole,
}

impl std::fmt::Display for ZoneShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cylinder => write!(f, "cylinder"),
            Self::Sector => write!(f, "sector"),
            Self::Line => write!(f, "line"),
            Self::DaecKeyhole => write!(f, "keyhole"),
        }
    }
}

/// Position of a turn point within the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPointRole {
    /// First turn point.
    Start,
    /// Anything between start and finish.
    Intermediate,
    /// Last turn point.
    Finish,
}

/// One entry of the task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnPoint {
    /// The waypoint to reach.
    pub waypoint: Waypoint,
    /// Observation zone shape.
    pub shape: ZoneShape,
    /// Zone radius (or line length) in metres.
    pub radius: f64,
}

impl TurnPoint {
    /// Create a turn point.
    #[must_use]
    pub fn new(waypoint: Waypoint, shape: ZoneShape, radius: f64) -> Self {
        Self {
            waypoint,
            shape,
            radius,
        }
    }

    /// The turn point's position.
    #[must_use]
    pub fn location(&self) -> GeoPoint {
        self.waypoint.location
    }

    /// The waypoint name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.waypoint.name
    }
}

/// Per-driver constraints checked before any I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeclarationLimits {
    /// Maximum number of turn points including start and finish.
    pub max_turn_points: usize,
    /// Longest waypoint name the recorder can store without truncation,
    /// `None` when the driver shortens names itself.
    pub max_name_length: Option<usize>,
}

impl DeclarationLimits {
    /// Limits with only a turn point maximum.
    #[must_use]
    pub const fn new(max_turn_points: usize) -> Self {
        Self {
            max_turn_points,
            max_name_length: None,
        }
    }

    /// Add a waypoint name length limit.
    #[must_use]
    pub const fn with_max_name_length(mut self, length: usize) -> Self {
        self.max_name_length = Some(length);
        self
    }
}

/// A task declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Declaration {
    /// Pilot in command.
    pub pilot_name: String,
    /// Second pilot, if any.
    pub copilot_name: String,
    /// Glider model.
    pub aircraft_type: String,
    /// Glider registration.
    pub aircraft_registration: String,
    /// Competition sign.
    pub competition_id: String,
    /// Turn points in task order.
    pub turn_points: Vec<TurnPoint>,
}

impl Declaration {
    /// Fewest turn points any task may have.
    pub const MIN_TURN_POINTS: usize = 2;

    /// Number of turn points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turn_points.len()
    }

    /// Check if the task has no turn points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turn_points.is_empty()
    }

    /// Append a turn point.
    pub fn push(&mut self, turn_point: TurnPoint) {
        self.turn_points.push(turn_point);
    }

    /// The role of the turn point at `index`.
    #[must_use]
    pub fn role(&self, index: usize) -> TurnPointRole {
        if index == 0 {
            TurnPointRole::Start
        } else if index + 1 >= self.turn_points.len() {
            TurnPointRole::Finish
        } else {
            TurnPointRole::Intermediate
        }
    }

    /// Check the declaration against a driver's limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDeclaration`] if there are too few or too many
    /// turn points, a position is out of range, or a name is too long.
    pub fn validate(&self, limits: &DeclarationLimits) -> Result<()> {
        let count = self.turn_points.len();
        if count < Self::MIN_TURN_POINTS {
            return Err(Error::invalid_declaration(format!(
                "at least {} turn points required, got {count}",
                Self::MIN_TURN_POINTS
            )));
        }
        if count > limits.max_turn_points {
            return Err(Error::invalid_declaration(format!(
                "at most {} turn points supported, got {count}",
                limits.max_turn_points
            )));
        }

        for (index, tp) in self.turn_points.iter().enumerate() {
            if !tp.location().is_valid() {
                return Err(Error::invalid_declaration(format!(
                    "turn point {index} ({}) has an invalid position",
                    tp.name()
                )));
            }
            if !tp.radius.is_finite() || tp.radius < 0.0 {
                return Err(Error::invalid_declaration(format!(
                    "turn point {index} ({}) has an invalid radius",
                    tp.name()
                )));
            }
            if let Some(max) = limits.max_name_length {
                if tp.name().chars().count() > max {
                    return Err(Error::invalid_declaration(format!(
                        "turn point name '{}' is longer than {max} characters",
                        tp.name()
                    )));
                }
            }
        }

        Ok(())
    }

    /// Bearing from turn point `index` towards its predecessor.
    #[must_use]
    pub fn bearing_to_previous(&self, index: usize) -> Option<f64> {
        let here = self.turn_points.get(index)?;
        let previous = self.turn_points.get(index.checked_sub(1)?)?;
        Some(here.location().bearing_to(&previous.location()))
    }

    /// Bearing from turn point `index` towards its successor.
    #[must_use]
    pub fn bearing_to_next(&self, index: usize) -> Option<f64> {
        let here = self.turn_points.get(index)?;
        let next = self.turn_points.get(index + 1)?;
        Some(here.location().bearing_to(&next.location()))
    }

    /// Orientation of the observation zone at turn point `index`.
    ///
    /// The start zone faces the next point, the finish zone faces the
    /// previous point, and intermediate zones face the sector bisector of
    /// both legs. Returns `None` if `index` is out of range or the task has
    /// a single point.
    #[must_use]
    pub fn zone_bearing(&self, index: usize) -> Option<f64> {
        match self.role(index) {
            TurnPointRole::Start => self.bearing_to_next(index),
            TurnPointRole::Finish => self.bearing_to_previous(index),
            TurnPointRole::Intermediate => Some(sector_bisector(
                self.bearing_to_previous(index)?,
                self.bearing_to_next(index)?,
            )),
        }
    }
}

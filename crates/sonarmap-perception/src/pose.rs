//! Pose tracking and origin calibration.
//!
//! The first position ever reported becomes the world origin; every later
//! position is expressed relative to it.  Heading is tracked separately
//! because the sensor stream reports it independently of position (or not at
//! all), so where it comes from is configurable via [`OrientationSource`].
//!
//! # Example
//!
//! ```rust
//! use sonarmap_perception::pose::PoseTracker;
//!
//! let mut tracker = PoseTracker::new();
//!
//! let first = tracker.apply_pose(50.0, 50.0);
//! assert_eq!((first.x, first.y), (0.0, 0.0));
//!
//! let second = tracker.apply_pose(60.0, 50.0);
//! assert_eq!((second.x, second.y), (10.0, 0.0));
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sonarmap_types::{Pose, WorldPoint};
use tracing::{debug, trace};

// ────────────────────────────────────────────────────────────────────────────
// OrientationSource
// ────────────────────────────────────────────────────────────────────────────

/// Where the robot's heading comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrientationSource {
    /// Orientation fields on incoming events are used as-is.
    #[default]
    External,
    /// Orientation fields are raw compass headings.  The first heading is
    /// the reference; later ones are reported relative to it in `[0, 360)`.
    Compass,
    /// Orientation fields are ignored; heading follows the direction of
    /// travel between consecutive poses.
    Odometry,
    /// Orientation fields are ignored; heading stays at its initial value.
    Fixed,
}

impl fmt::Display for OrientationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrientationSource::External => write!(f, "external"),
            OrientationSource::Compass => write!(f, "compass"),
            OrientationSource::Odometry => write!(f, "odometry"),
            OrientationSource::Fixed => write!(f, "fixed"),
        }
    }
}

impl FromStr for OrientationSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "external" => Ok(OrientationSource::External),
            "compass" => Ok(OrientationSource::Compass),
            "odometry" => Ok(OrientationSource::Odometry),
            "fixed" => Ok(OrientationSource::Fixed),
            other => Err(format!("unknown orientation source `{other}`")),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PoseTracker
// ────────────────────────────────────────────────────────────────────────────

/// Holds the current robot pose in the world frame.
#[derive(Debug, Clone)]
pub struct PoseTracker {
    source: OrientationSource,
    /// Absolute position of the first pose; `None` until calibrated.
    origin: Option<WorldPoint>,
    /// Current position relative to `origin`.
    position: WorldPoint,
    orientation: f64,
    /// First raw heading seen in [`OrientationSource::Compass`] mode.
    compass_reference: Option<f64>,
}

impl Default for PoseTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PoseTracker {
    /// Tracker with an [`OrientationSource::External`] heading starting at 0°.
    pub fn new() -> Self {
        Self::with_source(OrientationSource::External, 0.0)
    }

    /// Tracker using `source` for heading, starting at `initial_orientation`
    /// degrees until the source provides a value.
    pub fn with_source(source: OrientationSource, initial_orientation: f64) -> Self {
        Self {
            source,
            origin: None,
            position: WorldPoint::origin(),
            orientation: initial_orientation,
            compass_reference: None,
        }
    }

    /// Apply an absolute position and return the resulting world-frame pose.
    ///
    /// The first call calibrates the origin and always yields `(0, 0)`.
    pub fn apply_pose(&mut self, x: f64, y: f64) -> Pose {
        match self.origin {
            None => {
                let origin = WorldPoint::new(x, y);
                self.origin = Some(origin);
                self.position = WorldPoint::origin();
                debug!(origin_x = x, origin_y = y, "origin calibrated");
            }
            Some(origin) => {
                let next = WorldPoint::new(x - origin.x, y - origin.y);
                if self.source == OrientationSource::Odometry {
                    self.follow_motion(next);
                }
                self.position = next;
            }
        }
        self.pose()
    }

    /// Apply a heading reading in degrees, interpreted per the configured
    /// [`OrientationSource`].
    pub fn apply_orientation(&mut self, degrees: f64) {
        match self.source {
            OrientationSource::External => self.orientation = degrees,
            OrientationSource::Compass => {
                let reference = *self.compass_reference.get_or_insert(degrees);
                self.orientation = (degrees - reference).rem_euclid(360.0);
            }
            OrientationSource::Odometry | OrientationSource::Fixed => {
                trace!(degrees, source = %self.source, "heading reading ignored");
            }
        }
    }

    /// Current pose; `(0, 0)` until the origin is calibrated.
    pub fn pose(&self) -> Pose {
        Pose::new(self.position.x, self.position.y, self.orientation)
    }

    /// Absolute position of the world origin, once calibrated.
    pub fn origin(&self) -> Option<WorldPoint> {
        self.origin
    }

    pub fn is_calibrated(&self) -> bool {
        self.origin.is_some()
    }

    pub fn source(&self) -> OrientationSource {
        self.source
    }

    /// Point the heading along the displacement to `next`.  A stationary
    /// update keeps the previous heading.
    fn follow_motion(&mut self, next: WorldPoint) {
        let dx = next.x - self.position.x;
        let dy = next.y - self.position.y;
        if dx == 0.0 && dy == 0.0 {
            return;
        }
        // Heading is counter-clockwise from +y, so +x travel is 270°.
        self.orientation = (-dx).atan2(dy).to_degrees().rem_euclid(360.0);
    }
}

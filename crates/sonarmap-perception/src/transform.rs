//! Range-reading projection.
//!
//! Converts a [`SensorReading`] taken at a [`Pose`] into four world-frame
//! points, one per cardinal direction.
//!
//! Each direction is a vector at a fixed bearing measured clockwise from the
//! robot's forward axis (north 0°, east 90°, south 180°, west 270°).  For a
//! distance `d` at bearing `b` the body-frame vector is `(d·sin b, d·cos b)`,
//! so with heading 0° north points to +y and east to +x.  The vector is then
//! rotated by the heading θ:
//!
//! ```text
//! x' = dx·cos θ − dy·sin θ
//! y' = dx·sin θ + dy·cos θ
//! ```
//!
//! and translated by the robot position.
//!
//! # Example
//!
//! ```rust
//! use sonarmap_perception::transform::transform;
//! use sonarmap_types::{Pose, SensorReading, WorldPoint};
//!
//! let points = transform(&Pose::default(), &SensorReading::new(10.0, 0.0, 0.0, 0.0));
//! assert_eq!(points.north, WorldPoint::new(0.0, 10.0));
//! assert_eq!(points.east, WorldPoint::origin());
//! ```

use sonarmap_types::{Direction, Pose, SensorReading, WorldPoint};

// ────────────────────────────────────────────────────────────────────────────
// Primitive types
// ────────────────────────────────────────────────────────────────────────────

/// A 2-D vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn scale(self, k: f64) -> Self {
        Self::new(self.x * k, self.y * k)
    }

    /// Unit vector pointing along `direction` in the robot's body frame.
    ///
    /// Cardinal bearings are exact so a reading taken at heading 0° lands on
    /// exact coordinates.
    pub fn unit(direction: Direction) -> Self {
        match direction {
            Direction::North => Self::new(0.0, 1.0),
            Direction::East => Self::new(1.0, 0.0),
            Direction::South => Self::new(0.0, -1.0),
            Direction::West => Self::new(-1.0, 0.0),
        }
    }
}

/// A planar rotation stored as its cosine and sine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation2 {
    cos: f64,
    sin: f64,
}

impl Rotation2 {
    /// The identity rotation.
    pub fn identity() -> Self {
        Self { cos: 1.0, sin: 0.0 }
    }

    /// Counter-clockwise rotation by `degrees`.
    ///
    /// Whole quarter turns use exact sine/cosine values; everything else goes
    /// through `f64::sin_cos`.
    pub fn from_degrees(degrees: f64) -> Self {
        let wrapped = degrees.rem_euclid(360.0);
        if wrapped == 0.0 {
            Self::identity()
        } else if wrapped == 90.0 {
            Self { cos: 0.0, sin: 1.0 }
        } else if wrapped == 180.0 {
            Self { cos: -1.0, sin: 0.0 }
        } else if wrapped == 270.0 {
            Self { cos: 0.0, sin: -1.0 }
        } else {
            let (sin, cos) = degrees.to_radians().sin_cos();
            Self { cos, sin }
        }
    }

    pub fn rotate(self, v: Vec2) -> Vec2 {
        Vec2::new(
            v.x * self.cos - v.y * self.sin,
            v.x * self.sin + v.y * self.cos,
        )
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ProjectedReading
// ────────────────────────────────────────────────────────────────────────────

/// The four world-frame points produced from one [`SensorReading`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedReading {
    pub north: WorldPoint,
    pub east: WorldPoint,
    pub south: WorldPoint,
    pub west: WorldPoint,
}

impl ProjectedReading {
    /// The point observed along `direction`.
    pub fn point(&self, direction: Direction) -> WorldPoint {
        match direction {
            Direction::North => self.north,
            Direction::East => self.east,
            Direction::South => self.south,
            Direction::West => self.west,
        }
    }

    /// Points in bearing order, paired with their direction.
    pub fn iter(&self) -> impl Iterator<Item = (Direction, WorldPoint)> + '_ {
        Direction::ALL.into_iter().map(|d| (d, self.point(d)))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Projection
// ────────────────────────────────────────────────────────────────────────────

/// Project a single range `distance` along `direction` from `pose`.
pub fn project(pose: &Pose, direction: Direction, distance: f64) -> WorldPoint {
    project_with(pose, Rotation2::from_degrees(pose.orientation), direction, distance)
}

/// Project all four ranges of `reading` from `pose` into the world frame.
pub fn transform(pose: &Pose, reading: &SensorReading) -> ProjectedReading {
    let rotation = Rotation2::from_degrees(pose.orientation);
    let at = |d: Direction| project_with(pose, rotation, d, reading.distance(d));
    ProjectedReading {
        north: at(Direction::North),
        east: at(Direction::East),
        south: at(Direction::South),
        west: at(Direction::West),
    }
}

fn project_with(pose: &Pose, rotation: Rotation2, direction: Direction, distance: f64) -> WorldPoint {
    let offset = rotation.rotate(Vec2::unit(direction).scale(distance));
    WorldPoint::new(pose.x + offset.x, pose.y + offset.y)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

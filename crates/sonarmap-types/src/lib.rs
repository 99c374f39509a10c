use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A point in the world frame (origin = first reported robot position).
///
/// Equality and hashing compare the exact bit patterns of both coordinates,
/// with `-0.0` folded onto `0.0`.  Two observations are the same obstacle
/// only when they land on exactly the same coordinate; there is no binning.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WorldPoint {
    pub x: f64,
    pub y: f64,
}

impl WorldPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// The world-frame origin `(0, 0)`.
    pub fn origin() -> Self {
        Self::default()
    }

    /// Euclidean distance to `other`.
    pub fn distance_to(self, other: Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    fn key_bits(self) -> (u64, u64) {
        (canonical_bits(self.x), canonical_bits(self.y))
    }
}

fn canonical_bits(v: f64) -> u64 {
    if v == 0.0 { 0.0f64.to_bits() } else { v.to_bits() }
}

impl PartialEq for WorldPoint {
    fn eq(&self, other: &Self) -> bool {
        self.key_bits() == other.key_bits()
    }
}

impl Eq for WorldPoint {}

impl Hash for WorldPoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key_bits().hash(state);
    }
}

/// Robot pose in the world frame.
///
/// `orientation` is in degrees; `0` means the robot faces +y.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub orientation: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, orientation: f64) -> Self {
        Self { x, y, orientation }
    }

    pub fn position(&self) -> WorldPoint {
        WorldPoint::new(self.x, self.y)
    }
}

/// One of the four fixed sensor bearings, relative to the robot's heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    /// All directions in bearing order.
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    /// Bearing in degrees, measured clockwise from the robot's forward axis.
    pub fn bearing_deg(self) -> f64 {
        match self {
            Direction::North => 0.0,
            Direction::East => 90.0,
            Direction::South => 180.0,
            Direction::West => 270.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::North => "north",
            Direction::East => "east",
            Direction::South => "south",
            Direction::West => "west",
        };
        f.write_str(name)
    }
}

/// Distances measured along the four cardinal sensor directions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub n: f64,
    pub e: f64,
    pub s: f64,
    pub w: f64,
}

impl SensorReading {
    pub fn new(n: f64, e: f64, s: f64, w: f64) -> Self {
        Self { n, e, s, w }
    }

    /// Distance reported for `direction`.
    pub fn distance(&self, direction: Direction) -> f64 {
        match direction {
            Direction::North => self.n,
            Direction::East => self.e,
            Direction::South => self.s,
            Direction::West => self.w,
        }
    }
}

/// Typed input event consumed by the map engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MapEvent {
    /// Absolute robot position, optionally carrying a heading in degrees.
    PoseUpdate {
        x: f64,
        y: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        orientation: Option<f64>,
    },
    /// Four relative distances taken at the current pose.
    SensorReading(SensorReading),
    /// Four distances already aligned to the world axes (`n` along +y);
    /// projected from the current position without rotation.
    WorldReading(SensorReading),
    /// Heading reported independently of position.
    OrientationUpdate { degrees: f64 },
}

impl MapEvent {
    pub fn pose(x: f64, y: f64) -> Self {
        MapEvent::PoseUpdate {
            x,
            y,
            orientation: None,
        }
    }

    pub fn reading(n: f64, e: f64, s: f64, w: f64) -> Self {
        MapEvent::SensorReading(SensorReading::new(n, e, s, w))
    }

    pub fn world_reading(n: f64, e: f64, s: f64, w: f64) -> Self {
        MapEvent::WorldReading(SensorReading::new(n, e, s, w))
    }

    /// Short label used in logs and statistics.
    pub fn kind(&self) -> &'static str {
        match self {
            MapEvent::PoseUpdate { .. } => "pose_update",
            MapEvent::SensorReading(_) => "sensor_reading",
            MapEvent::WorldReading(_) => "world_reading",
            MapEvent::OrientationUpdate { .. } => "orientation_update",
        }
    }

    /// Reject the event if any numeric field is NaN or infinite.
    pub fn ensure_finite(&self) -> Result<(), MapError> {
        match self {
            MapEvent::PoseUpdate { x, y, orientation } => {
                finite("x", *x)?;
                finite("y", *y)?;
                if let Some(deg) = orientation {
                    finite("orientation", *deg)?;
                }
                Ok(())
            }
            MapEvent::SensorReading(r) | MapEvent::WorldReading(r) => {
                finite("n", r.n)?;
                finite("e", r.e)?;
                finite("s", r.s)?;
                finite("w", r.w)
            }
            MapEvent::OrientationUpdate { degrees } => finite("degrees", *degrees),
        }
    }
}

fn finite(field: &str, value: f64) -> Result<(), MapError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(MapError::NonFiniteValue {
            field: field.to_string(),
        })
    }
}

/// A world-frame obstacle and the directions that observed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObstaclePoint {
    pub x: f64,
    pub y: f64,
    pub directions: BTreeSet<Direction>,
}

impl ObstaclePoint {
    pub fn position(&self) -> WorldPoint {
        WorldPoint::new(self.x, self.y)
    }
}

/// Immutable, owned copy of the map's observable state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapSnapshot {
    pub robot_pose: Pose,
    pub obstacles: Vec<ObstaclePoint>,
    pub path: Vec<WorldPoint>,
}

impl MapSnapshot {
    /// The snapshot of an engine that has not received a pose yet.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Look up the obstacle recorded at exactly `point`.
    pub fn obstacle_at(&self, point: WorldPoint) -> Option<&ObstaclePoint> {
        self.obstacles.iter().find(|o| o.position() == point)
    }
}

/// Unified event wrapper for the internal event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "sonarmap-runtime::actor"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` with a fresh id and the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the internal event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// A decoded input event accepted by the engine.
    Applied(MapEvent),
    /// The map state right after an accepted event.
    Snapshot(MapSnapshot),
    /// A message or event that was dropped.
    Rejected { topic: String, error: MapError },
}

/// Every way a single message or event can fail.  None of them are fatal to
/// the engine.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MapError {
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Sensor reading received before the first pose")]
    UnreadyState,

    #[error("Non-finite value in field `{field}`")]
    NonFiniteValue { field: String },

    #[error("No route for topic `{0}`")]
    UnknownTopic(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("I/O error: {0}")]
    Io(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn world_point_equality_is_exact() {
        assert_eq!(WorldPoint::new(1.0, 2.0), WorldPoint::new(1.0, 2.0));
        assert_ne!(WorldPoint::new(1.0, 2.0), WorldPoint::new(1.0 + 1e-12, 2.0));
    }

    #[test]
    fn negative_zero_is_the_same_key() {
        let mut set = HashSet::new();
        set.insert(WorldPoint::new(0.0, 5.0));
        set.insert(WorldPoint::new(-0.0, 5.0));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn direction_serializes_lowercase() {
        let json = serde_json::to_string(&Direction::West).unwrap();
        assert_eq!(json, "\"west\"");
    }

    #[test]
    fn snapshot_uses_robot_pose_key() {
        let snap = MapSnapshot {
            robot_pose: Pose::new(1.0, 2.0, 90.0),
            obstacles: vec![ObstaclePoint {
                x: 0.0,
                y: 10.0,
                directions: [Direction::North].into_iter().collect(),
            }],
            path: vec![WorldPoint::origin()],
        };
        let json = serde_json::to_string(&snap).unwrap();
        assert!(json.starts_with(r#"{"robotPose":{"x":1.0,"y":2.0,"orientation":90.0}"#));
        assert!(json.contains(r#""directions":["north"]"#));
        assert!(json.contains(r#""path":[{"x":0.0,"y":0.0}]"#));
    }

    #[test]
    fn map_event_is_internally_tagged() {
        let json = serde_json::to_string(&MapEvent::reading(1.0, 2.0, 3.0, 4.0)).unwrap();
        assert!(json.contains(r#""event":"sensor_reading""#));

        let back: MapEvent =
            serde_json::from_str(r#"{"event":"pose_update","x":3.0,"y":4.0}"#).unwrap();
        assert_eq!(back, MapEvent::pose(3.0, 4.0));

        let json = serde_json::to_string(&MapEvent::world_reading(1.0, 2.0, 3.0, 4.0)).unwrap();
        assert!(json.contains(r#""event":"world_reading""#));
    }

    #[test]
    fn world_reading_is_checked_for_finite_values() {
        let err = MapEvent::world_reading(1.0, 1.0, f64::INFINITY, 1.0)
            .ensure_finite()
            .unwrap_err();
        assert_eq!(
            err,
            MapError::NonFiniteValue {
                field: "s".to_string()
            }
        );
    }

    #[test]
    fn ensure_finite_names_offending_field() {
        let err = MapEvent::reading(1.0, f64::NAN, 0.0, 0.0)
            .ensure_finite()
            .unwrap_err();
        assert_eq!(
            err,
            MapError::NonFiniteValue {
                field: "e".to_string()
            }
        );

        let err = MapEvent::PoseUpdate {
            x: 0.0,
            y: 0.0,
            orientation: Some(f64::INFINITY),
        }
        .ensure_finite()
        .unwrap_err();
        assert!(err.to_string().contains("orientation"));

        assert!(MapEvent::pose(1e300, -1e300).ensure_finite().is_ok());
    }

    #[test]
    fn map_error_display() {
        assert!(MapError::UnreadyState.to_string().contains("first pose"));
        let err = MapError::UnknownTopic("robot/battery".to_string());
        assert!(err.to_string().contains("robot/battery"));
    }

    #[test]
    fn event_roundtrip() {
        let event = Event::new(
            "sonarmap-runtime::actor",
            EventPayload::Rejected {
                topic: "sensors/recalculated".to_string(),
                error: MapError::UnreadyState,
            },
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
        assert!(matches!(
            back.payload,
            EventPayload::Rejected {
                error: MapError::UnreadyState,
                ..
            }
        ));
    }
}

//! Topic payload codec.
//!
//! Robots publish four kinds of JSON payload, each on its own topic:
//!
//! | Route | Default topic | Payload | Decoded as |
//! |---|---|---|---|
//! | [`Route::Pose`] | `robot/position` | `{"x": 50, "y": 50}` with optional heading | `PoseUpdate` |
//! | [`Route::Raw`] | `sensors/raw` | `{"n": 50, "e": 40, "s": 50, "w": 60}` relative to the robot | `SensorReading` |
//! | [`Route::Sensors`] | `sensors/recalculated` | `{"y": 87.5, "n": .., "e": .., "s": .., "w": ..}` | `WorldReading` |
//! | [`Route::Combined`] | `robot/sensors` | `{"pos": {"x": 1, "y": 2}, "yaw": 90, "distances": {"n": .., "e": .., "s": .., "w": ..}}` | `PoseUpdate`, `SensorReading` |
//!
//! The firmware rotates `sensors/recalculated` distances onto the world axes
//! before publishing, and `y` is the yaw it already applied.  Those readings
//! are therefore not rotated again, and `y` is ignored.
//!
//! A pose heading may be sent as `orientation`, `heading` or `yaw`.  When
//! several are present the first in that order wins.
//!
//! One payload may decode into several [`MapEvent`]s; they must be applied
//! in the returned order.

use serde::{Deserialize, Serialize};
use sonarmap_types::{MapError, MapEvent, SensorReading};

/// Kind of payload carried by a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Pose,
    /// Robot-relative readings.
    Raw,
    /// World-aligned readings.
    Sensors,
    Combined,
}

/// Topic names for each [`Route`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicMap {
    pub pose: String,
    pub raw: String,
    pub sensors: String,
    pub combined: String,
}

impl Default for TopicMap {
    fn default() -> Self {
        Self {
            pose: "robot/position".to_string(),
            raw: "sensors/raw".to_string(),
            sensors: "sensors/recalculated".to_string(),
            combined: "robot/sensors".to_string(),
        }
    }
}

impl TopicMap {
    /// Which [`Route`] handles `topic`, if any.
    pub fn route(&self, topic: &str) -> Option<Route> {
        if topic == self.pose {
            Some(Route::Pose)
        } else if topic == self.raw {
            Some(Route::Raw)
        } else if topic == self.sensors {
            Some(Route::Sensors)
        } else if topic == self.combined {
            Some(Route::Combined)
        } else {
            None
        }
    }

    /// Decode a raw `payload` received on `topic`.
    ///
    /// # Errors
    ///
    /// * [`MapError::UnknownTopic`] – `topic` has no route.
    /// * [`MapError::MalformedEvent`] – the payload is not valid JSON, lacks a
    ///   required numeric field, or reports a negative distance.
    pub fn decode(&self, topic: &str, payload: &[u8]) -> Result<Vec<MapEvent>, MapError> {
        let route = self
            .route(topic)
            .ok_or_else(|| MapError::UnknownTopic(topic.to_string()))?;
        decode_route(route, payload).map_err(|e| match e {
            MapError::MalformedEvent(msg) => MapError::MalformedEvent(format!("{topic}: {msg}")),
            other => other,
        })
    }
}

/// Decode `payload` for a known `route`.
pub fn decode_route(route: Route, payload: &[u8]) -> Result<Vec<MapEvent>, MapError> {
    match route {
        Route::Pose => {
            let p: PosePayload = parse(payload)?;
            Ok(vec![MapEvent::PoseUpdate {
                x: p.x,
                y: p.y,
                orientation: p.orientation.or(p.heading).or(p.yaw),
            }])
        }
        Route::Raw => {
            let d: Distances = parse(payload)?;
            Ok(vec![MapEvent::SensorReading(d.reading()?)])
        }
        Route::Sensors => {
            let d: Distances = parse(payload)?;
            Ok(vec![MapEvent::WorldReading(d.reading()?)])
        }
        Route::Combined => {
            let p: FramePayload = parse(payload)?;
            let reading = p.distances.reading()?;
            Ok(vec![
                MapEvent::PoseUpdate {
                    x: p.pos.x,
                    y: p.pos.y,
                    orientation: p.yaw,
                },
                MapEvent::SensorReading(reading),
            ])
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Wire payloads
// ────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct PosePayload {
    x: f64,
    y: f64,
    #[serde(default)]
    orientation: Option<f64>,
    #[serde(default)]
    heading: Option<f64>,
    #[serde(default)]
    yaw: Option<f64>,
}

#[derive(Deserialize)]
struct Position {
    x: f64,
    y: f64,
}

#[derive(Deserialize)]
struct Distances {
    n: f64,
    e: f64,
    s: f64,
    w: f64,
}

impl Distances {
    fn reading(&self) -> Result<SensorReading, MapError> {
        non_negative(SensorReading::new(self.n, self.e, self.s, self.w))
    }
}

#[derive(Deserialize)]
struct FramePayload {
    pos: Position,
    #[serde(default)]
    yaw: Option<f64>,
    distances: Distances,
}

fn parse<'a, T: Deserialize<'a>>(payload: &'a [u8]) -> Result<T, MapError> {
    serde_json::from_slice(payload).map_err(|e| MapError::MalformedEvent(e.to_string()))
}

fn non_negative(reading: SensorReading) -> Result<SensorReading, MapError> {
    for (name, value) in [("n", reading.n), ("e", reading.e), ("s", reading.s), ("w", reading.w)] {
        if value < 0.0 {
            return Err(MapError::MalformedEvent(format!(
                "distance `{name}` is negative ({value})"
            )));
        }
    }
    Ok(reading)
}

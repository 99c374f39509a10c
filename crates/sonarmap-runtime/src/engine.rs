//! [`MapEngine`] – the ingestion-and-fusion state machine.
//!
//! Composes a [`PoseTracker`], the range projection, an
//! [`ObstacleAggregator`] and a [`PathRecorder`] behind a single
//! [`apply`][MapEngine::apply] entry point.  Events must be applied in
//! delivery order: a [`MapEvent::SensorReading`] is projected from whatever
//! pose is current when it arrives.  A [`MapEvent::WorldReading`] uses the
//! current position only; its distances are already on the world axes.
//!
//! # States
//!
//! ```text
//!   Uninitialized ──PoseUpdate──▶ Tracking ──▶ (PoseUpdate | SensorReading | WorldReading)*
//! ```
//!
//! A sensor or world reading received while `Uninitialized` is rejected with
//! [`MapError::UnreadyState`] instead of assuming a zero pose.  Any event
//! carrying a NaN or infinite value is rejected with
//! [`MapError::NonFiniteValue`].  Rejections never mutate the map.
//!
//! # Example
//!
//! ```rust
//! use sonarmap_runtime::engine::MapEngine;
//! use sonarmap_types::{MapEvent, WorldPoint};
//!
//! let mut engine = MapEngine::new();
//! engine.apply(&MapEvent::pose(50.0, 50.0)).unwrap();
//! engine.apply(&MapEvent::reading(50.0, 50.0, 50.0, 50.0)).unwrap();
//!
//! let snap = engine.snapshot();
//! assert_eq!(snap.path, vec![WorldPoint::origin()]);
//! assert!(snap.obstacle_at(WorldPoint::new(0.0, 50.0)).is_some());
//! ```

use serde::{Deserialize, Serialize};
use sonarmap_perception::{ObstacleAggregator, OrientationSource, PathRecorder, PoseTracker, transform};
use sonarmap_types::{MapError, MapEvent, MapSnapshot, Pose, SensorReading};
use tracing::{debug, warn};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Construction options for [`MapEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Where heading comes from.
    pub orientation_source: OrientationSource,
    /// Heading in degrees until the source provides one.
    pub initial_orientation_deg: f64,
}

// ─────────────────────────────────────────────────────────────────────────────
// State & statistics
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle of a [`MapEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineState {
    /// No pose received yet; the origin is not calibrated.
    Uninitialized,
    /// Origin set; accepting pose and sensor events indefinitely.
    Tracking,
}

/// Running counters of what the engine has processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub poses: u64,
    pub readings: u64,
    pub orientations: u64,
    pub rejected: u64,
}

impl EngineStats {
    /// Total events accepted.
    pub fn accepted(&self) -> u64 {
        self.poses + self.readings + self.orientations
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MapEngine
// ─────────────────────────────────────────────────────────────────────────────

/// Single-writer map state.  See the [module docs][self].
#[derive(Debug, Clone)]
pub struct MapEngine {
    tracker: PoseTracker,
    obstacles: ObstacleAggregator,
    path: PathRecorder,
    stats: EngineStats,
}

impl Default for MapEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MapEngine {
    /// Engine with external heading starting at 0°.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            tracker: PoseTracker::with_source(
                config.orientation_source,
                config.initial_orientation_deg,
            ),
            obstacles: ObstacleAggregator::new(),
            path: PathRecorder::new(),
            stats: EngineStats::default(),
        }
    }

    pub fn state(&self) -> EngineState {
        if self.tracker.is_calibrated() {
            EngineState::Tracking
        } else {
            EngineState::Uninitialized
        }
    }

    /// Apply one event.
    ///
    /// # Errors
    ///
    /// * [`MapError::NonFiniteValue`] – a numeric field is NaN or infinite.
    /// * [`MapError::UnreadyState`] – a sensor reading arrived before any pose.
    ///
    /// On error the map is left untouched.
    pub fn apply(&mut self, event: &MapEvent) -> Result<(), MapError> {
        let result = event.ensure_finite().and_then(|()| self.dispatch(event));
        if let Err(e) = &result {
            self.stats.rejected += 1;
            warn!(event = event.kind(), error = %e, "event rejected");
        }
        result
    }

    fn dispatch(&mut self, event: &MapEvent) -> Result<(), MapError> {
        match event {
            MapEvent::PoseUpdate { x, y, orientation } => {
                self.on_pose(*x, *y, *orientation);
                Ok(())
            }
            MapEvent::SensorReading(reading) => self.on_reading(reading, false),
            MapEvent::WorldReading(reading) => self.on_reading(reading, true),
            MapEvent::OrientationUpdate { degrees } => {
                self.tracker.apply_orientation(*degrees);
                self.stats.orientations += 1;
                Ok(())
            }
        }
    }

    fn on_pose(&mut self, x: f64, y: f64, orientation: Option<f64>) {
        if let Some(degrees) = orientation {
            self.tracker.apply_orientation(degrees);
        }
        let pose = self.tracker.apply_pose(x, y);
        self.path.append(pose.position());
        self.stats.poses += 1;
        debug!(x = pose.x, y = pose.y, heading = pose.orientation, "pose applied");
    }

    /// `world_aligned` readings skip the heading rotation.
    fn on_reading(&mut self, reading: &SensorReading, world_aligned: bool) -> Result<(), MapError> {
        if !self.tracker.is_calibrated() {
            return Err(MapError::UnreadyState);
        }
        let mut pose = self.tracker.pose();
        if world_aligned {
            pose.orientation = 0.0;
        }
        let mut fresh = 0usize;
        for (direction, point) in transform(&pose, reading).iter() {
            if self.obstacles.record(point, direction) {
                fresh += 1;
            }
        }
        self.stats.readings += 1;
        debug!(fresh, total = self.obstacles.len(), "reading applied");
        Ok(())
    }

    /// Owned copy of the current map.
    ///
    /// Before the first pose this is [`MapSnapshot::empty`] with the robot at
    /// the zero pose.
    pub fn snapshot(&self) -> MapSnapshot {
        match self.state() {
            EngineState::Uninitialized => MapSnapshot::empty(),
            EngineState::Tracking => MapSnapshot {
                robot_pose: self.tracker.pose(),
                obstacles: self.obstacles.to_points(),
                path: self.path.points().to_vec(),
            },
        }
    }

    pub fn pose(&self) -> Pose {
        self.tracker.pose()
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn obstacles(&self) -> &ObstacleAggregator {
        &self.obstacles
    }

    pub fn path(&self) -> &PathRecorder {
        &self.path
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

//! `sonarmap-perception` – turns pose and range readings into world geometry.
//!
//! Every type in this crate is synchronous and free of I/O; ordering and
//! ownership are the runtime's concern.
//!
//! # Modules
//!
//! - [`pose`] – [`PoseTracker`][pose::PoseTracker]: calibrates the world
//!   origin on the first pose and tracks heading from a configurable
//!   [`OrientationSource`][pose::OrientationSource].
//! - [`transform`] – [`transform`][transform::transform]: projects the four
//!   cardinal range readings into world-frame points.
//! - [`obstacles`] – [`ObstacleAggregator`][obstacles::ObstacleAggregator]:
//!   exact-coordinate obstacle set tagged with the observing directions.
//! - [`path`] – [`PathRecorder`][path::PathRecorder]: append-only trail of
//!   visited positions.

pub mod obstacles;
pub mod path;
pub mod pose;
pub mod transform;

pub use obstacles::ObstacleAggregator;
pub use path::PathRecorder;
pub use pose::{OrientationSource, PoseTracker};
pub use transform::{ProjectedReading, transform};

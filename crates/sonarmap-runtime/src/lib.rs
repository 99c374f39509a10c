//! `sonarmap-runtime` – The Map Engine and its runtime
//!
//! Owns the live map and everything that moves data into and out of it.
//!
//! # Modules
//!
//! - [`engine`] – [`MapEngine`][engine::MapEngine]: the
//!   `Uninitialized → Tracking` state machine that calibrates the origin,
//!   records the path and fuses sensor readings into obstacles.
//! - [`actor`] – [`MapActor`][actor::MapActor] /
//!   [`MapHandle`][actor::MapHandle]: moves the engine into its own task so
//!   that events are applied one at a time in arrival order, while any number
//!   of readers take snapshots.  Accepted events, fresh snapshots and
//!   rejections are published on the [`EventBus`][sonarmap_middleware::EventBus].
//! - [`ingest`] – [`Ingestor`][ingest::Ingestor]: drains a
//!   [`MessageSource`][sonarmap_middleware::MessageSource] through the topic
//!   codec into the actor.
//! - [`feed`] – [`SnapshotFeed`][feed::SnapshotFeed]: WebSocket server that
//!   streams snapshots to dashboards.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   global `tracing` subscriber with an optional OTLP span exporter.  Set
//!   `OTEL_EXPORTER_OTLP_ENDPOINT` to enable live trace export.

pub mod actor;
pub mod engine;
pub mod feed;
pub mod ingest;
pub mod telemetry;

pub use actor::{MapActor, MapHandle};
pub use engine::{EngineConfig, EngineState, EngineStats, MapEngine};
pub use feed::SnapshotFeed;
pub use ingest::{IngestReport, Ingestor};
pub use telemetry::{TracerProviderGuard, init_tracing};

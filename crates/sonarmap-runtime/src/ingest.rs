//! Drains a [`MessageSource`] into a running map actor.
//!
//! For each message, in delivery order:
//!
//! 1. decode it with the [`TopicMap`] into zero or more [`MapEvent`]s,
//! 2. apply each event through the [`MapHandle`], waiting for the verdict
//!    before moving on.
//!
//! A message that fails to decode, or an event the engine rejects, is logged
//! and counted; ingestion carries on with the next one.  Only losing the
//! actor stops the run early.

use futures_util::StreamExt;
use serde::Serialize;
use sonarmap_middleware::{EventBus, MessageSource, Topic, TopicMap};
use sonarmap_types::{Event, EventPayload, MapError};
use tracing::{info, warn};

use crate::actor::MapHandle;

const EVENT_SOURCE: &str = "sonarmap-runtime::ingest";

/// Topic label for failures that happen before a topic is known.
const UNKNOWN_ORIGIN: &str = "<source>";

/// Totals for one [`Ingestor::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Messages pulled from the source, including undecodable ones.
    pub messages: u64,
    /// Events the engine accepted.
    pub applied: u64,
    /// Messages that failed to decode.
    pub malformed: u64,
    /// Decoded events the engine rejected.
    pub rejected: u64,
}

/// Feeds decoded events from a source into the map, in order.
pub struct Ingestor {
    topics: TopicMap,
    handle: MapHandle,
    bus: Option<EventBus>,
}

impl Ingestor {
    pub fn new(topics: TopicMap, handle: MapHandle) -> Self {
        Self {
            topics,
            handle,
            bus: None,
        }
    }

    /// Publish decode failures on [`Topic::Faults`] (builder-style).
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Consume `source` until its stream ends.
    ///
    /// # Errors
    ///
    /// Opening the source failed, or the map actor stopped
    /// ([`MapError::Channel`]).  Per-message failures are only counted.
    pub async fn run(&self, source: &dyn MessageSource) -> Result<IngestReport, MapError> {
        let mut stream = source.message_stream().await?;
        let mut report = IngestReport::default();

        while let Some(item) = stream.next().await {
            report.messages += 1;
            let message = match item {
                Ok(message) => message,
                Err(e) => {
                    self.malformed(&mut report, UNKNOWN_ORIGIN, e);
                    continue;
                }
            };
            let events = match self.topics.decode(&message.topic, &message.payload) {
                Ok(events) => events,
                Err(e) => {
                    self.malformed(&mut report, &message.topic, e);
                    continue;
                }
            };
            for event in events {
                match self.handle.apply(event).await {
                    Ok(()) => report.applied += 1,
                    Err(e @ MapError::Channel(_)) => return Err(e),
                    Err(e) => {
                        // The actor already published the fault.
                        warn!(topic = %message.topic, error = %e, "event rejected");
                        report.rejected += 1;
                    }
                }
            }
        }

        info!(
            messages = report.messages,
            applied = report.applied,
            malformed = report.malformed,
            rejected = report.rejected,
            "ingest finished"
        );
        Ok(report)
    }

    fn malformed(&self, report: &mut IngestReport, topic: &str, error: MapError) {
        warn!(topic, error = %error, "message dropped");
        report.malformed += 1;
        if let Some(bus) = &self.bus {
            bus.publish_to(
                Topic::Faults,
                Event::new(
                    EVENT_SOURCE,
                    EventPayload::Rejected {
                        topic: topic.to_string(),
                        error,
                    },
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::MapActor;
    use crate::engine::MapEngine;
    use sonarmap_middleware::{ChannelSource, RawMessage, ReplaySource};
    use sonarmap_types::{Direction, WorldPoint};

    const ROOM: &str = include_str!("../../../demos/room_exploration.ndjson");

    fn spawn() -> MapHandle {
        MapActor::spawn(MapEngine::new(), 64, None).0
    }

    #[tokio::test]
    async fn room_exploration_replays_cleanly() -> Result<(), MapError> {
        let handle = spawn();
        let ingestor = Ingestor::new(TopicMap::default(), handle.clone());
        let report = ingestor.run(&ReplaySource::from_text(ROOM)).await?;

        assert_eq!(report.messages, 72);
        assert_eq!(report.applied, 72);
        assert_eq!(report.malformed, 0);
        assert_eq!(report.rejected, 0);

        let snap = handle.snapshot().await?;
        assert_eq!(snap.path.len(), 36);
        assert_eq!(snap.path[0], WorldPoint::origin());
        assert_eq!(snap.robot_pose.position(), WorldPoint::new(30.0, 0.0));

        // The room is 100×100 around a centred origin: every echo is a wall.
        for obstacle in &snap.obstacles {
            assert!(
                obstacle.x.abs() == 50.0 || obstacle.y.abs() == 50.0,
                "obstacle off the walls: {obstacle:?}"
            );
        }
        let north_wall = snap.obstacle_at(WorldPoint::new(0.0, 50.0)).unwrap();
        assert!(north_wall.directions.contains(&Direction::North));
        Ok(())
    }

    #[tokio::test]
    async fn bad_messages_are_counted_and_skipped() -> Result<(), MapError> {
        let log = concat!(
            "{\"topic\":\"sensors/recalculated\",\"payload\":{\"n\":1,\"e\":1,\"s\":1,\"w\":1}}\n",
            "this is not json\n",
            "{\"topic\":\"robot/position\",\"payload\":\"{\\\"x\\\":\\\"abc\\\",\\\"y\\\":0}\"}\n",
            "{\"topic\":\"robot/status\",\"payload\":{}}\n",
            "{\"topic\":\"robot/position\",\"payload\":{\"x\":5,\"y\":5}}\n",
            "{\"topic\":\"sensors/recalculated\",\"payload\":{\"n\":1,\"e\":2,\"s\":3,\"w\":4}}\n",
        );
        let bus = EventBus::default();
        let mut faults = bus.subscribe_to(Topic::Faults);
        let handle = spawn();
        let ingestor = Ingestor::new(TopicMap::default(), handle.clone()).with_bus(bus);
        let report = ingestor.run(&ReplaySource::from_text(log)).await?;

        assert_eq!(
            report,
            IngestReport {
                messages: 6,
                applied: 2,
                malformed: 3,
                rejected: 1,
            }
        );
        let snap = handle.snapshot().await?;
        assert_eq!(snap.path.len(), 1);
        assert_eq!(snap.obstacles.len(), 4);

        let mut topics = Vec::new();
        while let Ok(event) = faults.try_recv() {
            if let EventPayload::Rejected { topic, .. } = event.payload {
                topics.push(topic);
            }
        }
        assert_eq!(topics, vec!["<source>", "robot/position", "robot/status"]);
        Ok(())
    }

    #[tokio::test]
    async fn recalculated_reading_is_not_rotated_again() -> Result<(), MapError> {
        let (tx, source) = ChannelSource::channel(8);
        tx.send(RawMessage::new("robot/position", br#"{"x":0,"y":0}"#.to_vec()))
            .await
            .unwrap();
        tx.send(RawMessage::new(
            "sensors/recalculated",
            br#"{"y":90.00,"n":10.01,"e":0.00,"s":0.00,"w":0.00}"#.to_vec(),
        ))
        .await
        .unwrap();
        drop(tx);

        let handle = spawn();
        let report = Ingestor::new(TopicMap::default(), handle.clone())
            .run(&source)
            .await?;
        assert_eq!(report.applied, 2);
        let snap = handle.snapshot().await?;
        assert!(snap.obstacle_at(WorldPoint::new(0.0, 10.01)).is_some());
        assert!(snap.obstacle_at(WorldPoint::new(-10.01, 0.0)).is_none());
        assert_eq!(snap.robot_pose.orientation, 0.0);
        Ok(())
    }

    #[tokio::test]
    async fn raw_reading_follows_pose_heading() -> Result<(), MapError> {
        let (tx, source) = ChannelSource::channel(8);
        tx.send(RawMessage::new(
            "robot/position",
            br#"{"x":0,"y":0,"orientation":90}"#.to_vec(),
        ))
        .await
        .unwrap();
        tx.send(RawMessage::new(
            "sensors/raw",
            br#"{"n":10,"e":0,"s":0,"w":0}"#.to_vec(),
        ))
        .await
        .unwrap();
        drop(tx);

        let handle = spawn();
        let report = Ingestor::new(TopicMap::default(), handle.clone())
            .run(&source)
            .await?;
        assert_eq!(report.applied, 2);
        let snap = handle.snapshot().await?;
        assert!(snap.obstacle_at(WorldPoint::new(-10.0, 0.0)).is_some());
        Ok(())
    }

    #[tokio::test]
    async fn stopped_actor_ends_the_run() {
        let (handle, task) = MapActor::spawn(MapEngine::new(), 1, None);
        task.abort();
        let _ = task.await;
        let err = Ingestor::new(TopicMap::default(), handle)
            .run(&ReplaySource::from_text(ROOM))
            .await
            .unwrap_err();
        assert!(matches!(err, MapError::Channel(_)));
    }
}

//! Headless, typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Events`] | Every input event the engine accepted |
//! | [`Topic::MapUpdates`] | A fresh snapshot after each accepted event |
//! | [`Topic::Faults`] | Messages or events that were dropped, with the reason |

use sonarmap_types::Event;
use tokio::sync::broadcast;
use tracing::trace;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Routing lanes on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Input events accepted by the engine, in application order.
    Events,
    /// Snapshots published after each accepted event.
    MapUpdates,
    /// Rejected messages and events.
    Faults,
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    events: broadcast::Sender<Event>,
    map_updates: broadcast::Sender<Event>,
    faults: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently and
    /// is raised to 1 when zero.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (events, _) = broadcast::channel(capacity);
        let (map_updates, _) = broadcast::channel(capacity);
        let (faults, _) = broadcast::channel(capacity);
        Self {
            events,
            map_updates,
            faults,
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event.
    /// Having nobody listening is normal and yields `0`.
    pub fn publish_to(&self, topic: Topic, event: Event) -> usize {
        match self.topic_sender(topic).send(event) {
            Ok(n) => n,
            Err(broadcast::error::SendError(_)) => {
                trace!(?topic, "no subscribers on topic");
                0
            }
        }
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topic_sender(topic).receiver_count()
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Events => &self.events,
            Topic::MapUpdates => &self.map_updates,
            Topic::Faults => &self.faults,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.  The caller decides whether to
    ///   continue or abort.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`recv`][Self::recv].
    pub fn try_recv(&mut self) -> Result<Event, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonarmap_types::{EventPayload, MapError, MapEvent};

    fn make_event(source: &str) -> Event {
        Event::new(source, EventPayload::Applied(MapEvent::pose(1.0, 2.0)))
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let bus = EventBus::default();
        assert_eq!(bus.publish_to(Topic::Events, make_event("test")), 0);
    }

    #[tokio::test]
    async fn zero_capacity_is_raised_to_one() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::new(0);
        let mut rx = bus.subscribe_to(Topic::Faults);
        let event = make_event("test");
        assert_eq!(bus.publish_to(Topic::Faults, event.clone()), 1);
        assert_eq!(rx.recv().await?.id, event.id);
        Ok(())
    }

    #[tokio::test]
    async fn topic_multiple_subscribers_receive_same_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut subscriber1 = bus.subscribe_to(Topic::MapUpdates);
        let mut subscriber2 = bus.subscribe_to(Topic::MapUpdates);
        assert_eq!(bus.subscriber_count(Topic::MapUpdates), 2);

        let event = make_event("sonarmap-runtime::actor");
        assert_eq!(bus.publish_to(Topic::MapUpdates, event.clone()), 2);

        assert_eq!(subscriber1.recv().await?.id, event.id);
        assert_eq!(subscriber2.recv().await?.id, event.id);
        Ok(())
    }

    /// A subscriber on `Faults` must not receive events published to
    /// `Events` because they are routed through separate channels.
    #[tokio::test]
    async fn topic_subscriber_does_not_receive_other_topic_events() {
        let bus = EventBus::default();
        let mut faults = bus.subscribe_to(Topic::Faults);
        let _events = bus.subscribe_to(Topic::Events);

        bus.publish_to(Topic::Events, make_event("replay"));

        let result = tokio::time::timeout(std::time::Duration::from_millis(50), faults.recv()).await;
        assert!(result.is_err(), "Faults subscriber must not receive an Events event");
        assert_eq!(faults.topic(), Topic::Faults);
    }

    #[tokio::test]
    async fn fault_payload_survives_the_bus() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut faults = bus.subscribe_to(Topic::Faults);

        bus.publish_to(
            Topic::Faults,
            Event::new(
                "ingest",
                EventPayload::Rejected {
                    topic: "sensors/recalculated".to_string(),
                    error: MapError::UnreadyState,
                },
            ),
        );

        let event = faults.recv().await?;
        assert!(matches!(
            event.payload,
            EventPayload::Rejected {
                error: MapError::UnreadyState,
                ..
            }
        ));
        Ok(())
    }

    /// Flooding a low-capacity channel while a subscriber sleeps must produce
    /// a `Lagged` error rather than panicking or blocking.
    #[tokio::test]
    async fn topic_channel_lag_on_slow_subscriber() {
        let bus = EventBus::new(16);
        let mut slow_sub = bus.subscribe_to(Topic::MapUpdates);

        for _ in 0..1_000 {
            bus.publish_to(Topic::MapUpdates, make_event("flood"));
        }

        let result = slow_sub.recv().await;
        assert!(
            matches!(result, Err(broadcast::error::RecvError::Lagged(_))),
            "expected Lagged error, got: {result:?}"
        );
    }
}

//! Single-owner task around a [`MapEngine`].
//!
//! The engine is mutated only from inside the actor task, so events are
//! applied strictly in the order their [`MapHandle::apply`] calls reach the
//! command channel.  Any number of cloned handles may read snapshots
//! concurrently without ever observing a half-applied event.
//!
//! When an [`EventBus`] is attached the actor also publishes:
//!
//! | Topic | Payload |
//! |---|---|
//! | [`Topic::Events`] | [`EventPayload::Applied`] for each accepted event |
//! | [`Topic::MapUpdates`] | [`EventPayload::Snapshot`] after each accepted event |
//! | [`Topic::Faults`] | [`EventPayload::Rejected`] for each rejected event |
//!
//! The task exits once every handle is dropped and hands the engine back
//! through its [`JoinHandle`].

use sonarmap_middleware::{EventBus, Topic};
use sonarmap_types::{Event, EventPayload, MapError, MapEvent, MapSnapshot};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::engine::{EngineState, EngineStats, MapEngine};

/// `source` field of events published by the actor.
const EVENT_SOURCE: &str = "sonarmap-runtime::actor";

enum Command {
    Apply {
        event: MapEvent,
        reply: oneshot::Sender<Result<(), MapError>>,
    },
    Snapshot {
        reply: oneshot::Sender<MapSnapshot>,
    },
    Status {
        reply: oneshot::Sender<(EngineState, EngineStats)>,
    },
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Apply { event, .. } => f.debug_struct("Apply").field("event", event).finish(),
            Command::Snapshot { .. } => f.write_str("Snapshot"),
            Command::Status { .. } => f.write_str("Status"),
        }
    }
}

/// The task side.  Use [`MapActor::spawn`] to start one.
pub struct MapActor {
    engine: MapEngine,
    commands: mpsc::Receiver<Command>,
    bus: Option<EventBus>,
}

impl MapActor {
    /// Move `engine` into a new task and return a handle to it.
    ///
    /// `capacity` bounds the command queue; callers wait when it is full.
    pub fn spawn(
        engine: MapEngine,
        capacity: usize,
        bus: Option<EventBus>,
    ) -> (MapHandle, JoinHandle<MapEngine>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let actor = Self {
            engine,
            commands: rx,
            bus,
        };
        (MapHandle { commands: tx }, tokio::spawn(actor.run()))
    }

    async fn run(mut self) -> MapEngine {
        while let Some(command) = self.commands.recv().await {
            self.handle(command);
        }
        let stats = self.engine.stats();
        info!(
            accepted = stats.accepted(),
            rejected = stats.rejected,
            "map actor stopped"
        );
        self.engine
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Apply { event, reply } => {
                let result = self.engine.apply(&event);
                self.publish(&event, &result);
                // The caller may have given up waiting; the event still counts.
                let _ = reply.send(result);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.engine.snapshot());
            }
            Command::Status { reply } => {
                let _ = reply.send((self.engine.state(), self.engine.stats()));
            }
        }
    }

    fn publish(&self, event: &MapEvent, result: &Result<(), MapError>) {
        let Some(bus) = &self.bus else {
            return;
        };
        match result {
            Ok(()) => {
                bus.publish_to(
                    Topic::Events,
                    Event::new(EVENT_SOURCE, EventPayload::Applied(event.clone())),
                );
                // Snapshots are full copies; skip building one nobody reads.
                if bus.subscriber_count(Topic::MapUpdates) > 0 {
                    let delivered = bus.publish_to(
                        Topic::MapUpdates,
                        Event::new(EVENT_SOURCE, EventPayload::Snapshot(self.engine.snapshot())),
                    );
                    debug!(delivered, "snapshot published");
                }
            }
            Err(error) => {
                bus.publish_to(
                    Topic::Faults,
                    Event::new(
                        EVENT_SOURCE,
                        EventPayload::Rejected {
                            topic: event.kind().to_string(),
                            error: error.clone(),
                        },
                    ),
                );
            }
        }
    }
}

/// Cloneable client for a running [`MapActor`].
#[derive(Clone, Debug)]
pub struct MapHandle {
    commands: mpsc::Sender<Command>,
}

impl MapHandle {
    /// Apply `event` and wait for the engine's verdict.
    ///
    /// # Errors
    ///
    /// The engine's rejection, or [`MapError::Channel`] if the actor is gone.
    pub async fn apply(&self, event: MapEvent) -> Result<(), MapError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Apply { event, reply }).await?;
        rx.await.map_err(|_| actor_gone())?
    }

    /// Current map as an owned snapshot.
    pub async fn snapshot(&self) -> Result<MapSnapshot, MapError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply }).await?;
        rx.await.map_err(|_| actor_gone())
    }

    pub async fn state(&self) -> Result<EngineState, MapError> {
        self.status().await.map(|(state, _)| state)
    }

    pub async fn stats(&self) -> Result<EngineStats, MapError> {
        self.status().await.map(|(_, stats)| stats)
    }

    async fn status(&self) -> Result<(EngineState, EngineStats), MapError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Status { reply }).await?;
        rx.await.map_err(|_| actor_gone())
    }

    async fn send(&self, command: Command) -> Result<(), MapError> {
        self.commands.send(command).await.map_err(|_| actor_gone())
    }
}

fn actor_gone() -> MapError {
    MapError::Channel("map actor has stopped".to_string())
}

//! Live WebSocket feed of map snapshots.
//!
//! [`SnapshotFeed`] serves every connecting client:
//!
//! 1. the current [`MapSnapshot`] as soon as the handshake completes, then
//! 2. one snapshot per accepted event, as published on
//!    [`Topic::MapUpdates`].
//!
//! Each frame is a single JSON text message.  A client may send
//! `{"op":"snapshot"}` at any time to get the current map again; other
//! incoming frames are ignored.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use sonarmap_middleware::{EventBus, Topic};
use sonarmap_types::{EventPayload, MapError, MapSnapshot};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::actor::MapHandle;

/// WebSocket server streaming [`MapSnapshot`]s to dashboards.
#[derive(Clone)]
pub struct SnapshotFeed {
    handle: MapHandle,
    bus: EventBus,
}

#[derive(Deserialize)]
struct ClientRequest {
    op: String,
}

impl SnapshotFeed {
    /// `bus` must be the bus the [`MapActor`][crate::actor::MapActor] behind
    /// `handle` publishes to.
    pub fn new(handle: MapHandle, bus: EventBus) -> Self {
        Self { handle, bus }
    }

    /// Bind `addr` and serve clients until the task is dropped.
    ///
    /// # Errors
    ///
    /// [`MapError::Io`] if the listener cannot be bound.
    pub async fn run(self, addr: SocketAddr) -> Result<(), MapError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| MapError::Io(format!("feed bind error on {addr}: {e}")))?;
        info!(%addr, "snapshot feed listening");
        self.serve(listener).await
    }

    /// Serve clients on an already-bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), MapError> {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let feed = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = feed.handle_client(stream, peer).await {
                            error!(peer = %peer, error = %e, "feed client error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "feed accept error");
                }
            }
        }
    }

    async fn handle_client(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), MapError> {
        let ws_stream = accept_async(stream)
            .await
            .map_err(|e| MapError::Io(format!("ws handshake from {peer}: {e}")))?;
        debug!(peer = %peer, "feed client connected");

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        // Subscribe before the first snapshot so no update falls in between.
        let mut updates = self.bus.subscribe_to(Topic::MapUpdates);

        let initial = self.handle.snapshot().await?;
        if ws_tx.send(encode(&initial)?).await.is_err() {
            return Ok(());
        }

        loop {
            tokio::select! {
                result = updates.recv() => {
                    match result {
                        Ok(event) => {
                            let EventPayload::Snapshot(snapshot) = event.payload else {
                                continue;
                            };
                            if ws_tx.send(encode(&snapshot)?).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(n)) => {
                            warn!(peer = %peer, lagged_by = n, "feed client lagged");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(_)) => break,
                        Some(Ok(Message::Text(text))) => {
                            if is_snapshot_request(text.as_str()) {
                                let snapshot = self.handle.snapshot().await?;
                                if ws_tx.send(encode(&snapshot)?).await.is_err() {
                                    break;
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        debug!(peer = %peer, "feed client disconnected");
        Ok(())
    }
}

fn encode(snapshot: &MapSnapshot) -> Result<Message, MapError> {
    serde_json::to_string(snapshot)
        .map(|json| Message::Text(json.into()))
        .map_err(|e| MapError::MalformedEvent(format!("snapshot encoding: {e}")))
}

fn is_snapshot_request(text: &str) -> bool {
    serde_json::from_str::<ClientRequest>(text).is_ok_and(|req| req.op == "snapshot")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::MapActor;
    use crate::engine::MapEngine;
    use sonarmap_types::{MapEvent, WorldPoint};
    use tokio_tungstenite::connect_async;

    async fn next_snapshot<S>(ws: &mut S) -> MapSnapshot
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        let msg = tokio::time::timeout(std::time::Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("ws error");
        match msg {
            Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[test]
    fn recognises_snapshot_requests() {
        assert!(is_snapshot_request(r#"{"op":"snapshot"}"#));
        assert!(!is_snapshot_request(r#"{"op":"subscribe"}"#));
        assert!(!is_snapshot_request("snapshot"));
    }

    #[tokio::test]
    async fn client_gets_initial_then_live_snapshots() {
        let bus = EventBus::default();
        let (handle, _task) = MapActor::spawn(MapEngine::new(), 16, Some(bus.clone()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(SnapshotFeed::new(handle.clone(), bus).serve(listener));

        let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();

        let initial = next_snapshot(&mut ws).await;
        assert_eq!(initial, MapSnapshot::empty());

        handle.apply(MapEvent::pose(50.0, 50.0)).await.unwrap();
        let live = next_snapshot(&mut ws).await;
        assert_eq!(live.path, vec![WorldPoint::origin()]);

        handle.apply(MapEvent::reading(50.0, 50.0, 50.0, 50.0)).await.unwrap();
        let live = next_snapshot(&mut ws).await;
        assert_eq!(live.obstacles.len(), 4);

        ws.send(Message::Text(r#"{"op":"snapshot"}"#.into())).await.unwrap();
        let requested = next_snapshot(&mut ws).await;
        assert_eq!(requested, live);
    }
}

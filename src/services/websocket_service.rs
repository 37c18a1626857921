use std::time::Duration;

use axum::{
    body::Bytes,
    extract::ws::{Message, WebSocket},
};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use serde::Deserialize;
use serde_with::{DurationSeconds, serde_as};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, interval_at, timeout, timeout_at},
};
use tracing::{debug, info, warn};

use crate::{
    dto::ws::{ClientAction, ServerMessage},
    error::ServiceError,
    services::{
        auth::PlayerIdentity,
        hub::{ConnectionHandle, ConnectionId, HubHandle},
    },
    state::SharedState,
};

/// Per-socket limits and keepalive timings.
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectionSettings {
    /// Frames queued for one socket before it is considered too slow.
    pub outbound_buffer: usize,
    /// Largest accepted inbound frame, in bytes.
    pub max_message_size: usize,
    /// Silence tolerated before the peer is considered gone.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub pong_wait: Duration,
    /// Must stay below `pong_wait`.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub ping_period: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub write_wait: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            outbound_buffer: 256,
            max_message_size: 512,
            pong_wait: Duration::from_secs(60),
            ping_period: Duration::from_secs(54),
            write_wait: Duration::from_secs(10),
        }
    }
}

/// Handle the full lifecycle of one player socket.
pub async fn handle_socket(state: SharedState, socket: WebSocket, player: PlayerIdentity) {
    let settings = state.config().connection.clone();
    let hub = state.hub().clone();

    let (sink, mut receiver) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::channel::<Message>(settings.outbound_buffer.max(1));

    // The hub keeps the only sender; dropping it from the registry ends this task.
    let mut writer_task = tokio::spawn(write_pump(sink, outbound_rx, settings.clone()));

    let connection = ConnectionHandle::new(&player, outbound_tx);
    let connection_id = connection.id;
    if hub.register(connection).await.is_err() {
        warn!(player_id = %player.player_id, "hub stopped; refusing connection");
        finalize(Some(writer_task), settings.write_wait).await;
        return;
    }
    info!(connection = %connection_id, player_id = %player.player_id, "player connected");

    let mut deadline = Instant::now() + settings.pong_wait;
    let mut writer_done = false;
    loop {
        let frame = tokio::select! {
            _ = &mut writer_task => {
                writer_done = true;
                break;
            }
            frame = timeout_at(deadline, receiver.next()) => frame,
        };

        match frame {
            Ok(Some(Ok(Message::Text(text)))) => {
                if !forward_frame(&hub, connection_id, text.as_str()).await {
                    break;
                }
            }
            Ok(Some(Ok(Message::Pong(_)))) => deadline = Instant::now() + settings.pong_wait,
            Ok(Some(Ok(Message::Close(_)))) => {
                debug!(connection = %connection_id, "peer closed");
                break;
            }
            Ok(Some(Ok(Message::Ping(_) | Message::Binary(_)))) => {}
            Ok(Some(Err(err))) => {
                warn!(connection = %connection_id, error = %err, "websocket error");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                info!(connection = %connection_id, "read deadline passed; closing");
                break;
            }
        }
    }

    let _ = hub.unregister(connection_id).await;
    info!(connection = %connection_id, player_id = %player.player_id, "player disconnected");

    finalize((!writer_done).then_some(writer_task), settings.write_wait).await;
}

/// Parse one text frame and queue it on the hub. Returns `false` once the hub is gone.
async fn forward_frame(hub: &HubHandle, connection_id: ConnectionId, raw: &str) -> bool {
    let err = match ClientAction::from_json_str(raw) {
        Ok(action) => return hub.dispatch(connection_id, action).await.is_ok(),
        Err(err) => err,
    };

    let Some(action) = err.action() else {
        warn!(connection = %connection_id, error = %err, "dropping unparseable frame");
        return true;
    };
    let rejected = ServiceError::InvalidInput(err.to_string());
    debug!(connection = %connection_id, error = %rejected, "invalid frame");
    if let Some(error_type) = action.error_type() {
        let message = ServerMessage::error(
            action.game_id().unwrap_or_default(),
            error_type,
            rejected.reason(),
        );
        hub.send_to_connection(connection_id, &message);
    }
    true
}

/// Drain the outbound buffer into the socket and keep the peer alive with pings.
async fn write_pump(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Message>,
    settings: ConnectionSettings,
) {
    let mut ping = interval_at(Instant::now() + settings.ping_period, settings.ping_period);

    loop {
        let message = tokio::select! {
            next = outbound.recv() => match next {
                Some(message) => message,
                None => {
                    let _ = timeout(settings.write_wait, sink.send(Message::Close(None))).await;
                    break;
                }
            },
            _ = ping.tick() => Message::Ping(Bytes::new()),
        };

        match timeout(settings.write_wait, sink.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                debug!(error = %err, "websocket write failed");
                break;
            }
            Err(_) => {
                warn!("websocket write timed out");
                break;
            }
        }
    }
}

/// Give the writer a bounded window to flush its close frame.
async fn finalize(writer_task: Option<JoinHandle<()>>, grace: Duration) {
    let Some(mut writer_task) = writer_task else {
        return;
    };
    if timeout(grace, &mut writer_task).await.is_err() {
        writer_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        dao::game_store::{GameStore, memory::MemoryGameStore},
        dto::ws::{ErrorType, EventKind, EventPayload},
        services::{
            hub::{Hub, HubSettings},
            words::Lexicon,
        },
    };

    async fn connected() -> (HubHandle, ConnectionId, mpsc::Receiver<Message>) {
        let store: Arc<dyn GameStore> = Arc::new(MemoryGameStore::default());
        let words = Arc::new(Lexicon::builtin().unwrap());
        let (hub, _) = Hub::spawn(store, words, &HubSettings::default());

        let (tx, rx) = mpsc::channel(8);
        let player = PlayerIdentity {
            player_id: "alice".into(),
            player_name: "Alice".into(),
        };
        let handle = ConnectionHandle::new(&player, tx);
        let id = handle.id;
        hub.register(handle).await.unwrap();
        while hub.connection_count() == 0 {
            tokio::task::yield_now().await;
        }
        (hub, id, rx)
    }

    #[tokio::test]
    async fn invalid_submit_frame_is_answered_with_invalid_input() {
        let (hub, id, mut rx) = connected().await;

        let raw = r#"{"action":"submit_word","gameId":"g1","word":"c0rd"}"#;
        assert!(forward_frame(&hub, id, raw).await);

        let frame = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        let Message::Text(text) = frame else {
            panic!("unexpected {frame:?}");
        };
        let message: ServerMessage = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(message.kind, EventKind::Error);
        assert_eq!(message.game_id, "g1");
        match message.payload {
            Some(EventPayload::Error(payload)) => {
                assert_eq!(payload.error_type, ErrorType::SubmitFailed);
                assert_eq!(payload.message, "invalid_input");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn frames_without_a_reply_are_dropped() {
        let (hub, id, mut rx) = connected().await;

        assert!(forward_frame(&hub, id, "not json").await);
        assert!(forward_frame(&hub, id, r#"{"action":"leave_game","gameId":"bad id"}"#).await);
        assert!(rx.try_recv().is_err());
    }
}

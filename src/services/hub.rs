//! Per-process connection hub.
//!
//! One actor task owns every mutation of local connection state and drains three
//! bounded queues (register, unregister, action). The registry it maintains is a
//! pair of sharded maps so the relay and the send path can read it concurrently.
//! Game events never go straight from the actor to sockets: they are published
//! on the store channel and come back through the relay, so players attached to
//! different instances see the same stream.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use axum::extract::ws::{Message, Utf8Bytes};
use dashmap::DashMap;
use serde::Deserialize;
use thiserror::Error;
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        game_store::GameStore,
        models::{WinReason, WordSubmission},
        storage::Rejection,
    },
    dto::ws::{ClientAction, ServerMessage, WordSubmittedPayload},
    error::ServiceError,
    services::{auth::PlayerIdentity, words::WordRules},
};

/// Identifier of one live socket.
pub type ConnectionId = Uuid;

/// Sizing of the hub's inbound queues.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HubSettings {
    pub queue_capacity: usize,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
        }
    }
}

/// Returned when the hub actor is gone.
#[derive(Debug, Error)]
#[error("connection hub has stopped")]
pub struct HubClosed;

/// A registered socket. The registry holds the only sender of its outbound
/// buffer, so removing the entry closes the buffer and ends the write pump.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub player_id: String,
    pub player_name: String,
    outbound: mpsc::Sender<Message>,
}

impl ConnectionHandle {
    pub fn new(player: &PlayerIdentity, outbound: mpsc::Sender<Message>) -> Self {
        Self {
            id: Uuid::new_v4(),
            player_id: player.player_id.clone(),
            player_name: player.player_name.clone(),
            outbound,
        }
    }
}

#[derive(Default)]
struct Registry {
    connections: DashMap<ConnectionId, ConnectionHandle>,
    groups: DashMap<String, HashSet<ConnectionId>>,
}

/// Cloneable front of the hub.
#[derive(Clone)]
pub struct HubHandle {
    register_tx: mpsc::Sender<ConnectionHandle>,
    unregister_tx: mpsc::Sender<ConnectionId>,
    action_tx: mpsc::Sender<(ConnectionId, ClientAction)>,
    registry: Arc<Registry>,
}

impl HubHandle {
    /// Queue a new connection. Registering the same id twice is a no-op.
    pub async fn register(&self, connection: ConnectionHandle) -> Result<(), HubClosed> {
        self.register_tx.send(connection).await.map_err(|_| HubClosed)
    }

    /// Queue the removal of a connection. Safe for unknown ids.
    pub async fn unregister(&self, id: ConnectionId) -> Result<(), HubClosed> {
        self.unregister_tx.send(id).await.map_err(|_| HubClosed)
    }

    /// Queue an action; actions of one connection are handled in order.
    pub async fn dispatch(&self, id: ConnectionId, action: ClientAction) -> Result<(), HubClosed> {
        self.action_tx
            .send((id, action))
            .await
            .map_err(|_| HubClosed)
    }

    /// Best-effort fan-out of a raw event to every local member of the game.
    /// Never waits: a member whose buffer is full misses the event and is
    /// scheduled for removal. Returns the number of members that got it.
    pub fn broadcast_to_game(&self, game_id: &str, payload: &str) -> usize {
        let members: Vec<ConnectionId> = match self.registry.groups.get(game_id) {
            Some(group) => group.iter().copied().collect(),
            None => return 0,
        };

        let text = Utf8Bytes::from(payload);
        let mut delivered = 0;
        for id in members {
            if self.try_deliver(id, Message::Text(text.clone())) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Push a frame to a single connection with the same eviction rules as a broadcast.
    pub fn send_to_connection(&self, id: ConnectionId, message: &ServerMessage) -> bool {
        match message.to_json() {
            Ok(payload) => self.try_deliver(id, Message::Text(payload.into())),
            Err(err) => {
                error!(error = %err, "failed to serialise server message");
                false
            }
        }
    }

    /// Local members of a game.
    pub fn group_size(&self, game_id: &str) -> usize {
        self.registry
            .groups
            .get(game_id)
            .map_or(0, |group| group.len())
    }

    /// Registered connections on this instance.
    pub fn connection_count(&self) -> usize {
        self.registry.connections.len()
    }

    /// Whether the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.action_tx.is_closed()
    }

    fn try_deliver(&self, id: ConnectionId, message: Message) -> bool {
        let result = match self.registry.connections.get(&id) {
            Some(connection) => connection.outbound.try_send(message),
            None => return false,
        };

        match result {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(connection = %id, "outbound buffer full; dropping connection");
                self.evict(id);
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.evict(id);
                false
            }
        }
    }

    fn evict(&self, id: ConnectionId) {
        match self.unregister_tx.try_send(id) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(id)) => {
                let unregister_tx = self.unregister_tx.clone();
                tokio::spawn(async move {
                    let _ = unregister_tx.send(id).await;
                });
            }
        }
    }
}

/// The hub actor.
pub struct Hub {
    store: Arc<dyn GameStore>,
    words: Arc<dyn WordRules>,
    registry: Arc<Registry>,
    /// Game each connection is attached to.
    attachments: HashMap<ConnectionId, String>,
    /// Connections whose direct frame could not be queued.
    evictions: Vec<ConnectionId>,
    register_rx: mpsc::Receiver<ConnectionHandle>,
    unregister_rx: mpsc::Receiver<ConnectionId>,
    action_rx: mpsc::Receiver<(ConnectionId, ClientAction)>,
}

impl Hub {
    /// Start the actor. It stops once every [`HubHandle`] is dropped.
    pub fn spawn(
        store: Arc<dyn GameStore>,
        words: Arc<dyn WordRules>,
        settings: &HubSettings,
    ) -> (HubHandle, JoinHandle<()>) {
        let capacity = settings.queue_capacity.max(1);
        let (register_tx, register_rx) = mpsc::channel(capacity);
        let (unregister_tx, unregister_rx) = mpsc::channel(capacity);
        let (action_tx, action_rx) = mpsc::channel(capacity);
        let registry = Arc::new(Registry::default());

        let hub = Self {
            store,
            words,
            registry: registry.clone(),
            attachments: HashMap::new(),
            evictions: Vec::new(),
            register_rx,
            unregister_rx,
            action_rx,
        };
        let task = tokio::spawn(hub.run());

        let handle = HubHandle {
            register_tx,
            unregister_tx,
            action_tx,
            registry,
        };
        (handle, task)
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                Some(connection) = self.register_rx.recv() => self.register(connection),
                Some(id) = self.unregister_rx.recv() => self.unregister(id).await,
                Some((id, action)) = self.action_rx.recv() => self.handle_action(id, action).await,
                else => break,
            }

            while let Some(id) = self.evictions.pop() {
                self.unregister(id).await;
            }
        }
        info!("connection hub stopped");
    }

    fn register(&mut self, connection: ConnectionHandle) {
        debug!(connection = %connection.id, player_id = %connection.player_id, "connection registered");
        self.registry
            .connections
            .entry(connection.id)
            .or_insert(connection);
    }

    async fn unregister(&mut self, id: ConnectionId) {
        if !self.registry.connections.contains_key(&id) {
            return;
        }
        self.leave_game(id).await;
        if let Some((_, connection)) = self.registry.connections.remove(&id) {
            debug!(connection = %id, player_id = %connection.player_id, "connection unregistered");
        }
    }

    async fn handle_action(&mut self, id: ConnectionId, action: ClientAction) {
        let Some(connection) = self.registry.connections.get(&id).map(|entry| entry.clone()) else {
            debug!(connection = %id, action = action.name(), "action from unknown connection ignored");
            return;
        };

        let result = match &action {
            ClientAction::JoinGame { game_id } => self.join_game(&connection, game_id).await,
            ClientAction::LeaveGame { .. } => {
                self.leave_game(id).await;
                Ok(())
            }
            ClientAction::SubmitWord { game_id, word } => {
                self.submit_word(&connection, game_id, word).await
            }
        };

        let Err(err) = result else {
            return;
        };
        match &err {
            ServiceError::Unavailable(source) => {
                error!(player_id = %connection.player_id, action = action.name(), error = %source, "store failure while handling action")
            }
            other => {
                info!(player_id = %connection.player_id, action = action.name(), reason = other.reason(), "action refused")
            }
        }
        if let Some(error_type) = action.error_type() {
            let game_id = action.game_id().unwrap_or_default();
            self.send_direct(&connection, ServerMessage::error(game_id, error_type, err.reason()));
        }
    }

    async fn join_game(
        &mut self,
        connection: &ConnectionHandle,
        game_id: &str,
    ) -> Result<(), ServiceError> {
        let attached = self.attachments.get(&connection.id).cloned();
        match attached.as_deref() {
            Some(current) if current == game_id => {
                self.send_direct(connection, ServerMessage::joined(game_id));
                return Ok(());
            }
            Some(_) => self.leave_game(connection.id).await,
            None => {}
        }

        let joined = self.store.join_session(game_id.to_owned()).await?;
        self.attach(connection.id, game_id);
        info!(
            game_id,
            player_id = %connection.player_id,
            connected = joined.connected_count,
            started = joined.started,
            "joined game session"
        );
        self.send_direct(connection, ServerMessage::joined(game_id));

        if joined.started {
            self.announce_start(game_id).await;
        }
        Ok(())
    }

    async fn announce_start(&self, game_id: &str) {
        match self.store.find_game(game_id.to_owned()).await {
            Ok(Some(game)) => self.publish(game_id, &ServerMessage::game_started(&game)).await,
            Ok(None) => warn!(game_id, "game vanished right after starting"),
            Err(err) => error!(game_id, error = %err, "failed to load started game"),
        }
    }

    async fn leave_game(&mut self, id: ConnectionId) {
        let Some(game_id) = self.detach(id) else {
            return;
        };
        match self.store.leave_session(game_id.clone()).await {
            Ok(remaining) => debug!(game_id, connection = %id, remaining, "left game session"),
            Err(err) => warn!(game_id, connection = %id, error = %err, "failed to leave game session"),
        }
    }

    async fn submit_word(
        &mut self,
        connection: &ConnectionHandle,
        game_id: &str,
        word: &str,
    ) -> Result<(), ServiceError> {
        if self.attachments.get(&connection.id).map(String::as_str) != Some(game_id) {
            return Err(ServiceError::NotInGame(game_id.to_owned()));
        }
        let word = word.trim().to_lowercase();

        let game = self
            .store
            .find_game(game_id.to_owned())
            .await?
            .ok_or(Rejection::GameNotFound)?;
        if game.current_turn_id.as_deref() != Some(connection.player_id.as_str()) {
            return Err(Rejection::NotYourTurn.into());
        }
        if self
            .store
            .is_word_played(game_id.to_owned(), word.clone())
            .await?
        {
            return Err(Rejection::WordAlreadyPlayed.into());
        }
        let current = game.current_word.clone().unwrap_or_default();
        if !self.words.is_valid_move(&current, &word) {
            return Err(ServiceError::InvalidMove {
                current,
                candidate: word,
            });
        }

        let outcome = self
            .store
            .submit_word(WordSubmission {
                game_id: game_id.to_owned(),
                player_id: connection.player_id.clone(),
                word: word.clone(),
                continuations: self.words.continuations(&word),
            })
            .await?;
        info!(game_id, player_id = %connection.player_id, word, next = %outcome.next_turn_id, "word accepted");

        let player_name = game
            .player_name(&connection.player_id)
            .unwrap_or(&connection.player_name)
            .to_owned();
        let submitted = ServerMessage::word_submitted(
            game_id,
            WordSubmittedPayload {
                player_id: connection.player_id.clone(),
                player_name,
                word,
                current_turn_id: outcome.next_turn_id,
            },
        );
        self.publish(game_id, &submitted).await;

        if let Some(winner_id) = outcome.winner_id {
            info!(game_id, winner_id, "game won by exhausting moves");
            let ended = ServerMessage::game_ended(game_id, winner_id, WinReason::NoMoves);
            self.publish(game_id, &ended).await;
        }
        Ok(())
    }

    /// Events that concern the whole game go through the store channel.
    async fn publish(&self, game_id: &str, message: &ServerMessage) {
        let payload = match message.to_json() {
            Ok(payload) => payload,
            Err(err) => {
                error!(game_id, error = %err, "failed to serialise game event");
                return;
            }
        };
        if let Err(err) = self.store.publish(game_id.to_owned(), payload).await {
            error!(game_id, error = %err, "failed to publish game event");
        }
    }

    fn send_direct(&mut self, connection: &ConnectionHandle, message: ServerMessage) {
        let payload = match message.to_json() {
            Ok(payload) => payload,
            Err(err) => {
                error!(error = %err, "failed to serialise server message");
                return;
            }
        };
        match connection.outbound.try_send(Message::Text(payload.into())) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(connection = %connection.id, "outbound buffer full; dropping connection");
                self.evictions.push(connection.id);
            }
            Err(TrySendError::Closed(_)) => self.evictions.push(connection.id),
        }
    }

    fn attach(&mut self, id: ConnectionId, game_id: &str) {
        self.attachments.insert(id, game_id.to_owned());
        self.registry
            .groups
            .entry(game_id.to_owned())
            .or_default()
            .insert(id);
    }

    fn detach(&mut self, id: ConnectionId) -> Option<String> {
        let game_id = self.attachments.remove(&id)?;
        if let Some(mut group) = self.registry.groups.get_mut(&game_id) {
            group.remove(&id);
        }
        self.registry
            .groups
            .remove_if(&game_id, |_, group| group.is_empty());
        Some(game_id)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::{
        dao::{
            game_store::memory::MemoryGameStore,
            models::{Challenger, GameEntity, GameKind, GameListing},
        },
        dto::ws::{ErrorPayload, EventKind, EventPayload},
        services::words::Lexicon,
    };

    struct Client {
        id: ConnectionId,
        rx: mpsc::Receiver<Message>,
    }

    impl Client {
        async fn next(&mut self) -> ServerMessage {
            let frame = timeout(Duration::from_secs(1), self.rx.recv())
                .await
                .expect("frame in time")
                .expect("channel open");
            match frame {
                Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    fn hub(store: &MemoryGameStore) -> HubHandle {
        let words = Arc::new(Lexicon::builtin().unwrap());
        Hub::spawn(Arc::new(store.clone()), words, &HubSettings::default()).0
    }

    async fn connect(hub: &HubHandle, player_id: &str, capacity: usize) -> Client {
        let (tx, rx) = mpsc::channel(capacity);
        let identity = PlayerIdentity {
            player_id: player_id.into(),
            player_name: player_id.to_uppercase(),
        };
        let handle = ConnectionHandle::new(&identity, tx);
        let id = handle.id;
        hub.register(handle).await.unwrap();
        Client { id, rx }
    }

    async fn ready_game(store: &MemoryGameStore) {
        let game = GameEntity::waiting(
            "g1".into(),
            GameKind::Online,
            None,
            "alice".into(),
            "ALICE".into(),
            0,
        );
        store.create_game(game, GameListing::Matchmaking).await.unwrap();
        store
            .pop_and_join(Challenger {
                player_id: "bob".into(),
                player_name: "BOB".into(),
                start_word: "cold".into(),
            })
            .await
            .unwrap()
            .unwrap();
    }

    fn join(game_id: &str) -> ClientAction {
        ClientAction::JoinGame {
            game_id: game_id.into(),
        }
    }

    #[tokio::test]
    async fn rejoining_the_same_game_only_acknowledges() {
        let store = MemoryGameStore::default();
        ready_game(&store).await;
        let hub = hub(&store);
        let mut alice = connect(&hub, "alice", 8).await;

        hub.dispatch(alice.id, join("g1")).await.unwrap();
        assert_eq!(alice.next().await.kind, EventKind::JoinedGame);
        hub.dispatch(alice.id, join("g1")).await.unwrap();
        assert_eq!(alice.next().await.kind, EventKind::JoinedGame);

        let game = store.find_game("g1".into()).await.unwrap().unwrap();
        assert_eq!(game.connected_count, 1);
        assert_eq!(hub.group_size("g1"), 1);
    }

    #[tokio::test]
    async fn submitting_outside_the_game_reports_not_in_game() {
        let store = MemoryGameStore::default();
        ready_game(&store).await;
        let hub = hub(&store);
        let mut alice = connect(&hub, "alice", 8).await;

        hub.dispatch(
            alice.id,
            ClientAction::SubmitWord {
                game_id: "g1".into(),
                word: "cord".into(),
            },
        )
        .await
        .unwrap();

        let frame = alice.next().await;
        assert_eq!(frame.kind, EventKind::Error);
        assert!(matches!(
            frame.payload,
            Some(EventPayload::Error(ErrorPayload { ref message, .. })) if message == "not_in_game"
        ));
    }

    #[tokio::test]
    async fn joining_a_missing_game_fails_without_attaching() {
        let store = MemoryGameStore::default();
        let hub = hub(&store);
        let mut alice = connect(&hub, "alice", 8).await;

        hub.dispatch(alice.id, join("nope")).await.unwrap();
        let frame = alice.next().await;
        assert_eq!(frame.kind, EventKind::Error);
        assert!(matches!(
            frame.payload,
            Some(EventPayload::Error(ErrorPayload { ref message, .. })) if message == "game_not_found"
        ));
        assert_eq!(hub.group_size("nope"), 0);
    }

    #[tokio::test]
    async fn unregister_releases_the_session_slot() {
        let store = MemoryGameStore::default();
        ready_game(&store).await;
        let hub = hub(&store);
        let mut alice = connect(&hub, "alice", 8).await;

        hub.dispatch(alice.id, join("g1")).await.unwrap();
        alice.next().await;
        hub.unregister(alice.id).await.unwrap();
        hub.unregister(alice.id).await.unwrap();

        // The registry dropped the only sender.
        assert!(timeout(Duration::from_secs(1), alice.rx.recv()).await.unwrap().is_none());
        let game = store.find_game("g1".into()).await.unwrap().unwrap();
        assert_eq!(game.connected_count, 0);
        assert_eq!(hub.group_size("g1"), 0);
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn full_buffer_drops_the_message_and_evicts() {
        let store = MemoryGameStore::default();
        ready_game(&store).await;
        let hub = hub(&store);
        let mut slow = connect(&hub, "alice", 1).await;
        let mut fast = connect(&hub, "bob", 8).await;

        hub.dispatch(slow.id, join("g1")).await.unwrap();
        hub.dispatch(fast.id, join("g1")).await.unwrap();
        fast.next().await;
        // alice's single slot now holds joined_game; game_started went through
        // the store channel, which nobody relays here.
        assert_eq!(hub.group_size("g1"), 2);

        let delivered = hub.broadcast_to_game("g1", r#"{"type":"word_submitted","gameId":"g1"}"#);
        assert_eq!(delivered, 1);

        assert_eq!(slow.next().await.kind, EventKind::JoinedGame);
        assert!(timeout(Duration::from_secs(1), slow.rx.recv()).await.unwrap().is_none());
        assert_eq!(hub.group_size("g1"), 1);
        assert_eq!(fast.next().await.kind, EventKind::WordSubmitted);
    }
}

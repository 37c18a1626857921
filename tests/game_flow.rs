//! End-to-end game flows through the hub, the relay and the arbiter on the in-memory store.

use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::extract::ws::Message;
use tokio::{sync::mpsc, time::timeout};

use delta_back::{
    config::AppConfig,
    dao::{
        game_store::{GameStore, ProtocolSettings, memory::MemoryGameStore},
        models::{GameStatus, WinReason},
    },
    dto::{
        game::MatchStatus,
        ws::{ClientAction, ErrorPayload, EventKind, EventPayload, ServerMessage},
    },
    services::{
        arbiter::{ArbiterSettings, TimeoutArbiter},
        auth::{HeaderAuthenticator, PlayerIdentity},
        hub::{ConnectionHandle, ConnectionId, Hub, HubHandle, HubSettings},
        matchmaking_service, relay,
        words::Lexicon,
    },
    state::{AppState, SharedState},
};

struct Player {
    identity: PlayerIdentity,
    connection: ConnectionId,
    rx: mpsc::Receiver<Message>,
}

impl Player {
    async fn next(&mut self) -> ServerMessage {
        let frame = timeout(Duration::from_secs(2), self.rx.recv())
            .await
            .expect("frame in time")
            .expect("connection open");
        match frame {
            Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("unexpected {other:?}"),
        }
    }

    async fn expect(&mut self, kind: EventKind) -> ServerMessage {
        let frame = self.next().await;
        assert_eq!(frame.kind, kind, "got {frame:?}");
        frame
    }
}

struct Harness {
    store: MemoryGameStore,
    state: SharedState,
    hub: HubHandle,
}

impl Harness {
    /// `cold` is the only start word; `colt` leads nowhere new.
    async fn start() -> Self {
        let store = MemoryGameStore::new(ProtocolSettings::default());
        let map = HashMap::from([
            ("cold".to_string(), vec!["cord".to_string(), "colt".to_string()]),
            ("colt".to_string(), vec!["cold".to_string()]),
            (
                "cord".to_string(),
                vec!["cold".to_string(), "card".to_string(), "word".to_string()],
            ),
            ("card".to_string(), vec!["cord".to_string()]),
            ("word".to_string(), vec!["cord".to_string()]),
        ]);
        let words = Arc::new(Lexicon::from_map(map, vec!["cold".into()]).unwrap());
        let shared: Arc<dyn GameStore> = Arc::new(store.clone());

        let (hub, _) = Hub::spawn(shared.clone(), words.clone(), &HubSettings::default());
        relay::start(shared.clone(), hub.clone()).await.unwrap();
        let state = AppState::new(
            AppConfig::default(),
            shared,
            words,
            Arc::new(HeaderAuthenticator),
            hub.clone(),
        );

        Self { store, state, hub }
    }

    async fn connect(&self, player_id: &str) -> Player {
        let identity = PlayerIdentity {
            player_id: player_id.into(),
            player_name: format!("{player_id} name"),
        };
        let (tx, rx) = mpsc::channel(16);
        let handle = ConnectionHandle::new(&identity, tx);
        let connection = handle.id;
        self.hub.register(handle).await.unwrap();
        Player {
            identity,
            connection,
            rx,
        }
    }

    async fn send(&self, player: &Player, action: ClientAction) {
        self.hub.dispatch(player.connection, action).await.unwrap();
    }

    /// Match both players and start the game on their sockets.
    async fn started_game(&self, alice: &mut Player, bob: &mut Player) -> String {
        let waiting = matchmaking_service::find_game(&self.state, &alice.identity)
            .await
            .unwrap();
        assert_eq!(waiting.status, MatchStatus::Waiting);
        let matched = matchmaking_service::find_game(&self.state, &bob.identity)
            .await
            .unwrap();
        assert_eq!(matched.status, MatchStatus::Matched);
        assert_eq!(matched.game_id, waiting.game_id);
        let game_id = matched.game_id;

        self.send(alice, join(&game_id)).await;
        alice.expect(EventKind::JoinedGame).await;
        self.send(bob, join(&game_id)).await;
        bob.expect(EventKind::JoinedGame).await;

        for player in [&mut *alice, &mut *bob] {
            let started = player.expect(EventKind::GameStarted).await;
            match started.payload {
                Some(EventPayload::GameStarted(payload)) => {
                    assert_eq!(payload.start_word, "cold");
                    assert_eq!(payload.current_turn_id, "alice");
                    assert_eq!(payload.player2_name, "bob name");
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        game_id
    }
}

fn join(game_id: &str) -> ClientAction {
    ClientAction::JoinGame {
        game_id: game_id.into(),
    }
}

fn submit(game_id: &str, word: &str) -> ClientAction {
    ClientAction::SubmitWord {
        game_id: game_id.into(),
        word: word.into(),
    }
}

fn error_message(frame: &ServerMessage) -> &str {
    match &frame.payload {
        Some(EventPayload::Error(ErrorPayload { message, .. })) => message,
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn abandoned_turn_is_settled_by_the_arbiter() {
    let harness = Harness::start().await;
    let mut alice = harness.connect("alice").await;
    let mut bob = harness.connect("bob").await;
    let game_id = harness.started_game(&mut alice, &mut bob).await;

    harness.send(&alice, submit(&game_id, "Cord ")).await;
    for player in [&mut alice, &mut bob] {
        let frame = player.expect(EventKind::WordSubmitted).await;
        match frame.payload {
            Some(EventPayload::WordSubmitted(payload)) => {
                assert_eq!(payload.word, "cord");
                assert_eq!(payload.player_name, "alice name");
                assert_eq!(payload.current_turn_id, "bob");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    // Played words and out-of-turn moves only reach the sender.
    harness.send(&bob, submit(&game_id, "cord")).await;
    let refused = bob.expect(EventKind::Error).await;
    assert_eq!(error_message(&refused), "word_already_played");
    harness.send(&alice, submit(&game_id, "card")).await;
    let refused = alice.expect(EventKind::Error).await;
    assert_eq!(error_message(&refused), "not_your_turn");

    let arbiter = TimeoutArbiter::new(harness.state.store().clone(), ArbiterSettings::default());
    assert!(arbiter.tick().await.unwrap().is_empty());

    harness.store.advance_clock(Duration::from_secs(101));
    let settled = arbiter.tick().await.unwrap();
    assert_eq!(settled.len(), 1);
    assert_eq!(settled[0].winner_id, "alice");
    assert!(arbiter.tick().await.unwrap().is_empty());

    for player in [&mut alice, &mut bob] {
        let frame = player.expect(EventKind::GameEnded).await;
        match frame.payload {
            Some(EventPayload::GameEnded(payload)) => {
                assert_eq!(payload.winner_id, "alice");
                assert_eq!(payload.reason, WinReason::Timeout);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    let game = harness.store.find_game(game_id).await.unwrap().unwrap();
    assert_eq!(game.status, GameStatus::Completed);
    assert_eq!(game.win_reason, Some(WinReason::Timeout));
}

#[tokio::test]
async fn move_without_replies_wins_the_game() {
    let harness = Harness::start().await;
    let mut alice = harness.connect("alice").await;
    let mut bob = harness.connect("bob").await;
    let game_id = harness.started_game(&mut alice, &mut bob).await;

    harness.send(&alice, submit(&game_id, "colt")).await;
    for player in [&mut alice, &mut bob] {
        player.expect(EventKind::WordSubmitted).await;
        let frame = player.expect(EventKind::GameEnded).await;
        match frame.payload {
            Some(EventPayload::GameEnded(payload)) => {
                assert_eq!(payload.winner_id, "alice");
                assert_eq!(payload.reason, WinReason::NoMoves);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    // Completed games have no deadline left to claim.
    harness.store.advance_clock(Duration::from_secs(101));
    let arbiter = TimeoutArbiter::new(harness.state.store().clone(), ArbiterSettings::default());
    assert!(arbiter.tick().await.unwrap().is_empty());
}

#[tokio::test]
async fn illegal_move_is_reported_to_the_sender_only() {
    let harness = Harness::start().await;
    let mut alice = harness.connect("alice").await;
    let mut bob = harness.connect("bob").await;
    let game_id = harness.started_game(&mut alice, &mut bob).await;

    harness.send(&alice, submit(&game_id, "word")).await;
    let refused = alice.expect(EventKind::Error).await;
    assert_eq!(error_message(&refused), "invalid_move");
    assert!(bob.rx.try_recv().is_err());

    let game = harness.store.find_game(game_id).await.unwrap().unwrap();
    assert_eq!(game.current_word.as_deref(), Some("cold"));
    assert_eq!(game.current_turn_id.as_deref(), Some("alice"));
}

#[tokio::test]
async fn disconnect_releases_the_session_without_ending_the_game() {
    let harness = Harness::start().await;
    let mut alice = harness.connect("alice").await;
    let mut bob = harness.connect("bob").await;
    let game_id = harness.started_game(&mut alice, &mut bob).await;

    harness.hub.unregister(bob.connection).await.unwrap();
    harness.send(&alice, submit(&game_id, "cord")).await;
    alice.expect(EventKind::WordSubmitted).await;

    let game = harness.store.find_game(game_id.clone()).await.unwrap().unwrap();
    assert_eq!(game.connected_count, 1);
    assert_eq!(game.status, GameStatus::Active);
    assert_eq!(harness.hub.group_size(&game_id), 1);

    // Reconnecting does not start the game a second time.
    let mut bob = harness.connect("bob").await;
    harness.send(&bob, join(&game_id)).await;
    bob.expect(EventKind::JoinedGame).await;
    assert!(
        timeout(Duration::from_millis(200), bob.rx.recv())
            .await
            .is_err()
    );
}

//! Game-state transitions against a live Redis. Skipped unless `REDIS_URL` is set.
#![cfg(feature = "redis-store")]

use std::time::Duration;

use futures::future::join_all;
use uuid::Uuid;

use delta_back::dao::{
    game_store::{GameStore, ProtocolSettings, redis::RedisGameStore},
    models::{Challenger, GameEntity, GameKind, GameListing, GameStatus, WinReason, WordSubmission},
    storage::{Rejection, StorageError},
};

async fn connect(turn_timeout: Duration) -> Option<RedisGameStore> {
    let Some(url) = std::env::var("REDIS_URL").ok().filter(|url| !url.is_empty()) else {
        eprintln!("REDIS_URL is not set; skipping");
        return None;
    };
    let settings = ProtocolSettings {
        turn_timeout,
        ..ProtocolSettings::default()
    };
    Some(RedisGameStore::connect(&url, settings).await.unwrap())
}

/// Player ids unique to one run so parallel tests never share records.
fn player(name: &str) -> Challenger {
    Challenger {
        player_id: format!("{name}-{}", Uuid::new_v4()),
        player_name: name.into(),
        start_word: "cold".into(),
    }
}

fn unique_id() -> String {
    Uuid::new_v4().to_string()
}

fn unique_code() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn waiting(game_id: &str, owner: &Challenger, join_code: Option<String>) -> GameEntity {
    let kind = if join_code.is_some() {
        GameKind::Private
    } else {
        GameKind::Online
    };
    GameEntity::waiting(
        game_id.into(),
        kind,
        join_code,
        owner.player_id.clone(),
        owner.player_name.clone(),
        0,
    )
}

/// A private game between two fresh players with both sockets attached.
async fn active_game(store: &RedisGameStore) -> (String, Challenger, Challenger) {
    let (alice, bob) = (player("alice"), player("bob"));
    let (game_id, code) = (unique_id(), unique_code());
    store
        .create_game(
            waiting(&game_id, &alice, Some(code.clone())),
            GameListing::JoinCode(code.clone()),
        )
        .await
        .unwrap();
    store.join_private_game(code, bob.clone()).await.unwrap();
    store.join_session(game_id.clone()).await.unwrap();
    let second = store.join_session(game_id.clone()).await.unwrap();
    assert!(second.started);
    (game_id, alice, bob)
}

fn submission(game_id: &str, player: &Challenger, word: &str, continuations: &[&str]) -> WordSubmission {
    WordSubmission {
        game_id: game_id.into(),
        player_id: player.player_id.clone(),
        word: word.into(),
        continuations: continuations.iter().map(|word| word.to_string()).collect(),
    }
}

#[tokio::test]
async fn session_starts_exactly_once() {
    let Some(store) = connect(Duration::from_secs(100)).await else {
        return;
    };
    let (alice, bob) = (player("alice"), player("bob"));
    let (game_id, code) = (unique_id(), unique_code());
    store
        .create_game(
            waiting(&game_id, &alice, Some(code.clone())),
            GameListing::JoinCode(code.clone()),
        )
        .await
        .unwrap();

    let waiting_join = store.join_session(game_id.clone()).await.unwrap();
    assert!(!waiting_join.started);
    assert_eq!(store.leave_session(game_id.clone()).await.unwrap(), 0);
    assert_eq!(store.leave_session(game_id.clone()).await.unwrap(), 0);

    store.join_private_game(code, bob).await.unwrap();
    let joins = join_all((0..4).map(|_| store.join_session(game_id.clone()))).await;
    let mut counts: Vec<_> = joins.iter().map(|join| join.as_ref().unwrap().connected_count).collect();
    counts.sort_unstable();
    assert_eq!(counts, vec![1, 2, 3, 4]);
    assert_eq!(joins.iter().filter(|join| join.as_ref().unwrap().started).count(), 1);

    let game = store.find_game(game_id).await.unwrap().unwrap();
    assert_eq!(game.status, GameStatus::Active);
}

#[tokio::test]
async fn repeated_word_is_rejected() {
    let Some(store) = connect(Duration::from_secs(100)).await else {
        return;
    };
    let (game_id, alice, bob) = active_game(&store).await;

    let outcome = store
        .submit_word(submission(&game_id, &alice, "cord", &["card"]))
        .await
        .unwrap();
    assert_eq!(outcome.next_turn_id, bob.player_id);
    assert_eq!(outcome.winner_id, None);

    for word in ["cord", "cold"] {
        let err = store
            .submit_word(submission(&game_id, &bob, word, &["card"]))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Rejected(Rejection::WordAlreadyPlayed)), "{word}: {err:?}");
    }
    let err = store
        .submit_word(submission(&game_id, &alice, "card", &["cord"]))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Rejected(Rejection::NotYourTurn)));

    assert!(store.is_word_played(game_id.clone(), "cord".into()).await.unwrap());
    assert!(!store.is_word_played(game_id.clone(), "card".into()).await.unwrap());
    let game = store.find_game(game_id).await.unwrap().unwrap();
    assert_eq!(game.current_word.as_deref(), Some("cord"));
    assert_eq!(game.current_turn_id, Some(bob.player_id));
}

#[tokio::test]
async fn expired_game_is_claimed_exactly_once() {
    let Some(store) = connect(Duration::from_secs(1)).await else {
        return;
    };
    let (game_id, _alice, bob) = active_game(&store).await;

    tokio::time::sleep(Duration::from_millis(2100)).await;
    let rounds = join_all((0..4).map(|_| store.claim_and_end_expired(100))).await;
    let claims: Vec<_> = rounds
        .into_iter()
        .flat_map(|round| round.unwrap())
        .filter(|game| game.game_id == game_id)
        .collect();
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0].winner_id, bob.player_id);

    let game = store.find_game(game_id.clone()).await.unwrap().unwrap();
    assert_eq!(game.status, GameStatus::Completed);
    assert_eq!(game.win_reason, Some(WinReason::Timeout));
    let err = store.join_session(game_id).await.unwrap_err();
    assert!(matches!(err, StorageError::Rejected(Rejection::GameNotJoinable)));
}

#[tokio::test]
async fn join_code_is_redeemed_exactly_once() {
    let Some(store) = connect(Duration::from_secs(100)).await else {
        return;
    };
    let alice = player("alice");
    let (game_id, code) = (unique_id(), unique_code());
    store
        .create_game(
            waiting(&game_id, &alice, Some(code.clone())),
            GameListing::JoinCode(code.clone()),
        )
        .await
        .unwrap();

    let err = store.join_private_game(code.clone(), alice.clone()).await.unwrap_err();
    assert!(matches!(err, StorageError::Rejected(Rejection::CannotJoinOwnGame)));

    let attempts = join_all((0..8).map(|i| store.join_private_game(code.clone(), player(&format!("p{i}"))))).await;
    let (joined, refused): (Vec<_>, Vec<_>) = attempts.into_iter().partition(Result::is_ok);
    assert_eq!(joined.len(), 1);
    assert!(refused.into_iter().all(|attempt| matches!(
        attempt,
        Err(StorageError::Rejected(Rejection::InvalidCode))
    )));

    let game = store.find_game(game_id).await.unwrap().unwrap();
    assert_eq!(game.status, GameStatus::Ready);
    assert_eq!(game.current_turn_id, Some(alice.player_id));
}

#[tokio::test]
async fn move_without_unplayed_continuation_ends_the_game() {
    let Some(store) = connect(Duration::from_secs(100)).await else {
        return;
    };
    let (game_id, alice, bob) = active_game(&store).await;

    let outcome = store
        .submit_word(submission(&game_id, &alice, "cord", &["cold", "cord"]))
        .await
        .unwrap();
    assert_eq!(outcome.winner_id.as_deref(), Some(alice.player_id.as_str()));

    let game = store.find_game(game_id.clone()).await.unwrap().unwrap();
    assert_eq!(game.status, GameStatus::Completed);
    assert_eq!(game.win_reason, Some(WinReason::NoMoves));
    assert_eq!(game.winner_id, Some(alice.player_id));

    let err = store
        .submit_word(submission(&game_id, &bob, "card", &["cord"]))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Rejected(Rejection::GameNotActive)));
}

#[tokio::test]
async fn own_games_stay_queued_in_order() {
    let Some(store) = connect(Duration::from_secs(100)).await else {
        return;
    };
    let alice = player("alice");
    let (first, second) = (unique_id(), unique_id());
    for game_id in [&first, &second] {
        store
            .create_game(waiting(game_id, &alice, None), GameListing::Matchmaking)
            .await
            .unwrap();
    }

    assert_eq!(store.pop_and_join(alice.clone()).await.unwrap(), None);
    assert_eq!(store.pop_and_join(alice.clone()).await.unwrap(), None);

    let bob = store.pop_and_join(player("bob")).await.unwrap().unwrap();
    let carol = store.pop_and_join(player("carol")).await.unwrap().unwrap();
    assert_eq!((bob.game_id, carol.game_id), (first, second));
}

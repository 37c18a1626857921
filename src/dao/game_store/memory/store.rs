use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
    time::Duration,
};

use futures::{future::BoxFuture, stream::BoxStream};
use time::OffsetDateTime;
use tokio::sync::{Mutex, broadcast};
use tokio_stream::{
    StreamExt,
    wrappers::{BroadcastStream, errors::BroadcastStreamRecvError},
};
use tracing::warn;

use crate::{
    dao::{
        game_store::{GameStore, ProtocolSettings},
        models::{
            ChannelMessage, Challenger, ExpiredGame, GameEntity, GameListing, GameStatus,
            MatchedGame, MoveOutcome, SessionJoin, WinReason, WordSubmission,
        },
        storage::{Rejection, StorageError, StorageResult},
    },
    dto::ws::ServerMessage,
};

const CHANNEL_CAPACITY: usize = 1024;

/// [`GameStore`] kept in process memory.
///
/// Every operation holds one mutex for its whole duration, which gives the same
/// all-or-nothing visibility as the scripted Redis transactions. Pub/sub is a
/// tokio broadcast channel, so only subscribers of this instance see events.
#[derive(Clone)]
pub struct MemoryGameStore {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    state: Mutex<MemoryState>,
    events: broadcast::Sender<ChannelMessage>,
    settings: ProtocolSettings,
    clock_offset_ms: AtomicI64,
}

#[derive(Default)]
struct MemoryState {
    games: HashMap<String, Expiring<GameEntity>>,
    words: HashMap<String, Expiring<HashSet<String>>>,
    codes: HashMap<String, Expiring<String>>,
    /// Front is the push end, back is the pop end.
    open: VecDeque<String>,
    /// Turn deadlines in unix seconds.
    expirations: HashMap<String, i64>,
}

struct Expiring<T> {
    value: T,
    expires_at_ms: i64,
}

impl<T> Expiring<T> {
    fn new(value: T, now_ms: i64, ttl: Duration) -> Self {
        Self {
            value,
            expires_at_ms: now_ms + duration_ms(ttl),
        }
    }
}

fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

impl MemoryState {
    fn purge(&mut self, now_ms: i64) {
        self.games.retain(|_, entry| entry.expires_at_ms > now_ms);
        self.words.retain(|_, entry| entry.expires_at_ms > now_ms);
        self.codes.retain(|_, entry| entry.expires_at_ms > now_ms);
    }

    fn game_mut(&mut self, game_id: &str) -> Option<&mut GameEntity> {
        self.games.get_mut(game_id).map(|entry| &mut entry.value)
    }

    /// Bind the challenger as second player and seed the played words.
    fn bind(
        &mut self,
        game_id: &str,
        challenger: &Challenger,
        now_ms: i64,
        retention: Duration,
    ) -> Option<MatchedGame> {
        let game = self.game_mut(game_id)?;
        game.player2_id = Some(challenger.player_id.clone());
        game.player2_name = Some(challenger.player_name.clone());
        game.status = GameStatus::Ready;
        game.current_word = Some(challenger.start_word.clone());
        game.current_turn_id = Some(game.player1_id.clone());
        let matched = MatchedGame {
            game_id: game_id.to_owned(),
            player1_id: game.player1_id.clone(),
        };

        let words = HashSet::from([challenger.start_word.clone()]);
        self.words
            .insert(game_id.to_owned(), Expiring::new(words, now_ms, retention));
        Some(matched)
    }
}

impl MemoryGameStore {
    pub fn new(settings: ProtocolSettings) -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(MemoryInner {
                state: Mutex::new(MemoryState::default()),
                events,
                settings,
                clock_offset_ms: AtomicI64::new(0),
            }),
        }
    }

    /// Move this store's clock forward. Turn deadlines and retention follow it.
    pub fn advance_clock(&self, by: Duration) {
        self.inner
            .clock_offset_ms
            .fetch_add(duration_ms(by), Ordering::SeqCst);
    }

    fn now_ms(&self) -> i64 {
        let wall = i64::try_from(OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000)
            .unwrap_or(i64::MAX);
        wall + self.inner.clock_offset_ms.load(Ordering::SeqCst)
    }

    fn deadline(&self, now_ms: i64) -> i64 {
        now_ms / 1000 + duration_ms(self.inner.settings.turn_timeout) / 1000
    }

    fn emit(&self, game_id: &str, payload: String) {
        // No subscriber is not an error for pub/sub.
        let _ = self.inner.events.send(ChannelMessage {
            game_id: game_id.to_owned(),
            payload,
        });
    }

    async fn create_game(&self, game: GameEntity, listing: GameListing) -> StorageResult<()> {
        let now = self.now_ms();
        let retention = self.inner.settings.retention;
        let mut state = self.inner.state.lock().await;
        state.purge(now);

        let game_id = game.id.clone();
        match listing {
            GameListing::Unlisted => {}
            GameListing::Matchmaking => state.open.push_front(game_id.clone()),
            GameListing::JoinCode(code) => {
                state
                    .codes
                    .insert(code, Expiring::new(game_id.clone(), now, retention));
            }
        }
        state
            .games
            .insert(game_id, Expiring::new(game, now, retention));
        Ok(())
    }

    async fn find_game(&self, game_id: String) -> StorageResult<Option<GameEntity>> {
        let now = self.now_ms();
        let mut state = self.inner.state.lock().await;
        state.purge(now);
        Ok(state.games.get(&game_id).map(|entry| entry.value.clone()))
    }

    async fn pop_and_join(&self, challenger: Challenger) -> StorageResult<Option<MatchedGame>> {
        let now = self.now_ms();
        let settings = &self.inner.settings;
        let mut state = self.inner.state.lock().await;
        state.purge(now);

        for _ in 0..settings.matchmaking_attempts {
            let Some(game_id) = state.open.pop_back() else {
                break;
            };
            let Some(game) = state.games.get(&game_id).map(|entry| &entry.value) else {
                continue;
            };
            if game.status != GameStatus::Waiting || game.player1_id.is_empty() {
                continue;
            }
            if game.player1_id == challenger.player_id {
                // Back at the head so the queue order is unchanged.
                state.open.push_back(game_id);
                return Ok(None);
            }
            return Ok(state.bind(&game_id, &challenger, now, settings.retention));
        }
        Ok(None)
    }

    async fn join_private_game(
        &self,
        join_code: String,
        challenger: Challenger,
    ) -> StorageResult<MatchedGame> {
        let now = self.now_ms();
        let retention = self.inner.settings.retention;
        let mut state = self.inner.state.lock().await;
        state.purge(now);

        let game_id = state
            .codes
            .get(&join_code)
            .map(|entry| entry.value.clone())
            .ok_or(Rejection::InvalidCode)?;
        let game = state
            .games
            .get(&game_id)
            .map(|entry| &entry.value)
            .filter(|game| game.status == GameStatus::Waiting)
            .ok_or(Rejection::GameNotAvailable)?;
        if game.player1_id == challenger.player_id {
            return Err(Rejection::CannotJoinOwnGame.into());
        }

        let matched = state
            .bind(&game_id, &challenger, now, retention)
            .ok_or(Rejection::GameNotAvailable)?;
        state.codes.remove(&join_code);
        Ok(matched)
    }

    async fn cancel_matchmaking(&self, game_id: String, player_id: String) -> StorageResult<()> {
        let now = self.now_ms();
        let mut state = self.inner.state.lock().await;
        state.purge(now);

        let game = state
            .games
            .get(&game_id)
            .map(|entry| &entry.value)
            .ok_or(Rejection::GameNotFound)?;
        if game.player1_id != player_id {
            return Err(Rejection::NotGameOwner.into());
        }
        if game.status != GameStatus::Waiting {
            return Err(Rejection::GameNotAvailable.into());
        }

        if let Some(code) = game.join_code.clone() {
            state.codes.remove(&code);
        }
        state.open.retain(|queued| queued != &game_id);
        state.games.remove(&game_id);
        Ok(())
    }

    async fn join_session(&self, game_id: String) -> StorageResult<SessionJoin> {
        let now = self.now_ms();
        let deadline = self.deadline(now);
        let mut state = self.inner.state.lock().await;
        state.purge(now);

        let game = state.game_mut(&game_id).ok_or(Rejection::GameNotFound)?;
        if game.status == GameStatus::Completed {
            return Err(Rejection::GameNotJoinable.into());
        }

        game.connected_count += 1;
        let started = game.connected_count == 2 && game.status == GameStatus::Ready;
        if started {
            game.status = GameStatus::Active;
        }
        let connected_count = game.connected_count;
        if started {
            state.expirations.insert(game_id, deadline);
        }

        Ok(SessionJoin {
            connected_count,
            started,
        })
    }

    async fn leave_session(&self, game_id: String) -> StorageResult<i64> {
        let now = self.now_ms();
        let mut state = self.inner.state.lock().await;
        state.purge(now);

        Ok(match state.game_mut(&game_id) {
            Some(game) => {
                game.connected_count = (game.connected_count - 1).max(0);
                game.connected_count
            }
            None => 0,
        })
    }

    async fn is_word_played(&self, game_id: String, word: String) -> StorageResult<bool> {
        let now = self.now_ms();
        let mut state = self.inner.state.lock().await;
        state.purge(now);

        Ok(state
            .words
            .get(&game_id)
            .is_some_and(|entry| entry.value.contains(&word)))
    }

    async fn submit_word(&self, submission: WordSubmission) -> StorageResult<MoveOutcome> {
        let now = self.now_ms();
        let deadline = self.deadline(now);
        let retention = self.inner.settings.retention;
        let mut state = self.inner.state.lock().await;
        state.purge(now);

        let WordSubmission {
            game_id,
            player_id,
            word,
            continuations,
        } = submission;

        let game = state
            .games
            .get(&game_id)
            .map(|entry| &entry.value)
            .ok_or(Rejection::GameNotFound)?;
        if game.status != GameStatus::Active {
            return Err(Rejection::GameNotActive.into());
        }
        if game.current_turn_id.as_deref() != Some(player_id.as_str()) {
            return Err(Rejection::NotYourTurn.into());
        }
        let next_turn_id = game
            .opponent_of(&player_id)
            .map(str::to_owned)
            .ok_or_else(|| StorageError::malformed("submit_word", "active game without opponent"))?;

        let words = &mut state
            .words
            .entry(game_id.clone())
            .or_insert_with(|| Expiring::new(HashSet::new(), now, retention))
            .value;
        if !words.insert(word.clone()) {
            return Err(Rejection::WordAlreadyPlayed.into());
        }
        let terminal = continuations
            .iter()
            .all(|candidate| words.contains(candidate));

        let Some(game) = state.game_mut(&game_id) else {
            return Err(Rejection::GameNotFound.into());
        };
        game.current_word = Some(word);
        game.current_turn_id = Some(next_turn_id.clone());
        let winner_id = if terminal {
            game.status = GameStatus::Completed;
            game.winner_id = Some(player_id.clone());
            game.win_reason = Some(WinReason::NoMoves);
            Some(player_id)
        } else {
            None
        };

        if terminal {
            state.expirations.remove(&game_id);
        } else {
            state.expirations.insert(game_id, deadline);
        }

        Ok(MoveOutcome {
            next_turn_id,
            winner_id,
        })
    }

    async fn claim_and_end_expired(&self, limit: usize) -> StorageResult<Vec<ExpiredGame>> {
        let now = self.now_ms();
        let now_secs = now / 1000;
        let mut state = self.inner.state.lock().await;
        state.purge(now);

        let mut due: Vec<(i64, String)> = state
            .expirations
            .iter()
            .filter(|(_, deadline)| **deadline <= now_secs)
            .map(|(game_id, deadline)| (*deadline, game_id.clone()))
            .collect();
        due.sort();
        due.truncate(limit);

        let mut settled = Vec::with_capacity(due.len());
        for (_, game_id) in due {
            state.expirations.remove(&game_id);
            let Some(game) = state.game_mut(&game_id) else {
                continue;
            };
            if game.status != GameStatus::Active {
                continue;
            }
            let Some(winner_id) = game
                .current_turn_id
                .as_deref()
                .and_then(|turn| game.opponent_of(turn))
                .map(str::to_owned)
            else {
                continue;
            };

            game.status = GameStatus::Completed;
            game.winner_id = Some(winner_id.clone());
            game.win_reason = Some(WinReason::Timeout);

            let payload = ServerMessage::game_ended(&game_id, &winner_id, WinReason::Timeout)
                .to_json()
                .map_err(|err| StorageError::malformed("claim_and_end_expired", err.to_string()))?;
            self.emit(&game_id, payload);
            settled.push(ExpiredGame { game_id, winner_id });
        }

        Ok(settled)
    }

    fn subscribe_stream(&self) -> BoxStream<'static, ChannelMessage> {
        let stream = BroadcastStream::new(self.inner.events.subscribe()).filter_map(|item| {
            match item {
                Ok(message) => Some(message),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "memory subscriber lagged, events dropped");
                    None
                }
            }
        });
        Box::pin(stream)
    }
}

impl Default for MemoryGameStore {
    fn default() -> Self {
        Self::new(ProtocolSettings::default())
    }
}

impl GameStore for MemoryGameStore {
    fn create_game(
        &self,
        game: GameEntity,
        listing: GameListing,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.create_game(game, listing).await })
    }

    fn find_game(&self, game_id: String) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_game(game_id).await })
    }

    fn pop_and_join(
        &self,
        challenger: Challenger,
    ) -> BoxFuture<'static, StorageResult<Option<MatchedGame>>> {
        let store = self.clone();
        Box::pin(async move { store.pop_and_join(challenger).await })
    }

    fn join_private_game(
        &self,
        join_code: String,
        challenger: Challenger,
    ) -> BoxFuture<'static, StorageResult<MatchedGame>> {
        let store = self.clone();
        Box::pin(async move { store.join_private_game(join_code, challenger).await })
    }

    fn cancel_matchmaking(
        &self,
        game_id: String,
        player_id: String,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.cancel_matchmaking(game_id, player_id).await })
    }

    fn join_session(&self, game_id: String) -> BoxFuture<'static, StorageResult<SessionJoin>> {
        let store = self.clone();
        Box::pin(async move { store.join_session(game_id).await })
    }

    fn leave_session(&self, game_id: String) -> BoxFuture<'static, StorageResult<i64>> {
        let store = self.clone();
        Box::pin(async move { store.leave_session(game_id).await })
    }

    fn is_word_played(
        &self,
        game_id: String,
        word: String,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.is_word_played(game_id, word).await })
    }

    fn submit_word(
        &self,
        submission: WordSubmission,
    ) -> BoxFuture<'static, StorageResult<MoveOutcome>> {
        let store = self.clone();
        Box::pin(async move { store.submit_word(submission).await })
    }

    fn claim_and_end_expired(
        &self,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<ExpiredGame>>> {
        let store = self.clone();
        Box::pin(async move { store.claim_and_end_expired(limit).await })
    }

    fn publish(&self, game_id: String, payload: String) -> BoxFuture<'static, StorageResult<()>> {
        self.emit(&game_id, payload);
        Box::pin(async { Ok(()) })
    }

    fn subscribe(&self) -> BoxFuture<'static, StorageResult<BoxStream<'static, ChannelMessage>>> {
        // Subscribe before returning so nothing published afterwards is missed.
        let stream = self.subscribe_stream();
        Box::pin(async move { Ok(stream) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

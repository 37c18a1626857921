pub mod keys;
pub mod memory;
#[cfg(feature = "redis-store")]
pub mod redis;

use std::time::Duration;

use futures::{future::BoxFuture, stream::BoxStream};
use serde::Deserialize;
use serde_with::{DurationSeconds, serde_as};

use crate::dao::{
    models::{
        ChannelMessage, Challenger, ExpiredGame, GameEntity, GameListing, MatchedGame,
        MoveOutcome, SessionJoin, WordSubmission,
    },
    storage::StorageResult,
};

/// Atomic game-state protocol over the shared store.
///
/// Every state-changing method runs as one indivisible transaction: concurrent
/// callers from any number of service instances observe either the state before
/// or the state after, never a mix. Rule violations come back as
/// [`StorageError::Rejected`](crate::dao::storage::StorageError::Rejected).
pub trait GameStore: Send + Sync {
    /// Write a new game record with the retention expiry and list it.
    fn create_game(
        &self,
        game: GameEntity,
        listing: GameListing,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Read a game record; `None` once absent or expired.
    fn find_game(&self, game_id: String) -> BoxFuture<'static, StorageResult<Option<GameEntity>>>;

    /// Pop waiting games off the matchmaking queue and bind the challenger to the
    /// first joinable one. Returns `None` when nothing matched.
    fn pop_and_join(
        &self,
        challenger: Challenger,
    ) -> BoxFuture<'static, StorageResult<Option<MatchedGame>>>;

    /// Redeem a private join code.
    fn join_private_game(
        &self,
        join_code: String,
        challenger: Challenger,
    ) -> BoxFuture<'static, StorageResult<MatchedGame>>;

    /// Withdraw a waiting game from matchmaking and delete it.
    fn cancel_matchmaking(
        &self,
        game_id: String,
        player_id: String,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Attach one socket to the game session, starting the game on the second.
    fn join_session(&self, game_id: String) -> BoxFuture<'static, StorageResult<SessionJoin>>;

    /// Detach one socket. Returns the remaining count, never below zero.
    fn leave_session(&self, game_id: String) -> BoxFuture<'static, StorageResult<i64>>;

    /// Whether the word was already accepted in this game.
    fn is_word_played(
        &self,
        game_id: String,
        word: String,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Record a move and pass the turn.
    fn submit_word(
        &self,
        submission: WordSubmission,
    ) -> BoxFuture<'static, StorageResult<MoveOutcome>>;

    /// Settle up to `limit` games whose turn deadline has passed and publish
    /// their `game_ended` events.
    fn claim_and_end_expired(
        &self,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<ExpiredGame>>>;

    /// Publish a client-facing event on the game channel.
    fn publish(&self, game_id: String, payload: String) -> BoxFuture<'static, StorageResult<()>>;

    /// Subscribe to every game channel. The subscription is live once the
    /// future resolves.
    fn subscribe(&self) -> BoxFuture<'static, StorageResult<BoxStream<'static, ChannelMessage>>>;

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Timing and retry knobs of the state-transition protocol.
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProtocolSettings {
    /// Time a player has to move before the opponent wins.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub turn_timeout: Duration,
    /// Lifetime of game records, played-word sets and join codes.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub retention: Duration,
    /// Queue entries inspected per matchmaking attempt.
    pub matchmaking_attempts: usize,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            turn_timeout: Duration::from_secs(100),
            retention: Duration::from_secs(24 * 60 * 60),
            matchmaking_attempts: 10,
        }
    }
}

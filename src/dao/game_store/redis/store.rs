use std::{collections::HashMap, pin::pin, sync::Arc};

use futures::{StreamExt, future::BoxFuture, stream::BoxStream};
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use tracing::warn;

use super::{
    error::{RedisDaoError, RedisDaoResult},
    scripts::Scripts,
};
use crate::dao::{
    game_store::{
        GameStore, ProtocolSettings,
        keys::{
            EXPIRE_SET, GAME_CHANNEL_PATTERN, GAME_PREFIX, OPEN_QUEUE, channel_game_id, code_key,
            game_key, words_key,
        },
    },
    models::{
        ChannelMessage, Challenger, ExpiredGame, GameEntity, GameListing, MatchedGame,
        MoveOutcome, SessionJoin, WordSubmission,
    },
    storage::{Rejection, StorageError, StorageResult},
};

/// [`GameStore`] backed by Redis.
#[derive(Clone)]
pub struct RedisGameStore {
    inner: Arc<RedisInner>,
}

struct RedisInner {
    client: Client,
    connection: ConnectionManager,
    scripts: Scripts,
    settings: ProtocolSettings,
}

impl RedisGameStore {
    /// Open the multiplexed connection. The manager reconnects on its own afterwards.
    pub async fn connect(url: &str, settings: ProtocolSettings) -> RedisDaoResult<Self> {
        let client = Client::open(url).map_err(|source| RedisDaoError::InvalidUrl { source })?;
        let connection = ConnectionManager::new(client.clone())
            .await
            .map_err(|source| RedisDaoError::Connect { source })?;

        Ok(Self {
            inner: Arc::new(RedisInner {
                client,
                connection,
                scripts: Scripts::load(),
                settings,
            }),
        })
    }

    fn connection(&self) -> ConnectionManager {
        self.inner.connection.clone()
    }

    fn retention_secs(&self) -> u64 {
        self.inner.settings.retention.as_secs()
    }

    fn turn_timeout_secs(&self) -> u64 {
        self.inner.settings.turn_timeout.as_secs()
    }

    async fn ping(&self) -> RedisDaoResult<()> {
        let mut conn = self.connection();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|source| RedisDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn create_game(&self, game: GameEntity, listing: GameListing) -> StorageResult<()> {
        let key = game_key(&game.id);
        let retention = self.retention_secs();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset_multiple(&key, &game.to_fields())
            .ignore()
            .expire(&key, i64::try_from(retention).unwrap_or(i64::MAX))
            .ignore();
        match listing {
            GameListing::Unlisted => {}
            GameListing::Matchmaking => {
                pipe.lpush(OPEN_QUEUE, &game.id).ignore();
            }
            GameListing::JoinCode(code) => {
                pipe.set_ex(code_key(&code), &game.id, retention).ignore();
            }
        }

        let mut conn = self.connection();
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|source| RedisDaoError::Command {
                command: "create_game",
                source,
            })?;
        Ok(())
    }

    async fn find_game(&self, game_id: String) -> StorageResult<Option<GameEntity>> {
        let mut conn = self.connection();
        let fields: HashMap<String, String> = conn
            .hgetall(game_key(&game_id))
            .await
            .map_err(|source| RedisDaoError::Command {
                command: "HGETALL",
                source,
            })?;

        GameEntity::from_fields(fields)
            .map_err(|source| RedisDaoError::DecodeGame { game_id, source }.into())
    }

    async fn pop_and_join(&self, challenger: Challenger) -> StorageResult<Option<MatchedGame>> {
        let mut invocation = self.inner.scripts.pop_and_join.prepare_invoke();
        invocation
            .key(OPEN_QUEUE)
            .arg(&challenger.player_id)
            .arg(&challenger.player_name)
            .arg(&challenger.start_word)
            .arg(self.inner.settings.matchmaking_attempts)
            .arg(self.retention_secs())
            .arg(GAME_PREFIX);

        let mut conn = self.connection();
        let reply: Vec<String> = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|source| RedisDaoError::Script {
                script: "pop_and_join",
                source,
            })?;

        match accepted("pop_and_join", reply)?.as_slice() {
            [tag] if tag == "none" => Ok(None),
            [tag, game_id, player1_id] if tag == "matched" => Ok(Some(MatchedGame {
                game_id: game_id.clone(),
                player1_id: player1_id.clone(),
            })),
            other => Err(StorageError::malformed("pop_and_join", format!("{other:?}"))),
        }
    }

    async fn join_private_game(
        &self,
        join_code: String,
        challenger: Challenger,
    ) -> StorageResult<MatchedGame> {
        let mut invocation = self.inner.scripts.join_private.prepare_invoke();
        invocation
            .key(code_key(&join_code))
            .arg(&challenger.player_id)
            .arg(&challenger.player_name)
            .arg(&challenger.start_word)
            .arg(self.retention_secs())
            .arg(GAME_PREFIX);

        let mut conn = self.connection();
        let reply: Vec<String> = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|source| RedisDaoError::Script {
                script: "join_private",
                source,
            })?;

        match accepted("join_private", reply)?.as_slice() {
            [tag, game_id, player1_id] if tag == "matched" => Ok(MatchedGame {
                game_id: game_id.clone(),
                player1_id: player1_id.clone(),
            }),
            other => Err(StorageError::malformed("join_private", format!("{other:?}"))),
        }
    }

    async fn cancel_matchmaking(&self, game_id: String, player_id: String) -> StorageResult<()> {
        let mut invocation = self.inner.scripts.cancel_matchmaking.prepare_invoke();
        invocation
            .key(game_key(&game_id))
            .key(OPEN_QUEUE)
            .arg(&player_id)
            .arg(&game_id)
            .arg(code_key(""));

        let mut conn = self.connection();
        let reply: Vec<String> = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|source| RedisDaoError::Script {
                script: "cancel_matchmaking",
                source,
            })?;

        accepted("cancel_matchmaking", reply).map(|_| ())
    }

    async fn join_session(&self, game_id: String) -> StorageResult<SessionJoin> {
        let mut invocation = self.inner.scripts.join_session.prepare_invoke();
        invocation
            .key(game_key(&game_id))
            .key(EXPIRE_SET)
            .arg(&game_id)
            .arg(self.turn_timeout_secs());

        let mut conn = self.connection();
        let reply: Vec<String> = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|source| RedisDaoError::Script {
                script: "join_session",
                source,
            })?;

        match accepted("join_session", reply)?.as_slice() {
            [_, count, started] => Ok(SessionJoin {
                connected_count: count
                    .parse()
                    .map_err(|_| StorageError::malformed("join_session", count.clone()))?,
                started: started == "1",
            }),
            other => Err(StorageError::malformed("join_session", format!("{other:?}"))),
        }
    }

    async fn leave_session(&self, game_id: String) -> StorageResult<i64> {
        let mut invocation = self.inner.scripts.leave_session.prepare_invoke();
        invocation.key(game_key(&game_id));

        let mut conn = self.connection();
        let remaining: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|source| RedisDaoError::Script {
                script: "leave_session",
                source,
            })?;
        Ok(remaining)
    }

    async fn is_word_played(&self, game_id: String, word: String) -> StorageResult<bool> {
        let mut conn = self.connection();
        let played: bool = conn
            .sismember(words_key(&game_id), word)
            .await
            .map_err(|source| RedisDaoError::Command {
                command: "SISMEMBER",
                source,
            })?;
        Ok(played)
    }

    async fn submit_word(&self, submission: WordSubmission) -> StorageResult<MoveOutcome> {
        let mut invocation = self.inner.scripts.submit_word.prepare_invoke();
        invocation
            .key(game_key(&submission.game_id))
            .key(words_key(&submission.game_id))
            .key(EXPIRE_SET)
            .arg(&submission.game_id)
            .arg(&submission.player_id)
            .arg(&submission.word)
            .arg(self.turn_timeout_secs())
            .arg(self.retention_secs());
        for continuation in &submission.continuations {
            invocation.arg(continuation);
        }

        let mut conn = self.connection();
        let reply: Vec<String> = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|source| RedisDaoError::Script {
                script: "submit_word",
                source,
            })?;

        match accepted("submit_word", reply)?.as_slice() {
            [_, next_turn_id] => Ok(MoveOutcome {
                next_turn_id: next_turn_id.clone(),
                winner_id: None,
            }),
            [_, next_turn_id, winner_id] => Ok(MoveOutcome {
                next_turn_id: next_turn_id.clone(),
                winner_id: Some(winner_id.clone()),
            }),
            other => Err(StorageError::malformed("submit_word", format!("{other:?}"))),
        }
    }

    async fn claim_and_end_expired(&self, limit: usize) -> StorageResult<Vec<ExpiredGame>> {
        let mut invocation = self.inner.scripts.claim_and_end_expired.prepare_invoke();
        invocation.key(EXPIRE_SET).arg(limit).arg(GAME_PREFIX);

        let mut conn = self.connection();
        let reply: Vec<String> = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|source| RedisDaoError::Script {
                script: "claim_and_end_expired",
                source,
            })?;

        settled_pairs(reply)
    }

    async fn publish(&self, game_id: String, payload: String) -> StorageResult<()> {
        let mut conn = self.connection();
        let _receivers: i64 = conn
            .publish(game_key(&game_id), payload)
            .await
            .map_err(|source| RedisDaoError::Command {
                command: "PUBLISH",
                source,
            })?;
        Ok(())
    }

    /// Dedicated pub/sub connection; the manager's multiplexed one cannot subscribe.
    async fn subscribe(&self) -> RedisDaoResult<BoxStream<'static, ChannelMessage>> {
        let mut pubsub = self.inner.client.get_async_pubsub().await.map_err(|source| {
            RedisDaoError::Subscribe {
                pattern: GAME_CHANNEL_PATTERN,
                source,
            }
        })?;
        pubsub
            .psubscribe(GAME_CHANNEL_PATTERN)
            .await
            .map_err(|source| RedisDaoError::Subscribe {
                pattern: GAME_CHANNEL_PATTERN,
                source,
            })?;

        let stream = async_stream::stream! {
            let mut messages = pin!(pubsub.into_on_message());
            while let Some(message) = messages.next().await {
                let channel = message.get_channel_name();
                let Some(game_id) = channel_game_id(channel) else {
                    continue;
                };
                match message.get_payload::<String>() {
                    Ok(payload) => {
                        yield ChannelMessage {
                            game_id: game_id.to_owned(),
                            payload,
                        };
                    }
                    Err(err) => warn!(channel, error = %err, "dropping undecodable pub/sub payload"),
                }
            }
        };
        Ok(Box::pin(stream))
    }
}

/// Split a script reply into its rejection or its accepted fields.
fn accepted(operation: &'static str, reply: Vec<String>) -> StorageResult<Vec<String>> {
    match reply.first().map(String::as_str) {
        Some("err") => {
            let code = reply.get(1).map(String::as_str).unwrap_or_default();
            Err(Rejection::from_code(code)
                .map(StorageError::from)
                .unwrap_or_else(|| {
                    StorageError::malformed(operation, format!("unknown rejection `{code}`"))
                }))
        }
        Some(_) => Ok(reply),
        None => Err(StorageError::malformed(operation, "empty reply")),
    }
}

fn settled_pairs(reply: Vec<String>) -> StorageResult<Vec<ExpiredGame>> {
    if reply.len() % 2 != 0 {
        return Err(StorageError::malformed(
            "claim_and_end_expired",
            format!("odd reply length {}", reply.len()),
        ));
    }

    let mut items = reply.into_iter();
    let mut settled = Vec::new();
    while let (Some(game_id), Some(winner_id)) = (items.next(), items.next()) {
        settled.push(ExpiredGame { game_id, winner_id });
    }
    Ok(settled)
}

impl GameStore for RedisGameStore {
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
        let store = self.clone();
        Box::pin(async move { store.publish(game_id, payload).await })
    }

    fn subscribe(&self) -> BoxFuture<'static, StorageResult<BoxStream<'static, ChannelMessage>>> {
        let store = self.clone();
        Box::pin(async move { store.subscribe().await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ping().await.map_err(Into::into) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|part| part.to_string()).collect()
    }

    #[test]
    fn error_replies_become_rejections() {
        let err = accepted("submit_word", reply(&["err", "not_your_turn"])).unwrap_err();
        assert!(matches!(err, StorageError::Rejected(Rejection::NotYourTurn)));

        let err = accepted("submit_word", reply(&["err", "on_fire"])).unwrap_err();
        assert!(matches!(err, StorageError::MalformedReply { operation: "submit_word", .. }));

        let err = accepted("submit_word", Vec::new()).unwrap_err();
        assert!(matches!(err, StorageError::MalformedReply { .. }));
    }

    #[test]
    fn claim_reply_is_read_in_pairs() {
        let settled = settled_pairs(reply(&["g1", "bob", "g2", "carol"])).unwrap();
        assert_eq!(
            settled,
            vec![
                ExpiredGame {
                    game_id: "g1".into(),
                    winner_id: "bob".into(),
                },
                ExpiredGame {
                    game_id: "g2".into(),
                    winner_id: "carol".into(),
                },
            ]
        );

        assert!(settled_pairs(Vec::new()).unwrap().is_empty());
        assert!(settled_pairs(reply(&["g1"])).is_err());
    }
}

//! Lua scripts implementing the atomic transitions.
//!
//! Replies are flat arrays of strings. `{'err', code}` carries a rejection code
//! understood by [`Rejection::from_code`](crate::dao::storage::Rejection::from_code).
//! Deadlines use the server clock (`TIME`) so instances never disagree on "now".

use redis::Script;

/// KEYS: open queue. ARGV: player id, player name, start word, attempts,
/// retention seconds, game key prefix.
/// Stops at the caller's own game and puts it back at the head.
pub(super) const POP_AND_JOIN: &str = r#"
for _ = 1, tonumber(ARGV[4]) do
  local game_id = redis.call('RPOP', KEYS[1])
  if not game_id then
    break
  end
  local key = ARGV[6] .. game_id
  local fields = redis.call('HMGET', key, 'status', 'player1_id')
  local status, owner = fields[1], fields[2]
  if status == 'waiting' and owner and owner ~= '' then
    if owner == ARGV[1] then
      redis.call('RPUSH', KEYS[1], game_id)
      return {'none'}
    end
    redis.call('HSET', key,
      'player2_id', ARGV[1], 'player2_name', ARGV[2], 'status', 'ready',
      'current_word', ARGV[3], 'current_turn_id', owner)
    local words = key .. ':words'
    redis.call('SADD', words, ARGV[3])
    redis.call('EXPIRE', words, tonumber(ARGV[5]))
    return {'matched', game_id, owner}
  end
end
return {'none'}
"#;

/// KEYS: code key. ARGV: player id, player name, start word, retention seconds,
/// game key prefix.
pub(super) const JOIN_PRIVATE: &str = r#"
local game_id = redis.call('GET', KEYS[1])
if not game_id then
  return {'err', 'invalid_code'}
end
local key = ARGV[5] .. game_id
local fields = redis.call('HMGET', key, 'status', 'player1_id')
if fields[1] ~= 'waiting' then
  return {'err', 'game_not_available'}
end
if fields[2] == ARGV[1] then
  return {'err', 'cannot_join_own_game'}
end
redis.call('HSET', key,
  'player2_id', ARGV[1], 'player2_name', ARGV[2], 'status', 'ready',
  'current_word', ARGV[3], 'current_turn_id', fields[2])
local words = key .. ':words'
redis.call('SADD', words, ARGV[3])
redis.call('EXPIRE', words, tonumber(ARGV[4]))
redis.call('DEL', KEYS[1])
return {'matched', game_id, fields[2]}
"#;

/// KEYS: game key, open queue. ARGV: player id, game id, code key prefix.
pub(super) const CANCEL_MATCHMAKING: &str = r#"
local fields = redis.call('HMGET', KEYS[1], 'status', 'player1_id', 'join_code')
if not fields[1] then
  return {'err', 'game_not_found'}
end
if fields[2] ~= ARGV[1] then
  return {'err', 'not_game_owner'}
end
if fields[1] ~= 'waiting' then
  return {'err', 'game_not_available'}
end
redis.call('LREM', KEYS[2], 0, ARGV[2])
if fields[3] and fields[3] ~= '' then
  redis.call('DEL', ARGV[3] .. fields[3])
end
redis.call('DEL', KEYS[1])
return {'ok'}
"#;

/// KEYS: game key, expire set. ARGV: game id, turn timeout seconds.
pub(super) const JOIN_SESSION: &str = r#"
local status = redis.call('HGET', KEYS[1], 'status')
if not status then
  return {'err', 'game_not_found'}
end
if status == 'completed' then
  return {'err', 'game_not_joinable'}
end
local count = redis.call('HINCRBY', KEYS[1], 'connected_count', 1)
local started = '0'
if count == 2 and status == 'ready' then
  local now = tonumber(redis.call('TIME')[1])
  redis.call('HSET', KEYS[1], 'status', 'active')
  redis.call('ZADD', KEYS[2], now + tonumber(ARGV[2]), ARGV[1])
  started = '1'
end
return {'ok', tostring(count), started}
"#;

/// KEYS: game key. Replies with the remaining count.
pub(super) const LEAVE_SESSION: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return 0
end
local count = redis.call('HINCRBY', KEYS[1], 'connected_count', -1)
if count < 0 then
  redis.call('HSET', KEYS[1], 'connected_count', 0)
  count = 0
end
return count
"#;

/// KEYS: game key, words key, expire set. ARGV: game id, player id, word,
/// turn timeout seconds, retention seconds, continuations...
pub(super) const SUBMIT_WORD: &str = r#"
local fields = redis.call('HMGET', KEYS[1], 'status', 'current_turn_id', 'player1_id', 'player2_id')
if not fields[1] then
  return {'err', 'game_not_found'}
end
if fields[1] ~= 'active' then
  return {'err', 'game_not_active'}
end
if fields[2] ~= ARGV[2] then
  return {'err', 'not_your_turn'}
end
if redis.call('SISMEMBER', KEYS[2], ARGV[3]) == 1 then
  return {'err', 'word_already_played'}
end
local next_turn = fields[3]
if ARGV[2] == fields[3] then
  next_turn = fields[4]
end
redis.call('SADD', KEYS[2], ARGV[3])
if redis.call('TTL', KEYS[2]) == -1 then
  redis.call('EXPIRE', KEYS[2], tonumber(ARGV[5]))
end
redis.call('HSET', KEYS[1], 'current_word', ARGV[3], 'current_turn_id', next_turn)
local terminal = true
for i = 6, #ARGV do
  if redis.call('SISMEMBER', KEYS[2], ARGV[i]) == 0 then
    terminal = false
    break
  end
end
if terminal then
  redis.call('HSET', KEYS[1], 'status', 'completed', 'winner_id', ARGV[2], 'win_reason', 'no_moves')
  redis.call('ZREM', KEYS[3], ARGV[1])
  return {'ok', next_turn, ARGV[2]}
end
local now = tonumber(redis.call('TIME')[1])
redis.call('ZADD', KEYS[3], now + tonumber(ARGV[4]), ARGV[1])
return {'ok', next_turn}
"#;

/// KEYS: expire set. ARGV: limit, game key prefix.
/// Replies with `game_id, winner_id` pairs of the games it settled.
pub(super) const CLAIM_AND_END_EXPIRED: &str = r#"
local now = tonumber(redis.call('TIME')[1])
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', now, 'LIMIT', 0, tonumber(ARGV[1]))
local settled = {}
for _, game_id in ipairs(due) do
  redis.call('ZREM', KEYS[1], game_id)
  local key = ARGV[2] .. game_id
  local fields = redis.call('HMGET', key, 'status', 'current_turn_id', 'player1_id', 'player2_id')
  if fields[1] == 'active' then
    local winner = fields[3]
    if fields[2] == fields[3] then
      winner = fields[4]
    end
    redis.call('HSET', key, 'status', 'completed', 'winner_id', winner, 'win_reason', 'timeout')
    redis.call('PUBLISH', key, cjson.encode({
      type = 'game_ended',
      gameId = game_id,
      payload = { winnerId = winner, reason = 'timeout' },
    }))
    table.insert(settled, game_id)
    table.insert(settled, winner)
  end
end
return settled
"#;

/// Compiled scripts; `Script` caches the SHA and falls back to `EVAL` on a miss.
pub(super) struct Scripts {
    pub pop_and_join: Script,
    pub join_private: Script,
    pub cancel_matchmaking: Script,
    pub join_session: Script,
    pub leave_session: Script,
    pub submit_word: Script,
    pub claim_and_end_expired: Script,
}

impl Scripts {
    pub fn load() -> Self {
        Self {
            pop_and_join: Script::new(POP_AND_JOIN),
            join_private: Script::new(JOIN_PRIVATE),
            cancel_matchmaking: Script::new(CANCEL_MATCHMAKING),
            join_session: Script::new(JOIN_SESSION),
            leave_session: Script::new(LEAVE_SESSION),
            submit_word: Script::new(SUBMIT_WORD),
            claim_and_end_expired: Script::new(CLAIM_AND_END_EXPIRED),
        }
    }
}

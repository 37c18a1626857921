//! Key and channel layout in the shared store.

/// Prefix shared by every game key and channel.
pub const GAME_PREFIX: &str = "game:";
/// Matchmaking queue (list).
pub const OPEN_QUEUE: &str = "game:open";
/// Turn deadlines (sorted set, unix seconds).
pub const EXPIRE_SET: &str = "game:expire";
/// Ids whose game key would land on a shared key.
pub const RESERVED_GAME_IDS: [&str; 2] = ["open", "expire"];
/// Pattern matching every game channel.
pub const GAME_CHANNEL_PATTERN: &str = "game:*";

/// Hash holding the game record. Doubles as the game's pub/sub channel.
pub fn game_key(game_id: &str) -> String {
    format!("{GAME_PREFIX}{game_id}")
}

/// Set of words already played in the game.
pub fn words_key(game_id: &str) -> String {
    format!("{GAME_PREFIX}{game_id}:words")
}

/// Private join code mapping.
pub fn code_key(join_code: &str) -> String {
    format!("{GAME_PREFIX}code:{join_code}")
}

/// Extract the game id from a channel name, ignoring anything that is not a
/// per-game channel.
pub fn channel_game_id(channel: &str) -> Option<&str> {
    let game_id = channel.strip_prefix(GAME_PREFIX)?;
    if game_id.is_empty() || game_id.contains(':') || RESERVED_GAME_IDS.contains(&game_id) {
        return None;
    }
    Some(game_id)
}

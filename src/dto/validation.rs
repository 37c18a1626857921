//! Validation helpers for inbound frames and requests.

use validator::ValidationError;

use crate::dao::game_store::keys::RESERVED_GAME_IDS;

/// Longest accepted game identifier.
pub const MAX_GAME_ID_LEN: usize = 64;
/// Longest accepted word.
pub const MAX_WORD_LEN: usize = 32;
/// Exact length of a private join code.
pub const JOIN_CODE_LEN: usize = 8;

fn invalid(code: &'static str, message: String) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

/// Validates a game identifier: 1 to 64 ASCII alphanumerics or dashes.
///
/// ```ignore
/// validate_game_id("0199e0c2-5c4e-7b3a-9f00-1d2e3f405162") // Ok
/// validate_game_id("")                                     // Err - empty
/// validate_game_id("game:*")                               // Err - forbidden characters
/// validate_game_id("open")                                 // Err - names the matchmaking queue
/// ```
pub fn validate_game_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() || id.len() > MAX_GAME_ID_LEN {
        return Err(invalid(
            "game_id_length",
            format!(
                "Game ID must be between 1 and {MAX_GAME_ID_LEN} characters (got {})",
                id.len()
            ),
        ));
    }

    if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(invalid(
            "game_id_format",
            "Game ID must contain only alphanumeric characters and dashes".into(),
        ));
    }

    if RESERVED_GAME_IDS.contains(&id) {
        return Err(invalid(
            "game_id_reserved",
            format!("Game ID `{id}` is reserved"),
        ));
    }

    Ok(())
}

/// Validates a submitted word: 1 to 32 ASCII letters, surrounding whitespace ignored.
pub fn validate_word(word: &str) -> Result<(), ValidationError> {
    let word = word.trim();
    if word.is_empty() || word.len() > MAX_WORD_LEN {
        return Err(invalid(
            "word_length",
            format!(
                "Word must be between 1 and {MAX_WORD_LEN} letters (got {})",
                word.len()
            ),
        ));
    }

    if !word.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(invalid(
            "word_format",
            "Word must contain only letters".into(),
        ));
    }

    Ok(())
}

/// Validates a private join code: exactly 8 ASCII alphanumerics.
pub fn validate_join_code(code: &str) -> Result<(), ValidationError> {
    if code.len() != JOIN_CODE_LEN {
        return Err(invalid(
            "join_code_length",
            format!(
                "Join code must be exactly {JOIN_CODE_LEN} characters (got {})",
                code.len()
            ),
        ));
    }

    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(invalid(
            "join_code_format",
            "Join code must contain only alphanumeric characters".into(),
        ));
    }

    Ok(())
}

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::{GameEntity, GameKind, GameStatus, WinReason},
    dto::{format_unix_millis, validation::validate_join_code},
};

/// Outcome of a matchmaking request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// A fresh game was queued; wait for an opponent on the socket.
    Waiting,
    /// Bound to an existing game as second player.
    Matched,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FindGameResponse {
    pub status: MatchStatus,
    pub game_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePrivateGameResponse {
    pub game_id: String,
    /// Code to share with the invited player.
    pub join_code: String,
}

/// Body of `POST /games/private/join`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JoinPrivateGameRequest {
    pub join_code: String,
}

impl Validate for JoinPrivateGameRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(e) = validate_join_code(&self.join_code) {
            errors.add("joinCode", e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Public view of a game record. Join codes are never exposed.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub id: String,
    pub kind: GameKind,
    pub status: GameStatus,
    pub player1_id: String,
    pub player1_name: String,
    pub player2_id: Option<String>,
    pub player2_name: Option<String>,
    pub current_word: Option<String>,
    pub current_turn_id: Option<String>,
    pub winner_id: Option<String>,
    pub win_reason: Option<WinReason>,
    pub connected_count: i64,
    /// RFC 3339 creation time.
    pub created_at: String,
}

impl From<GameEntity> for GameSnapshot {
    fn from(game: GameEntity) -> Self {
        Self {
            created_at: format_unix_millis(game.created_at),
            id: game.id,
            kind: game.kind,
            status: game.status,
            player1_id: game.player1_id,
            player1_name: game.player1_name,
            player2_id: game.player2_id,
            player2_name: game.player2_name,
            current_word: game.current_word,
            current_turn_id: game.current_turn_id,
            winner_id: game.winner_id,
            win_reason: game.win_reason,
            connected_count: game.connected_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_request_rejects_short_codes() {
        let request: JoinPrivateGameRequest =
            serde_json::from_str(r#"{"joinCode":"ABC"}"#).unwrap();
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("joinCode"));

        let request: JoinPrivateGameRequest =
            serde_json::from_str(r#"{"joinCode":"AB12cd34"}"#).unwrap();
        assert!(request.validate().is_ok());
    }

    #[test]
    fn snapshot_hides_the_join_code() {
        let game = GameEntity::waiting(
            "g1".into(),
            GameKind::Private,
            Some("AB12CD34".into()),
            "alice".into(),
            "Alice".into(),
            0,
        );
        let value = serde_json::to_value(GameSnapshot::from(game)).unwrap();
        assert_eq!(value["status"], "waiting");
        assert_eq!(value["createdAt"], "1970-01-01T00:00:00Z");
        assert!(value.get("joinCode").is_none());
    }
}

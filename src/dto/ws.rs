use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::{GameEntity, WinReason},
    dto::validation::{validate_game_id, validate_word},
};

/// Actions accepted from game websocket clients.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "action", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientAction {
    /// Attach the connection to a game session.
    JoinGame { game_id: String },
    /// Detach from the current game without closing the socket.
    LeaveGame {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        game_id: Option<String>,
    },
    /// Play a word in the attached game.
    SubmitWord { game_id: String, word: String },
}

/// Why an inbound frame could not be turned into a [`ClientAction`].
#[derive(Debug, Error)]
pub enum ClientActionError {
    /// Not JSON, or not one of the known actions.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Well-formed action carrying invalid fields.
    #[error("invalid `{}` frame: {errors}", action.name())]
    Invalid {
        action: ClientAction,
        errors: ValidationErrors,
    },
}

impl ClientActionError {
    /// The parsed action, when the frame got that far.
    pub fn action(&self) -> Option<&ClientAction> {
        match self {
            Self::Malformed(_) => None,
            Self::Invalid { action, .. } => Some(action),
        }
    }
}

impl ClientAction {
    /// Parse and validate a text frame.
    pub fn from_json_str(raw: &str) -> Result<Self, ClientActionError> {
        let action: Self = serde_json::from_str(raw)?;
        match action.validate() {
            Ok(()) => Ok(action),
            Err(errors) => Err(ClientActionError::Invalid { action, errors }),
        }
    }

    /// Wire name of the action.
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinGame { .. } => "join_game",
            Self::LeaveGame { .. } => "leave_game",
            Self::SubmitWord { .. } => "submit_word",
        }
    }

    /// Game the action targets, if any.
    pub fn game_id(&self) -> Option<&str> {
        match self {
            Self::JoinGame { game_id } | Self::SubmitWord { game_id, .. } => Some(game_id),
            Self::LeaveGame { game_id } => game_id.as_deref(),
        }
    }

    /// Error category reported to the client when this action fails.
    /// Leaving never reports failures.
    pub fn error_type(&self) -> Option<ErrorType> {
        match self {
            Self::JoinGame { .. } => Some(ErrorType::JoinFailed),
            Self::SubmitWord { .. } => Some(ErrorType::SubmitFailed),
            Self::LeaveGame { .. } => None,
        }
    }
}

impl Validate for ClientAction {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Some(game_id) = self.game_id() {
            if let Err(e) = validate_game_id(game_id) {
                errors.add("gameId", e);
            }
        }

        if let Self::SubmitWord { word, .. } = self {
            if let Err(e) = validate_word(word) {
                errors.add("word", e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Kind of an outbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    JoinedGame,
    GameStarted,
    WordSubmitted,
    GameEnded,
    Error,
}

/// Category of an `error` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    JoinFailed,
    SubmitFailed,
}

/// Event pushed to websocket clients, either directly or through the game channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub game_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<EventPayload>,
}

/// Event-specific body; the variant is implied by [`ServerMessage::kind`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(untagged)]
pub enum EventPayload {
    GameStarted(GameStartedPayload),
    WordSubmitted(WordSubmittedPayload),
    GameEnded(GameEndedPayload),
    Error(ErrorPayload),
}

/// Broadcast once both players are connected.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameStartedPayload {
    pub current_word: String,
    pub current_turn_id: String,
    pub player1_id: String,
    pub player1_name: String,
    pub player2_id: String,
    pub player2_name: String,
    pub start_word: String,
}

/// Broadcast after every accepted move.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WordSubmittedPayload {
    pub player_id: String,
    pub player_name: String,
    pub word: String,
    pub current_turn_id: String,
}

/// Broadcast when a game is settled.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameEndedPayload {
    pub winner_id: String,
    pub reason: WinReason,
}

/// Sent to the originating connection only.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub error_type: ErrorType,
    /// Machine-readable sub-reason such as `not_your_turn`.
    pub message: String,
}

impl ServerMessage {
    /// Acknowledgement sent to the joining connection.
    pub fn joined(game_id: impl Into<String>) -> Self {
        Self {
            kind: EventKind::JoinedGame,
            game_id: game_id.into(),
            payload: None,
        }
    }

    /// Opening event built from the freshly activated game record.
    pub fn game_started(game: &GameEntity) -> Self {
        let current_word = game.current_word.clone().unwrap_or_default();
        Self {
            kind: EventKind::GameStarted,
            game_id: game.id.clone(),
            payload: Some(EventPayload::GameStarted(GameStartedPayload {
                current_word: current_word.clone(),
                current_turn_id: game.current_turn_id.clone().unwrap_or_default(),
                player1_id: game.player1_id.clone(),
                player1_name: game.player1_name.clone(),
                player2_id: game.player2_id.clone().unwrap_or_default(),
                player2_name: game.player2_name.clone().unwrap_or_default(),
                start_word: current_word,
            })),
        }
    }

    pub fn word_submitted(game_id: impl Into<String>, payload: WordSubmittedPayload) -> Self {
        Self {
            kind: EventKind::WordSubmitted,
            game_id: game_id.into(),
            payload: Some(EventPayload::WordSubmitted(payload)),
        }
    }

    pub fn game_ended(
        game_id: impl Into<String>,
        winner_id: impl Into<String>,
        reason: WinReason,
    ) -> Self {
        Self {
            kind: EventKind::GameEnded,
            game_id: game_id.into(),
            payload: Some(EventPayload::GameEnded(GameEndedPayload {
                winner_id: winner_id.into(),
                reason,
            })),
        }
    }

    pub fn error(
        game_id: impl Into<String>,
        error_type: ErrorType,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: EventKind::Error,
            game_id: game_id.into(),
            payload: Some(EventPayload::Error(ErrorPayload {
                error_type,
                message: message.into(),
            })),
        }
    }

    /// Serialise to the text frame sent on the wire.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_every_action() {
        let join = ClientAction::from_json_str(r#"{"action":"join_game","gameId":"g1"}"#).unwrap();
        assert_eq!(join, ClientAction::JoinGame { game_id: "g1".into() });

        let leave = ClientAction::from_json_str(r#"{"action":"leave_game"}"#).unwrap();
        assert_eq!(leave, ClientAction::LeaveGame { game_id: None });

        let submit =
            ClientAction::from_json_str(r#"{"action":"submit_word","gameId":"g1","word":"cord"}"#)
                .unwrap();
        assert_eq!(submit.name(), "submit_word");
        assert_eq!(submit.error_type(), Some(ErrorType::SubmitFailed));
    }

    #[test]
    fn unknown_action_is_malformed() {
        let err = ClientAction::from_json_str(r#"{"action":"dance","gameId":"g1"}"#).unwrap_err();
        assert!(matches!(err, ClientActionError::Malformed(_)));

        let err = ClientAction::from_json_str("not json").unwrap_err();
        assert!(matches!(err, ClientActionError::Malformed(_)));
    }

    #[test]
    fn invalid_fields_keep_the_parsed_action() {
        let err =
            ClientAction::from_json_str(r#"{"action":"submit_word","gameId":"g1","word":"c0rd"}"#)
                .unwrap_err();
        match err {
            ClientActionError::Invalid { action, errors } => {
                assert_eq!(action.game_id(), Some("g1"));
                assert!(errors.field_errors().contains_key("word"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn invalid_frame_error_names_the_action() {
        let err =
            ClientAction::from_json_str(r#"{"action":"submit_word","gameId":"g1","word":"c0rd"}"#)
                .unwrap_err();
        assert_eq!(err.action().map(ClientAction::name), Some("submit_word"));

        let text = err.to_string();
        let details = text
            .strip_prefix("invalid `submit_word` frame: ")
            .unwrap_or_else(|| panic!("unexpected {text}"));
        assert!(details.contains("word"), "{text}");

        let err = ClientAction::from_json_str("not json").unwrap_err();
        assert!(err.action().is_none());
        assert!(err.to_string().starts_with("malformed frame: "));
    }

    #[test]
    fn game_ended_matches_the_published_shape() {
        let message = ServerMessage::game_ended("g1", "bob", WinReason::Timeout);
        let value: serde_json::Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "game_ended",
                "gameId": "g1",
                "payload": { "winnerId": "bob", "reason": "timeout" }
            })
        );
    }

    #[test]
    fn joined_has_no_payload() {
        let raw = ServerMessage::joined("g1").to_json().unwrap();
        assert_eq!(raw, r#"{"type":"joined_game","gameId":"g1"}"#);
    }

    #[test]
    fn error_frames_parse_back() {
        let raw = ServerMessage::error("g1", ErrorType::SubmitFailed, "not_your_turn")
            .to_json()
            .unwrap();
        let parsed: ServerMessage = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.kind, EventKind::Error);
        assert!(matches!(
            parsed.payload,
            Some(EventPayload::Error(ErrorPayload { ref message, .. })) if message == "not_your_turn"
        ));
    }
}

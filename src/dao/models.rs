use std::{collections::HashMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// How a game was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GameKind {
    /// Created through public matchmaking.
    Online,
    /// Created with a shareable join code.
    Private,
}

/// Lifecycle status of a game. Ordering follows the lifecycle: a status never
/// moves to a smaller value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// Only the first player is bound.
    Waiting,
    /// Both players are bound, sockets not yet attached.
    Ready,
    /// Both sockets attached, turns are being played.
    Active,
    /// A winner has been declared.
    Completed,
}

/// Why a game was won.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WinReason {
    /// The opponent did not move before the turn deadline.
    Timeout,
    /// The opponent was left without any unplayed legal word.
    NoMoves,
}

/// Error raised when a stored record cannot be decoded.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unknown {field} value `{value}`")]
    UnknownVariant { field: &'static str, value: String },
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("field `{field}` is not an integer: `{value}`")]
    NotAnInteger { field: &'static str, value: String },
}

macro_rules! string_enum {
    ($ty:ident, $field:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            /// Stored representation of the value.
            pub fn as_str(self) -> &'static str {
                match self {
                    $($ty::$variant => $text),+
                }
            }
        }

        impl FromStr for $ty {
            type Err = ModelError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok($ty::$variant),)+
                    other => Err(ModelError::UnknownVariant {
                        field: $field,
                        value: other.to_owned(),
                    }),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(GameKind, "kind", { Online => "online", Private => "private" });
string_enum!(GameStatus, "status", {
    Waiting => "waiting",
    Ready => "ready",
    Active => "active",
    Completed => "completed",
});
string_enum!(WinReason, "win_reason", { Timeout => "timeout", NoMoves => "no_moves" });

/// Authoritative game record as held by the shared store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameEntity {
    /// Opaque unique identifier.
    pub id: String,
    /// Matchmaking or private game.
    pub kind: GameKind,
    /// Current lifecycle status.
    pub status: GameStatus,
    /// Join code, private games only.
    pub join_code: Option<String>,
    /// Player who created the game.
    pub player1_id: String,
    /// Display name of the creator.
    pub player1_name: String,
    /// Player bound by matchmaking or code redemption.
    pub player2_id: Option<String>,
    /// Display name of the second player.
    pub player2_name: Option<String>,
    /// Last accepted word (the start word right after matching).
    pub current_word: Option<String>,
    /// Player whose move is awaited.
    pub current_turn_id: Option<String>,
    /// Winner once completed.
    pub winner_id: Option<String>,
    /// Why the winner won.
    pub win_reason: Option<WinReason>,
    /// Number of sockets attached across all instances.
    pub connected_count: i64,
    /// Creation time in unix milliseconds.
    pub created_at: i64,
}

impl GameEntity {
    /// Build a freshly created game waiting for its second player.
    pub fn waiting(
        id: String,
        kind: GameKind,
        join_code: Option<String>,
        player1_id: String,
        player1_name: String,
        created_at: i64,
    ) -> Self {
        Self {
            id,
            kind,
            status: GameStatus::Waiting,
            join_code,
            player1_id,
            player1_name,
            player2_id: None,
            player2_name: None,
            current_word: None,
            current_turn_id: None,
            winner_id: None,
            win_reason: None,
            connected_count: 0,
            created_at,
        }
    }

    /// The other player of a two-player game.
    pub fn opponent_of(&self, player_id: &str) -> Option<&str> {
        if player_id == self.player1_id {
            self.player2_id.as_deref()
        } else if self.player2_id.as_deref() == Some(player_id) {
            Some(self.player1_id.as_str())
        } else {
            None
        }
    }

    /// Display name for one of the two players.
    pub fn player_name(&self, player_id: &str) -> Option<&str> {
        if player_id == self.player1_id {
            Some(self.player1_name.as_str())
        } else if self.player2_id.as_deref() == Some(player_id) {
            self.player2_name.as_deref()
        } else {
            None
        }
    }

    /// Flatten the record into hash fields; absent values are stored as empty strings.
    pub fn to_fields(&self) -> Vec<(&'static str, String)> {
        fn opt(value: &Option<String>) -> String {
            value.clone().unwrap_or_default()
        }

        vec![
            ("id", self.id.clone()),
            ("kind", self.kind.as_str().to_owned()),
            ("status", self.status.as_str().to_owned()),
            ("join_code", opt(&self.join_code)),
            ("player1_id", self.player1_id.clone()),
            ("player1_name", self.player1_name.clone()),
            ("player2_id", opt(&self.player2_id)),
            ("player2_name", opt(&self.player2_name)),
            ("current_word", opt(&self.current_word)),
            ("current_turn_id", opt(&self.current_turn_id)),
            ("winner_id", opt(&self.winner_id)),
            (
                "win_reason",
                self.win_reason
                    .map(|reason| reason.as_str().to_owned())
                    .unwrap_or_default(),
            ),
            ("connected_count", self.connected_count.to_string()),
            ("created_at", self.created_at.to_string()),
        ]
    }

    /// Rebuild a record from hash fields. Returns `Ok(None)` for an empty hash.
    pub fn from_fields(mut fields: HashMap<String, String>) -> Result<Option<Self>, ModelError> {
        if fields.is_empty() {
            return Ok(None);
        }

        let mut take = |name: &'static str| fields.remove(name).filter(|value| !value.is_empty());
        let required = |name: &'static str, value: Option<String>| {
            value.ok_or(ModelError::MissingField(name))
        };
        let integer = |name: &'static str, value: Option<String>| -> Result<i64, ModelError> {
            match value {
                None => Ok(0),
                Some(raw) => raw.parse().map_err(|_| ModelError::NotAnInteger {
                    field: name,
                    value: raw,
                }),
            }
        };

        let id = required("id", take("id"))?;
        let kind = required("kind", take("kind"))?.parse()?;
        let status = required("status", take("status"))?.parse()?;
        let join_code = take("join_code");
        let player1_id = required("player1_id", take("player1_id"))?;
        let player1_name = take("player1_name").unwrap_or_default();
        let player2_id = take("player2_id");
        let player2_name = take("player2_name");
        let current_word = take("current_word");
        let current_turn_id = take("current_turn_id");
        let winner_id = take("winner_id");
        let win_reason = take("win_reason").map(|raw| raw.parse()).transpose()?;
        let connected_count = integer("connected_count", take("connected_count"))?;
        let created_at = integer("created_at", take("created_at"))?;

        Ok(Some(Self {
            id,
            kind,
            status,
            join_code,
            player1_id,
            player1_name,
            player2_id,
            player2_name,
            current_word,
            current_turn_id,
            winner_id,
            win_reason,
            connected_count,
            created_at,
        }))
    }
}

/// Identity and start word of the player trying to take the second seat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenger {
    pub player_id: String,
    pub player_name: String,
    /// Word seeded as the first current word if the join succeeds.
    pub start_word: String,
}

/// Successful binding of a second player to a waiting game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedGame {
    pub game_id: String,
    /// The game creator, who also holds the first turn.
    pub player1_id: String,
}

/// Where a new game is advertised, written in the same transaction as the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameListing {
    /// Not reachable through matchmaking or a code.
    Unlisted,
    /// Pushed onto the matchmaking queue.
    Matchmaking,
    /// Reachable through the given private join code.
    JoinCode(String),
}

/// Result of attaching one socket to a game session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionJoin {
    /// Attached sockets after the increment.
    pub connected_count: i64,
    /// True only for the join that moved the game from ready to active.
    pub started: bool,
}

/// A move handed to the atomic submit operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordSubmission {
    pub game_id: String,
    pub player_id: String,
    pub word: String,
    /// Every legal follow-up of `word`; when all of them are already played the
    /// move ends the game.
    pub continuations: Vec<String>,
}

/// Outcome of an accepted move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    /// Player who now holds the turn.
    pub next_turn_id: String,
    /// Set when the move left the opponent without a legal word.
    pub winner_id: Option<String>,
}

/// A game settled by the timeout arbiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredGame {
    pub game_id: String,
    pub winner_id: String,
}

/// A raw event received on a game channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    pub game_id: String,
    /// Fully formed client-facing JSON event.
    pub payload: String,
}

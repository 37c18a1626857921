use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The store answered with something the protocol does not understand.
    #[error("malformed reply from `{operation}`: {detail}")]
    MalformedReply {
        operation: &'static str,
        detail: String,
    },
    /// The atomic operation ran but refused the transition.
    #[error("operation rejected: {0}")]
    Rejected(#[from] Rejection),
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Build a malformed-reply error for the named operation.
    pub fn malformed(operation: &'static str, detail: impl Into<String>) -> Self {
        StorageError::MalformedReply {
            operation,
            detail: detail.into(),
        }
    }
}

/// Game-rule refusals produced inside the atomic operations.
///
/// Every variant carries a stable snake_case code. The Redis scripts return the
/// same codes, and they double as the `message` of client error frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("invalid_code")]
    InvalidCode,
    #[error("game_not_found")]
    GameNotFound,
    #[error("game_not_available")]
    GameNotAvailable,
    #[error("game_not_joinable")]
    GameNotJoinable,
    #[error("game_not_active")]
    GameNotActive,
    #[error("cannot_join_own_game")]
    CannotJoinOwnGame,
    #[error("not_game_owner")]
    NotGameOwner,
    #[error("not_your_turn")]
    NotYourTurn,
    #[error("word_already_played")]
    WordAlreadyPlayed,
}

impl Rejection {
    const ALL: [Rejection; 9] = [
        Rejection::InvalidCode,
        Rejection::GameNotFound,
        Rejection::GameNotAvailable,
        Rejection::GameNotJoinable,
        Rejection::GameNotActive,
        Rejection::CannotJoinOwnGame,
        Rejection::NotGameOwner,
        Rejection::NotYourTurn,
        Rejection::WordAlreadyPlayed,
    ];

    /// Machine-readable code shared with the store scripts.
    pub fn code(self) -> &'static str {
        match self {
            Rejection::InvalidCode => "invalid_code",
            Rejection::GameNotFound => "game_not_found",
            Rejection::GameNotAvailable => "game_not_available",
            Rejection::GameNotJoinable => "game_not_joinable",
            Rejection::GameNotActive => "game_not_active",
            Rejection::CannotJoinOwnGame => "cannot_join_own_game",
            Rejection::NotGameOwner => "not_game_owner",
            Rejection::NotYourTurn => "not_your_turn",
            Rejection::WordAlreadyPlayed => "word_already_played",
        }
    }

    /// Parse a code returned by a store script.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|rejection| rejection.code() == code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_codes_round_trip_through_script_replies() {
        for rejection in Rejection::ALL {
            assert_eq!(Rejection::from_code(rejection.code()), Some(rejection));
            assert_eq!(rejection.to_string(), rejection.code());
        }
        assert_eq!(Rejection::from_code("teapot"), None);
    }

    #[test]
    fn rejected_storage_error_keeps_the_code() {
        let err: StorageError = Rejection::NotYourTurn.into();
        assert!(matches!(err, StorageError::Rejected(Rejection::NotYourTurn)));
    }
}

//! Player identity resolution.
//!
//! Session handling lives in front of this service; the gateway forwards the
//! authenticated player in request headers.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};
use thiserror::Error;

use crate::{
    error::{AppError, ServiceError},
    state::SharedState,
};

/// Header carrying the authenticated player id.
pub const PLAYER_ID_HEADER: &str = "x-player-id";
/// Header carrying the display name; defaults to the id.
pub const PLAYER_NAME_HEADER: &str = "x-player-name";

const MAX_HEADER_LEN: usize = 64;

/// Authenticated player attached to a request or socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerIdentity {
    pub player_id: String,
    pub player_name: String,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing `{0}` header")]
    MissingHeader(&'static str),
    #[error("malformed `{0}` header")]
    MalformedHeader(&'static str),
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        ServiceError::Unauthorized(err.to_string())
    }
}

/// Resolves the caller from request headers.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, headers: &HeaderMap) -> Result<PlayerIdentity, AuthError>;
}

/// Trusts identity headers set by an upstream gateway.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderAuthenticator;

impl Authenticator for HeaderAuthenticator {
    fn authenticate(&self, headers: &HeaderMap) -> Result<PlayerIdentity, AuthError> {
        let player_id = header_value(headers, PLAYER_ID_HEADER)?
            .ok_or(AuthError::MissingHeader(PLAYER_ID_HEADER))?;
        let player_name = header_value(headers, PLAYER_NAME_HEADER)?
            .unwrap_or_else(|| player_id.clone());

        Ok(PlayerIdentity {
            player_id,
            player_name,
        })
    }
}

fn header_value(headers: &HeaderMap, name: &'static str) -> Result<Option<String>, AuthError> {
    let Some(value) = headers.get(name) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| AuthError::MalformedHeader(name))?
        .trim();

    if value.is_empty() {
        return Ok(None);
    }
    if value.len() > MAX_HEADER_LEN || value.chars().any(char::is_control) {
        return Err(AuthError::MalformedHeader(name));
    }
    Ok(Some(value.to_owned()))
}

impl FromRequestParts<SharedState> for PlayerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        state
            .auth()
            .authenticate(&parts.headers)
            .map_err(|err| ServiceError::from(err).into())
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn name_defaults_to_the_player_id() {
        let identity = HeaderAuthenticator
            .authenticate(&headers(&[(PLAYER_ID_HEADER, " alice ")]))
            .unwrap();
        assert_eq!(identity.player_id, "alice");
        assert_eq!(identity.player_name, "alice");

        let identity = HeaderAuthenticator
            .authenticate(&headers(&[(PLAYER_ID_HEADER, "alice"), (PLAYER_NAME_HEADER, "Alice")]))
            .unwrap();
        assert_eq!(identity.player_name, "Alice");
    }

    #[test]
    fn missing_or_blank_id_is_refused() {
        let err = HeaderAuthenticator.authenticate(&HeaderMap::new()).unwrap_err();
        assert!(matches!(err, AuthError::MissingHeader(PLAYER_ID_HEADER)));

        let err = HeaderAuthenticator
            .authenticate(&headers(&[(PLAYER_ID_HEADER, "   ")]))
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingHeader(_)));
    }

    #[test]
    fn oversized_id_is_malformed() {
        let long = "x".repeat(MAX_HEADER_LEN + 1);
        let err = HeaderAuthenticator
            .authenticate(&headers(&[(PLAYER_ID_HEADER, &long)]))
            .unwrap_err();
        assert!(matches!(err, AuthError::MalformedHeader(PLAYER_ID_HEADER)));
    }
}

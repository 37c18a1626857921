/// Timeout arbiter settling abandoned games.
pub mod arbiter;
/// Player identity resolution from gateway headers.
pub mod auth;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Per-process connection hub actor.
pub mod hub;
/// Matchmaking, private games and game lookup.
pub mod matchmaking_service;
/// Store channel to local hub relay.
pub mod relay;
/// WebSocket connection and message handling service.
pub mod websocket_service;
/// Word ladder rules.
pub mod words;

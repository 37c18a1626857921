use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};

use crate::{
    services::{auth::PlayerIdentity, websocket_service},
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/ws",
    tag = "game",
    params(("X-Player-Id" = String, Header, description = "Authenticated player id")),
    responses(
        (status = 101, description = "Switching protocols to WebSocket"),
        (status = 401, description = "Missing identity")
    )
)]
/// Upgrade the HTTP connection into a player game socket.
pub async fn ws_handler(
    State(state): State<SharedState>,
    player: PlayerIdentity,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let max_message_size = state.config().connection.max_message_size;
    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| websocket_service::handle_socket(state, socket, player))
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/ws", get(ws_handler))
}

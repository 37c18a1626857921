use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use axum_valid::Valid;

use crate::{
    dto::game::{
        CreatePrivateGameResponse, FindGameResponse, GameSnapshot, JoinPrivateGameRequest,
    },
    error::AppError,
    services::{auth::PlayerIdentity, matchmaking_service},
    state::SharedState,
};

/// Matchmaking, private games and game lookup.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/games/find", get(find_game))
        .route("/games/private", post(create_private_game))
        .route("/games/private/join", post(join_private_game))
        .route("/games/matchmaking/{id}", delete(cancel_matchmaking))
        .route("/games/{id}", get(get_game))
}

/// Join a waiting game or queue a new one.
#[utoipa::path(
    get,
    path = "/games/find",
    tag = "game",
    params(("X-Player-Id" = String, Header, description = "Authenticated player id")),
    responses(
        (status = 200, description = "Matched or queued", body = FindGameResponse),
        (status = 401, description = "Missing identity")
    )
)]
pub async fn find_game(
    State(state): State<SharedState>,
    player: PlayerIdentity,
) -> Result<Json<FindGameResponse>, AppError> {
    Ok(Json(matchmaking_service::find_game(&state, &player).await?))
}

/// Create a private game and return its join code.
#[utoipa::path(
    post,
    path = "/games/private",
    tag = "game",
    params(("X-Player-Id" = String, Header, description = "Authenticated player id")),
    responses((status = 200, description = "Private game created", body = CreatePrivateGameResponse))
)]
pub async fn create_private_game(
    State(state): State<SharedState>,
    player: PlayerIdentity,
) -> Result<Json<CreatePrivateGameResponse>, AppError> {
    Ok(Json(
        matchmaking_service::create_private_game(&state, &player).await?,
    ))
}

/// Redeem a join code.
#[utoipa::path(
    post,
    path = "/games/private/join",
    tag = "game",
    params(("X-Player-Id" = String, Header, description = "Authenticated player id")),
    request_body = JoinPrivateGameRequest,
    responses(
        (status = 200, description = "Joined as second player", body = FindGameResponse),
        (status = 400, description = "Unknown code or own game"),
        (status = 409, description = "Game no longer waiting")
    )
)]
pub async fn join_private_game(
    State(state): State<SharedState>,
    player: PlayerIdentity,
    Valid(Json(payload)): Valid<Json<JoinPrivateGameRequest>>,
) -> Result<Json<FindGameResponse>, AppError> {
    Ok(Json(
        matchmaking_service::join_private_game(&state, &player, payload.join_code).await?,
    ))
}

/// Withdraw a waiting game from matchmaking.
#[utoipa::path(
    delete,
    path = "/games/matchmaking/{id}",
    tag = "game",
    params(
        ("id" = String, Path, description = "Identifier of the waiting game"),
        ("X-Player-Id" = String, Header, description = "Authenticated player id")
    ),
    responses(
        (status = 204, description = "Game withdrawn"),
        (status = 403, description = "Not the creator"),
        (status = 404, description = "Unknown game"),
        (status = 409, description = "Game already matched")
    )
)]
pub async fn cancel_matchmaking(
    State(state): State<SharedState>,
    player: PlayerIdentity,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    matchmaking_service::cancel_matchmaking(&state, &player, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Read the current state of a game.
#[utoipa::path(
    get,
    path = "/games/{id}",
    tag = "game",
    params(("id" = String, Path, description = "Identifier of the game")),
    responses(
        (status = 200, description = "Game found", body = GameSnapshot),
        (status = 404, description = "Unknown or expired game")
    )
)]
pub async fn get_game(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<GameSnapshot>, AppError> {
    Ok(Json(matchmaking_service::get_game(&state, id).await?))
}

use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Delta Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::game::find_game,
        crate::routes::game::create_private_game,
        crate::routes::game::join_private_game,
        crate::routes::game::cancel_matchmaking,
        crate::routes::game::get_game,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::game::MatchStatus,
            crate::dto::game::FindGameResponse,
            crate::dto::game::CreatePrivateGameResponse,
            crate::dto::game::JoinPrivateGameRequest,
            crate::dto::game::GameSnapshot,
            crate::dto::ws::ServerMessage,
            crate::dto::ws::EventKind,
            crate::dto::ws::ErrorType,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "game", description = "Matchmaking, private games and the game socket"),
    )
)]
pub struct ApiDoc;

use rand::{Rng, distr::Alphanumeric};
use tracing::info;
use uuid::Uuid;

use crate::{
    dao::models::{Challenger, GameEntity, GameKind, GameListing},
    dto::{
        game::{CreatePrivateGameResponse, FindGameResponse, GameSnapshot, MatchStatus},
        validation::JOIN_CODE_LEN,
    },
    error::ServiceError,
    services::auth::PlayerIdentity,
    state::SharedState,
};

/// Join the oldest compatible waiting game, or queue a new one.
pub async fn find_game(
    state: &SharedState,
    player: &PlayerIdentity,
) -> Result<FindGameResponse, ServiceError> {
    let store = state.store();
    let challenger = challenger(state, player);

    if let Some(matched) = store.pop_and_join(challenger).await? {
        info!(game_id = %matched.game_id, player_id = %player.player_id, opponent = %matched.player1_id, "matched players");
        return Ok(FindGameResponse {
            status: MatchStatus::Matched,
            game_id: matched.game_id,
        });
    }

    let game = new_game(GameKind::Online, None, player);
    let game_id = game.id.clone();
    store.create_game(game, GameListing::Matchmaking).await?;
    info!(game_id, player_id = %player.player_id, "queued new game");

    Ok(FindGameResponse {
        status: MatchStatus::Waiting,
        game_id,
    })
}

/// Create a game reachable only through a fresh join code.
pub async fn create_private_game(
    state: &SharedState,
    player: &PlayerIdentity,
) -> Result<CreatePrivateGameResponse, ServiceError> {
    let join_code = generate_join_code();
    let game = new_game(GameKind::Private, Some(join_code.clone()), player);
    let game_id = game.id.clone();

    state
        .store()
        .create_game(game, GameListing::JoinCode(join_code.clone()))
        .await?;
    info!(game_id, player_id = %player.player_id, "created private game");

    Ok(CreatePrivateGameResponse { game_id, join_code })
}

/// Redeem a join code as second player.
pub async fn join_private_game(
    state: &SharedState,
    player: &PlayerIdentity,
    join_code: String,
) -> Result<FindGameResponse, ServiceError> {
    let matched = state
        .store()
        .join_private_game(join_code, challenger(state, player))
        .await?;
    info!(game_id = %matched.game_id, player_id = %player.player_id, "joined private game");

    Ok(FindGameResponse {
        status: MatchStatus::Matched,
        game_id: matched.game_id,
    })
}

/// Withdraw the caller's waiting game from matchmaking.
pub async fn cancel_matchmaking(
    state: &SharedState,
    player: &PlayerIdentity,
    game_id: String,
) -> Result<(), ServiceError> {
    state
        .store()
        .cancel_matchmaking(game_id.clone(), player.player_id.clone())
        .await?;
    info!(game_id, player_id = %player.player_id, "matchmaking cancelled");
    Ok(())
}

pub async fn get_game(state: &SharedState, game_id: String) -> Result<GameSnapshot, ServiceError> {
    state
        .store()
        .find_game(game_id.clone())
        .await?
        .map(GameSnapshot::from)
        .ok_or_else(|| ServiceError::NotFound(format!("game `{game_id}` not found")))
}

fn challenger(state: &SharedState, player: &PlayerIdentity) -> Challenger {
    Challenger {
        player_id: player.player_id.clone(),
        player_name: player.player_name.clone(),
        start_word: state.words().random_start_word(),
    }
}

fn new_game(kind: GameKind, join_code: Option<String>, player: &PlayerIdentity) -> GameEntity {
    GameEntity::waiting(
        Uuid::now_v7().to_string(),
        kind,
        join_code,
        player.player_id.clone(),
        player.player_name.clone(),
        now_millis(),
    )
}

fn generate_join_code() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(JOIN_CODE_LEN)
        .map(char::from)
        .collect()
}

fn now_millis() -> i64 {
    let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
    i64::try_from(nanos / 1_000_000).unwrap_or(i64::MAX)
}

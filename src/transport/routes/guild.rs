use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use tracing::info;

use crate::{
    common::{CommandRejection, GuildId},
    protocol::{ErrorResponse, JoinRequest, MessageResponse, PlayRequest, QueueResponse, VolumeRequest},
    server::AppState,
};

pub fn status_for(rejection: &CommandRejection) -> StatusCode {
    match rejection {
        CommandRejection::SessionNotFound => StatusCode::NOT_FOUND,
        CommandRejection::VolumeOutOfRange { .. } | CommandRejection::EmptySource => {
            StatusCode::BAD_REQUEST
        }
        CommandRejection::Connect(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::CONFLICT,
    }
}

pub fn rejection_response(rejection: CommandRejection, path: &str) -> Response {
    let status = status_for(&rejection);
    let body = ErrorResponse::new(
        status.as_u16(),
        status.canonical_reason().unwrap_or("Error"),
        rejection.to_string(),
        path,
    );
    (status, Json(body)).into_response()
}

fn respond(result: Result<String, CommandRejection>, path: &str) -> Response {
    match result {
        Ok(message) => (StatusCode::OK, Json(MessageResponse { message })).into_response(),
        Err(rejection) => {
            info!("{} rejected: {}", path, rejection);
            rejection_response(rejection, path)
        }
    }
}

/// POST /v1/guilds/{guildId}/play
pub async fn play(
    Path(guild_id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<PlayRequest>,
) -> Response {
    let path = format!("/v1/guilds/{guild_id}/play");
    info!("POST {} uri={}", path, body.uri);
    let channel_id = body.channel_id;
    let result = state
        .dispatcher
        .play(&GuildId::from(guild_id), channel_id, body.into_track())
        .await;
    respond(result, &path)
}

/// POST /v1/guilds/{guildId}/join
pub async fn join(
    Path(guild_id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<JoinRequest>,
) -> Response {
    let path = format!("/v1/guilds/{guild_id}/join");
    info!("POST {}", path);
    let result = state
        .dispatcher
        .join(&GuildId::from(guild_id), body.channel_id)
        .await;
    respond(result, &path)
}

/// POST /v1/guilds/{guildId}/skip
pub async fn skip(Path(guild_id): Path<String>, State(state): State<Arc<AppState>>) -> Response {
    let path = format!("/v1/guilds/{guild_id}/skip");
    info!("POST {}", path);
    respond(state.dispatcher.skip(&GuildId::from(guild_id)).await, &path)
}

/// POST /v1/guilds/{guildId}/pause
pub async fn pause(Path(guild_id): Path<String>, State(state): State<Arc<AppState>>) -> Response {
    let path = format!("/v1/guilds/{guild_id}/pause");
    info!("POST {}", path);
    respond(state.dispatcher.pause(&GuildId::from(guild_id)).await, &path)
}

/// POST /v1/guilds/{guildId}/resume
pub async fn resume(Path(guild_id): Path<String>, State(state): State<Arc<AppState>>) -> Response {
    let path = format!("/v1/guilds/{guild_id}/resume");
    info!("POST {}", path);
    respond(state.dispatcher.resume(&GuildId::from(guild_id)).await, &path)
}

/// POST /v1/guilds/{guildId}/stop
pub async fn stop(Path(guild_id): Path<String>, State(state): State<Arc<AppState>>) -> Response {
    let path = format!("/v1/guilds/{guild_id}/stop");
    info!("POST {}", path);
    respond(state.dispatcher.stop(&GuildId::from(guild_id)).await, &path)
}

/// POST /v1/guilds/{guildId}/leave
pub async fn leave(Path(guild_id): Path<String>, State(state): State<Arc<AppState>>) -> Response {
    let path = format!("/v1/guilds/{guild_id}/leave");
    info!("POST {}", path);
    respond(state.dispatcher.leave(&GuildId::from(guild_id)).await, &path)
}

/// PUT /v1/guilds/{guildId}/volume
pub async fn set_volume(
    Path(guild_id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<VolumeRequest>,
) -> Response {
    let path = format!("/v1/guilds/{guild_id}/volume");
    info!("PUT {} volume={}", path, body.volume);
    let result = state
        .dispatcher
        .set_volume(&GuildId::from(guild_id), body.volume)
        .await;
    respond(result, &path)
}

/// GET /v1/guilds/{guildId}/queue
pub async fn queue(Path(guild_id): Path<String>, State(state): State<Arc<AppState>>) -> Response {
    let path = format!("/v1/guilds/{guild_id}/queue");
    match state.dispatcher.queue_list(&GuildId::from(guild_id)).await {
        Ok(tracks) => (StatusCode::OK, Json(QueueResponse { tracks })).into_response(),
        Err(rejection) => rejection_response(rejection, &path),
    }
}

/// GET /v1/guilds/{guildId}/nowplaying
pub async fn now_playing(
    Path(guild_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let path = format!("/v1/guilds/{guild_id}/nowplaying");
    match state.dispatcher.now_playing(&GuildId::from(guild_id)).await {
        Ok(now) => (StatusCode::OK, Json(now)).into_response(),
        Err(rejection) => rejection_response(rejection, &path),
    }
}

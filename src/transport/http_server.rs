use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post, put},
};

use crate::{
    server::AppState,
    transport::{
        middleware::{add_response_headers, check_auth},
        routes::{guild, sessions},
        websocket_server,
    },
};

const API_V1: &str = "/v1";

pub fn router(state: Arc<AppState>) -> Router {
    let v1_routes = Router::new()
        .route("/guilds/{guild_id}/play", post(guild::play))
        .route("/guilds/{guild_id}/join", post(guild::join))
        .route("/guilds/{guild_id}/skip", post(guild::skip))
        .route("/guilds/{guild_id}/pause", post(guild::pause))
        .route("/guilds/{guild_id}/resume", post(guild::resume))
        .route("/guilds/{guild_id}/stop", post(guild::stop))
        .route("/guilds/{guild_id}/leave", post(guild::leave))
        .route("/guilds/{guild_id}/volume", put(guild::set_volume))
        .route("/guilds/{guild_id}/queue", get(guild::queue))
        .route("/guilds/{guild_id}/nowplaying", get(guild::now_playing))
        .route("/sessions", get(sessions::list_sessions))
        .route("/events", get(websocket_server::events_handler));

    Router::new()
        .nest(API_V1, v1_routes)
        .route("/version", get(sessions::get_version))
        .layer(middleware::from_fn_with_state(state.clone(), check_auth))
        .layer(middleware::from_fn(add_response_headers))
        .with_state(state)
}

use std::sync::Arc;

use axum::{extract::State, response::Json};

use crate::{common::banner::BuildInfo, protocol::SessionsResponse, server::AppState};

/// GET /v1/sessions
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<SessionsResponse> {
    tracing::debug!("GET /v1/sessions");
    Json(SessionsResponse {
        sessions: state.registry.statuses(),
    })
}

/// GET /version
pub async fn get_version() -> String {
    BuildInfo::default().describe()
}

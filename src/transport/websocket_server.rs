use std::sync::Arc;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

use crate::{
    common::GuildId,
    protocol::{EngineEvent, EventsQuery},
    server::AppState,
};

/// GET /v1/events
pub async fn events_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<EventsQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let filter = query.guild_id.map(GuildId::from);
    let events = state.events.subscribe();
    ws.on_upgrade(move |socket| forward_events(socket, events, filter))
}

async fn forward_events(
    mut socket: WebSocket,
    mut events: broadcast::Receiver<EngineEvent>,
    filter: Option<GuildId>,
) {
    info!(
        "event subscriber connected (guild filter: {})",
        filter.as_deref().unwrap_or("none")
    );

    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("event subscriber read error: {}", e);
                    break;
                }
            },
            event = events.recv() => match event {
                Ok(event) => {
                    if filter.as_ref().is_some_and(|g| g != event.guild_id()) {
                        continue;
                    }
                    let json = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!("failed to serialize event: {}", e);
                            continue;
                        }
                    };
                    if socket.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("event subscriber lagged, {} events dropped", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    info!("event subscriber disconnected");
}

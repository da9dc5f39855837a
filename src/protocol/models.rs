use serde::{Deserialize, Serialize};

use crate::{
    common::{ChannelId, now_ms},
    player::{SessionStatus, Track},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayRequest {
    pub channel_id: ChannelId,
    pub uri: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

impl PlayRequest {
    pub fn into_track(self) -> Track {
        let title = self.title.unwrap_or_default();
        Track::new(self.uri, title, self.duration_ms)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub channel_id: ChannelId,
}

#[derive(Debug, Deserialize)]
pub struct VolumeRequest {
    pub volume: u16,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsQuery {
    /// Only forward events of this guild.
    pub guild_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    pub tracks: Vec<Track>,
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionStatus>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub timestamp: u64,
    pub status: u16,
    pub error: String,
    pub message: String,
    pub path: String,
}

impl ErrorResponse {
    pub fn new(status: u16, error: impl Into<String>, message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            timestamp: now_ms(),
            status,
            error: error.into(),
            message: message.into(),
            path: path.into(),
        }
    }
}

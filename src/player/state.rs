use serde::Serialize;
use tokio::time::Instant;

use crate::{
    common::{ChannelId, GuildId, SessionId},
    player::track::Track,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackState {
    Idle,
    Loading,
    Playing,
    Paused,
    /// Terminal; the session task has exited or is exiting.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum VoiceConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

impl std::fmt::Display for VoiceConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Snapshot published by a session after every change. Readers never talk
/// to the session task.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub session_id: SessionId,
    pub guild_id: GuildId,
    pub state: PlaybackState,
    pub voice: VoiceConnectionState,
    pub channel_id: Option<ChannelId>,
    pub current: Option<Track>,
    pub queue_len: usize,
    pub volume: u16,
    pub consecutive_failures: u32,
    /// Set when playback halted or the voice connection was lost for good.
    pub error: Option<String>,
    #[serde(skip)]
    pub idle_since: Option<Instant>,
    /// Earliest moment the reaper may tear this session down.
    #[serde(skip)]
    pub reap_after: Option<Instant>,
}

impl SessionStatus {
    pub fn new(session_id: SessionId, guild_id: GuildId, volume: u16) -> Self {
        Self {
            session_id,
            guild_id,
            state: PlaybackState::Idle,
            voice: VoiceConnectionState::Disconnected,
            channel_id: None,
            current: None,
            queue_len: 0,
            volume,
            consecutive_failures: 0,
            error: None,
            idle_since: None,
            reap_after: None,
        }
    }

    /// Idle past the grace period with nothing left to play, or with a voice
    /// connection that is gone for good.
    pub fn is_reapable(&self, now: Instant) -> bool {
        self.state == PlaybackState::Idle
            && (self.queue_len == 0 || self.voice == VoiceConnectionState::Failed)
            && self.reap_after.is_some_and(|at| now >= at)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NowPlaying {
    pub track: Track,
    pub position_ms: u64,
    pub paused: bool,
    pub loading: bool,
    pub volume: u16,
    pub voice: VoiceConnectionState,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn reapable_only_when_idle_and_due() {
        let now = Instant::now();
        let mut status = SessionStatus::new(SessionId(1), GuildId::from("g"), 50);
        assert!(!status.is_reapable(now));

        status.reap_after = Some(now + Duration::from_secs(5));
        assert!(!status.is_reapable(now));
        assert!(status.is_reapable(now + Duration::from_secs(5)));

        status.state = PlaybackState::Playing;
        assert!(!status.is_reapable(now + Duration::from_secs(60)));
    }

    #[test]
    fn halted_session_with_queue_stays_unless_voice_failed() {
        let now = Instant::now();
        let mut status = SessionStatus::new(SessionId(1), GuildId::from("g"), 50);
        status.reap_after = Some(now);
        status.queue_len = 2;
        status.voice = VoiceConnectionState::Connected;
        assert!(!status.is_reapable(now));

        status.voice = VoiceConnectionState::Failed;
        assert!(status.is_reapable(now));
    }
}

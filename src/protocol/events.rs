use serde::Serialize;

use crate::{
    common::{ChannelId, GuildId, Severity},
    player::{CloseReason, Track, VoiceConnectionState},
};

/// Events emitted by guild sessions, fanned out to every subscriber.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum EngineEvent {
    #[serde(rename = "TrackStartEvent")]
    TrackStart { guild_id: GuildId, track: Track },

    #[serde(rename = "TrackEndEvent")]
    TrackEnd {
        guild_id: GuildId,
        track: Track,
        reason: TrackEndReason,
        frames_sent: u64,
    },

    #[serde(rename = "TrackExceptionEvent")]
    TrackException {
        guild_id: GuildId,
        track: Track,
        message: String,
        severity: Severity,
    },

    #[serde(rename = "PlaybackHaltedEvent")]
    PlaybackHalted {
        guild_id: GuildId,
        reason: String,
        consecutive_failures: u32,
    },

    #[serde(rename = "VoiceStateChangedEvent")]
    VoiceStateChanged {
        guild_id: GuildId,
        state: VoiceConnectionState,
        channel_id: Option<ChannelId>,
    },

    #[serde(rename = "SessionClosedEvent")]
    SessionClosed {
        guild_id: GuildId,
        reason: CloseReason,
    },
}

impl EngineEvent {
    pub fn guild_id(&self) -> &GuildId {
        match self {
            Self::TrackStart { guild_id, .. }
            | Self::TrackEnd { guild_id, .. }
            | Self::TrackException { guild_id, .. }
            | Self::PlaybackHalted { guild_id, .. }
            | Self::VoiceStateChanged { guild_id, .. }
            | Self::SessionClosed { guild_id, .. } => guild_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackEndReason {
    Finished,
    Skipped,
    Stopped,
    LoadFailed,
    DecodeFailed,
    /// No frame arrived within the frame timeout.
    Stalled,
    /// The voice connection was lost and could not be re-established.
    VoiceLost,
}

use serde::{Deserialize, Serialize};

use crate::common::types::ChannelId;

/// Exception severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    /// The source itself is at fault (missing, private, unsupported).
    Common,
    /// The failure happened after audio started flowing.
    Fault,
}

/// Why a source could not be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FetchReason {
    NotFound,
    NetworkTimeout,
    Unsupported,
}

impl std::fmt::Display for FetchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotFound => "not found",
            Self::NetworkTimeout => "network timeout",
            Self::Unsupported => "unsupported",
        };
        f.write_str(s)
    }
}

/// A track's source failed before its first frame was produced.
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to open {uri}: {reason} ({detail})")]
pub struct FetchError {
    pub reason: FetchReason,
    pub uri: String,
    pub detail: String,
}

impl FetchError {
    pub fn new(reason: FetchReason, uri: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            reason,
            uri: uri.into(),
            detail: detail.into(),
        }
    }
}

/// The stream broke after frames were produced. Fatal for the track only.
#[derive(Debug, Clone, thiserror::Error)]
#[error("decode failed: {0}")]
pub struct DecodeError(pub String);

impl DecodeError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self(detail.into())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("voice connect failed: {0}")]
    Connect(String),
    #[error("voice send failed: {0}")]
    Send(String),
    #[error("voice send timed out")]
    SendTimeout,
    #[error("voice connection closed")]
    Closed,
}

/// The reason a dispatcher command was refused. `Display` is the text shown
/// to the user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandRejection {
    #[error("no active session for this guild")]
    SessionNotFound,
    #[error("the session was closed")]
    SessionClosed,
    #[error("nothing is playing")]
    NothingPlaying,
    #[error("playback halted: {0}")]
    PlaybackHalted(String),
    #[error("the track is still loading")]
    StillLoading,
    #[error("playback is already paused")]
    AlreadyPaused,
    #[error("playback is not paused")]
    NotPaused,
    #[error("busy in channel {0}; join it or wait until playback ends")]
    Busy(ChannelId),
    #[error("volume must be between 0 and {max}, got {requested}")]
    VolumeOutOfRange { requested: u16, max: u16 },
    #[error("track has no source uri")]
    EmptySource,
    #[error("could not connect to the voice channel: {0}")]
    Connect(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("environment variable {key} has invalid value {value:?}")]
    Env { key: &'static str, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

use serde::Serialize;
use tokio::sync::oneshot;

use crate::{
    common::{ChannelId, CommandRejection, TransportError},
    gateway::{BoxedConnection, ConnectionId},
    player::{
        state::{NowPlaying, VoiceConnectionState},
        track::Track,
    },
};

pub type Reply<T> = oneshot::Sender<Result<T, CommandRejection>>;

/// Everything a session task consumes, in arrival order.
pub enum SessionMsg {
    Command(SessionCommand),
    Voice(VoiceSignal),
}

pub enum SessionCommand {
    Play {
        channel_id: ChannelId,
        track: Track,
        reply: Reply<PlayAccepted>,
    },
    Join {
        channel_id: ChannelId,
        reply: Reply<JoinOutcome>,
    },
    /// Replies with the track that was skipped.
    Skip { reply: Reply<Track> },
    Pause { reply: Reply<()> },
    Resume { reply: Reply<()> },
    Stop { reply: Reply<()> },
    Queue { reply: Reply<Vec<Track>> },
    NowPlaying { reply: Reply<NowPlaying> },
    SetVolume { percent: u16, reply: Reply<u16> },
    /// The session closes itself if it is still idle and due; replies whether
    /// it did.
    ReapIfIdle { reply: oneshot::Sender<bool> },
    Shutdown {
        reason: CloseReason,
        reply: oneshot::Sender<()>,
    },
}

pub enum VoiceSignal {
    State {
        connection: ConnectionId,
        state: VoiceConnectionState,
    },
    Reconnected {
        ticket: ConnectionId,
        connection: BoxedConnection,
    },
    ReconnectFailed {
        ticket: ConnectionId,
        error: TransportError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayAccepted {
    /// The track went straight to loading.
    Started,
    /// 1-based position in the queue.
    Queued { position: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    AlreadyConnected,
    Moved { from: ChannelId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CloseReason {
    Left,
    Idle,
    Shutdown,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Left => "left",
            Self::Idle => "idle",
            Self::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

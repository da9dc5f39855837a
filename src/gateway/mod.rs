//! Voice transport seam: how a guild session reaches a voice channel.

pub mod backoff;
pub mod constants;
pub mod udp_link;

use async_trait::async_trait;

use crate::{
    audio::Frame,
    common::{ChannelId, GuildId, TransportError},
    player::{SessionMsg, VoiceConnectionState, VoiceSignal},
};

pub use backoff::Backoff;
pub use udp_link::{RtpPacketizer, UdpConnection, UdpTransport};

/// Identity of one connection attempt made by a session. State reports that
/// carry an outdated id are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Delivers connection state changes into the owning session's inbox.
///
/// Holds a weak sender, so a transport keeping its sink alive never keeps a
/// closed session around.
#[derive(Clone)]
pub struct StateSink {
    connection: ConnectionId,
    tx: flume::WeakSender<SessionMsg>,
}

impl StateSink {
    pub fn new(connection: ConnectionId, tx: flume::WeakSender<SessionMsg>) -> Self {
        Self { connection, tx }
    }

    /// Returns `false` once the session is gone.
    pub fn notify(&self, state: VoiceConnectionState) -> bool {
        match self.tx.upgrade() {
            Some(tx) => tx
                .send(SessionMsg::Voice(VoiceSignal::State {
                    connection: self.connection,
                    state,
                }))
                .is_ok(),
            None => false,
        }
    }
}

#[async_trait]
pub trait VoiceConnection: Send {
    /// Hands one frame to the transport. Errors are treated as transient loss.
    async fn send_frame(&mut self, frame: &Frame) -> Result<(), TransportError>;

    async fn disconnect(&mut self);
}

pub type BoxedConnection = Box<dyn VoiceConnection>;

#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn connect(
        &self,
        guild_id: &GuildId,
        channel_id: ChannelId,
        sink: StateSink,
    ) -> Result<BoxedConnection, TransportError>;
}

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::oneshot;

use crate::{
    common::{ChannelId, CommandRejection, GuildId, SessionId},
    player::{
        context::{SessionActor, SessionDeps},
        messages::{CloseReason, JoinOutcome, PlayAccepted, Reply, SessionCommand, SessionMsg},
        state::{NowPlaying, PlaybackState, SessionStatus},
        track::Track,
    },
};

/// Cloneable handle to a running guild session.
#[derive(Clone)]
pub struct GuildSession {
    id: SessionId,
    guild_id: GuildId,
    tx: flume::Sender<SessionMsg>,
    status: Arc<RwLock<SessionStatus>>,
}

impl GuildSession {
    /// Starts the session task. Must be called from within a tokio runtime.
    pub fn spawn(id: SessionId, guild_id: GuildId, deps: SessionDeps) -> Self {
        let (tx, rx) = flume::unbounded();
        let status = Arc::new(RwLock::new(SessionStatus::new(
            id,
            guild_id.clone(),
            deps.config.default_volume,
        )));

        let actor = SessionActor::new(
            id,
            guild_id.clone(),
            deps,
            rx,
            tx.downgrade(),
            status.clone(),
        );
        tokio::spawn(actor.run());

        Self {
            id,
            guild_id,
            tx,
            status,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn guild_id(&self) -> &GuildId {
        &self.guild_id
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_disconnected() || self.status.read().state == PlaybackState::Closed
    }

    /// Last published snapshot; does not wait for the session task.
    pub fn status(&self) -> SessionStatus {
        self.status.read().clone()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> Result<T, CommandRejection> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send_async(SessionMsg::Command(build(reply)))
            .await
            .map_err(|_| CommandRejection::SessionClosed)?;
        rx.await.map_err(|_| CommandRejection::SessionClosed)?
    }

    pub async fn play(
        &self,
        channel_id: ChannelId,
        track: Track,
    ) -> Result<PlayAccepted, CommandRejection> {
        self.request(|reply| SessionCommand::Play {
            channel_id,
            track,
            reply,
        })
        .await
    }

    pub async fn join(&self, channel_id: ChannelId) -> Result<JoinOutcome, CommandRejection> {
        self.request(|reply| SessionCommand::Join { channel_id, reply })
            .await
    }

    pub async fn skip(&self) -> Result<Track, CommandRejection> {
        self.request(|reply| SessionCommand::Skip { reply }).await
    }

    pub async fn pause(&self) -> Result<(), CommandRejection> {
        self.request(|reply| SessionCommand::Pause { reply }).await
    }

    pub async fn resume(&self) -> Result<(), CommandRejection> {
        self.request(|reply| SessionCommand::Resume { reply }).await
    }

    pub async fn stop(&self) -> Result<(), CommandRejection> {
        self.request(|reply| SessionCommand::Stop { reply }).await
    }

    pub async fn queue(&self) -> Result<Vec<Track>, CommandRejection> {
        self.request(|reply| SessionCommand::Queue { reply }).await
    }

    pub async fn now_playing(&self) -> Result<NowPlaying, CommandRejection> {
        self.request(|reply| SessionCommand::NowPlaying { reply })
            .await
    }

    pub async fn set_volume(&self, percent: u16) -> Result<u16, CommandRejection> {
        self.request(|reply| SessionCommand::SetVolume { percent, reply })
            .await
    }

    /// Asks the session to close itself if it is idle and due. Returns
    /// `true` when the session is gone afterwards.
    pub async fn reap_if_idle(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send_async(SessionMsg::Command(SessionCommand::ReapIfIdle { reply }))
            .await
            .is_err()
        {
            return true;
        }
        match rx.await {
            Ok(reaped) => reaped,
            Err(_) => self.is_closed(),
        }
    }

    /// Closes the session and waits until its resources are released.
    pub async fn shutdown(&self, reason: CloseReason) {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send_async(SessionMsg::Command(SessionCommand::Shutdown { reason, reply }))
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }
}

impl std::fmt::Debug for GuildSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuildSession")
            .field("id", &self.id)
            .field("guild_id", &self.guild_id)
            .finish()
    }
}

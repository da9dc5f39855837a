use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    common::{ChannelId, CommandRejection, GuildId, TransportError},
    gateway::{Backoff, BoxedConnection, ConnectionId, StateSink, VoiceTransport},
    player::{
        context::SessionActor,
        messages::{JoinOutcome, SessionMsg, VoiceSignal},
        state::VoiceConnectionState,
    },
    protocol::{EngineEvent, TrackEndReason},
};

/// The session's side of its voice connection.
pub(super) struct VoiceLink {
    pub(super) state: VoiceConnectionState,
    pub(super) channel_id: Option<ChannelId>,
    pub(super) connection: Option<BoxedConnection>,
    connection_id: Option<ConnectionId>,
    reconnect: Option<ReconnectTask>,
    next_id: u64,
}

struct ReconnectTask {
    ticket: ConnectionId,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl VoiceLink {
    pub(super) fn new() -> Self {
        Self {
            state: VoiceConnectionState::Disconnected,
            channel_id: None,
            connection: None,
            connection_id: None,
            reconnect: None,
            next_id: 0,
        }
    }

    pub(super) fn is_ready(&self) -> bool {
        self.state == VoiceConnectionState::Connected && self.connection.is_some()
    }

    /// Channel we are connected to or trying to get back into.
    fn linked_channel(&self) -> Option<ChannelId> {
        self.channel_id
            .filter(|_| self.connection.is_some() || self.reconnect.is_some())
    }

    fn allocate_id(&mut self) -> ConnectionId {
        self.next_id += 1;
        ConnectionId(self.next_id)
    }

    fn cancel_reconnect(&mut self) -> bool {
        match self.reconnect.take() {
            Some(reconnect) => {
                reconnect.cancel.cancel();
                reconnect.task.abort();
                true
            }
            None => false,
        }
    }

    async fn drop_connection(&mut self) {
        self.connection_id = None;
        if let Some(mut connection) = self.connection.take() {
            connection.disconnect().await;
        }
    }
}

impl SessionActor {
    /// Makes sure the session is connected to `channel_id`, moving there if
    /// nothing is playing elsewhere.
    pub(super) async fn ensure_channel(
        &mut self,
        channel_id: ChannelId,
    ) -> Result<JoinOutcome, CommandRejection> {
        let current = self.voice.linked_channel();
        if current == Some(channel_id) {
            return Ok(JoinOutcome::AlreadyConnected);
        }
        if let Some(current) = current {
            if self.has_track() {
                return Err(CommandRejection::Busy(current));
            }
        }

        self.voice.cancel_reconnect();
        self.voice.drop_connection().await;
        self.connect(channel_id).await?;

        Ok(match current {
            Some(from) => JoinOutcome::Moved { from },
            None => JoinOutcome::Joined,
        })
    }

    async fn connect(&mut self, channel_id: ChannelId) -> Result<(), CommandRejection> {
        let id = self.voice.allocate_id();
        let sink = StateSink::new(id, self.self_tx.clone());
        let connect_timeout = self.deps.config.connect_timeout();

        self.voice.channel_id = Some(channel_id);
        self.set_voice_state(VoiceConnectionState::Connecting);

        let connected = match tokio::time::timeout(
            connect_timeout,
            self.deps
                .transport
                .connect(&self.guild_id, channel_id, sink),
        )
        .await
        {
            Ok(connected) => connected,
            Err(_) => Err(TransportError::Connect(format!(
                "timed out after {} ms",
                connect_timeout.as_millis()
            ))),
        };

        match connected {
            Ok(connection) => {
                info!("[{}] connected to channel {}", self.guild_id, channel_id);
                self.voice.connection = Some(connection);
                self.voice.connection_id = Some(id);
                self.set_voice_state(VoiceConnectionState::Connected);
                Ok(())
            }
            Err(e) => {
                warn!(
                    "[{}] connecting to channel {} failed: {}",
                    self.guild_id, channel_id, e
                );
                self.voice.channel_id = None;
                self.set_voice_state(VoiceConnectionState::Disconnected);
                Err(CommandRejection::Connect(match e {
                    TransportError::Connect(detail) => detail,
                    other => other.to_string(),
                }))
            }
        }
    }

    pub(super) fn set_voice_state(&mut self, state: VoiceConnectionState) {
        if self.voice.state == state {
            return;
        }
        debug!(
            "[{}] voice {} -> {}",
            self.guild_id, self.voice.state, state
        );
        self.voice.state = state;
        self.emit(EngineEvent::VoiceStateChanged {
            guild_id: self.guild_id.clone(),
            state,
            channel_id: self.voice.channel_id,
        });
    }

    pub(super) async fn on_voice_signal(&mut self, signal: VoiceSignal) {
        match signal {
            VoiceSignal::State { connection, state } => {
                if self.voice.connection_id != Some(connection) {
                    debug!(
                        "[{}] ignoring {} from stale {}",
                        self.guild_id, state, connection
                    );
                    return;
                }
                match state {
                    VoiceConnectionState::Disconnected => {
                        self.voice.drop_connection().await;
                        self.begin_reconnect();
                    }
                    VoiceConnectionState::Failed => {
                        self.voice.drop_connection().await;
                        self.voice_failed("the transport reported a failure".into())
                            .await;
                    }
                    other => self.set_voice_state(other),
                }
            }
            VoiceSignal::Reconnected {
                ticket,
                mut connection,
            } => {
                if self.voice.reconnect.as_ref().map(|r| r.ticket) != Some(ticket) {
                    debug!("[{}] dropping late reconnect {}", self.guild_id, ticket);
                    connection.disconnect().await;
                    return;
                }
                self.voice.reconnect = None;
                self.voice.connection = Some(connection);
                self.voice.connection_id = Some(ticket);
                self.set_voice_state(VoiceConnectionState::Connected);
                info!("[{}] voice reconnected", self.guild_id);
            }
            VoiceSignal::ReconnectFailed { ticket, error } => {
                if self.voice.reconnect.as_ref().map(|r| r.ticket) != Some(ticket) {
                    return;
                }
                self.voice.reconnect = None;
                self.voice_failed(error.to_string()).await;
            }
        }
    }

    /// A frame could not be sent; delivery pauses until reconnected.
    pub(super) async fn voice_lost(&mut self, error: TransportError) {
        warn!("[{}] {}; reconnecting", self.guild_id, error);
        self.voice.drop_connection().await;
        self.begin_reconnect();
    }

    fn begin_reconnect(&mut self) {
        if self.voice.reconnect.is_some() {
            return;
        }
        let Some(channel_id) = self.voice.channel_id else {
            self.set_voice_state(VoiceConnectionState::Disconnected);
            return;
        };

        let ticket = self.voice.allocate_id();
        let cancel = CancellationToken::new();
        let config = &self.deps.config;
        let job = ReconnectJob {
            guild_id: self.guild_id.clone(),
            channel_id,
            ticket,
            transport: self.deps.transport.clone(),
            inbox: self.self_tx.clone(),
            backoff: Backoff::new(config.reconnect_backoff_base_ms, config.max_reconnect_attempts),
            connect_timeout: config.connect_timeout(),
            cancel: cancel.clone(),
        };

        self.voice.reconnect = Some(ReconnectTask {
            ticket,
            cancel,
            task: tokio::spawn(job.run()),
        });
        self.set_voice_state(VoiceConnectionState::Reconnecting);
    }

    /// Reconnection gave up: the current track ends, the queue is kept.
    async fn voice_failed(&mut self, reason: String) {
        self.voice.cancel_reconnect();
        self.voice.drop_connection().await;
        self.set_voice_state(VoiceConnectionState::Failed);
        error!("[{}] voice connection lost: {}", self.guild_id, reason);

        self.release_current(TrackEndReason::VoiceLost).await;
        self.error = Some(format!("voice connection lost: {reason}"));
        self.mark_idle();
    }

    pub(super) fn cancel_reconnect(&mut self) {
        if self.voice.cancel_reconnect() {
            self.set_voice_state(VoiceConnectionState::Disconnected);
        }
    }

    pub(super) async fn close_voice(&mut self) {
        self.voice.cancel_reconnect();
        self.voice.drop_connection().await;
        self.set_voice_state(VoiceConnectionState::Disconnected);
    }
}

struct ReconnectJob {
    guild_id: GuildId,
    channel_id: ChannelId,
    ticket: ConnectionId,
    transport: Arc<dyn VoiceTransport>,
    inbox: flume::WeakSender<SessionMsg>,
    backoff: Backoff,
    connect_timeout: Duration,
    cancel: CancellationToken,
}

impl ReconnectJob {
    async fn run(mut self) {
        let mut last_error = TransportError::Closed;

        while !self.backoff.is_exhausted() {
            let delay = self.backoff.next();
            debug!(
                "[{}] reconnect attempt {} in {:?}",
                self.guild_id,
                self.backoff.attempt(),
                delay
            );
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            let sink = StateSink::new(self.ticket, self.inbox.clone());
            let attempt = tokio::select! {
                _ = self.cancel.cancelled() => return,
                attempt = tokio::time::timeout(
                    self.connect_timeout,
                    self.transport.connect(&self.guild_id, self.channel_id, sink),
                ) => attempt,
            };

            match attempt {
                Ok(Ok(connection)) => {
                    self.report(VoiceSignal::Reconnected {
                        ticket: self.ticket,
                        connection,
                    })
                    .await;
                    return;
                }
                Ok(Err(e)) => {
                    warn!(
                        "[{}] reconnect attempt {} failed: {}",
                        self.guild_id,
                        self.backoff.attempt(),
                        e
                    );
                    last_error = e;
                }
                Err(_) => {
                    warn!(
                        "[{}] reconnect attempt {} timed out",
                        self.guild_id,
                        self.backoff.attempt()
                    );
                    last_error = TransportError::Connect("timed out".into());
                }
            }
        }

        let error = TransportError::Connect(format!(
            "gave up after {} attempts ({})",
            self.backoff.attempt(),
            last_error
        ));
        self.report(VoiceSignal::ReconnectFailed {
            ticket: self.ticket,
            error,
        })
        .await;
    }

    async fn report(&self, signal: VoiceSignal) {
        let undelivered = match self.inbox.upgrade() {
            Some(tx) => match tx.send(SessionMsg::Voice(signal)) {
                Ok(()) => return,
                Err(flume::SendError(SessionMsg::Voice(signal))) => signal,
                Err(_) => return,
            },
            None => signal,
        };
        if let VoiceSignal::Reconnected { mut connection, .. } = undelivered {
            connection.disconnect().await;
        }
    }
}

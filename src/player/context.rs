use std::{ops::ControlFlow, sync::Arc};

use parking_lot::RwLock;
use tokio::{
    sync::broadcast,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info};

use crate::{
    audio::{FrameFormat, SourceProvider, constants::MAX_VOLUME_PERCENT},
    common::{ChannelId, CommandRejection, GuildId, SessionId},
    configs::PlayerConfig,
    gateway::VoiceTransport,
    player::{
        messages::{CloseReason, PlayAccepted, Reply, SessionCommand, SessionMsg, VoiceSignal},
        playback::{Loading, PlaybackCursor},
        queue::TrackQueue,
        state::{NowPlaying, PlaybackState, SessionStatus, VoiceConnectionState},
        track::Track,
        voice::VoiceLink,
    },
    protocol::{EngineEvent, TrackEndReason},
};

/// Collaborators shared by every session.
#[derive(Clone)]
pub struct SessionDeps {
    pub config: Arc<PlayerConfig>,
    pub source: Arc<dyn SourceProvider>,
    pub transport: Arc<dyn VoiceTransport>,
    pub events: broadcast::Sender<EngineEvent>,
}

/// State owned by one session task. Only the task itself touches it.
pub(super) struct SessionActor {
    pub(super) id: SessionId,
    pub(super) guild_id: GuildId,
    pub(super) deps: SessionDeps,
    pub(super) format: FrameFormat,
    pub(super) rx: flume::Receiver<SessionMsg>,
    pub(super) self_tx: flume::WeakSender<SessionMsg>,
    status: Arc<RwLock<SessionStatus>>,
    pub(super) state: PlaybackState,
    pub(super) queue: TrackQueue,
    pub(super) cursor: Option<PlaybackCursor>,
    pub(super) loading: Option<Loading>,
    pub(super) voice: VoiceLink,
    pub(super) volume: u16,
    pub(super) consecutive_failures: u32,
    /// Set when playback halted; cleared by the next play or stop.
    pub(super) error: Option<String>,
    idle_since: Option<Instant>,
    reap_after: Option<Instant>,
}

impl SessionActor {
    pub(super) fn new(
        id: SessionId,
        guild_id: GuildId,
        deps: SessionDeps,
        rx: flume::Receiver<SessionMsg>,
        self_tx: flume::WeakSender<SessionMsg>,
        status: Arc<RwLock<SessionStatus>>,
    ) -> Self {
        let format = FrameFormat::new(deps.config.frame_duration_ms);
        let volume = deps.config.default_volume;
        let now = Instant::now();
        let reap_after = Some(now + deps.config.idle_timeout());

        Self {
            id,
            guild_id,
            deps,
            format,
            rx,
            self_tx,
            status,
            state: PlaybackState::Idle,
            queue: TrackQueue::new(),
            cursor: None,
            loading: None,
            voice: VoiceLink::new(),
            volume,
            consecutive_failures: 0,
            error: None,
            idle_since: Some(now),
            reap_after,
        }
    }

    pub(super) async fn run(mut self) {
        info!("[{}] session {} started", self.guild_id, self.id);
        self.publish();

        let mut ticker = tokio::time::interval(self.format.duration());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let loading = self.loading.is_some();
            let streaming = self.is_streaming();

            let flow = tokio::select! {
                biased;
                msg = self.rx.recv_async() => match msg {
                    Ok(msg) => self.handle(msg).await,
                    Err(_) => {
                        debug!("[{}] every session handle was dropped", self.guild_id);
                        self.teardown(CloseReason::Shutdown).await;
                        ControlFlow::Break(())
                    }
                },
                opened = Loading::wait(&mut self.loading), if loading => {
                    self.on_loaded(opened);
                    ControlFlow::Continue(())
                }
                _ = ticker.tick(), if streaming => self.on_tick().await,
            };

            if flow.is_break() {
                break;
            }
            self.publish();
        }
    }

    pub(super) async fn handle(&mut self, msg: SessionMsg) -> ControlFlow<()> {
        match msg {
            SessionMsg::Command(command) => self.on_command(command).await,
            SessionMsg::Voice(signal) => {
                self.on_voice_signal(signal).await;
                ControlFlow::Continue(())
            }
        }
    }

    async fn on_command(&mut self, command: SessionCommand) -> ControlFlow<()> {
        match command {
            SessionCommand::Play {
                channel_id,
                track,
                reply,
            } => {
                let result = self.play(channel_id, track).await;
                self.answer(reply, result);
            }
            SessionCommand::Join { channel_id, reply } => {
                let result = self.ensure_channel(channel_id).await;
                self.answer(reply, result);
            }
            SessionCommand::Skip { reply } => {
                let result = self.skip().await;
                self.answer(reply, result);
            }
            SessionCommand::Pause { reply } => {
                let result = self.pause();
                self.answer(reply, result);
            }
            SessionCommand::Resume { reply } => {
                let result = self.resume();
                self.answer(reply, result);
            }
            SessionCommand::Stop { reply } => {
                self.stop().await;
                self.answer(reply, Ok(()));
            }
            SessionCommand::Queue { reply } => {
                let _ = reply.send(Ok(self.queue.snapshot()));
            }
            SessionCommand::NowPlaying { reply } => {
                let _ = reply.send(self.now_playing());
            }
            SessionCommand::SetVolume { percent, reply } => {
                let result = self.set_volume(percent);
                self.answer(reply, result);
            }
            SessionCommand::ReapIfIdle { reply } => {
                if self.is_reapable(Instant::now()) {
                    self.teardown(CloseReason::Idle).await;
                    let _ = reply.send(true);
                    return ControlFlow::Break(());
                }
                let _ = reply.send(false);
            }
            SessionCommand::Shutdown { reason, reply } => {
                self.teardown(reason).await;
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Publishes first, so a caller reading the status after the reply sees
    /// the effect of its command.
    fn answer<T>(&self, reply: Reply<T>, result: Result<T, CommandRejection>) {
        self.publish();
        let _ = reply.send(result);
    }

    async fn play(
        &mut self,
        channel_id: ChannelId,
        track: Track,
    ) -> Result<PlayAccepted, CommandRejection> {
        if track.uri().trim().is_empty() {
            return Err(CommandRejection::EmptySource);
        }
        self.ensure_channel(channel_id).await?;

        if let Some(reason) = self.error.take() {
            debug!("[{}] clearing halted state ({})", self.guild_id, reason);
        }

        info!("[{}] enqueued {}", self.guild_id, track);
        let position = self.queue.push(track);
        if self.has_track() {
            return Ok(PlayAccepted::Queued { position });
        }

        self.start_next();
        Ok(match position {
            1 => PlayAccepted::Started,
            n => PlayAccepted::Queued { position: n - 1 },
        })
    }

    async fn skip(&mut self) -> Result<Track, CommandRejection> {
        if !self.has_track() {
            return Err(self.nothing_playing());
        }
        let skipped = self
            .release_current(TrackEndReason::Skipped)
            .await
            .ok_or(CommandRejection::NothingPlaying)?;
        info!("[{}] skipped {}", self.guild_id, skipped);
        self.start_next();
        Ok(skipped)
    }

    fn pause(&mut self) -> Result<(), CommandRejection> {
        if self.cursor.is_none() {
            return Err(self.no_cursor());
        }
        if let Some(cursor) = self.cursor.as_mut() {
            if cursor.paused {
                return Err(CommandRejection::AlreadyPaused);
            }
            cursor.paused = true;
        }
        self.state = PlaybackState::Paused;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), CommandRejection> {
        if self.cursor.is_none() {
            return Err(self.no_cursor());
        }
        if let Some(cursor) = self.cursor.as_mut() {
            if !cursor.paused {
                return Err(CommandRejection::NotPaused);
            }
            cursor.paused = false;
        }
        self.state = PlaybackState::Playing;
        Ok(())
    }

    async fn stop(&mut self) {
        let dropped = self.queue.clear();
        self.release_current(TrackEndReason::Stopped).await;
        self.cancel_reconnect();

        self.error = None;
        self.consecutive_failures = 0;
        self.mark_idle();
        // a stopped session goes on the next sweep
        self.reap_after = self.idle_since;
        info!(
            "[{}] stopped, {} queued tracks dropped",
            self.guild_id, dropped
        );
    }

    fn now_playing(&self) -> Result<NowPlaying, CommandRejection> {
        if let Some(cursor) = &self.cursor {
            return Ok(NowPlaying {
                track: cursor.track.clone(),
                position_ms: cursor.frames_sent * self.format.duration_ms() as u64,
                paused: cursor.paused,
                loading: false,
                volume: self.volume,
                voice: self.voice.state,
            });
        }
        if let Some(loading) = &self.loading {
            return Ok(NowPlaying {
                track: loading.track.clone(),
                position_ms: 0,
                paused: false,
                loading: true,
                volume: self.volume,
                voice: self.voice.state,
            });
        }
        Err(self.nothing_playing())
    }

    fn set_volume(&mut self, percent: u16) -> Result<u16, CommandRejection> {
        if percent > MAX_VOLUME_PERCENT {
            return Err(CommandRejection::VolumeOutOfRange {
                requested: percent,
                max: MAX_VOLUME_PERCENT,
            });
        }
        if !self.has_track() {
            return Err(self.nothing_playing());
        }
        debug!("[{}] volume {} -> {}", self.guild_id, self.volume, percent);
        self.volume = percent;
        Ok(percent)
    }

    pub(super) fn has_track(&self) -> bool {
        self.cursor.is_some() || self.loading.is_some()
    }

    fn is_streaming(&self) -> bool {
        self.cursor.as_ref().is_some_and(|c| !c.paused) && self.voice.is_ready()
    }

    fn is_reapable(&self, now: Instant) -> bool {
        self.state == PlaybackState::Idle
            && !self.has_track()
            && (self.queue.is_empty() || self.voice.state == VoiceConnectionState::Failed)
            && self.reap_after.is_some_and(|at| now >= at)
    }

    fn nothing_playing(&self) -> CommandRejection {
        match &self.error {
            Some(reason) => CommandRejection::PlaybackHalted(reason.clone()),
            None => CommandRejection::NothingPlaying,
        }
    }

    fn no_cursor(&self) -> CommandRejection {
        if self.loading.is_some() {
            CommandRejection::StillLoading
        } else {
            self.nothing_playing()
        }
    }

    /// Enters `Idle` and starts the idle grace period.
    pub(super) fn mark_idle(&mut self) {
        let now = Instant::now();
        self.state = PlaybackState::Idle;
        self.idle_since = Some(now);
        self.reap_after = Some(now + self.deps.config.idle_timeout());
    }

    pub(super) fn mark_busy(&mut self, state: PlaybackState) {
        self.state = state;
        self.idle_since = None;
        self.reap_after = None;
    }

    pub(super) fn emit(&self, event: EngineEvent) {
        // no subscribers is fine
        let _ = self.deps.events.send(event);
    }

    pub(super) fn current_track(&self) -> Option<&Track> {
        self.cursor
            .as_ref()
            .map(|c| &c.track)
            .or_else(|| self.loading.as_ref().map(|l| &l.track))
    }

    fn publish(&self) {
        let mut status = self.status.write();
        status.state = self.state;
        status.voice = self.voice.state;
        status.channel_id = self.voice.channel_id;
        status.current = self.current_track().cloned();
        status.queue_len = self.queue.len();
        status.volume = self.volume;
        status.consecutive_failures = self.consecutive_failures;
        status.error = self.error.clone();
        status.idle_since = self.idle_since;
        status.reap_after = self.reap_after;
    }

    pub(super) async fn teardown(&mut self, reason: CloseReason) {
        self.release_current(TrackEndReason::Stopped).await;
        self.queue.clear();
        self.close_voice().await;

        self.state = PlaybackState::Closed;
        self.publish();
        self.emit(EngineEvent::SessionClosed {
            guild_id: self.guild_id.clone(),
            reason,
        });
        info!("[{}] session {} closed ({})", self.guild_id, self.id, reason);

        // Requests still queued are dropped unanswered; callers see SessionClosed.
        while let Ok(msg) = self.rx.try_recv() {
            if let SessionMsg::Voice(VoiceSignal::Reconnected { mut connection, .. }) = msg {
                connection.disconnect().await;
            }
        }
    }
}

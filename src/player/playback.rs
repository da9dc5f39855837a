use std::ops::ControlFlow;

use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    audio::{BoxedFrameStream, Frame},
    common::{FetchError, FetchReason, Severity, TransportError},
    player::{
        context::SessionActor,
        messages::CloseReason,
        state::PlaybackState,
        track::Track,
    },
    protocol::{EngineEvent, TrackEndReason},
};

/// The current track and the stream bound to it.
pub(super) struct PlaybackCursor {
    pub(super) track: Track,
    pub(super) stream: BoxedFrameStream,
    pub(super) paused: bool,
    pub(super) frames_sent: u64,
    /// Pulled but not yet accepted by the transport; sent before pulling again.
    pub(super) pending: Option<Frame>,
}

impl PlaybackCursor {
    fn new(track: Track, stream: BoxedFrameStream) -> Self {
        Self {
            track,
            stream,
            paused: false,
            frames_sent: 0,
            pending: None,
        }
    }
}

pub(super) type OpenResult = Result<Result<BoxedFrameStream, FetchError>, JoinError>;

/// A source being opened in the background.
pub(super) struct Loading {
    pub(super) track: Track,
    task: JoinHandle<Result<BoxedFrameStream, FetchError>>,
}

impl Loading {
    /// Resolves when the open finishes; pending forever without a load.
    pub(super) async fn wait(loading: &mut Option<Loading>) -> OpenResult {
        match loading {
            Some(loading) => (&mut loading.task).await,
            None => std::future::pending().await,
        }
    }

    /// Aborts the open and waits for it, closing the stream if it had
    /// already been produced.
    async fn cancel(self) -> Track {
        self.task.abort();
        if let Ok(Ok(mut stream)) = self.task.await {
            stream.close().await;
        }
        self.track
    }
}

impl SessionActor {
    /// Starts opening the queue head, or goes idle when the queue is empty.
    pub(super) fn start_next(&mut self) {
        let Some(track) = self.queue.pop_next() else {
            // a new batch of requests starts with a clean failure count
            self.consecutive_failures = 0;
            self.mark_idle();
            return;
        };

        debug!("[{}] loading {}", self.guild_id, track.uri());
        let source = self.deps.source.clone();
        let format = self.format;
        let open_timeout = self.deps.config.open_timeout();
        let target = track.clone();

        let task = tokio::spawn(async move {
            match tokio::time::timeout(open_timeout, source.open(&target, format)).await {
                Ok(opened) => opened,
                Err(_) => Err(FetchError::new(
                    FetchReason::NetworkTimeout,
                    target.uri(),
                    format!("no audio within {} ms", open_timeout.as_millis()),
                )),
            }
        });

        self.loading = Some(Loading { track, task });
        self.mark_busy(PlaybackState::Loading);
    }

    pub(super) fn on_loaded(&mut self, opened: OpenResult) {
        let Some(loading) = self.loading.take() else {
            return;
        };

        match opened {
            Ok(Ok(stream)) => {
                info!("[{}] now playing {}", self.guild_id, loading.track);
                self.emit(EngineEvent::TrackStart {
                    guild_id: self.guild_id.clone(),
                    track: loading.track.clone(),
                });
                self.cursor = Some(PlaybackCursor::new(loading.track, stream));
                self.mark_busy(PlaybackState::Playing);
            }
            Ok(Err(e)) => self.track_failed(
                loading.track,
                e.to_string(),
                Severity::Common,
                TrackEndReason::LoadFailed,
                0,
            ),
            Err(e) => self.track_failed(
                loading.track,
                format!("source task failed: {e}"),
                Severity::Fault,
                TrackEndReason::LoadFailed,
                0,
            ),
        }
    }

    /// One cadence step: deliver exactly one frame of the current track.
    pub(super) async fn on_tick(&mut self) -> ControlFlow<()> {
        let frame_timeout = self.deps.config.frame_timeout();
        let Some(cursor) = self.cursor.as_mut() else {
            return ControlFlow::Continue(());
        };

        if let Some(frame) = cursor.pending.take() {
            self.deliver(frame).await;
            return ControlFlow::Continue(());
        }

        let pulled = tokio::select! {
            biased;
            msg = self.rx.recv_async() => {
                // The pull is abandoned and this tick's frame slot is lost;
                // `next_frame` is cancel-safe and the next tick pulls again.
                return match msg {
                    Ok(msg) => self.handle(msg).await,
                    Err(_) => {
                        self.teardown(CloseReason::Shutdown).await;
                        ControlFlow::Break(())
                    }
                };
            }
            pulled = tokio::time::timeout(frame_timeout, cursor.stream.next_frame()) => pulled,
        };

        match pulled {
            Ok(Ok(Some(mut frame))) => {
                frame.apply_volume(self.volume);
                self.deliver(frame).await;
            }
            Ok(Ok(None)) => self.finish_track(TrackEndReason::Finished).await,
            Ok(Err(e)) => self.fail_current(e.to_string()).await,
            Err(_) => {
                warn!(
                    "[{}] no frame within {} ms, ending track",
                    self.guild_id,
                    frame_timeout.as_millis()
                );
                self.finish_track(TrackEndReason::Stalled).await;
            }
        }
        ControlFlow::Continue(())
    }

    async fn deliver(&mut self, frame: Frame) {
        let send_timeout = self.deps.config.send_timeout();
        let result = match self.voice.connection.as_mut() {
            Some(connection) => {
                match tokio::time::timeout(send_timeout, connection.send_frame(&frame)).await {
                    Ok(sent) => sent,
                    Err(_) => Err(TransportError::SendTimeout),
                }
            }
            None => Err(TransportError::Closed),
        };

        match result {
            Ok(()) => {
                if let Some(cursor) = self.cursor.as_mut() {
                    cursor.frames_sent += 1;
                }
                self.consecutive_failures = 0;
            }
            Err(e) => {
                if let Some(cursor) = self.cursor.as_mut() {
                    cursor.pending = Some(frame);
                }
                self.voice_lost(e).await;
            }
        }
    }

    async fn finish_track(&mut self, reason: TrackEndReason) {
        if let Some(mut cursor) = self.cursor.take() {
            cursor.stream.close().await;
            debug!(
                "[{}] {} ended ({:?}) after {} frames",
                self.guild_id, cursor.track, reason, cursor.frames_sent
            );
            self.emit(EngineEvent::TrackEnd {
                guild_id: self.guild_id.clone(),
                track: cursor.track,
                reason,
                frames_sent: cursor.frames_sent,
            });
        }
        self.start_next();
    }

    async fn fail_current(&mut self, message: String) {
        let Some(mut cursor) = self.cursor.take() else {
            return;
        };
        cursor.stream.close().await;
        self.track_failed(
            cursor.track,
            message,
            Severity::Fault,
            TrackEndReason::DecodeFailed,
            cursor.frames_sent,
        );
    }

    /// Drops the failed track alone, then advances or halts.
    fn track_failed(
        &mut self,
        track: Track,
        message: String,
        severity: Severity,
        reason: TrackEndReason,
        frames_sent: u64,
    ) {
        warn!("[{}] track {} failed: {}", self.guild_id, track, message);
        self.emit(EngineEvent::TrackException {
            guild_id: self.guild_id.clone(),
            track: track.clone(),
            message: message.clone(),
            severity,
        });
        self.emit(EngineEvent::TrackEnd {
            guild_id: self.guild_id.clone(),
            track,
            reason,
            frames_sent,
        });

        self.consecutive_failures += 1;
        if self.consecutive_failures < self.deps.config.max_consecutive_failures {
            self.start_next();
            return;
        }

        let halted = format!(
            "{} tracks failed in a row, last error: {}",
            self.consecutive_failures, message
        );
        warn!(
            "[{}] playback halted, {} tracks left in queue: {}",
            self.guild_id,
            self.queue.len(),
            halted
        );
        self.emit(EngineEvent::PlaybackHalted {
            guild_id: self.guild_id.clone(),
            reason: halted.clone(),
            consecutive_failures: self.consecutive_failures,
        });
        self.error = Some(halted);
        self.consecutive_failures = 0;
        self.mark_idle();
    }

    /// Ends whatever is loading or playing and releases its stream before
    /// returning.
    pub(super) async fn release_current(&mut self, reason: TrackEndReason) -> Option<Track> {
        let (track, frames_sent) = if let Some(loading) = self.loading.take() {
            (loading.cancel().await, 0)
        } else {
            let mut cursor = self.cursor.take()?;
            cursor.stream.close().await;
            (cursor.track, cursor.frames_sent)
        };

        self.emit(EngineEvent::TrackEnd {
            guild_id: self.guild_id.clone(),
            track: track.clone(),
            reason,
            frames_sent,
        });
        Some(track)
    }
}

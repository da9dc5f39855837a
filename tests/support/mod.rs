#![allow(dead_code)]

//! In-memory frame source and voice transport for driving sessions in tests.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::BytesMut;
use guildbeat::{
    audio::{BoxedFrameStream, Frame, FrameFormat, FrameStream, SourceProvider},
    common::{ChannelId, DecodeError, FetchError, FetchReason, GuildId, TransportError},
    configs::PlayerConfig,
    gateway::{BoxedConnection, StateSink, VoiceConnection, VoiceTransport},
    player::{SessionDeps, SessionStatus, Track},
    protocol::EngineEvent,
    server::{CommandDispatcher, SessionRegistry},
};
use parking_lot::Mutex;
use tokio::sync::broadcast;

pub fn g(id: &str) -> GuildId {
    GuildId::from(id)
}

pub fn test_config() -> PlayerConfig {
    PlayerConfig {
        idle_timeout_secs: 30,
        frame_duration_ms: 20,
        max_consecutive_failures: 3,
        max_reconnect_attempts: 3,
        reconnect_backoff_base_ms: 10,
        open_timeout_ms: 1_000,
        frame_timeout_ms: 200,
        send_timeout_ms: 50,
        connect_timeout_ms: 500,
        // unity gain keeps the tag bytes of every frame intact
        default_volume: 100,
        reap_interval_secs: 1,
    }
}

#[derive(Debug, Clone)]
pub enum Script {
    /// Yields `n` frames, then ends cleanly.
    Frames(u32),
    FailOpen(FetchReason),
    DecodeErrorAfter(u32),
    /// Yields `n` frames, then never produces another.
    StallAfter(u32),
    Forever,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    Opened(String),
    Closed(String),
}

#[derive(Default)]
struct SourceState {
    scripts: HashMap<String, (u32, Script)>,
    names: Vec<String>,
    log: Vec<SourceEvent>,
}

/// Frame source whose tracks follow a script. Every frame carries its
/// track tag and sequence number in the first eight bytes.
pub struct ScriptedSource {
    state: Arc<Mutex<SourceState>>,
    open_delay: Duration,
}

impl ScriptedSource {
    pub fn new(open_delay: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(SourceState::default())),
            open_delay,
        }
    }

    pub fn track(&self, name: &str, script: Script) -> Track {
        let mut state = self.state.lock();
        let tag = state.names.len() as u32;
        state.names.push(name.to_owned());
        let uri = format!("mem://{name}");
        state.scripts.insert(uri.clone(), (tag, script));
        Track::new(uri, name, None)
    }

    pub fn name_of(&self, tag: u32) -> String {
        self.state
            .lock()
            .names
            .get(tag as usize)
            .cloned()
            .unwrap_or_else(|| format!("?{tag}"))
    }

    pub fn log(&self) -> Vec<SourceEvent> {
        self.state.lock().log.clone()
    }

    pub fn position(&self, event: &SourceEvent) -> Option<usize> {
        self.state.lock().log.iter().position(|e| e == event)
    }

    pub fn opens(&self, name: &str) -> usize {
        self.state
            .lock()
            .log
            .iter()
            .filter(|e| **e == SourceEvent::Opened(name.to_owned()))
            .count()
    }

    pub fn closed(&self, name: &str) -> bool {
        self.position(&SourceEvent::Closed(name.to_owned())).is_some()
    }
}

#[async_trait]
impl SourceProvider for ScriptedSource {
    async fn open(
        &self,
        track: &Track,
        format: FrameFormat,
    ) -> Result<BoxedFrameStream, FetchError> {
        let name = track.title().to_owned();
        let script = {
            let mut state = self.state.lock();
            state.log.push(SourceEvent::Opened(name.clone()));
            state.scripts.get(track.uri()).cloned()
        };

        tokio::time::sleep(self.open_delay).await;

        match script {
            None => Err(FetchError::new(
                FetchReason::NotFound,
                track.uri(),
                "no script",
            )),
            Some((_, Script::FailOpen(reason))) => {
                Err(FetchError::new(reason, track.uri(), "scripted failure"))
            }
            Some((tag, script)) => Ok(Box::new(ScriptedStream {
                name,
                tag,
                script,
                format,
                produced: 0,
                closed: false,
                state: self.state.clone(),
            })),
        }
    }
}

struct ScriptedStream {
    name: String,
    tag: u32,
    script: Script,
    format: FrameFormat,
    produced: u32,
    closed: bool,
    state: Arc<Mutex<SourceState>>,
}

impl ScriptedStream {
    fn frame(&mut self) -> Frame {
        let mut data = BytesMut::zeroed(self.format.byte_len());
        data[0..4].copy_from_slice(&self.tag.to_le_bytes());
        data[4..8].copy_from_slice(&self.produced.to_le_bytes());
        self.produced += 1;
        Frame::new(data)
    }

    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state
                .lock()
                .log
                .push(SourceEvent::Closed(self.name.clone()));
        }
    }
}

#[async_trait]
impl FrameStream for ScriptedStream {
    async fn next_frame(&mut self) -> Result<Option<Frame>, DecodeError> {
        match self.script {
            Script::Frames(n) if self.produced >= n => Ok(None),
            Script::DecodeErrorAfter(n) if self.produced >= n => {
                Err(DecodeError::new("scripted decode error"))
            }
            Script::StallAfter(n) if self.produced >= n => std::future::pending().await,
            _ => Ok(Some(self.frame())),
        }
    }

    async fn close(&mut self) {
        self.release();
    }
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Default)]
struct TransportState {
    frames: HashMap<GuildId, Vec<(u32, u32)>>,
    fail_sends: HashMap<GuildId, u32>,
    refuse_connects: HashMap<GuildId, u32>,
    connects: HashMap<GuildId, u32>,
    sinks: HashMap<GuildId, Vec<StateSink>>,
}

/// Voice transport that records delivered frames per guild and can be told
/// to fail.
#[derive(Default)]
pub struct RecordingTransport {
    state: Arc<Mutex<TransportState>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` sends of `guild` fail.
    pub fn fail_next_sends(&self, guild: &str, count: u32) {
        self.state.lock().fail_sends.insert(g(guild), count);
    }

    /// The next `count` connects of `guild` are refused; `u32::MAX` refuses
    /// forever.
    pub fn refuse_connects(&self, guild: &str, count: u32) {
        self.state.lock().refuse_connects.insert(g(guild), count);
    }

    pub fn connects(&self, guild: &str) -> u32 {
        self.state
            .lock()
            .connects
            .get(&g(guild))
            .copied()
            .unwrap_or(0)
    }

    /// Sinks handed out for `guild`, oldest first.
    pub fn sinks(&self, guild: &str) -> Vec<StateSink> {
        self.state
            .lock()
            .sinks
            .get(&g(guild))
            .cloned()
            .unwrap_or_default()
    }

    fn raw_frames(&self, guild: &str) -> Vec<(u32, u32)> {
        self.state
            .lock()
            .frames
            .get(&g(guild))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl VoiceTransport for RecordingTransport {
    async fn connect(
        &self,
        guild_id: &GuildId,
        _channel_id: ChannelId,
        sink: StateSink,
    ) -> Result<BoxedConnection, TransportError> {
        let mut state = self.state.lock();
        *state.connects.entry(guild_id.clone()).or_default() += 1;

        if let Some(left) = state.refuse_connects.get_mut(guild_id) {
            if *left > 0 {
                if *left != u32::MAX {
                    *left -= 1;
                }
                return Err(TransportError::Connect("scripted refusal".into()));
            }
        }

        state
            .sinks
            .entry(guild_id.clone())
            .or_default()
            .push(sink);

        Ok(Box::new(RecordingConnection {
            guild_id: guild_id.clone(),
            state: self.state.clone(),
        }))
    }
}

struct RecordingConnection {
    guild_id: GuildId,
    state: Arc<Mutex<TransportState>>,
}

#[async_trait]
impl VoiceConnection for RecordingConnection {
    async fn send_frame(&mut self, frame: &Frame) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if let Some(left) = state.fail_sends.get_mut(&self.guild_id) {
            if *left > 0 {
                *left -= 1;
                return Err(TransportError::Send("scripted send failure".into()));
            }
        }

        let bytes = frame.as_bytes();
        let tag = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let seq = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        state
            .frames
            .entry(self.guild_id.clone())
            .or_default()
            .push((tag, seq));
        Ok(())
    }

    async fn disconnect(&mut self) {}
}

pub struct Harness {
    pub registry: Arc<SessionRegistry>,
    pub dispatcher: CommandDispatcher,
    pub source: Arc<ScriptedSource>,
    pub transport: Arc<RecordingTransport>,
    events: broadcast::Receiver<EngineEvent>,
    seen: Vec<EngineEvent>,
}

impl Harness {
    pub fn new(config: PlayerConfig) -> Self {
        Self::with_open_delay(config, Duration::from_millis(5))
    }

    pub fn with_open_delay(config: PlayerConfig, open_delay: Duration) -> Self {
        let source = Arc::new(ScriptedSource::new(open_delay));
        let transport = Arc::new(RecordingTransport::new());
        let (events, rx) = broadcast::channel(4096);

        let registry = Arc::new(SessionRegistry::new(SessionDeps {
            config: Arc::new(config),
            source: source.clone(),
            transport: transport.clone(),
            events,
        }));

        Self {
            dispatcher: CommandDispatcher::new(registry.clone()),
            registry,
            source,
            transport,
            events: rx,
            seen: Vec::new(),
        }
    }

    pub fn track(&self, name: &str, script: Script) -> Track {
        self.source.track(name, script)
    }

    /// Frames delivered to `guild` as (track name, sequence number).
    pub fn frames(&self, guild: &str) -> Vec<(String, u32)> {
        self.transport
            .raw_frames(guild)
            .into_iter()
            .map(|(tag, seq)| (self.source.name_of(tag), seq))
            .collect()
    }

    pub fn frame_count(&self, guild: &str, name: &str) -> usize {
        self.frames(guild).iter().filter(|(n, _)| n == name).count()
    }

    pub fn status(&self, guild: &str) -> Option<SessionStatus> {
        self.registry.get(&g(guild)).map(|s| s.status())
    }

    /// Every event received so far.
    pub fn events(&mut self) -> &[EngineEvent] {
        while let Ok(event) = self.events.try_recv() {
            self.seen.push(event);
        }
        &self.seen
    }
}

/// Polls `cond` on the (usually paused) clock for up to 20 virtual seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..4_000 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

/// Sequence numbers of `name` in delivery order.
pub fn seqs_of(frames: &[(String, u32)], name: &str) -> Vec<u32> {
    frames
        .iter()
        .filter(|(n, _)| n == name)
        .map(|(_, seq)| *seq)
        .collect()
}

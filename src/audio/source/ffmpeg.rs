//! Frame source backed by one `ffmpeg` subprocess per track.
//!
//! The child decodes the source URI to raw s16le 48 kHz stereo on stdout,
//! which [`PcmFrameCodec`] cuts into frames. stderr is kept as a short tail
//! so failures can be classified and reported.

use std::{collections::VecDeque, process::Stdio, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::{Child, ChildStderr, ChildStdout, Command},
    task::JoinHandle,
};
use tokio_util::codec::FramedRead;
use tracing::{debug, warn};

use crate::{
    audio::{
        constants::{CHANNELS, DECODER_EXIT_WAIT_MS, STDERR_DRAIN_MS, TARGET_SAMPLE_RATE},
        frame::{Frame, FrameFormat},
        source::{
            codec::PcmFrameCodec,
            traits::{BoxedFrameStream, FrameStream, SourceProvider},
        },
    },
    common::{DecodeError, FetchError, FetchReason},
    configs::SourceConfig,
    player::Track,
};

pub struct FfmpegSource {
    config: SourceConfig,
}

impl FfmpegSource {
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SourceProvider for FfmpegSource {
    async fn open(
        &self,
        track: &Track,
        format: FrameFormat,
    ) -> Result<BoxedFrameStream, FetchError> {
        let mut stream = FfmpegStream::spawn(&self.config, track.uri(), format)?;

        // A source only counts as open once it produced audio.
        match stream.frames.next().await {
            Some(Ok(frame)) => {
                debug!("ffmpeg opened {}", track.uri());
                stream.primed = Some(frame);
                Ok(Box::new(stream))
            }
            Some(Err(e)) => {
                stream.close().await;
                Err(FetchError::new(
                    FetchReason::Unsupported,
                    track.uri(),
                    format!("reading decoder output: {e}"),
                ))
            }
            None => {
                let status = stream.wait_exit().await;
                stream.drain_stderr().await;
                let tail = stream.stderr.summary();
                stream.close().await;

                let detail = match status {
                    Some(status) if tail.is_empty() => format!("decoder exited with {status}"),
                    Some(status) => format!("decoder exited with {status}: {tail}"),
                    None if tail.is_empty() => "decoder produced no audio".to_string(),
                    None => tail.clone(),
                };
                Err(FetchError::new(classify_failure(&tail), track.uri(), detail))
            }
        }
    }
}

pub struct FfmpegStream {
    uri: String,
    child: Option<Child>,
    frames: FramedRead<ChildStdout, PcmFrameCodec>,
    /// First frame, read while opening.
    primed: Option<Frame>,
    stderr: StderrTail,
    stderr_task: Option<JoinHandle<()>>,
}

impl FfmpegStream {
    fn spawn(config: &SourceConfig, uri: &str, format: FrameFormat) -> Result<Self, FetchError> {
        let mut child = Command::new(&config.ffmpeg_path)
            .args(build_args(config, uri))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                let detail = if e.kind() == std::io::ErrorKind::NotFound {
                    format!("decoder binary '{}' not found", config.ffmpeg_path)
                } else {
                    format!("failed to start decoder: {e}")
                };
                FetchError::new(FetchReason::Unsupported, uri, detail)
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            FetchError::new(FetchReason::Unsupported, uri, "decoder stdout unavailable")
        })?;

        let stderr = StderrTail::new(config.stderr_lines);
        let stderr_task = child
            .stderr
            .take()
            .map(|pipe| tokio::spawn(stderr.clone().collect(pipe)));

        debug!(
            "spawned decoder pid={:?} for {}",
            child.id(),
            uri
        );

        Ok(Self {
            uri: uri.to_owned(),
            child: Some(child),
            frames: FramedRead::new(stdout, PcmFrameCodec::new(format)),
            primed: None,
            stderr,
            stderr_task,
        })
    }

    /// Reaps the child after stdout closed. `None` if the status is unknown.
    async fn wait_exit(&mut self) -> Option<std::process::ExitStatus> {
        let child = self.child.as_mut()?;
        match tokio::time::timeout(Duration::from_millis(DECODER_EXIT_WAIT_MS), child.wait()).await
        {
            Ok(Ok(status)) => {
                self.child = None;
                Some(status)
            }
            Ok(Err(e)) => {
                warn!("failed to reap decoder for {}: {}", self.uri, e);
                None
            }
            Err(_) => {
                warn!("decoder for {} closed stdout but did not exit", self.uri);
                let _ = child.start_kill();
                None
            }
        }
    }

    async fn drain_stderr(&mut self) {
        if let Some(task) = self.stderr_task.as_mut() {
            let _ = tokio::time::timeout(Duration::from_millis(STDERR_DRAIN_MS), task).await;
        }
    }
}

#[async_trait]
impl FrameStream for FfmpegStream {
    async fn next_frame(&mut self) -> Result<Option<Frame>, DecodeError> {
        if let Some(frame) = self.primed.take() {
            return Ok(Some(frame));
        }

        match self.frames.next().await {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(e)) => Err(DecodeError::new(format!("reading decoder output: {e}"))),
            None => match self.wait_exit().await {
                Some(status) if !status.success() => {
                    self.drain_stderr().await;
                    Err(DecodeError::new(format!(
                        "decoder exited with {status}: {}",
                        self.stderr.summary()
                    )))
                }
                _ => Ok(None),
            },
        }
    }

    async fn close(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                debug!("decoder for {} already gone: {}", self.uri, e);
            }
            match tokio::time::timeout(Duration::from_millis(DECODER_EXIT_WAIT_MS), child.wait())
                .await
            {
                Ok(Ok(status)) => debug!("decoder for {} stopped ({})", self.uri, status),
                Ok(Err(e)) => warn!("failed to reap decoder for {}: {}", self.uri, e),
                Err(_) => warn!("decoder for {} did not exit after kill", self.uri),
            }
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

/// Last few lines the decoder wrote to stderr.
#[derive(Clone)]
struct StderrTail {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl StderrTail {
    fn new(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    async fn collect(self, pipe: ChildStderr) {
        let mut lines = BufReader::new(pipe).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!("[ffmpeg] {}", line);
            let mut tail = self.lines.lock();
            if tail.len() == self.capacity {
                tail.pop_front();
            }
            tail.push_back(line);
        }
    }

    fn summary(&self) -> String {
        let tail = self.lines.lock();
        tail.iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

/// Command line for decoding `uri` to raw PCM on stdout.
pub fn build_args(config: &SourceConfig, uri: &str) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-nostdin"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    // reconnect flags are http protocol options; ffmpeg rejects them for files
    if is_network_uri(uri) {
        args.extend(config.before_options.split_whitespace().map(String::from));
    }

    args.push("-i".into());
    args.push(uri.into());
    args.extend(config.options.split_whitespace().map(String::from));
    args.extend(
        [
            "-f".to_string(),
            "s16le".to_string(),
            "-ar".to_string(),
            TARGET_SAMPLE_RATE.to_string(),
            "-ac".to_string(),
            CHANNELS.to_string(),
            "pipe:1".to_string(),
        ]
        .into_iter(),
    );
    args
}

fn is_network_uri(uri: &str) -> bool {
    let lower = uri.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Maps decoder stderr output to a fetch failure reason.
pub fn classify_failure(stderr: &str) -> FetchReason {
    const UNSUPPORTED: [&str; 5] = [
        "protocol not found",
        "invalid data found",
        "could not find codec",
        "does not contain any stream",
        "unsupported",
    ];
    const NOT_FOUND: [&str; 4] = ["404", "410", "no such file", "not found"];
    const NETWORK: [&str; 7] = [
        "timed out",
        "timeout",
        "connection refused",
        "connection reset",
        "network is unreachable",
        "name resolution",
        "failed to resolve",
    ];

    let lower = stderr.to_ascii_lowercase();
    if UNSUPPORTED.iter().any(|m| lower.contains(m)) {
        FetchReason::Unsupported
    } else if NOT_FOUND.iter().any(|m| lower.contains(m)) {
        FetchReason::NotFound
    } else if NETWORK.iter().any(|m| lower.contains(m)) {
        FetchReason::NetworkTimeout
    } else {
        FetchReason::Unsupported
    }
}

use serde::{Deserialize, Serialize};

/// How the external decoder is invoked for every track.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SourceConfig {
    pub ffmpeg_path: String,
    /// Input options, only applied to network sources.
    pub before_options: String,
    /// Output options placed after the input.
    pub options: String,
    /// Number of stderr lines kept for classifying failures.
    pub stderr_lines: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".into(),
            before_options: "-reconnect 1 -reconnect_streamed 1 -reconnect_delay_max 5".into(),
            options: "-vn".into(),
            stderr_lines: 16,
        }
    }
}

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audio::constants::{MAX_VOLUME_PERCENT, VALID_FRAME_DURATIONS_MS};

/// Playback engine tuning shared by every guild session.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PlayerConfig {
    /// How long an idle session may linger before it is torn down.
    pub idle_timeout_secs: u64,
    /// Duration of one audio frame; also the playback cadence.
    pub frame_duration_ms: u32,
    /// Consecutive failed tracks after which playback halts.
    pub max_consecutive_failures: u32,
    /// Reconnect attempts after a voice connection drops.
    pub max_reconnect_attempts: u32,
    pub reconnect_backoff_base_ms: u64,
    /// Upper bound for opening a source and producing its first frame.
    pub open_timeout_ms: u64,
    /// Upper bound for a single frame pull; exceeding it ends the track.
    pub frame_timeout_ms: u64,
    /// Upper bound for handing a frame to the voice transport.
    pub send_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Starting volume of a new session, in percent.
    pub default_volume: u16,
    /// How often the registry sweeps for idle sessions.
    pub reap_interval_secs: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 300,
            frame_duration_ms: 20,
            max_consecutive_failures: 3,
            max_reconnect_attempts: 5,
            reconnect_backoff_base_ms: 1_000,
            open_timeout_ms: 15_000,
            frame_timeout_ms: 2_000,
            send_timeout_ms: 100,
            connect_timeout_ms: 10_000,
            default_volume: 50,
            reap_interval_secs: 15,
        }
    }
}

impl PlayerConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn frame_duration(&self) -> Duration {
        Duration::from_millis(self.frame_duration_ms as u64)
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs.max(1))
    }

    pub fn validate(&self) -> Result<(), String> {
        if !VALID_FRAME_DURATIONS_MS.contains(&self.frame_duration_ms) {
            return Err(format!(
                "player.frame_duration_ms must be one of {:?}, got {}",
                VALID_FRAME_DURATIONS_MS, self.frame_duration_ms
            ));
        }
        if self.max_consecutive_failures == 0 {
            return Err("player.max_consecutive_failures must be at least 1".into());
        }
        if self.default_volume > MAX_VOLUME_PERCENT {
            return Err(format!(
                "player.default_volume must be at most {}, got {}",
                MAX_VOLUME_PERCENT, self.default_volume
            ));
        }
        if self.frame_timeout_ms < self.frame_duration_ms as u64 {
            return Err("player.frame_timeout_ms must be at least one frame duration".into());
        }
        if self.send_timeout_ms == 0 || self.open_timeout_ms == 0 || self.connect_timeout_ms == 0 {
            return Err("player timeouts must be non-zero".into());
        }
        Ok(())
    }
}

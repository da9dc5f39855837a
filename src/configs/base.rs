use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{common::ConfigError, configs::*};

const CONFIG_PATHS: [&str; 2] = ["config.toml", "config.default.toml"];

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    pub logging: Option<LoggingConfig>,
    /// File the configuration was read from, if any.
    #[serde(skip)]
    pub loaded_from: Option<String>,
}

impl Config {
    /// Reads `config.toml` (or `config.default.toml`), falls back to the
    /// built-in defaults, then applies environment overrides and validates.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match CONFIG_PATHS.iter().find(|p| Path::new(p).exists()) {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        let mut config = Self::from_toml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })?;
        config.loaded_from = Some(path.to_owned());
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Overlays `GUILDBEAT_*` variables (and `FFMPEG_PATH`) onto the file
    /// configuration. `lookup` is `std::env::var` outside of tests.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("GUILDBEAT_PASSWORD") {
            self.server.password = v;
        }
        if let Some(v) = lookup("GUILDBEAT_HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("FFMPEG_PATH") {
            self.source.ffmpeg_path = v;
        }
        if let Some(v) = lookup("GUILDBEAT_VOICE_ENDPOINT") {
            self.transport.endpoint = v;
        }

        parse_env(&lookup, "GUILDBEAT_PORT", &mut self.server.port)?;
        parse_env(
            &lookup,
            "GUILDBEAT_IDLE_TIMEOUT_SECS",
            &mut self.player.idle_timeout_secs,
        )?;
        parse_env(
            &lookup,
            "GUILDBEAT_FRAME_DURATION_MS",
            &mut self.player.frame_duration_ms,
        )?;
        parse_env(
            &lookup,
            "GUILDBEAT_MAX_CONSECUTIVE_FAILURES",
            &mut self.player.max_consecutive_failures,
        )?;
        parse_env(
            &lookup,
            "GUILDBEAT_MAX_RECONNECT_ATTEMPTS",
            &mut self.player.max_reconnect_attempts,
        )?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.password.is_empty() {
            return Err(ConfigError::Invalid("server.password must not be empty".into()));
        }
        if self.source.ffmpeg_path.trim().is_empty() {
            return Err(ConfigError::Invalid("source.ffmpeg_path must not be empty".into()));
        }
        self.player.validate().map_err(ConfigError::Invalid)
    }
}

fn parse_env<F, T>(lookup: &F, key: &'static str, target: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(value) = lookup(key) {
        *target = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Env { key, value })?;
    }
    Ok(())
}

use crate::configs::Config;

const GREEN: &str = "\x1b[32m";
const CYAN: &str = "\x1b[36m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";
const DIM: &str = "\x1b[2m";

macro_rules! env_or {
    ($key:literal, $default:literal) => {
        option_env!($key).unwrap_or($default)
    };
}

/// Build identity baked in by `build.rs`.
pub struct BuildInfo {
    pub version: &'static str,
    pub branch: &'static str,
    pub commit_short: &'static str,
    pub profile: &'static str,
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            branch: env_or!("GIT_BRANCH", "unknown"),
            commit_short: env_or!("GIT_COMMIT_SHORT", "unknown"),
            profile: if cfg!(debug_assertions) {
                "debug"
            } else {
                "release"
            },
        }
    }
}

impl BuildInfo {
    /// `0.3.2 (main@abc1234)`
    pub fn describe(&self) -> String {
        format!("{} ({}@{})", self.version, self.branch, self.commit_short)
    }
}

pub fn print_banner(build: &BuildInfo, config: &Config) {
    let player = &config.player;

    println!();
    println!("{GREEN}{BOLD}  guildbeat{RESET}{DIM}  per-guild voice playback engine{RESET}");
    println!("{DIM}  ----------------------------------------{RESET}");
    print_row("Version", &build.describe(), CYAN);
    print_row("Profile", build.profile, YELLOW);
    print_row(
        "Listen",
        &format!("{}:{}", config.server.host, config.server.port),
        RESET,
    );
    print_row("Voice relay", &config.transport.endpoint, RESET);
    print_row("Decoder", &config.source.ffmpeg_path, RESET);
    print_row(
        "Frames",
        &format!("{} ms, volume {}%", player.frame_duration_ms, player.default_volume),
        RESET,
    );
    print_row(
        "Limits",
        &format!(
            "{} failures, {} reconnects, idle {}s",
            player.max_consecutive_failures,
            player.max_reconnect_attempts,
            player.idle_timeout_secs
        ),
        RESET,
    );
    println!();
}

fn print_row(label: &str, value: &str, color: &str) {
    println!("  {BOLD}{label:<12}{RESET}{color}{value}{RESET}");
}

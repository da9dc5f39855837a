//! Central constants for the audio pipeline.
//!
//! Every stream is decoded to the same output format, so frame sizes depend
//! only on the configured frame duration.

// ── Sample / PCM ─────────────────────────────────────────────────────────────

/// Output sample rate handed to the voice transport (Hz).
pub const TARGET_SAMPLE_RATE: u32 = 48_000;

/// Interleaved stereo output.
pub const CHANNELS: usize = 2;

/// Signed 16-bit little-endian samples.
pub const BYTES_PER_SAMPLE: usize = 2;

/// Frame durations the voice codec accepts (ms).
pub const VALID_FRAME_DURATIONS_MS: [u32; 4] = [10, 20, 40, 60];

// ── i16 PCM clip boundaries ──────────────────────────────────────────────────

pub const INT16_MAX_F: f32 = 32_767.0;
pub const INT16_MIN_F: f32 = -32_768.0;

// ── Volume ───────────────────────────────────────────────────────────────────

/// Upper bound of the per-session volume, in percent.
pub const MAX_VOLUME_PERCENT: u16 = 200;

/// Percent value that leaves samples untouched.
pub const UNITY_VOLUME_PERCENT: u16 = 100;

// ── Decoder process ──────────────────────────────────────────────────────────

/// How long to wait for a killed or finished decoder to be reaped (ms).
pub const DECODER_EXIT_WAIT_MS: u64 = 2_000;

/// How long to wait for the decoder's stderr to drain after it exits (ms).
pub const STDERR_DRAIN_MS: u64 = 500;

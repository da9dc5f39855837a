use std::time::Duration;

use bytes::BytesMut;

use crate::audio::constants::{
    BYTES_PER_SAMPLE, CHANNELS, INT16_MAX_F, INT16_MIN_F, TARGET_SAMPLE_RATE,
    UNITY_VOLUME_PERCENT,
};

/// Shape of every frame produced by a source and accepted by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    duration_ms: u32,
}

impl FrameFormat {
    pub fn new(duration_ms: u32) -> Self {
        Self { duration_ms }
    }

    pub fn duration_ms(&self) -> u32 {
        self.duration_ms
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms as u64)
    }

    /// Samples per channel in one frame (960 at 20 ms).
    pub fn samples_per_channel(&self) -> usize {
        (TARGET_SAMPLE_RATE as usize * self.duration_ms as usize) / 1000
    }

    /// Encoded size of one frame in bytes (3840 at 20 ms).
    pub fn byte_len(&self) -> usize {
        self.samples_per_channel() * CHANNELS * BYTES_PER_SAMPLE
    }
}

impl Default for FrameFormat {
    fn default() -> Self {
        Self::new(20)
    }
}

/// One fixed-duration block of interleaved s16le stereo PCM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: BytesMut,
}

impl Frame {
    pub fn new(data: BytesMut) -> Self {
        Self { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Scales every sample by `volume_percent / 100`, saturating at the i16
    /// range.
    pub fn apply_volume(&mut self, volume_percent: u16) {
        if volume_percent == UNITY_VOLUME_PERCENT {
            return;
        }
        let gain = volume_percent as f32 / UNITY_VOLUME_PERCENT as f32;

        for sample in self.data.chunks_exact_mut(BYTES_PER_SAMPLE) {
            let value = i16::from_le_bytes([sample[0], sample[1]]) as f32 * gain;
            let clipped = value.clamp(INT16_MIN_F, INT16_MAX_F) as i16;
            sample.copy_from_slice(&clipped.to_le_bytes());
        }
    }
}

impl From<BytesMut> for Frame {
    fn from(data: BytesMut) -> Self {
        Self::new(data)
    }
}

impl From<Vec<u8>> for Frame {
    fn from(data: Vec<u8>) -> Self {
        Self::new(BytesMut::from(&data[..]))
    }
}

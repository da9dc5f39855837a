use async_trait::async_trait;

use crate::{
    audio::frame::{Frame, FrameFormat},
    common::{DecodeError, FetchError},
    player::Track,
};

/// An open, pull-based stream of fixed-size frames for one track.
///
/// `next_frame` must be cancel-safe: dropping the returned future before it
/// completes must not lose data already read from the underlying source.
#[async_trait]
pub trait FrameStream: Send {
    /// `Ok(None)` signals a clean end of stream.
    async fn next_frame(&mut self) -> Result<Option<Frame>, DecodeError>;

    /// Releases the decoder and any network resources. Idempotent.
    async fn close(&mut self);
}

pub type BoxedFrameStream = Box<dyn FrameStream>;

/// Opens tracks into frame streams.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    async fn open(&self, track: &Track, format: FrameFormat)
    -> Result<BoxedFrameStream, FetchError>;
}

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::audio::frame::{Frame, FrameFormat};

/// Splits a raw PCM byte stream into fixed-size frames. The trailing partial
/// frame at end of stream is padded with silence.
#[derive(Debug, Clone, Copy)]
pub struct PcmFrameCodec {
    frame_len: usize,
}

impl PcmFrameCodec {
    pub fn new(format: FrameFormat) -> Self {
        Self {
            frame_len: format.byte_len(),
        }
    }
}

impl Decoder for PcmFrameCodec {
    type Item = Frame;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Self::Error> {
        if src.len() < self.frame_len {
            src.reserve(self.frame_len - src.len());
            return Ok(None);
        }
        Ok(Some(Frame::new(src.split_to(self.frame_len))))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            return Ok(None);
        }
        let mut tail = src.split();
        tail.resize(self.frame_len, 0);
        Ok(Some(Frame::new(tail)))
    }
}

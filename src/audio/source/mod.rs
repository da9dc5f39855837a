pub mod codec;
pub mod ffmpeg;
pub mod traits;

pub use codec::PcmFrameCodec;
pub use ffmpeg::{FfmpegSource, FfmpegStream};
pub use traits::{BoxedFrameStream, FrameStream, SourceProvider};

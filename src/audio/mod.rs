pub mod constants;
pub mod frame;
pub mod source;

pub use frame::{Frame, FrameFormat};
pub use source::{BoxedFrameStream, FfmpegSource, FrameStream, SourceProvider};

pub mod buffer;
pub mod codec;

pub use buffer::{Frame, FrameMetadata, PixelFormat};
pub use codec::{FrameCodec, PngCodec};

//! Wire encoding for frames sent to a remote endpoint

use std::io::Cursor;

use bytes::Bytes;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage, RgbaImage};

use crate::error::CodecError;

use super::buffer::{Frame, PixelFormat};

/// Encode/decode pair with the contract `decode(encode(f)) ≈ f`.
///
/// Sequence numbers are not part of the payload; they travel next to it
/// in [`crate::offload::EncodedFrame`].
pub trait FrameCodec: Send + Sync {
    fn encode(&self, frame: &Frame) -> Result<Bytes, CodecError>;
    fn decode(&self, payload: &[u8]) -> Result<Frame, CodecError>;
}

/// Lossless PNG codec
#[derive(Debug, Default, Clone, Copy)]
pub struct PngCodec;

impl FrameCodec for PngCodec {
    fn encode(&self, frame: &Frame) -> Result<Bytes, CodecError> {
        let (width, height) = (frame.width(), frame.height());
        let size_err = || CodecError::BufferSize { width, height };

        let image = match frame.format() {
            PixelFormat::Rgba8 => DynamicImage::ImageRgba8(
                RgbaImage::from_raw(width, height, frame.data.to_vec()).ok_or_else(size_err)?,
            ),
            PixelFormat::Bgra8 => {
                // PNG has no BGRA layout, swap to RGBA
                let mut rgba = frame.data.to_vec();
                for px in rgba.chunks_exact_mut(4) {
                    px.swap(0, 2);
                }
                DynamicImage::ImageRgba8(RgbaImage::from_raw(width, height, rgba).ok_or_else(size_err)?)
            }
            PixelFormat::Rgb8 => DynamicImage::ImageRgb8(
                RgbImage::from_raw(width, height, frame.data.to_vec()).ok_or_else(size_err)?,
            ),
            PixelFormat::Gray8 => DynamicImage::ImageLuma8(
                GrayImage::from_raw(width, height, frame.data.to_vec()).ok_or_else(size_err)?,
            ),
        };

        let mut out = Vec::with_capacity(frame.data.len() / 2);
        image.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
        Ok(Bytes::from(out))
    }

    fn decode(&self, payload: &[u8]) -> Result<Frame, CodecError> {
        let image = image::load_from_memory_with_format(payload, ImageFormat::Png)?;
        let (width, height) = (image.width(), image.height());

        let (format, data) = match image {
            DynamicImage::ImageLuma8(img) => (PixelFormat::Gray8, img.into_raw()),
            DynamicImage::ImageRgb8(img) => (PixelFormat::Rgb8, img.into_raw()),
            other => (PixelFormat::Rgba8, other.into_rgba8().into_raw()),
        };

        Frame::new(width, height, format, data).ok_or(CodecError::BufferSize { width, height })
    }
}

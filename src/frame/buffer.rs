use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Frame data with zero-copy semantics
///
/// A frame moves through the pipeline by value: pushing it onto a channel
/// hands it to the next stage. Cloning only bumps reference counts.
#[derive(Clone)]
pub struct Frame {
    /// Immutable pixel data - can be shared across threads without copying
    pub data: Bytes,

    /// Frame metadata
    pub meta: Arc<FrameMetadata>,

    /// Ingress timestamp for latency tracking
    pub timestamp: Instant,
}

/// Frame metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMetadata {
    /// Assigned on submit; 0 until then
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    /// Bytes per row
    pub stride: usize,
    pub format: PixelFormat,
}

/// Pixel formats we support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgba8,
    Bgra8,
    Rgb8,
    Gray8,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Gray8 => 1,
        }
    }
}

impl Frame {
    /// Wrap a tightly packed pixel buffer.
    ///
    /// Returns `None` if `data` does not hold exactly `width * height` pixels.
    pub fn new(width: u32, height: u32, format: PixelFormat, data: impl Into<Bytes>) -> Option<Self> {
        let data = data.into();
        let stride = (width as usize).checked_mul(format.bytes_per_pixel())?;
        if Some(data.len()) != stride.checked_mul(height as usize) {
            return None;
        }

        Some(Self {
            data,
            meta: Arc::new(FrameMetadata {
                sequence: 0,
                width,
                height,
                stride,
                format,
            }),
            timestamp: Instant::now(),
        })
    }

    /// Frame of the given size with every byte set to `value`.
    pub fn filled(width: u32, height: u32, format: PixelFormat, value: u8) -> Self {
        let stride = width as usize * format.bytes_per_pixel();
        Self {
            data: Bytes::from(vec![value; stride * height as usize]),
            meta: Arc::new(FrameMetadata {
                sequence: 0,
                width,
                height,
                stride,
                format,
            }),
            timestamp: Instant::now(),
        }
    }

    /// Build a frame that carries this frame's sequence and timestamp but new pixels.
    ///
    /// Transforms use this so identity metadata survives every stage.
    pub fn derive(&self, width: u32, height: u32, format: PixelFormat, data: impl Into<Bytes>) -> Self {
        let stride = width as usize * format.bytes_per_pixel();
        Self {
            data: data.into(),
            meta: Arc::new(FrameMetadata {
                sequence: self.meta.sequence,
                width,
                height,
                stride,
                format,
            }),
            timestamp: self.timestamp,
        }
    }

    /// Same pixels, new sequence number.
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        Arc::make_mut(&mut self.meta).sequence = sequence;
        self
    }

    pub fn sequence(&self) -> u64 {
        self.meta.sequence
    }

    pub fn width(&self) -> u32 {
        self.meta.width
    }

    pub fn height(&self) -> u32 {
        self.meta.height
    }

    pub fn format(&self) -> PixelFormat {
        self.meta.format
    }

    /// Row `y` as a byte slice.
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.meta.stride;
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }

    /// Channels of the pixel at (`x`, `y`).
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let bpp = self.meta.format.bytes_per_pixel();
        let start = x as usize * bpp;
        &self.row(y)[start..start + bpp]
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.meta.sequence)
            .field("width", &self.meta.width)
            .field("height", &self.meta.height)
            .field("format", &self.meta.format)
            .field("bytes", &self.data.len())
            .finish()
    }
}

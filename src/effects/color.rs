//! Per-pixel color effects. Output is always `Rgba8`.

use crate::frame::{Frame, PixelFormat};

use super::{EffectKind, Transform};

/// BT.601 luma in fixed point
#[inline]
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((77 * r as u32 + 150 * g as u32 + 29 * b as u32) >> 8) as u8
}

/// Visit every pixel as (r, g, b, a) regardless of the input layout.
fn map_rgba(frame: &Frame, mut f: impl FnMut(u8, u8, u8, u8) -> [u8; 4]) -> Frame {
    let format = frame.format();
    let mut out = Vec::with_capacity(frame.width() as usize * frame.height() as usize * 4);

    for px in frame.data.chunks_exact(format.bytes_per_pixel()) {
        let [r, g, b, a] = match format {
            PixelFormat::Rgba8 => [px[0], px[1], px[2], px[3]],
            PixelFormat::Bgra8 => [px[2], px[1], px[0], px[3]],
            PixelFormat::Rgb8 => [px[0], px[1], px[2], 255],
            PixelFormat::Gray8 => [px[0], px[0], px[0], 255],
        };
        out.extend_from_slice(&f(r, g, b, a));
    }

    frame.derive(frame.width(), frame.height(), PixelFormat::Rgba8, out)
}

/// Single luma channel replicated across RGB, opaque alpha.
#[derive(Debug, Default, Clone, Copy)]
pub struct Grayscale;

impl Transform for Grayscale {
    fn apply(&self, frame: Frame) -> Frame {
        map_rgba(&frame, |r, g, b, _| {
            let y = luma(r, g, b);
            [y, y, y, 255]
        })
    }

    fn kind(&self) -> EffectKind {
        EffectKind::Grayscale
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Negative;

impl Transform for Negative {
    fn apply(&self, frame: Frame) -> Frame {
        map_rgba(&frame, |r, g, b, a| [!r, !g, !b, a])
    }

    fn kind(&self) -> EffectKind {
        EffectKind::Negative
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Sepia;

impl Transform for Sepia {
    fn apply(&self, frame: Frame) -> Frame {
        map_rgba(&frame, |r, g, b, a| {
            let (r, g, b) = (r as f32, g as f32, b as f32);
            let tone = |cr: f32, cg: f32, cb: f32| (r * cr + g * cg + b * cb).min(255.0) as u8;
            [
                tone(0.393, 0.769, 0.189),
                tone(0.349, 0.686, 0.168),
                tone(0.272, 0.534, 0.131),
                a,
            ]
        })
    }

    fn kind(&self) -> EffectKind {
        EffectKind::Sepia
    }
}

/// Inverted grayscale
#[derive(Debug, Default, Clone, Copy)]
pub struct Xray;

impl Transform for Xray {
    fn apply(&self, frame: Frame) -> Frame {
        map_rgba(&frame, |r, g, b, _| {
            let y = !luma(r, g, b);
            [y, y, y, 255]
        })
    }

    fn kind(&self) -> EffectKind {
        EffectKind::Xray
    }
}

//! Spatial effects. These keep the input pixel format.

use crate::frame::Frame;

use super::{EffectKind, Transform};

/// Mirror left-right
#[derive(Debug, Default, Clone, Copy)]
pub struct HorizontalFlip;

impl Transform for HorizontalFlip {
    fn apply(&self, frame: Frame) -> Frame {
        let bpp = frame.format().bytes_per_pixel();
        let mut out = Vec::with_capacity(frame.data.len());
        for y in 0..frame.height() {
            for px in frame.row(y).chunks_exact(bpp).rev() {
                out.extend_from_slice(px);
            }
        }
        frame.derive(frame.width(), frame.height(), frame.format(), out)
    }

    fn kind(&self) -> EffectKind {
        EffectKind::HorizontalFlip
    }
}

/// Mirror top-bottom
#[derive(Debug, Default, Clone, Copy)]
pub struct VerticalFlip;

impl Transform for VerticalFlip {
    fn apply(&self, frame: Frame) -> Frame {
        let mut out = Vec::with_capacity(frame.data.len());
        for y in (0..frame.height()).rev() {
            out.extend_from_slice(frame.row(y));
        }
        frame.derive(frame.width(), frame.height(), frame.format(), out)
    }

    fn kind(&self) -> EffectKind {
        EffectKind::VerticalFlip
    }
}

/// 3x3 box blur with clamped edges
#[derive(Debug, Default, Clone, Copy)]
pub struct BoxBlur;

impl Transform for BoxBlur {
    fn apply(&self, frame: Frame) -> Frame {
        let (w, h) = (frame.width() as i64, frame.height() as i64);
        let bpp = frame.format().bytes_per_pixel();
        let mut out = Vec::with_capacity(frame.data.len());

        for y in 0..h {
            for x in 0..w {
                for c in 0..bpp {
                    let mut sum = 0u32;
                    for dy in -1..=1 {
                        for dx in -1..=1 {
                            let sx = (x + dx).clamp(0, w - 1) as u32;
                            let sy = (y + dy).clamp(0, h - 1) as u32;
                            sum += frame.pixel(sx, sy)[c] as u32;
                        }
                    }
                    out.push((sum / 9) as u8);
                }
            }
        }

        frame.derive(frame.width(), frame.height(), frame.format(), out)
    }

    fn kind(&self) -> EffectKind {
        EffectKind::Blur
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;

    fn ramp(width: u32, height: u32) -> Frame {
        let data: Vec<u8> = (0..width * height).map(|v| v as u8).collect();
        Frame::new(width, height, PixelFormat::Gray8, data).unwrap()
    }

    #[test]
    fn test_horizontal_flip() {
        let out = HorizontalFlip.apply(ramp(3, 2));
        assert_eq!(&out.data[..], &[2, 1, 0, 5, 4, 3]);
        assert_eq!(out.format(), PixelFormat::Gray8);
    }

    #[test]
    fn test_vertical_flip() {
        let out = VerticalFlip.apply(ramp(3, 2));
        assert_eq!(&out.data[..], &[3, 4, 5, 0, 1, 2]);
    }

    #[test]
    fn test_blur_flat_image_unchanged() {
        let frame = Frame::new(4, 4, PixelFormat::Rgba8, vec![100u8; 64]).unwrap();
        let out = BoxBlur.apply(frame.clone());
        assert_eq!(out.data, frame.data);
    }
}

//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod endpoints;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use frameflow::effects::{EffectKind, Transform};
use frameflow::{Frame, PixelFormat};

/// Upper bound for anything a test waits on
pub fn test_timeout() -> Duration {
    Duration::from_secs(2)
}

/// 2x2 RGBA frame with distinct channel values so grayscale changes it
pub fn rgba_frame(seed: u8) -> Frame {
    let data: Vec<u8> = (0..4u8)
        .flat_map(|i| [seed.wrapping_add(i), seed.wrapping_mul(3), 200u8.wrapping_sub(i), 255])
        .collect();
    Frame::new(2, 2, PixelFormat::Rgba8, data).unwrap()
}

/// True if every pixel has r == g == b and opaque alpha
pub fn is_replicated_gray(frame: &Frame) -> bool {
    frame.format() == PixelFormat::Rgba8
        && frame
            .data
            .chunks_exact(4)
            .all(|px| px[0] == px[1] && px[1] == px[2] && px[3] == 255)
}

/// Poll `cond` until it holds or the test timeout passes
pub fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + test_timeout();
    while !cond() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(2));
    }
    true
}

/// Pass-through that sleeps, to keep channels busy
#[derive(Debug)]
pub struct Slow(pub Duration);

impl Transform for Slow {
    fn apply(&self, frame: Frame) -> Frame {
        thread::sleep(self.0);
        frame
    }

    fn kind(&self) -> EffectKind {
        EffectKind::Identity
    }
}

pub fn slow(millis: u64) -> Arc<dyn Transform> {
    Arc::new(Slow(Duration::from_millis(millis)))
}

pub fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_time()
        .build()
        .unwrap()
}

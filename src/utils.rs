use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::frame::{Frame, PixelFormat};
use crate::LoggingConfig;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured filter.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_timer(fmt::time::uptime()));

    #[cfg(feature = "profiling")]
    let registry = registry.with(tracing_tracy::TracyLayer::default());

    registry.init();
}

/// Synthetic RGBA test pattern source, standing in for a camera
pub struct TestPattern {
    template: Frame,
    tick: u32,
}

impl TestPattern {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            template: Frame::filled(width, height, PixelFormat::Rgba8, 0),
            tick: 0,
        }
    }

    /// Diagonal gradient that scrolls one pixel per frame.
    pub fn next_frame(&mut self) -> Frame {
        let (w, h, t) = (self.template.width(), self.template.height(), self.tick);
        let mut data = Vec::with_capacity(w as usize * h as usize * 4);
        for y in 0..h {
            for x in 0..w {
                data.extend_from_slice(&[
                    (x.wrapping_add(t) % 256) as u8,
                    (y.wrapping_add(t) % 256) as u8,
                    ((x + y) % 256) as u8,
                    255,
                ]);
            }
        }
        self.tick = self.tick.wrapping_add(1);

        let mut frame = self.template.derive(w, h, PixelFormat::Rgba8, data);
        frame.timestamp = std::time::Instant::now();
        frame
    }
}

impl Iterator for TestPattern {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        Some(self.next_frame())
    }
}

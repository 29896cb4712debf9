//! Frameflow demo: feeds a synthetic pattern through the frame processor

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use color_eyre::{eyre::eyre, Result};
use tokio::runtime::Handle;
use tracing::{info, warn};

use frameflow::effects::{self, EffectKind};
use frameflow::frame::{FrameCodec, PngCodec};
use frameflow::offload::{LoopbackEndpoint, RemoteLink};
use frameflow::utils::{self, TestPattern};
use frameflow::{Config, FrameProcessor};

const FRAMES: usize = 120;
const WIDTH: u32 = 64;
const HEIGHT: u32 = 48;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;
    utils::init_tracing(&config.logging);

    info!("Frameflow launching...");

    let effects = config.build_effects()?;
    let processor = if config.offload.enabled {
        let codec: Arc<dyn FrameCodec> = Arc::new(PngCodec);
        let latency = Duration::from_millis(config.offload.simulated_latency_ms);
        let link = RemoteLink {
            endpoint: Arc::new(LoopbackEndpoint::with_latency(Arc::clone(&codec), latency)),
            codec,
            runtime: Handle::current(),
        };
        FrameProcessor::with_remote(&config, effects, link)
    } else {
        FrameProcessor::new(&config, effects)
    };
    let processor = Arc::new(processor);
    processor.start()?;

    let worker = Arc::clone(&processor);
    let summary = tokio::task::spawn_blocking(move || run(&worker));
    let (retrieved, elapsed) = tokio::select! {
        res = summary => res.map_err(|e| eyre!("Frame loop panicked: {e}"))??,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted");
            processor.stop();
            return Ok(());
        }
    };

    processor.stop();
    for (replica, stages) in processor.stats().iter().enumerate() {
        for stage in stages {
            info!(
                replica,
                effect = %stage.effect,
                read = stage.frames_read,
                written = stage.frames_written,
                dropped = stage.frames_dropped,
                "Stage summary"
            );
        }
    }
    info!(
        submitted = FRAMES,
        retrieved,
        fps = retrieved as f64 / elapsed.as_secs_f64().max(f64::EPSILON),
        "Frameflow shutting down"
    );
    Ok(())
}

/// Submit/retrieve loop; rearranges the chain halfway through.
fn run(processor: &FrameProcessor) -> Result<(usize, Duration)> {
    let started = Instant::now();
    let mut retrieved = 0;

    for (i, frame) in TestPattern::new(WIDTH, HEIGHT).take(FRAMES).enumerate() {
        if i == FRAMES / 2 {
            let negative = effects::from_kind(EffectKind::Negative)
                .ok_or_else(|| eyre!("{} has no local implementation", EffectKind::Negative))?;
            processor.insert_effect(0, negative)?;
            let chain: Vec<_> = processor.list_effects().iter().map(|t| t.kind()).collect();
            info!(?chain, "Effect chain updated");
        }

        processor.submit(frame);
        if processor.retrieve_timeout(Duration::from_millis(50)).is_some() {
            retrieved += 1;
        }
    }

    if !processor.drain_timeout(Duration::from_secs(5)) {
        warn!(pending = processor.pending(), "Remote frames still outstanding");
    }
    Ok((retrieved, started.elapsed()))
}

//! Integration tests for the local stage chain
//!
//! These tests drive real worker threads:
//! - Backpressure and frame drops at the boundaries
//! - Channel occupancy under load
//! - Topology changes while frames are in flight

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{is_replicated_gray, rgba_frame, slow, test_timeout, wait_for};
use frameflow::effects::{EffectKind, Grayscale, Identity, Negative, Transform};
use frameflow::pipeline::{FrameChannel, Offer};
use frameflow::{Config, FrameProcessor, Pipeline};

#[test]
fn test_burst_drops_frames_and_keeps_order() {
    let processor = FrameProcessor::new(&Config::default(), vec![Arc::new(Grayscale), Arc::new(Identity)]);

    // Not started yet: the unprocessed queue holds two frames, the rest drop
    for seed in 1..=5 {
        processor.submit(rgba_frame(seed * 10));
    }
    processor.start().unwrap();

    let first = processor.retrieve_timeout(test_timeout()).unwrap();
    let second = processor.retrieve_timeout(test_timeout()).unwrap();
    assert_eq!((first.sequence(), second.sequence()), (1, 2));
    assert!(is_replicated_gray(&first));
    assert!(is_replicated_gray(&second));
    assert_eq!(first.data, Grayscale.apply(rgba_frame(10)).data);

    assert!(
        processor.retrieve_timeout(Duration::from_millis(50)).is_none(),
        "frames 3..=5 were dropped at ingress"
    );
}

#[test]
fn test_running_burst_drops_inside_stages() {
    let processor = FrameProcessor::new(&Config::default(), vec![Arc::new(Grayscale), Arc::new(Identity)]);
    processor.start().unwrap();

    // Nobody retrieves: the processed queue fills and the last stage sheds
    let mut seed = 0u8;
    assert!(wait_for(|| {
        processor.submit(rgba_frame(seed));
        seed = seed.wrapping_add(1);
        thread::sleep(Duration::from_millis(1));
        processor.stats()[0].iter().any(|stage| stage.frames_dropped > 0)
    }));

    let stats = &processor.stats()[0];
    assert_eq!(stats[1].effect, EffectKind::Identity);
    assert!(stats[1].frames_dropped > 0, "{stats:?}");

    let first = processor.retrieve_timeout(test_timeout()).unwrap();
    let second = processor.retrieve_timeout(test_timeout()).unwrap();
    assert!(first.sequence() < second.sequence());
    assert!(is_replicated_gray(&first));
    assert!(is_replicated_gray(&second));
    processor.stop();
}

#[test]
fn test_occupancy_never_exceeds_capacity() {
    let input = FrameChannel::bounded(2);
    let output = FrameChannel::bounded(2);
    let mut pipeline = Pipeline::new(input.clone(), output.clone(), [slow(5), slow(5), slow(5)]);
    pipeline.start().unwrap();

    let mut dropped = 0;
    for seed in 0..60u8 {
        if input.offer(rgba_frame(seed)) == Offer::Dropped {
            dropped += 1;
        }
        for occupied in pipeline.occupancy() {
            assert!(occupied <= pipeline.capacity(), "{:?}", pipeline.occupancy());
        }
        thread::sleep(Duration::from_millis(1));
    }

    assert!(dropped > 0, "a slow chain must shed load");
    let stats = pipeline.stats();
    assert_eq!(stats.len(), 3);
    assert!(stats.iter().all(|s| s.effect == EffectKind::Identity));
    pipeline.stop();
}

#[test]
fn test_replicas_share_boundaries() {
    let mut config = Config::default();
    config.pipeline.replicas = 3;
    let processor = FrameProcessor::new(&config, vec![Arc::new(Negative)]);
    processor.start().unwrap();
    assert_eq!(processor.stats().len(), 3);

    for seed in 0..10u8 {
        processor.submit(rgba_frame(seed));
        let out = processor.retrieve_timeout(test_timeout()).unwrap();
        assert_eq!(out.data, Negative.apply(rgba_frame(seed)).data);
    }

    processor.add_effect(Arc::new(Grayscale)).unwrap();
    let kinds: Vec<_> = processor.list_effects().iter().map(|t| t.kind()).collect();
    assert_eq!(kinds, [EffectKind::Negative, EffectKind::Grayscale]);
    assert!(processor.stats().iter().all(|stages| stages.len() == 2));

    processor.stop();
}

#[test]
fn test_mutations_under_load() {
    let processor = Arc::new(FrameProcessor::new(&Config::default(), vec![Arc::new(Grayscale)]));
    processor.start().unwrap();

    let running = Arc::new(AtomicBool::new(true));
    let feeder = {
        let processor = Arc::clone(&processor);
        let running = Arc::clone(&running);
        thread::spawn(move || {
            let mut seed = 0u8;
            while running.load(Ordering::Relaxed) {
                processor.submit(rgba_frame(seed));
                seed = seed.wrapping_add(1);
                thread::sleep(Duration::from_millis(1));
            }
        })
    };

    let mut sequences = Vec::new();
    let mut collect = |n: usize| {
        for _ in 0..n {
            if let Some(frame) = processor.retrieve_timeout(test_timeout()) {
                sequences.push(frame.sequence());
            }
        }
    };

    for _ in 0..5 {
        processor.add_effect(Arc::new(Negative)).unwrap();
        collect(3);
        processor.move_effect(1, 0).unwrap();
        collect(3);
        processor.insert_effect(1, slow(1)).unwrap();
        collect(3);
        processor.remove_effect(1).unwrap();
        processor.remove_effect(0).unwrap();
        collect(3);
    }

    let kinds: Vec<_> = processor.list_effects().iter().map(|t| t.kind()).collect();
    assert_eq!(kinds, [EffectKind::Grayscale]);

    processor.clear_effects().unwrap();
    assert!(processor.list_effects().is_empty());
    collect(5);

    running.store(false, Ordering::Relaxed);
    feeder.join().unwrap();
    processor.stop();

    assert!(sequences.len() > 10, "frames kept flowing: {}", sequences.len());
    assert!(sequences.windows(2).all(|w| w[0] < w[1]), "{sequences:?}");
}

#[test]
fn test_out_of_range_mutations_rejected() {
    let processor = FrameProcessor::new(&Config::default(), vec![Arc::new(Negative)]);
    assert!(processor.remove_effect(1).is_err());
    assert!(processor.move_effect(3, 0).is_err());
    assert_eq!(processor.list_effects().len(), 1);

    processor.remove_effect(0).unwrap();
    assert!(processor.list_effects().is_empty());

    // Empty chain is a pass-through
    processor.start().unwrap();
    processor.submit(rgba_frame(9));
    assert!(wait_for(|| processor
        .retrieve_timeout(Duration::from_millis(10))
        .is_some_and(|f| f.data == rgba_frame(9).data)));
}

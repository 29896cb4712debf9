//! Stage worker: pull, transform, push, repeat
//!
//! A stage reads its channel endpoints through an [`ArcSwapOption`], so the
//! owning pipeline can rewire it while the worker thread keeps running. A
//! rebind or cancel wakes a worker that is parked on its input.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use arc_swap::ArcSwapOption;
use crossbeam::utils::CachePadded;
use flume::{Receiver, RecvError, Selector, Sender};
use tracing::{debug, error, trace};

use crate::effects::{EffectKind, Identity, SharedTransform};
use crate::error::PipelineResult;
use crate::frame::Frame;

use super::channel::{FrameChannel, Offer};

/// Channel endpoints a stage is currently wired to
struct Ports {
    input: FrameChannel,
    output: FrameChannel,
}

#[derive(Default)]
struct Stats {
    frames_read: AtomicUsize,
    frames_written: AtomicUsize,
    frames_dropped: AtomicUsize,
}

/// State shared between a [`Stage`] and its worker thread
struct StageShared {
    ports: ArcSwapOption<Ports>,
    cancelled: AtomicBool,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
    stats: CachePadded<Stats>,
    /// Held across the binding check and the push, and by every rebind
    push: Mutex<()>,
}

impl StageShared {
    fn push_guard(&self) -> MutexGuard<'_, ()> {
        self.push.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn wake(&self) {
        // Unbounded and we hold the receiver, cannot fail
        let _ = self.wake_tx.send(());
    }
}

/// Counters for one stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageStats {
    pub effect: EffectKind,
    pub frames_read: usize,
    pub frames_written: usize,
    pub frames_dropped: usize,
}

/// One transform bound to an input/output channel pair, run by one worker thread.
pub struct Stage {
    transform: SharedTransform,
    shared: Arc<StageShared>,
    worker: Option<JoinHandle<()>>,
    placeholder: bool,
}

impl Stage {
    pub fn new(transform: SharedTransform) -> Self {
        let (wake_tx, wake_rx) = flume::unbounded();
        Self {
            transform,
            shared: Arc::new(StageShared {
                ports: ArcSwapOption::empty(),
                cancelled: AtomicBool::new(false),
                wake_tx,
                wake_rx,
                stats: CachePadded::new(Stats::default()),
                push: Mutex::new(()),
            }),
            worker: None,
            placeholder: false,
        }
    }

    /// Pass-through stage that stands in for an empty pipeline
    pub fn placeholder() -> Self {
        let mut stage = Self::new(Arc::new(Identity));
        stage.placeholder = true;
        stage
    }

    pub fn transform(&self) -> &SharedTransform {
        &self.transform
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    /// Point this stage at a new channel pair.
    ///
    /// A running worker picks the change up on its next iteration. A frame
    /// it is transforming right now is discarded if the output changed, and
    /// pushed as usual if only the input did. Returns `false` if the stage
    /// was already wired this way.
    pub fn bind(&self, input: &FrameChannel, output: &FrameChannel) -> bool {
        if self.is_bound_to(input, output) {
            return false;
        }

        {
            let _push = self.shared.push_guard();
            self.shared.ports.store(Some(Arc::new(Ports {
                input: input.clone(),
                output: output.clone(),
            })));
        }
        self.shared.wake();
        debug!(effect = self.transform.label(), "Stage rebound");
        true
    }

    /// Detach from all channels. Once this returns the worker pushes nothing
    /// until the next [`bind`](Self::bind).
    pub fn unbind(&self) {
        {
            let _push = self.shared.push_guard();
            self.shared.ports.store(None);
        }
        self.shared.wake();
    }

    pub fn is_bound_to(&self, input: &FrameChannel, output: &FrameChannel) -> bool {
        self.shared
            .ports
            .load()
            .as_ref()
            .is_some_and(|ports| ports.input.same_channel(input) && ports.output.same_channel(output))
    }

    /// Spawn the worker if there is none. Idempotent.
    pub fn start(&mut self) -> PipelineResult<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        self.shared.cancelled.store(false, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        let transform = Arc::clone(&self.transform);
        let handle = thread::Builder::new()
            .name(format!("stage-{}", self.transform.kind().label().to_lowercase()))
            .spawn(move || run(shared, transform))?;

        debug!(effect = self.transform.label(), "Stage worker started");
        self.worker = Some(handle);
        Ok(())
    }

    /// Request cancellation without waiting for the worker.
    pub fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::Release);
        self.shared.wake();
    }

    /// Cancel and join the worker. Returns within one transform step.
    pub fn stop(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };

        self.cancel();
        if handle.join().is_err() {
            error!(effect = self.transform.label(), "Stage worker panicked");
        }
        debug!(effect = self.transform.label(), "Stage worker stopped");
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    pub fn stats(&self) -> StageStats {
        let stats = &self.shared.stats;
        StageStats {
            effect: self.transform.kind(),
            frames_read: stats.frames_read.load(Ordering::Relaxed),
            frames_written: stats.frames_written.load(Ordering::Relaxed),
            frames_dropped: stats.frames_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Drop for Stage {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("effect", &self.transform.kind())
            .field("placeholder", &self.placeholder)
            .field("running", &self.is_running())
            .finish()
    }
}

enum Event {
    Frame(Result<Frame, RecvError>),
    Signal,
}

fn run(shared: Arc<StageShared>, transform: SharedTransform) {
    let effect = transform.label();
    // Wake-ups left over from before this worker existed
    shared.wake_rx.drain().for_each(drop);

    loop {
        if shared.is_cancelled() {
            break;
        }

        let Some(ports) = shared.ports.load_full() else {
            // Unbound: park until bound or cancelled
            let _ = shared.wake_rx.recv();
            continue;
        };

        let event = Selector::new()
            .recv(ports.input.receiver(), Event::Frame)
            .recv(&shared.wake_rx, |_| Event::Signal)
            .wait();

        let frame = match event {
            Event::Frame(Ok(frame)) => frame,
            // Rebind or cancel, re-read state at the top
            Event::Frame(Err(_)) | Event::Signal => continue,
        };
        shared.stats.frames_read.fetch_add(1, Ordering::Relaxed);

        if shared.is_cancelled() {
            break;
        }

        let frame = transform.apply(frame);

        // The consumer of our output may already be gone
        if shared.is_cancelled() {
            break;
        }

        // A frame transformed under one wiring must not reach another
        // stage's input: its remaining effects would no longer match.
        let _push = shared.push_guard();
        let rewired = shared
            .ports
            .load()
            .as_ref()
            .map_or(true, |current| !current.output.same_channel(&ports.output));
        if rewired {
            shared.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            debug!(effect, sequence = frame.sequence(), "Output rewired during transform, frame discarded");
            continue;
        }

        match ports.output.offer(frame) {
            Offer::Accepted => {
                shared.stats.frames_written.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("frameflow_stage_frames_processed_total", "effect" => effect)
                    .increment(1);
            }
            Offer::Dropped | Offer::Closed => {
                shared.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("frameflow_stage_frames_dropped_total", "effect" => effect)
                    .increment(1);
                trace!(effect, "Output full, frame dropped");
            }
        }
    }
}

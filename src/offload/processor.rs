//! Frame processor: single entry and exit point of the engine
//!
//! ```text
//! submit ──► unprocessed ──► [Pipeline replicas] ──► processed ──► Reorder ──► retrieve
//!    │                                                   ▲
//!    └─► encode ─► batch ─► RemoteEndpoint ─► on_result ─┘
//! ```
//!
//! Remote mode is chosen once, at construction. Remote batches run on the
//! tokio runtime handed in with [`RemoteLink`]; the caller never waits on
//! the network.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, trace, warn};

use crate::effects::{EffectKind, SharedTransform};
use crate::error::{PipelineError, PipelineResult, RemoteError};
use crate::frame::{Frame, FrameCodec};
use crate::pipeline::{FrameChannel, Offer, Pipeline, StageStats};
use crate::Config;

use super::remote::{EncodedFrame, RemoteEndpoint};
use super::reorder::Reorder;

/// Everything needed to offload frames
#[derive(Clone)]
pub struct RemoteLink {
    pub endpoint: Arc<dyn RemoteEndpoint>,
    pub codec: Arc<dyn FrameCodec>,
    pub runtime: Handle,
}

/// Topology mirroring calls, applied in order by one task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MirrorOp {
    Configure(EffectKind),
    Clear,
}

struct Remote {
    link: RemoteLink,
    batch: Mutex<Vec<EncodedFrame>>,
    threshold: usize,
    mirror_tx: UnboundedSender<MirrorOp>,
}

/// Where remote results land; shared with in-flight batch tasks.
struct Inbox {
    processed: FrameChannel,
    pending: AtomicUsize,
}

impl Inbox {
    fn on_result(&self, results: Vec<EncodedFrame>, sent: usize, codec: &dyn FrameCodec) {
        let received = results.len();
        debug!(received, sent, "Remote batch completed");

        for encoded in results {
            match codec.decode(&encoded.payload) {
                Ok(frame) => {
                    if self.processed.offer(frame.with_sequence(encoded.sequence)) != Offer::Accepted {
                        trace!(sequence = encoded.sequence, "Processed queue full, remote frame dropped");
                    }
                }
                Err(err) => {
                    // One bad frame must not sink the rest of the batch
                    warn!(sequence = encoded.sequence, "Failed to decode remote frame: {err}");
                    metrics::counter!("frameflow_remote_decode_failures_total").increment(1);
                }
            }
        }

        if received < sent {
            warn!(lost = sent - received, "Remote batch returned fewer frames than sent");
        }
        self.settle(sent);
    }

    fn on_error(&self, err: RemoteError, sent: usize) {
        error!(frames = sent, "Remote batch failed: {err}");
        metrics::counter!("frameflow_remote_failures_total").increment(1);
        self.settle(sent);
    }

    /// Saturating decrement of the pending counter
    fn settle(&self, frames: usize) {
        let previous = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(frames)))
            .unwrap_or_default();
        metrics::gauge!("frameflow_remote_pending").set(previous.saturating_sub(frames) as f64);
    }
}

/// A dispatched batch not yet settled.
///
/// If the batch task is dropped before it finishes, as when the runtime
/// shuts down, the batch is settled as failed.
struct InFlight {
    inbox: Option<Arc<Inbox>>,
    sent: usize,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Some(inbox) = self.inbox.take() {
            inbox.on_error(RemoteError::Transport("batch task abandoned".into()), self.sent);
        }
    }
}

/// Offload coordinator owning the pipeline replicas and boundary channels.
pub struct FrameProcessor {
    unprocessed: FrameChannel,
    inbox: Arc<Inbox>,
    pipelines: Mutex<Vec<Pipeline>>,
    remote: Option<Remote>,
    next_sequence: AtomicU64,
    last_frame: Mutex<Option<Frame>>,
    egress: Mutex<Reorder>,
    drain_poll: Duration,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FrameProcessor {
    /// Local-only processor.
    pub fn new(config: &Config, effects: Vec<SharedTransform>) -> Self {
        Self::build(config, effects, None)
    }

    /// Processor that offloads to `link` when `config.offload.enabled`.
    pub fn with_remote(config: &Config, effects: Vec<SharedTransform>, link: RemoteLink) -> Self {
        Self::build(config, effects, Some(link))
    }

    fn build(config: &Config, effects: Vec<SharedTransform>, link: Option<RemoteLink>) -> Self {
        let capacity = config.pipeline.channel_capacity.max(1);
        let unprocessed = FrameChannel::bounded(capacity);
        let processed = FrameChannel::bounded(capacity);

        let first = Pipeline::new(unprocessed.clone(), processed.clone(), effects);
        let mut pipelines = Vec::with_capacity(config.pipeline.replicas.max(1));
        for _ in 1..config.pipeline.replicas.max(1) {
            pipelines.push(first.replicate());
        }
        pipelines.insert(0, first);

        let remote = link.filter(|_| config.offload.enabled).map(|link| {
            let (mirror_tx, mirror_rx) = mpsc::unbounded_channel();
            link.runtime.spawn(mirror_loop(Arc::clone(&link.endpoint), mirror_rx));
            Remote {
                link,
                batch: Mutex::new(Vec::new()),
                threshold: config.offload.batch_threshold,
                mirror_tx,
            }
        });

        let processor = Self {
            unprocessed,
            inbox: Arc::new(Inbox {
                processed,
                pending: AtomicUsize::new(0),
            }),
            pipelines: Mutex::new(pipelines),
            remote,
            next_sequence: AtomicU64::new(0),
            last_frame: Mutex::new(None),
            egress: Mutex::new(Reorder::new()),
            drain_poll: Duration::from_millis(config.offload.drain_poll_ms.max(1)),
        };

        info!(
            replicas = config.pipeline.replicas.max(1),
            capacity,
            remote = processor.is_remote(),
            "Frame processor ready"
        );
        processor.mirror_all();
        processor
    }

    pub fn is_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Frames dispatched remotely whose results have not come back
    pub fn pending(&self) -> usize {
        self.inbox.pending.load(Ordering::Acquire)
    }

    // ── Ingress / egress ──

    /// Hand a frame to the engine. Never blocks.
    pub fn submit(&self, frame: Frame) {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let frame = frame.with_sequence(sequence);
        *lock(&self.last_frame) = Some(frame.clone());

        match &self.remote {
            Some(remote) => self.submit_remote(remote, frame),
            None => {
                if self.unprocessed.offer(frame) != Offer::Accepted {
                    trace!(sequence, "Unprocessed queue full, frame dropped");
                }
            }
        }
    }

    fn submit_remote(&self, remote: &Remote, frame: Frame) {
        let sequence = frame.sequence();
        let payload = match remote.link.codec.encode(&frame) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(sequence, "Failed to encode frame for offload: {err}");
                return;
            }
        };

        self.inbox.pending.fetch_add(1, Ordering::AcqRel);
        let ready = {
            let mut batch = lock(&remote.batch);
            batch.push(EncodedFrame { sequence, payload });
            if batch.len() > remote.threshold {
                std::mem::take(&mut *batch)
            } else {
                Vec::new()
            }
        };

        if !ready.is_empty() {
            self.dispatch(remote, ready);
        }
    }

    fn dispatch(&self, remote: &Remote, batch: Vec<EncodedFrame>) {
        let sent = batch.len();
        let endpoint = Arc::clone(&remote.link.endpoint);
        let codec = Arc::clone(&remote.link.codec);
        // Moved into the task so it is dropped even if the task never runs
        let in_flight = InFlight {
            inbox: Some(Arc::clone(&self.inbox)),
            sent,
        };

        debug!(frames = sent, "Dispatching remote batch");
        metrics::counter!("frameflow_remote_batches_total").increment(1);
        remote.link.runtime.spawn(async move {
            let mut in_flight = in_flight;
            let result = endpoint.send_batch(batch).await;
            let Some(inbox) = in_flight.inbox.take() else {
                return;
            };
            match result {
                Ok(results) => inbox.on_result(results, sent, codec.as_ref()),
                Err(err) => inbox.on_error(err, sent),
            }
        });
    }

    /// Next processed frame, lowest sequence first.
    ///
    /// Processed frames never come out older than a processed frame returned
    /// before. Local mode blocks until one is ready. Remote mode never
    /// blocks: with no result queued it returns the last submitted frame
    /// unprocessed, and `None` only if nothing was ever submitted. That raw
    /// fallback is a preview of the newest input and does not take part in
    /// the ordering, so older processed results may still follow it.
    pub fn retrieve(&self) -> Option<Frame> {
        if self.is_remote() {
            return self.retrieve_remote();
        }
        self.retrieve_local(None)
    }

    /// Like [`retrieve`](Self::retrieve) but gives up after `timeout` in local mode.
    pub fn retrieve_timeout(&self, timeout: Duration) -> Option<Frame> {
        if self.is_remote() {
            return self.retrieve_remote();
        }
        self.retrieve_local(Some(Instant::now() + timeout))
    }

    fn retrieve_remote(&self) -> Option<Frame> {
        let processed = self.inbox.processed.receiver();
        let mut egress = lock(&self.egress);
        egress.absorb(processed, self.inbox.processed.capacity());
        egress.pop().or_else(|| lock(&self.last_frame).clone())
    }

    fn retrieve_local(&self, deadline: Option<Instant>) -> Option<Frame> {
        let processed = self.inbox.processed.receiver();
        let limit = self.inbox.processed.capacity();
        loop {
            {
                let mut egress = lock(&self.egress);
                egress.absorb(processed, limit);
                if let Some(frame) = egress.pop() {
                    return Some(frame);
                }
            }

            // No lock held while parked
            let frame = match deadline {
                Some(deadline) => processed.recv_deadline(deadline).ok()?,
                None => processed.recv().ok()?,
            };
            lock(&self.egress).push(frame);
        }
    }

    /// Last frame handed to [`submit`](Self::submit), unprocessed
    pub fn last_frame(&self) -> Option<Frame> {
        lock(&self.last_frame).clone()
    }

    // ── Topology ──

    pub fn list_effects(&self) -> Vec<SharedTransform> {
        lock(&self.pipelines)
            .first()
            .map(Pipeline::list_effects)
            .unwrap_or_default()
    }

    /// Append `transform` to every replica and the remote chain.
    pub fn add_effect(&self, transform: SharedTransform) -> PipelineResult<()> {
        let kind = transform.kind();
        for pipeline in lock(&self.pipelines).iter_mut() {
            pipeline.append(Arc::clone(&transform))?;
        }
        if kind.remote_name().is_some() {
            self.mirror(MirrorOp::Configure(kind));
        }
        Ok(())
    }

    pub fn insert_effect(&self, index: usize, transform: SharedTransform) -> PipelineResult<()> {
        for pipeline in lock(&self.pipelines).iter_mut() {
            pipeline.insert_at(index, Arc::clone(&transform))?;
        }
        self.mirror_all();
        Ok(())
    }

    pub fn remove_effect(&self, index: usize) -> PipelineResult<SharedTransform> {
        let mut removed = None;
        for pipeline in lock(&self.pipelines).iter_mut() {
            removed = Some(pipeline.remove_at(index)?);
        }
        self.mirror_all();
        // At least one replica always exists
        removed.ok_or(PipelineError::IndexOutOfRange { index, len: 0 })
    }

    pub fn move_effect(&self, from: usize, to: usize) -> PipelineResult<()> {
        for pipeline in lock(&self.pipelines).iter_mut() {
            pipeline.move_effect(from, to)?;
        }
        self.mirror_all();
        Ok(())
    }

    pub fn clear_effects(&self) -> PipelineResult<()> {
        for pipeline in lock(&self.pipelines).iter_mut() {
            pipeline.clear_effects()?;
        }
        self.mirror(MirrorOp::Clear);
        Ok(())
    }

    fn mirror(&self, op: MirrorOp) {
        if let Some(remote) = &self.remote {
            // Receiver lives as long as the runtime
            let _ = remote.mirror_tx.send(op);
        }
    }

    /// Rebuild the remote chain from the local one.
    fn mirror_all(&self) {
        if self.remote.is_none() {
            return;
        }
        self.mirror(MirrorOp::Clear);
        for transform in self.list_effects() {
            if transform.kind().remote_name().is_some() {
                self.mirror(MirrorOp::Configure(transform.kind()));
            }
        }
    }

    // ── Lifecycle ──

    pub fn start(&self) -> PipelineResult<()> {
        for pipeline in lock(&self.pipelines).iter_mut() {
            pipeline.start()?;
        }
        Ok(())
    }

    /// Stop every replica and empty both boundary channels.
    pub fn stop(&self) {
        for pipeline in lock(&self.pipelines).iter_mut() {
            pipeline.stop();
        }
        let dropped = self.unprocessed.clear() + self.inbox.processed.clear();
        lock(&self.egress).clear();
        debug!(dropped, "Frame processor stopped");
    }

    /// Dispatch a partially filled remote batch.
    pub fn flush(&self) {
        let Some(remote) = &self.remote else {
            return;
        };
        let batch = std::mem::take(&mut *lock(&remote.batch));
        if !batch.is_empty() {
            self.dispatch(remote, batch);
        }
    }

    /// Block until every remote frame has come back or failed.
    pub fn drain(&self) {
        self.flush();
        while self.pending() > 0 {
            thread::sleep(self.drain_poll);
        }
    }

    /// [`drain`](Self::drain) with a deadline. Returns `true` if fully drained.
    pub fn drain_timeout(&self, timeout: Duration) -> bool {
        self.flush();
        let deadline = Instant::now() + timeout;
        while self.pending() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(self.drain_poll);
        }
        true
    }

    /// Per-replica stage counters
    pub fn stats(&self) -> Vec<Vec<StageStats>> {
        lock(&self.pipelines).iter().map(Pipeline::stats).collect()
    }
}

async fn mirror_loop(endpoint: Arc<dyn RemoteEndpoint>, mut ops: UnboundedReceiver<MirrorOp>) {
    while let Some(op) = ops.recv().await {
        let result = match op {
            MirrorOp::Configure(kind) => endpoint.configure_effect(kind).await,
            MirrorOp::Clear => endpoint.clear_effects().await,
        };
        if let Err(err) = result {
            warn!(?op, "Remote topology update failed: {err}");
        }
    }
    debug!("Remote mirroring stopped");
}

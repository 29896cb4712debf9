//! Remote execution contract and an in-process loopback endpoint

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, instrument};

use crate::effects::{self, EffectKind, SharedTransform};
use crate::error::RemoteError;
use crate::frame::FrameCodec;

/// Boxed future returned by [`RemoteEndpoint`] calls
pub type RemoteFuture<T> = Pin<Box<dyn Future<Output = Result<T, RemoteError>> + Send + 'static>>;

/// One frame on the wire. The sequence number rides next to the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    pub sequence: u64,
    pub payload: Bytes,
}

/// A service that runs its own copy of the effect chain.
///
/// Calls must not block the caller; all work happens when the returned
/// future is polled. Results of `send_batch` keep each input's sequence.
pub trait RemoteEndpoint: Send + Sync {
    fn send_batch(&self, batch: Vec<EncodedFrame>) -> RemoteFuture<Vec<EncodedFrame>>;

    /// Append `kind` to the remote chain.
    fn configure_effect(&self, kind: EffectKind) -> RemoteFuture<()>;

    fn clear_effects(&self) -> RemoteFuture<()>;
}

struct LoopbackInner {
    effects: Mutex<Vec<SharedTransform>>,
    codec: Arc<dyn FrameCodec>,
    latency: Duration,
}

/// Endpoint that runs the chain in-process on the async runtime.
///
/// Stands in for the remote server in the demo binary and in tests.
#[derive(Clone)]
pub struct LoopbackEndpoint {
    inner: Arc<LoopbackInner>,
}

impl LoopbackEndpoint {
    pub fn new(codec: Arc<dyn FrameCodec>) -> Self {
        Self::with_latency(codec, Duration::ZERO)
    }

    /// Delay every batch by `latency` to imitate a network hop.
    pub fn with_latency(codec: Arc<dyn FrameCodec>, latency: Duration) -> Self {
        Self {
            inner: Arc::new(LoopbackInner {
                effects: Mutex::new(Vec::new()),
                codec,
                latency,
            }),
        }
    }

    /// Effects currently configured
    pub fn effects(&self) -> Vec<EffectKind> {
        self.inner
            .effects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|t| t.kind())
            .collect()
    }
}

impl RemoteEndpoint for LoopbackEndpoint {
    #[instrument(skip_all, fields(frames = batch.len()))]
    fn send_batch(&self, batch: Vec<EncodedFrame>) -> RemoteFuture<Vec<EncodedFrame>> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            if !inner.latency.is_zero() {
                tokio::time::sleep(inner.latency).await;
            }

            let chain = inner.effects.lock().unwrap_or_else(PoisonError::into_inner).clone();
            let mut results = Vec::with_capacity(batch.len());
            for encoded in batch {
                let frame = inner.codec.decode(&encoded.payload)?;
                let frame = chain.iter().fold(frame, |frame, t| t.apply(frame));
                results.push(EncodedFrame {
                    sequence: encoded.sequence,
                    payload: inner.codec.encode(&frame)?,
                });
            }
            debug!(frames = results.len(), "Loopback batch processed");
            Ok(results)
        })
    }

    fn configure_effect(&self, kind: EffectKind) -> RemoteFuture<()> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            let transform = effects::from_kind(kind)
                .ok_or_else(|| RemoteError::Rejected(format!("no implementation for {kind}")))?;
            inner.effects.lock().unwrap_or_else(PoisonError::into_inner).push(transform);
            Ok(())
        })
    }

    fn clear_effects(&self) -> RemoteFuture<()> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            inner.effects.lock().unwrap_or_else(PoisonError::into_inner).clear();
            Ok(())
        })
    }
}

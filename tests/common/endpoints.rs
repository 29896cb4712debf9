//! Remote endpoints that misbehave on purpose

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use frameflow::effects::EffectKind;
use frameflow::error::RemoteError;
use frameflow::frame::{FrameCodec, PngCodec};
use frameflow::offload::{EncodedFrame, LoopbackEndpoint, RemoteEndpoint, RemoteFuture, RemoteLink};

/// Every batch fails with a transport error
#[derive(Debug, Default)]
pub struct FailingEndpoint {
    pub batches: AtomicUsize,
}

impl RemoteEndpoint for FailingEndpoint {
    fn send_batch(&self, batch: Vec<EncodedFrame>) -> RemoteFuture<Vec<EncodedFrame>> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        let frames = batch.len();
        Box::pin(async move { Err(RemoteError::Transport(format!("connection reset ({frames} frames)"))) })
    }

    fn configure_effect(&self, _kind: EffectKind) -> RemoteFuture<()> {
        Box::pin(async { Ok(()) })
    }

    fn clear_effects(&self) -> RemoteFuture<()> {
        Box::pin(async { Ok(()) })
    }
}

/// Loopback that garbles the payload of one sequence number
pub struct CorruptingEndpoint {
    pub inner: LoopbackEndpoint,
    pub corrupt: u64,
}

impl RemoteEndpoint for CorruptingEndpoint {
    fn send_batch(&self, batch: Vec<EncodedFrame>) -> RemoteFuture<Vec<EncodedFrame>> {
        let results = self.inner.send_batch(batch);
        let corrupt = self.corrupt;
        Box::pin(async move {
            let mut results = results.await?;
            for encoded in &mut results {
                if encoded.sequence == corrupt {
                    encoded.payload = Bytes::from_static(b"not a png");
                }
            }
            Ok(results)
        })
    }

    fn configure_effect(&self, kind: EffectKind) -> RemoteFuture<()> {
        self.inner.configure_effect(kind)
    }

    fn clear_effects(&self) -> RemoteFuture<()> {
        self.inner.clear_effects()
    }
}

pub fn link(endpoint: Arc<dyn RemoteEndpoint>, runtime: &tokio::runtime::Runtime) -> RemoteLink {
    let codec: Arc<dyn FrameCodec> = Arc::new(PngCodec);
    RemoteLink {
        endpoint,
        codec,
        runtime: runtime.handle().clone(),
    }
}

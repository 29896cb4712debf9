//! Offload coordination: local pipelines, remote batches, ordered egress

pub mod processor;
pub mod remote;
pub mod reorder;

pub use processor::{FrameProcessor, RemoteLink};
pub use remote::{EncodedFrame, LoopbackEndpoint, RemoteEndpoint, RemoteFuture};
pub use reorder::Reorder;

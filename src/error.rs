//! Library error types.

use thiserror::Error;

/// Errors raised synchronously by topology mutation.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Effect index {index} out of range (pipeline has {len} effects)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Failed to spawn stage worker: {0}")]
    WorkerSpawn(#[from] std::io::Error),
}

/// Errors from the frame wire codec.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Pixel buffer does not match {width}x{height}")]
    BufferSize { width: u32, height: u32 },

    #[error("Image codec error: {0}")]
    Image(#[from] image::ImageError),
}

/// Errors reported by a remote endpoint.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Remote rejected request: {0}")]
    Rejected(String),

    #[error("Remote codec failure: {0}")]
    Codec(#[from] CodecError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Unknown effect in configuration: {0}")]
    UnknownEffect(String),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

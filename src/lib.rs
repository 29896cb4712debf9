pub mod effects;
pub mod error;
pub mod frame;
pub mod offload;
pub mod pipeline;
pub mod utils;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::effects::{EffectKind, SharedTransform};
use crate::error::ConfigError;

pub use frame::{Frame, FrameMetadata, PixelFormat};
pub use offload::FrameProcessor;
pub use pipeline::Pipeline;

/// Environment prefix for overrides, e.g. `FRAMEFLOW__OFFLOAD__ENABLED=true`
pub const ENV_PREFIX: &str = "FRAMEFLOW";

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub offload: OffloadConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Capacity of every channel, fixed for the pipeline's lifetime
    pub channel_capacity: usize,
    /// Pipelines sharing the same boundary channels
    pub replicas: usize,
    /// Initial effect chain
    pub effects: Vec<EffectKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OffloadConfig {
    /// Route frames to the remote endpoint when one is attached
    pub enabled: bool,
    /// A batch is dispatched once it holds more than this many frames
    pub batch_threshold: usize,
    pub drain_poll_ms: u64,
    /// Artificial delay for the loopback endpoint
    pub simulated_latency_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, `RUST_LOG` wins if set
    pub filter: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: pipeline::DEFAULT_CAPACITY,
            replicas: 1,
            effects: Vec::new(),
        }
    }
}

impl Default for OffloadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            batch_threshold: 1,
            drain_poll_ms: 5,
            simulated_latency_ms: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "frameflow=info".into(),
        }
    }
}

impl Config {
    /// Defaults, then the optional TOML file at `path`, then environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Local implementations of the configured effect chain.
    pub fn build_effects(&self) -> Result<Vec<SharedTransform>, ConfigError> {
        self.pipeline
            .effects
            .iter()
            .map(|&kind| effects::from_kind(kind).ok_or_else(|| ConfigError::UnknownEffect(kind.to_string())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.pipeline.channel_capacity, 2);
        assert_eq!(config.pipeline.replicas, 1);
        assert!(!config.offload.enabled);
        assert_eq!(config.offload.batch_threshold, 1);
    }

    #[test]
    fn test_load_toml_file() {
        let path = std::env::temp_dir().join(format!("frameflow-config-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[pipeline]\nreplicas = 2\neffects = [\"grayscale\", \"negative\"]\n\n[offload]\nenabled = true"
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.pipeline.replicas, 2);
        assert_eq!(config.pipeline.channel_capacity, 2);
        assert_eq!(config.pipeline.effects, [EffectKind::Grayscale, EffectKind::Negative]);
        assert!(config.offload.enabled);
        assert_eq!(config.build_effects().unwrap().len(), 2);
    }

    #[test]
    fn test_unimplemented_effect_rejected() {
        let mut config = Config::default();
        config.pipeline.effects = vec![EffectKind::SeamCarve];
        assert!(matches!(config.build_effects(), Err(ConfigError::UnknownEffect(_))));
    }
}

//! Pipeline configuration.

use crate::decoder::DEFAULT_MAX_BUFFER_SAMPLES;
use crate::error::ConfigError;
use eyre::{Result as EyreResult, WrapErr};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What a worker does when the decoder fails on one utterance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Log the failure, count it, and continue with the next utterance
    Skip,
    /// Stop the worker and fail the whole run
    Abort,
}

/// Configuration for [`DataPipeline`](crate::pipeline::DataPipeline).
///
/// The uid-to-path mapping and the decoder factory are code, not data, and
/// are passed to the pipeline separately.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Manifest with one uid per line
    pub manifest_path: PathBuf,

    /// Number of worker threads, each owning one shard
    pub num_workers: usize,

    /// Target rows per batch; the last batch of a run may be smaller
    pub batch_size: usize,

    /// Decode buffer capacity per worker, in samples
    #[serde(default = "default_max_buffer_samples")]
    pub max_buffer_samples: usize,

    /// Decoded samples that may wait in the worker-to-consumer channel
    pub queue_capacity: usize,

    /// Policy for per-utterance decode failures
    pub on_decode_error: ErrorPolicy,

    /// Fail the run when no worker delivers for this long; unbounded if unset
    #[serde(default)]
    pub stall_timeout_ms: Option<u64>,
}

fn default_max_buffer_samples() -> usize {
    DEFAULT_MAX_BUFFER_SAMPLES
}

impl PipelineConfig {
    /// Create a configuration with the default buffer capacity, a queue of
    /// one batch, and no stall timeout.
    pub fn new(
        manifest_path: impl Into<PathBuf>,
        num_workers: usize,
        batch_size: usize,
        on_decode_error: ErrorPolicy,
    ) -> Self {
        Self {
            manifest_path: manifest_path.into(),
            num_workers,
            batch_size,
            max_buffer_samples: DEFAULT_MAX_BUFFER_SAMPLES,
            queue_capacity: batch_size,
            on_decode_error,
            stall_timeout_ms: None,
        }
    }

    pub fn with_max_buffer_samples(mut self, max_buffer_samples: usize) -> Self {
        self.max_buffer_samples = max_buffer_samples;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn stall_timeout(&self) -> Option<Duration> {
        self.stall_timeout_ms.map(Duration::from_millis)
    }

    /// Check every size limit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_workers == 0 {
            return Err(ConfigError::InvalidWorkerCount(self.num_workers));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }
        if self.max_buffer_samples == 0 {
            return Err(ConfigError::InvalidBufferCapacity(self.max_buffer_samples));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidQueueCapacity(self.queue_capacity));
        }
        if self.stall_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidStallTimeout(0));
        }
        Ok(())
    }

    /// Load and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> EyreResult<Self> {
        let path = path.as_ref();

        let text = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read config: {:?}", path.display()))?;

        let config: Self = serde_json::from_str(&text)
            .wrap_err_with(|| format!("failed to parse config: {:?}", path.display()))?;

        config
            .validate()
            .wrap_err_with(|| format!("invalid config: {:?}", path.display()))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_applies_documented_defaults() {
        let config = PipelineConfig::new("data/sample-100.uid", 4, 10, ErrorPolicy::Skip);

        assert_eq!(config.max_buffer_samples, 160_000);
        assert_eq!(config.queue_capacity, 10);
        assert_eq!(config.stall_timeout(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_sizes() {
        let base = PipelineConfig::new("m.uid", 2, 4, ErrorPolicy::Abort);

        let cases = [
            PipelineConfig {
                num_workers: 0,
                ..base.clone()
            },
            PipelineConfig {
                batch_size: 0,
                ..base.clone()
            },
            base.clone().with_max_buffer_samples(0),
            base.clone().with_queue_capacity(0),
            base.clone().with_stall_timeout(Duration::ZERO),
        ];

        let errors: Vec<_> = cases.iter().map(|c| c.validate().unwrap_err()).collect();
        assert!(matches!(errors[0], ConfigError::InvalidWorkerCount(0)));
        assert!(matches!(errors[1], ConfigError::InvalidBatchSize(0)));
        assert!(matches!(errors[2], ConfigError::InvalidBufferCapacity(0)));
        assert!(matches!(errors[3], ConfigError::InvalidQueueCapacity(0)));
        assert!(matches!(errors[4], ConfigError::InvalidStallTimeout(0)));
    }

    #[test]
    fn accepts_short_nonzero_stall_timeout() {
        let config = PipelineConfig::new("m.uid", 1, 1, ErrorPolicy::Skip)
            .with_stall_timeout(Duration::from_millis(1));

        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_json_with_buffer_default() {
        let json = r#"{
            "manifest_path": "data/sample-100.uid",
            "num_workers": 3,
            "batch_size": 4,
            "queue_capacity": 8,
            "on_decode_error": "skip",
            "stall_timeout_ms": 30000
        }"#;

        let config: PipelineConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.num_workers, 3);
        assert_eq!(config.max_buffer_samples, DEFAULT_MAX_BUFFER_SAMPLES);
        assert_eq!(config.on_decode_error, ErrorPolicy::Skip);
        assert_eq!(config.stall_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn json_requires_error_policy() {
        let json = r#"{
            "manifest_path": "m.uid",
            "num_workers": 1,
            "batch_size": 1,
            "queue_capacity": 1
        }"#;

        assert!(serde_json::from_str::<PipelineConfig>(json).is_err());
    }

    #[test]
    fn from_json_file_validates() {
        let name = format!("voxshard-config-{}.json", std::process::id());
        let path = std::env::temp_dir().join(name);
        let config = PipelineConfig::new("m.uid", 0, 2, ErrorPolicy::Abort);
        std::fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();

        let err = PipelineConfig::from_json_file(&path).unwrap_err();

        assert!(err.to_string().contains("invalid config"));
        std::fs::remove_file(path).ok();
    }
}

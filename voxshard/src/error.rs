//! Error types for voxshard organized by pipeline stage.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Error reported by an [`AudioDecoder`](crate::decoder::AudioDecoder) implementation.
///
/// Decoders are external collaborators, so their failures are carried opaquely.
pub type DecoderError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Pipeline error variants organized by processing stage.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration stage error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Manifest loading stage error
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Shard assignment stage error
    #[error(transparent)]
    Shard(#[from] ShardError),

    /// Per-utterance decode error
    #[error(transparent)]
    Sample(#[from] SampleError),

    /// Batch collation error
    #[error(transparent)]
    Collate(#[from] CollateError),

    /// Worker orchestration error
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid worker count: {0} (minimum 1)")]
    InvalidWorkerCount(usize),

    #[error("invalid batch size: {0} (minimum 1)")]
    InvalidBatchSize(usize),

    #[error("invalid decode buffer capacity: {0} samples (minimum 1)")]
    InvalidBufferCapacity(usize),

    #[error("invalid queue capacity: {0} (minimum 1)")]
    InvalidQueueCapacity(usize),

    #[error("invalid stall timeout: {0}ms (minimum 1)")]
    InvalidStallTimeout(u64),
}

/// Manifest loading errors.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Manifest file could not be opened
    #[error("failed to open manifest {path:?}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A line could not be read (I/O failure or invalid UTF-8)
    #[error("failed to read manifest {path:?} at line {line}")]
    Read {
        path: PathBuf,
        line: usize,
        #[source]
        source: std::io::Error,
    },
}

/// A uid without an extractable numeric serial suffix.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("malformed uid {uid:?}: no numeric serial suffix")]
pub struct MalformedUidError {
    pub uid: String,
}

/// Shard assignment errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShardError {
    #[error(transparent)]
    Malformed(#[from] MalformedUidError),

    #[error("worker index {worker} out of range for {num_workers} workers")]
    WorkerOutOfRange { worker: usize, num_workers: usize },
}

/// Per-utterance errors raised while producing decoded samples.
#[derive(Debug, Error)]
pub enum SampleError {
    /// The decoder failed on one file
    #[error("failed to decode {uid} ({path:?})")]
    Decode {
        uid: String,
        path: PathBuf,
        #[source]
        source: DecoderError,
    },
}

impl SampleError {
    /// Uid of the utterance that failed.
    pub fn uid(&self) -> &str {
        match self {
            SampleError::Decode { uid, .. } => uid,
        }
    }
}

/// Decoded stream exceeded the decode buffer capacity.
///
/// Not propagated as a failure: it is attached to the truncated sample so the
/// loss is always visible to the consumer.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("decoded stream exceeded buffer capacity of {capacity} samples ({dropped} dropped)")]
pub struct BufferOverflow {
    pub capacity: usize,
    pub dropped: usize,
}

/// Batch collation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CollateError {
    #[error("cannot collate an empty batch")]
    EmptyBatch,
}

/// Worker orchestration errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Worker thread could not be spawned
    #[error("failed to spawn worker {worker}")]
    Spawn {
        worker: usize,
        #[source]
        source: std::io::Error,
    },

    /// Worker exited without reporting completion (panic)
    #[error("worker {worker} crashed: {message}")]
    WorkerCrashed { worker: usize, message: String },

    /// Worker stopped on a decode error under the abort policy
    #[error("worker {worker} aborted")]
    WorkerAborted {
        worker: usize,
        #[source]
        source: SampleError,
    },

    /// No worker delivered anything within the stall timeout
    #[error("no decoded sample arrived within {timeout:?}")]
    Stalled { timeout: Duration },
}

/// Audio format errors raised by [`WavDecoder`](crate::decoder::WavDecoder).
#[derive(Debug, Error)]
pub enum AudioError {
    /// Sample rate validation failed
    #[error("invalid sample rate: expected {expected}Hz, got {got}Hz")]
    InvalidSampleRate { expected: u32, got: u32 },

    /// Channel count validation failed
    #[error("invalid channel count: expected mono, got {0} channels")]
    InvalidChannels(u16),

    /// Sample encoding validation failed
    #[error("invalid sample format: expected 16-bit integer PCM, got {bits}-bit {format}")]
    InvalidSampleFormat { bits: u16, format: &'static str },

    /// WAV file format error
    #[error(transparent)]
    Hound(#[from] hound::Error),
}

/// Decode interrupted by pipeline shutdown.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("decode cancelled")]
pub struct Cancelled;

/// Result type alias for voxshard operations.
pub type Result<T> = std::result::Result<T, Error>;

// MalformedUidError → ShardError → Error
impl From<MalformedUidError> for Error {
    fn from(e: MalformedUidError) -> Self {
        Error::Shard(ShardError::Malformed(e))
    }
}

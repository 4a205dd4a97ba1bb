//! voxshard: Sharded multi-worker audio decoding into padded training batches.
//!
//! A manifest of utterance ids is partitioned across worker threads by the
//! numeric serial at the end of each uid. Every worker decodes its shard in
//! order through one reusable PCM buffer, and the consumer groups the merged
//! output into zero-padded batches with attention masks.
//!
//! # Architecture
//!
//! - [`manifest::UtteranceIndex`]: Ordered uid list loaded from a manifest file
//! - [`shard::ShardAssigner`]: Deterministic `serial % num_workers` partitioning
//! - [`resolve::PathResolver`]: Maps uids to audio files ([`resolve::BucketedLayout`], closures)
//! - [`decoder::AudioDecoder`]: Decoding capability writing into a [`decoder::PcmBuffer`]
//! - [`source::WorkerAudioSource`]: Sequential per-worker producer
//! - [`collate::BatchCollator`]: Pads samples into `input_values` / `attention_mask`
//! - [`pipeline::DataPipeline`]: Spawns workers and yields [`types::Batch`]es
//!
//! # Quick Start
//!
//! ```ignore
//! use voxshard::config::{ErrorPolicy, PipelineConfig};
//! use voxshard::decoder::WavDecoder;
//! use voxshard::pipeline::DataPipeline;
//! use voxshard::resolve::BucketedLayout;
//!
//! let config = PipelineConfig::new("data/sample-100.uid", 4, 10, ErrorPolicy::Skip);
//! let layout = BucketedLayout::new("data/wav", "wav");
//! let pipeline = DataPipeline::new(config, layout, |_worker| WavDecoder)?;
//!
//! for batch in pipeline.run()? {
//!     let batch = batch?;
//!     println!("{:?} {:?}", batch.uids, batch.input_values.dim());
//! }
//! ```

pub mod collate;
pub mod config;
pub mod decoder;
pub mod error;
pub mod manifest;
pub mod pipeline;
pub mod resolve;
pub mod shard;
pub mod source;
pub mod types;

pub use error::{Error, Result};

//! Core types for voxshard

use crate::error::BufferOverflow;
use ndarray::Array2;
use std::path::PathBuf;

/// One utterance of the corpus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Utterance {
    /// Globally unique id ending in a numeric serial
    pub uid: String,
    /// Location of the encoded audio file
    pub path: PathBuf,
}

impl Utterance {
    pub fn new(uid: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            uid: uid.into(),
            path: path.into(),
        }
    }
}

/// PCM samples decoded from one utterance.
///
/// Samples are mono 16 kHz 16-bit signed, by contract with the decoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedSample {
    pub uid: String,
    pub samples: Vec<i16>,
    /// Set when the decoder produced more samples than the buffer could hold
    pub overflow: Option<BufferOverflow>,
}

impl DecodedSample {
    pub fn new(uid: impl Into<String>, samples: Vec<i16>) -> Self {
        Self {
            uid: uid.into(),
            samples,
            overflow: None,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_truncated(&self) -> bool {
        self.overflow.is_some()
    }
}

/// Padded batch handed to the consumer.
///
/// Invariants, for every row `i` with `n = lengths[i]`:
/// - `input_values[i][..n]` holds the decoded samples, the rest is `PAD_VALUE`
/// - `attention_mask[i][..n]` is 1, the rest is `PAD_MASK`
#[derive(Clone, Debug)]
pub struct Batch {
    pub uids: Vec<String>,
    pub lengths: Vec<usize>,
    /// Per-row truncation flag
    pub truncated: Vec<bool>,
    /// Shape `[batch_size, max_len]`
    pub input_values: Array2<i16>,
    /// Shape `[batch_size, max_len]`
    pub attention_mask: Array2<i16>,
}

impl Batch {
    pub fn batch_size(&self) -> usize {
        self.input_values.nrows()
    }

    pub fn max_len(&self) -> usize {
        self.input_values.ncols()
    }

    /// Total number of real (non-padding) samples.
    pub fn sample_count(&self) -> usize {
        self.lengths.iter().sum()
    }
}

//! Per-worker producer of decoded samples.

use crate::decoder::{AudioDecoder, PcmBuffer};
use crate::error::{BufferOverflow, SampleError};
use crate::types::{DecodedSample, Utterance};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Decodes one worker's shard, in order, through a single reusable buffer.
///
/// Decoding is strictly sequential: each call blocks until the decoder has
/// finished the current utterance, and nothing is decoded ahead of the caller.
pub struct WorkerAudioSource<D> {
    worker: usize,
    shard: Vec<Utterance>,
    decoder: D,
    buffer: PcmBuffer,
    position: usize,
}

/// Borrowed view of the buffer after one decode.
///
/// Valid until the next call to [`WorkerAudioSource::next_view`].
#[derive(Debug)]
pub struct SampleView<'a> {
    pub utterance: &'a Utterance,
    pub samples: &'a [i16],
    pub overflow: Option<BufferOverflow>,
}

impl SampleView<'_> {
    /// Copy the view out of the shared buffer.
    pub fn to_decoded(&self) -> DecodedSample {
        DecodedSample {
            uid: self.utterance.uid.clone(),
            samples: self.samples.to_vec(),
            overflow: self.overflow,
        }
    }
}

impl<D: AudioDecoder> WorkerAudioSource<D> {
    /// Create a source with a decode buffer of `max_buffer_samples` samples.
    pub fn new(
        worker: usize,
        shard: Vec<Utterance>,
        decoder: D,
        max_buffer_samples: usize,
    ) -> Self {
        Self {
            worker,
            shard,
            decoder,
            buffer: PcmBuffer::with_capacity(max_buffer_samples),
            position: 0,
        }
    }

    /// Interrupt in-flight decodes once `flag` is raised.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.buffer = self.buffer.with_cancel_flag(flag);
        self
    }

    /// Utterances not yet decoded.
    pub fn remaining(&self) -> usize {
        self.shard.len() - self.position
    }

    /// Decode the next utterance of the shard.
    ///
    /// Returns `None` once the shard is exhausted. A decode failure is
    /// returned for that utterance only; the following call moves on to the
    /// next one.
    pub fn next_view(&mut self) -> Option<Result<SampleView<'_>, SampleError>> {
        let utterance = self.shard.get(self.position)?;
        self.position += 1;

        self.buffer.reset();

        if let Err(source) = self.decoder.decode(&utterance.path, &mut self.buffer) {
            return Some(Err(SampleError::Decode {
                uid: utterance.uid.clone(),
                path: utterance.path.clone(),
                source,
            }));
        }

        let overflow = self.buffer.overflowed().then(|| BufferOverflow {
            capacity: self.buffer.capacity(),
            dropped: self.buffer.dropped(),
        });

        if let Some(overflow) = overflow {
            tracing::warn!(
                worker = self.worker,
                uid = %utterance.uid,
                capacity = overflow.capacity,
                dropped = overflow.dropped,
                "decoded audio truncated"
            );
        }

        Some(Ok(SampleView {
            utterance,
            samples: self.buffer.as_slice(),
            overflow,
        }))
    }

    /// Iterate the rest of the shard as owned samples.
    pub fn produce(&mut self) -> Produce<'_, D> {
        Produce { source: self }
    }
}

/// Iterator returned by [`WorkerAudioSource::produce`].
pub struct Produce<'a, D> {
    source: &'a mut WorkerAudioSource<D>,
}

impl<D: AudioDecoder> Iterator for Produce<'_, D> {
    type Item = Result<DecodedSample, SampleError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.source
            .next_view()
            .map(|result| result.map(|view| view.to_decoded()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.source.remaining();
        (remaining, Some(remaining))
    }
}

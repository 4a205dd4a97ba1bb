//! Decoder boundary: the reusable PCM buffer and the [`AudioDecoder`] capability.

use crate::error::{AudioError, Cancelled, DecoderError};
use hound::{SampleFormat, WavReader};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Sample rate of every decoded stream (16kHz)
pub const SAMPLE_RATE: u32 = 16000;

/// Default decode buffer capacity: 10 seconds of 16kHz mono audio
pub const DEFAULT_MAX_BUFFER_SAMPLES: usize = 10 * SAMPLE_RATE as usize;

/// Samples handed to the buffer per write by [`WavDecoder`]
const WAV_CHUNK_SAMPLES: usize = 4096;

/// Decodes one encoded audio file into mono 16kHz 16-bit PCM.
///
/// Implementations write samples into the caller's [`PcmBuffer`] as they are
/// produced and return once the stream ends or fails. The call blocks the
/// calling worker until then.
pub trait AudioDecoder {
    /// Decode the file at `path` into `buffer`.
    ///
    /// The buffer has already been reset. Writes past its capacity are counted
    /// and rejected by the buffer, so implementations do not need to check
    /// capacity themselves. A [`Cancelled`] write error should be propagated.
    fn decode(&mut self, path: &Path, buffer: &mut PcmBuffer) -> Result<(), DecoderError>;
}

impl<D: AudioDecoder + ?Sized> AudioDecoder for Box<D> {
    fn decode(&mut self, path: &Path, buffer: &mut PcmBuffer) -> Result<(), DecoderError> {
        (**self).decode(path, buffer)
    }
}

/// Fixed-capacity PCM buffer reused across decodes.
///
/// The buffer is allocated once. Its length acts as the write cursor: samples
/// beyond `len()` are always zero, so nothing from a previous decode can leak
/// into the current one.
#[derive(Debug)]
pub struct PcmBuffer {
    data: Box<[i16]>,
    len: usize,
    dropped: usize,
    cancel: Option<Arc<AtomicBool>>,
}

impl PcmBuffer {
    /// Allocate a zeroed buffer holding up to `capacity` samples.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity].into_boxed_slice(),
            len: 0,
            dropped: 0,
            cancel: None,
        }
    }

    /// Make writes fail with [`Cancelled`] once `flag` is raised.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Samples written by the current decode.
    pub fn as_slice(&self) -> &[i16] {
        &self.data[..self.len]
    }

    /// Whether the current decode tried to write past capacity.
    pub fn overflowed(&self) -> bool {
        self.dropped > 0
    }

    /// Number of samples rejected because the buffer was full.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Rewind the cursor for a new decode, zeroing what the last one wrote.
    pub fn reset(&mut self) {
        self.data[..self.len].fill(0);
        self.len = 0;
        self.dropped = 0;
    }

    /// Append samples, keeping only what fits.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] without writing if shutdown was requested.
    pub fn extend_from_slice(&mut self, samples: &[i16]) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            return Err(Cancelled);
        }

        let n = samples.len().min(self.capacity() - self.len);
        self.data[self.len..self.len + n].copy_from_slice(&samples[..n]);
        self.len += n;
        self.dropped += samples.len() - n;

        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn tail_is_zeroed(&self) -> bool {
        self.data[self.len..].iter().all(|&s| s == 0)
    }

    /// Append a single sample.
    pub fn push(&mut self, sample: i16) -> Result<(), Cancelled> {
        self.extend_from_slice(&[sample])
    }
}

/// Decoder for 16kHz mono 16-bit PCM WAV files.
///
/// Anything else is rejected; resampling and downmixing belong to whatever
/// produced the files.
#[derive(Clone, Copy, Debug, Default)]
pub struct WavDecoder;

impl AudioDecoder for WavDecoder {
    fn decode(&mut self, path: &Path, buffer: &mut PcmBuffer) -> Result<(), DecoderError> {
        let mut reader = WavReader::open(path).map_err(AudioError::from)?;
        let spec = reader.spec();

        if spec.sample_rate != SAMPLE_RATE {
            return Err(AudioError::InvalidSampleRate {
                expected: SAMPLE_RATE,
                got: spec.sample_rate,
            }
            .into());
        }

        if spec.channels != 1 {
            return Err(AudioError::InvalidChannels(spec.channels).into());
        }

        if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
            let format = match spec.sample_format {
                SampleFormat::Int => "integer",
                SampleFormat::Float => "float",
            };
            return Err(AudioError::InvalidSampleFormat {
                bits: spec.bits_per_sample,
                format,
            }
            .into());
        }

        let mut chunk = [0i16; WAV_CHUNK_SAMPLES];
        let mut n = 0;

        for sample in reader.samples::<i16>() {
            chunk[n] = sample.map_err(AudioError::from)?;
            n += 1;

            if n == WAV_CHUNK_SAMPLES {
                buffer.extend_from_slice(&chunk)?;
                n = 0;
            }
        }

        buffer.extend_from_slice(&chunk[..n])?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};
    use std::path::PathBuf;

    fn create_test_wav(
        name: &str,
        sample_rate: u32,
        channels: u16,
        samples: &[i16],
    ) -> hound::Result<PathBuf> {
        let path = std::env::temp_dir().join(format!("voxshard-{}-{name}", std::process::id()));
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        Ok(path)
    }

    #[test]
    fn buffer_truncates_and_counts_overflow() {
        let mut buffer = PcmBuffer::with_capacity(4);

        buffer.extend_from_slice(&[1, 2, 3]).unwrap();
        buffer.extend_from_slice(&[4, 5, 6]).unwrap();

        assert_eq!(buffer.as_slice(), [1, 2, 3, 4]);
        assert!(buffer.overflowed());
        assert_eq!(buffer.dropped(), 2);
        assert_eq!(buffer.capacity(), 4);
    }

    #[test]
    fn reset_clears_previous_decode() {
        let mut buffer = PcmBuffer::with_capacity(8);
        buffer.extend_from_slice(&[9; 8]).unwrap();
        buffer.push(9).unwrap();

        buffer.reset();
        buffer.extend_from_slice(&[1, 2]).unwrap();

        assert_eq!(buffer.as_slice(), [1, 2]);
        assert!(!buffer.overflowed());
        assert!(buffer.tail_is_zeroed());
    }

    #[test]
    fn cancelled_buffer_rejects_writes() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut buffer = PcmBuffer::with_capacity(8).with_cancel_flag(Arc::clone(&flag));

        buffer.push(1).unwrap();
        flag.store(true, Ordering::Relaxed);

        assert_eq!(buffer.push(2), Err(Cancelled));
        assert_eq!(buffer.as_slice(), [1]);
    }

    #[test]
    fn wav_decoder_reads_mono_16khz() {
        let samples: Vec<i16> = (0..10_000).map(|i| (i % 200) as i16 - 100).collect();
        let path = create_test_wav("mono.wav", SAMPLE_RATE, 1, &samples).unwrap();
        let mut buffer = PcmBuffer::with_capacity(DEFAULT_MAX_BUFFER_SAMPLES);

        WavDecoder.decode(&path, &mut buffer).unwrap();

        assert_eq!(buffer.as_slice(), samples.as_slice());
        assert!(!buffer.overflowed());
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn wav_decoder_flags_overflow() {
        let samples = vec![7i16; 1000];
        let path = create_test_wav("long.wav", SAMPLE_RATE, 1, &samples).unwrap();
        let mut buffer = PcmBuffer::with_capacity(600);

        WavDecoder.decode(&path, &mut buffer).unwrap();

        assert_eq!(buffer.len(), 600);
        assert_eq!(buffer.dropped(), 400);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn wav_decoder_rejects_wrong_sample_rate() {
        let path = create_test_wav("44khz.wav", 44100, 1, &[0, 1]).unwrap();
        let mut buffer = PcmBuffer::with_capacity(16);

        let err = WavDecoder.decode(&path, &mut buffer).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<AudioError>(),
            Some(AudioError::InvalidSampleRate { got: 44100, .. })
        ));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn wav_decoder_rejects_stereo() {
        let path = create_test_wav("stereo.wav", SAMPLE_RATE, 2, &[0, 1, 2, 3]).unwrap();
        let mut buffer = PcmBuffer::with_capacity(16);

        let err = WavDecoder.decode(&path, &mut buffer).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<AudioError>(),
            Some(AudioError::InvalidChannels(2))
        ));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn wav_decoder_reports_missing_file() {
        let mut buffer = PcmBuffer::with_capacity(16);

        let result = WavDecoder.decode(Path::new("/nonexistent/voxshard.wav"), &mut buffer);

        assert!(result.is_err());
    }
}

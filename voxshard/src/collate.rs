//! Padding of variable-length samples into rectangular batches.

use crate::error::CollateError;
use crate::types::{Batch, DecodedSample};
use ndarray::{Array2, ArrayView1, s};

/// Fill value for padded sample positions
pub const PAD_VALUE: i16 = 0;

/// Fill value for padded mask positions
pub const PAD_MASK: i16 = 0;

/// Mask value for real sample positions
const MASK_VALID: i16 = 1;

/// Collates decoded samples into `input_values` / `attention_mask` matrices.
///
/// Rows keep the input order; nothing is sorted by length or uid.
#[derive(Clone, Copy, Debug, Default)]
pub struct BatchCollator;

impl BatchCollator {
    /// Pad `samples` to the longest one.
    ///
    /// # Errors
    ///
    /// Returns [`CollateError::EmptyBatch`] if `samples` is empty.
    pub fn collate(&self, samples: Vec<DecodedSample>) -> Result<Batch, CollateError> {
        let max_len = samples
            .iter()
            .map(DecodedSample::len)
            .max()
            .ok_or(CollateError::EmptyBatch)?;
        let batch_size = samples.len();

        let mut input_values = Array2::from_elem((batch_size, max_len), PAD_VALUE);
        let mut attention_mask = Array2::from_elem((batch_size, max_len), PAD_MASK);

        let mut uids = Vec::with_capacity(batch_size);
        let mut lengths = Vec::with_capacity(batch_size);
        let mut truncated = Vec::with_capacity(batch_size);

        for (i, sample) in samples.into_iter().enumerate() {
            let n = sample.len();

            input_values
                .slice_mut(s![i, ..n])
                .assign(&ArrayView1::from(&sample.samples[..]));
            attention_mask.slice_mut(s![i, ..n]).fill(MASK_VALID);

            lengths.push(n);
            truncated.push(sample.is_truncated());
            uids.push(sample.uid);
        }

        tracing::debug!(batch_size, max_len, "collated batch");

        Ok(Batch {
            uids,
            lengths,
            truncated,
            input_values,
            attention_mask,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BufferOverflow;
    use ndarray::array;

    fn sample(uid: &str, samples: &[i16]) -> DecodedSample {
        DecodedSample::new(uid, samples.to_vec())
    }

    #[test]
    fn pads_shorter_rows() {
        let batch = BatchCollator
            .collate(vec![
                sample("cv_en_1", &[11, 12, 13]),
                sample("cv_en_2", &[21, 22, 23, 24, 25]),
            ])
            .unwrap();

        assert_eq!(batch.input_values.dim(), (2, 5));
        assert_eq!(batch.attention_mask.dim(), (2, 5));
        assert_eq!(
            batch.input_values,
            array![[11, 12, 13, 0, 0], [21, 22, 23, 24, 25]]
        );
        assert_eq!(
            batch.attention_mask,
            array![[1, 1, 1, 0, 0], [1, 1, 1, 1, 1]]
        );
        assert_eq!(batch.lengths, [3, 5]);
    }

    #[test]
    fn preserves_input_order() {
        let batch = BatchCollator
            .collate(vec![
                sample("cv_en_9", &[1; 7]),
                sample("cv_en_1", &[2; 2]),
                sample("cv_en_5", &[3; 4]),
            ])
            .unwrap();

        assert_eq!(batch.uids, ["cv_en_9", "cv_en_1", "cv_en_5"]);
        assert_eq!(batch.lengths, [7, 2, 4]);
        assert_eq!(batch.input_values[[1, 0]], 2);
        assert_eq!(batch.input_values[[2, 3]], 3);
    }

    #[test]
    fn rows_satisfy_padding_invariant() {
        let lens = [0usize, 1, 17, 3, 17, 9];
        let samples: Vec<_> = lens
            .iter()
            .enumerate()
            .map(|(i, &n)| {
                let values: Vec<i16> = (0..n).map(|j| (i * 100 + j) as i16 - 250).collect();
                sample(&format!("cv_en_{i}"), &values)
            })
            .collect();
        let expected = samples.clone();

        let batch = BatchCollator.collate(samples).unwrap();

        assert_eq!(batch.batch_size(), lens.len());
        assert_eq!(batch.max_len(), 17);
        for (i, sample) in expected.iter().enumerate() {
            let n = sample.len();
            let row = batch.input_values.row(i);
            let mask = batch.attention_mask.row(i);

            assert_eq!(mask.iter().map(|&m| m as usize).sum::<usize>(), n);
            assert_eq!(row.slice(s![..n]).to_vec(), sample.samples);
            assert!(row.slice(s![n..]).iter().all(|&v| v == PAD_VALUE));
            assert!(mask.slice(s![..n]).iter().all(|&m| m == 1));
            assert!(mask.slice(s![n..]).iter().all(|&m| m == PAD_MASK));
        }
    }

    #[test]
    fn carries_truncation_flags() {
        let mut long = sample("cv_en_2", &[5; 4]);
        long.overflow = Some(BufferOverflow {
            capacity: 4,
            dropped: 10,
        });

        let batch = BatchCollator
            .collate(vec![sample("cv_en_1", &[1]), long])
            .unwrap();

        assert_eq!(batch.truncated, [false, true]);
    }

    #[test]
    fn all_empty_samples_yield_zero_width() {
        let batch = BatchCollator
            .collate(vec![sample("cv_en_1", &[]), sample("cv_en_2", &[])])
            .unwrap();

        assert_eq!(batch.input_values.dim(), (2, 0));
        assert_eq!(batch.sample_count(), 0);
    }

    #[test]
    fn rejects_empty_batch() {
        assert_eq!(
            BatchCollator.collate(Vec::new()).unwrap_err(),
            CollateError::EmptyBatch
        );
    }
}

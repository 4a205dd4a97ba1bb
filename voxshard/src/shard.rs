//! Deterministic assignment of utterances to workers.
//!
//! Every uid ends in a numeric serial (`common_voice_en_482` has serial 482).
//! A uid belongs to worker `serial % num_workers`, so for a fixed worker count
//! the shards are disjoint and together cover the whole index.

use crate::error::{ConfigError, MalformedUidError, ShardError};

/// Numeric serial of a uid, borrowed as its decimal digits.
///
/// Serials may be longer than any integer type; assignment only needs the
/// residue modulo a small count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Serial<'a>(&'a str);

impl<'a> Serial<'a> {
    pub fn as_str(&self) -> &'a str {
        self.0
    }

    /// Value as a `u64`, or `None` if it does not fit.
    pub fn to_u64(&self) -> Option<u64> {
        self.0.parse().ok()
    }

    /// `serial % modulus`, computed digit by digit.
    ///
    /// # Panics
    ///
    /// Panics if `modulus` is zero.
    pub fn residue(&self, modulus: u64) -> u64 {
        let modulus = u128::from(modulus);
        let residue = self.0.bytes().fold(0u128, |acc, digit| {
            (acc * 10 + u128::from(digit - b'0')) % modulus
        });
        // Strictly below `modulus`, which came from a u64
        residue as u64
    }
}

/// Extract the numeric serial of a uid.
///
/// The serial is the final `_`-delimited token of the last `/`-separated
/// component, e.g. `de/cv_de_17` has serial 17.
///
/// # Errors
///
/// Returns [`MalformedUidError`] if that token is empty or contains anything
/// other than ASCII digits.
pub fn parse_serial(uid: &str) -> Result<Serial<'_>, MalformedUidError> {
    let name = uid.rsplit('/').next().unwrap_or(uid);
    let token = name.rsplit('_').next().unwrap_or(name);

    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MalformedUidError {
            uid: uid.to_owned(),
        });
    }

    Ok(Serial(token))
}

/// Partitions uids across a fixed number of workers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShardAssigner {
    num_workers: usize,
}

impl ShardAssigner {
    /// Create an assigner for `num_workers` workers.
    pub fn new(num_workers: usize) -> Result<Self, ConfigError> {
        if num_workers == 0 {
            return Err(ConfigError::InvalidWorkerCount(num_workers));
        }

        Ok(Self { num_workers })
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Worker index that owns `uid`.
    pub fn worker_for(&self, uid: &str) -> Result<usize, MalformedUidError> {
        let serial = parse_serial(uid)?;
        Ok(serial.residue(self.num_workers as u64) as usize)
    }

    /// Uids owned by `worker`, in index order.
    pub fn shard<S: AsRef<str>>(
        &self,
        uids: &[S],
        worker: usize,
    ) -> Result<Vec<String>, ShardError> {
        if worker >= self.num_workers {
            return Err(ShardError::WorkerOutOfRange {
                worker,
                num_workers: self.num_workers,
            });
        }

        let mut shard = Vec::new();
        for uid in uids {
            let uid = uid.as_ref();
            if self.worker_for(uid)? == worker {
                shard.push(uid.to_owned());
            }
        }

        Ok(shard)
    }

    /// All shards at once, indexed by worker.
    ///
    /// Fails on the first uid without a serial, so a successful result means
    /// every uid has been validated.
    pub fn partition<S: AsRef<str>>(
        &self,
        uids: &[S],
    ) -> Result<Vec<Vec<String>>, MalformedUidError> {
        let mut shards = vec![Vec::new(); self.num_workers];

        for uid in uids {
            let uid = uid.as_ref();
            shards[self.worker_for(uid)?].push(uid.to_owned());
        }

        Ok(shards)
    }
}

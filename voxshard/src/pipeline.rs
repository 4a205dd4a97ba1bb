//! Multi-worker decode pipeline.
//!
//! Architecture:
//! Worker threads (one shard each) -> bounded channel -> `Batches` (consumer thread)
//!
//! - Shards are computed and resolved before any worker starts
//! - Each worker builds its own decoder and decodes its shard sequentially
//! - The consumer merges worker output, groups it into batches and pads them
//! - Dropping `Batches` shuts the workers down and joins them

use crate::collate::BatchCollator;
use crate::config::{ErrorPolicy, PipelineConfig};
use crate::decoder::AudioDecoder;
use crate::error::{Error, PipelineError, Result, SampleError};
use crate::manifest::UtteranceIndex;
use crate::resolve::PathResolver;
use crate::shard::ShardAssigner;
use crate::source::WorkerAudioSource;
use crate::types::{Batch, DecodedSample, Utterance};

use crossbeam::channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, bounded};
use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How often blocked channel operations wake up to check for shutdown
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Sharded, multi-worker audio loader.
///
/// `R` maps uids to file paths. `F` builds one decoder per worker; it is
/// called inside the worker thread with the worker index, so decoders never
/// cross threads.
pub struct DataPipeline<R, F> {
    config: PipelineConfig,
    resolver: R,
    decoders: Arc<F>,
}

impl<R, F, D> DataPipeline<R, F>
where
    R: PathResolver,
    F: Fn(usize) -> D + Send + Sync + 'static,
    D: AudioDecoder + 'static,
{
    /// Create a pipeline after validating `config`.
    pub fn new(config: PipelineConfig, resolver: R, decoders: F) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            resolver,
            decoders: Arc::new(decoders),
        })
    }

    /// Load the manifest and start the workers.
    ///
    /// # Errors
    ///
    /// Manifest and uid errors are returned before any worker is spawned.
    pub fn run(&self) -> Result<Batches> {
        let index = UtteranceIndex::load(&self.config.manifest_path)?;
        self.run_with_index(&index)
    }

    /// Start the workers over an index that is already loaded.
    pub fn run_with_index(&self, index: &UtteranceIndex) -> Result<Batches> {
        let shards = self.assign(index)?;
        Ok(self.spawn(index.len(), shards)?)
    }

    /// Partition the index and resolve every path.
    fn assign(&self, index: &UtteranceIndex) -> Result<Vec<Vec<Utterance>>> {
        let assigner = ShardAssigner::new(self.config.num_workers)?;

        assigner
            .partition(index.uids())?
            .into_iter()
            .map(|uids| {
                uids.into_iter()
                    .map(|uid| -> Result<Utterance> {
                        let path = self.resolver.resolve(&uid)?;
                        Ok(Utterance { uid, path })
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect()
    }

    fn spawn(
        &self,
        total: usize,
        shards: Vec<Vec<Utterance>>,
    ) -> std::result::Result<Batches, PipelineError> {
        let (tx, rx) = bounded(self.config.queue_capacity);
        let mut batches = Batches::new(rx, &self.config);

        tracing::info!(
            uids = total,
            num_workers = shards.len(),
            batch_size = self.config.batch_size,
            "starting pipeline"
        );

        for (worker, shard) in shards.into_iter().enumerate() {
            tracing::debug!(worker, shard_len = shard.len(), "spawning worker");

            let context = WorkerContext {
                worker,
                shard,
                max_buffer_samples: self.config.max_buffer_samples,
                on_decode_error: self.config.on_decode_error,
                tx: tx.clone(),
                shutdown: Arc::clone(&batches.shutdown),
            };
            let decoders = Arc::clone(&self.decoders);

            // On failure, dropping `batches` shuts down the workers already started
            let handle = thread::Builder::new()
                .name(format!("voxshard-worker-{worker}"))
                .spawn(move || {
                    let decoder = (*decoders)(worker);
                    worker_main(context, decoder);
                })
                .map_err(|source| PipelineError::Spawn { worker, source })?;

            batches.workers.push(WorkerSlot {
                worker,
                handle: Some(handle),
                state: WorkerState::Running,
            });
        }

        Ok(batches)
    }
}

/// Running totals of a pipeline run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Batches handed to the consumer
    pub batches: usize,
    /// Rows across those batches
    pub samples: usize,
    /// Utterances skipped on decode errors, reported as workers finish
    pub skipped: usize,
    /// Samples received with a truncation flag
    pub truncated: usize,
}

/// Stream of padded batches produced by a running pipeline.
///
/// Ends once every worker has finished its shard. After an error the error
/// is yielded once and the stream ends.
pub struct Batches {
    rx: Receiver<WorkerMessage>,
    workers: Vec<WorkerSlot>,
    shutdown: Arc<AtomicBool>,
    collator: BatchCollator,
    batch_size: usize,
    stall_timeout: Option<Duration>,
    pending: Vec<DecodedSample>,
    stats: PipelineStats,
    finished: bool,
}

struct WorkerSlot {
    worker: usize,
    handle: Option<JoinHandle<()>>,
    state: WorkerState,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WorkerState {
    Running,
    Done,
    Failed,
}

impl Batches {
    fn new(rx: Receiver<WorkerMessage>, config: &PipelineConfig) -> Self {
        Self {
            rx,
            workers: Vec::with_capacity(config.num_workers),
            shutdown: Arc::new(AtomicBool::new(false)),
            collator: BatchCollator,
            batch_size: config.batch_size,
            stall_timeout: config.stall_timeout(),
            pending: Vec::with_capacity(config.batch_size),
            stats: PipelineStats::default(),
            finished: false,
        }
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Stop all workers, discard undelivered samples, and wait for the
    /// workers to exit.
    pub fn cancel(mut self) {
        self.finish();
    }

    fn running(&self) -> usize {
        self.workers
            .iter()
            .filter(|slot| slot.state == WorkerState::Running)
            .count()
    }

    /// Receive until a full batch is pending or every worker is done.
    fn fill(&mut self) -> Result<()> {
        let mut last_progress = Instant::now();

        while self.pending.len() < self.batch_size && self.running() > 0 {
            match self.rx.recv_timeout(POLL_INTERVAL) {
                Ok(message) => {
                    last_progress = Instant::now();
                    self.handle(message)?;
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.check_exited()?;

                    if let Some(timeout) = self.stall_timeout {
                        if last_progress.elapsed() >= timeout {
                            tracing::error!(?timeout, running = self.running(), "pipeline stalled");
                            return Err(PipelineError::Stalled { timeout }.into());
                        }
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    // Queue is drained and every sender is gone
                    if let Some(i) = self.position_running() {
                        return Err(self.crashed(i).into());
                    }
                }
            }
        }

        Ok(())
    }

    fn handle(&mut self, message: WorkerMessage) -> Result<()> {
        match message {
            WorkerMessage::Sample(sample) => {
                if sample.is_truncated() {
                    self.stats.truncated += 1;
                }
                self.pending.push(sample);
            }
            WorkerMessage::Done { worker, skipped } => {
                self.stats.skipped += skipped;
                self.workers[worker].state = WorkerState::Done;
            }
            WorkerMessage::Aborted { worker, error } => {
                self.workers[worker].state = WorkerState::Failed;
                return Err(PipelineError::WorkerAborted {
                    worker,
                    source: error,
                }
                .into());
            }
        }

        Ok(())
    }

    /// Detect workers whose thread ended without reporting completion.
    fn check_exited(&mut self) -> Result<()> {
        let exited: Vec<usize> = self
            .workers
            .iter()
            .enumerate()
            .filter(|(_, slot)| {
                slot.state == WorkerState::Running
                    && slot.handle.as_ref().is_some_and(JoinHandle::is_finished)
            })
            .map(|(i, _)| i)
            .collect();

        if exited.is_empty() {
            return Ok(());
        }

        // Anything an exited worker sent is already queued
        while let Ok(message) = self.rx.try_recv() {
            self.handle(message)?;
        }

        match exited
            .into_iter()
            .find(|&i| self.workers[i].state == WorkerState::Running)
        {
            Some(i) => Err(self.crashed(i).into()),
            None => Ok(()),
        }
    }

    fn position_running(&self) -> Option<usize> {
        self.workers
            .iter()
            .position(|slot| slot.state == WorkerState::Running)
    }

    fn crashed(&mut self, i: usize) -> PipelineError {
        let slot = &mut self.workers[i];
        slot.state = WorkerState::Failed;

        let message = match slot.handle.take().map(JoinHandle::join) {
            Some(Err(payload)) => panic_message(payload.as_ref()),
            _ => "exited without reporting completion".to_owned(),
        };

        tracing::error!(worker = slot.worker, %message, "worker crashed");

        PipelineError::WorkerCrashed {
            worker: slot.worker,
            message,
        }
    }

    /// Signal shutdown and join every worker.
    ///
    /// With a stall timeout, workers still busy after that long are detached.
    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.shutdown.store(true, Ordering::Relaxed);

        if !self.pending.is_empty() {
            tracing::debug!(discarded = self.pending.len(), "discarding undelivered samples");
            self.pending.clear();
        }

        let deadline = self.stall_timeout.map(|grace| Instant::now() + grace);

        for slot in &mut self.workers {
            let Some(handle) = slot.handle.take() else {
                continue;
            };

            if let Some(deadline) = deadline {
                while !handle.is_finished() && Instant::now() < deadline {
                    thread::sleep(POLL_INTERVAL / 10);
                }
                if !handle.is_finished() {
                    tracing::warn!(worker = slot.worker, "worker did not stop, detaching");
                    continue;
                }
            }

            if let Err(payload) = handle.join() {
                tracing::error!(
                    worker = slot.worker,
                    message = %panic_message(payload.as_ref()),
                    "worker panicked during shutdown"
                );
            }
        }

        tracing::info!(
            batches = self.stats.batches,
            samples = self.stats.samples,
            skipped = self.stats.skipped,
            truncated = self.stats.truncated,
            "pipeline stopped"
        );
    }
}

impl Iterator for Batches {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        if let Err(error) = self.fill() {
            self.finish();
            return Some(Err(error));
        }

        if self.pending.is_empty() {
            self.finish();
            return None;
        }

        let take = self.pending.len().min(self.batch_size);
        let samples: Vec<_> = self.pending.drain(..take).collect();

        let batch = self.collator.collate(samples).map_err(Error::from);
        if let Ok(batch) = &batch {
            self.stats.batches += 1;
            self.stats.samples += batch.batch_size();
        }

        Some(batch)
    }
}

impl Drop for Batches {
    fn drop(&mut self) {
        self.finish();
    }
}

// --- Worker Thread ---

/// Everything a worker needs, handed over at spawn time.
struct WorkerContext {
    worker: usize,
    shard: Vec<Utterance>,
    max_buffer_samples: usize,
    on_decode_error: ErrorPolicy,
    tx: Sender<WorkerMessage>,
    shutdown: Arc<AtomicBool>,
}

enum WorkerMessage {
    Sample(DecodedSample),
    Done { worker: usize, skipped: usize },
    Aborted { worker: usize, error: SampleError },
}

fn worker_main<D: AudioDecoder>(context: WorkerContext, decoder: D) {
    let WorkerContext {
        worker,
        shard,
        max_buffer_samples,
        on_decode_error,
        tx,
        shutdown,
    } = context;

    tracing::info!(worker, shard_len = shard.len(), "worker started");

    let mut producer = WorkerAudioSource::new(worker, shard, decoder, max_buffer_samples)
        .with_cancel_flag(Arc::clone(&shutdown));
    let mut decoded = 0usize;
    let mut skipped = 0usize;

    while let Some(result) = producer.next_view() {
        if shutdown.load(Ordering::Relaxed) {
            tracing::debug!(worker, "worker cancelled");
            return;
        }

        match result {
            Ok(view) => {
                if !send(&tx, &shutdown, WorkerMessage::Sample(view.to_decoded())) {
                    return;
                }
                decoded += 1;
            }
            Err(error) => {
                let SampleError::Decode { uid, source: cause, .. } = &error;

                match on_decode_error {
                    ErrorPolicy::Skip => {
                        tracing::warn!(worker, %uid, error = %cause, "skipping utterance");
                        skipped += 1;
                    }
                    ErrorPolicy::Abort => {
                        tracing::error!(worker, %uid, error = %cause, "aborting worker");
                        send(&tx, &shutdown, WorkerMessage::Aborted { worker, error });
                        return;
                    }
                }
            }
        }
    }

    tracing::info!(worker, decoded, skipped, "worker finished");

    send(&tx, &shutdown, WorkerMessage::Done { worker, skipped });
}

/// Send with retry on timeout, checking shutdown between attempts.
fn send(tx: &Sender<WorkerMessage>, shutdown: &AtomicBool, mut message: WorkerMessage) -> bool {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        match tx.send_timeout(message, POLL_INTERVAL) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(returned)) => message = returned,
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

//! Cleanup queue: bounded channel, worker pool, retry with backoff.
//!
//! Scheduling never blocks the caller. When the channel is full the job is
//! dropped and counted; the superseded object then stays in storage until it
//! is removed out of band.
//!
//! Shutdown: [`CleanupQueue::shutdown`] closes the channel, so later jobs are
//! dropped, then waits up to `drain_timeout` for every accepted job (queued or
//! running) to finish.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assetgate_core::CleanupConfig;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::sleep;

use crate::handler::{CleanupFailure, CleanupHandler, CleanupJob};

/// Upper bound of the delay between two attempts of the same job.
pub const MAX_RETRY_BACKOFF_MS: u64 = 30_000;

/// Backoff before retry number `attempt` (1-based): base, 2x base, 4x base...
#[inline]
pub(crate) fn compute_retry_backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    let factor = 2_u64.saturating_pow(attempt.saturating_sub(1));
    base_ms.saturating_mul(factor).min(MAX_RETRY_BACKOFF_MS)
}

#[derive(Debug, Clone)]
pub struct CleanupQueueConfig {
    pub max_workers: usize,
    pub capacity: usize,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub drain_timeout: Duration,
}

impl Default for CleanupQueueConfig {
    fn default() -> Self {
        Self::from(&CleanupConfig::default())
    }
}

impl From<&CleanupConfig> for CleanupQueueConfig {
    fn from(config: &CleanupConfig) -> Self {
        Self {
            max_workers: config.max_workers.max(1),
            capacity: config.queue_capacity.max(1),
            max_retries: config.max_retries,
            backoff_base_ms: config.backoff_base_ms,
            drain_timeout: Duration::from_secs(config.shutdown_timeout_secs),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    scheduled: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    retried: AtomicU64,
}

/// Snapshot of queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupStats {
    pub scheduled: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub dropped: u64,
    pub retried: u64,
}

#[derive(Clone)]
pub struct CleanupQueue {
    sender: mpsc::Sender<CleanupJob>,
    shutdown_tx: mpsc::Sender<()>,
    dispatcher: Arc<Mutex<Option<JoinHandle<()>>>>,
    drain_timeout: Duration,
    counters: Arc<Counters>,
}

impl CleanupQueue {
    /// Spawn the dispatcher and return a handle for scheduling jobs.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: CleanupQueueConfig, handler: Arc<dyn CleanupHandler>) -> Self {
        let (sender, receiver) = mpsc::channel(config.capacity.max(1));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let counters = Arc::new(Counters::default());
        let drain_timeout = config.drain_timeout;

        let dispatcher = tokio::spawn(Self::dispatch(
            config,
            handler,
            receiver,
            shutdown_rx,
            counters.clone(),
        ));

        Self {
            sender,
            shutdown_tx,
            dispatcher: Arc::new(Mutex::new(Some(dispatcher))),
            drain_timeout,
            counters,
        }
    }

    /// Enqueue a job without waiting. Returns false when it was dropped.
    pub fn schedule(&self, job: CleanupJob) -> bool {
        match self.sender.try_send(job) {
            Ok(()) => {
                self.counters.scheduled.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Full(job)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    provider = %job.provider,
                    path = %job.path,
                    reason = %job.reason,
                    "Cleanup queue full, dropping job"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    provider = %job.provider,
                    path = %job.path,
                    "Cleanup queue stopped, dropping job"
                );
                false
            }
        }
    }

    pub fn stats(&self) -> CleanupStats {
        CleanupStats {
            scheduled: self.counters.scheduled.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            retried: self.counters.retried.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting jobs and wait for the accepted ones, up to the drain timeout.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating cleanup queue shutdown");
        let _ = self.shutdown_tx.try_send(());

        let Some(dispatcher) = self.dispatcher.lock().await.take() else {
            return;
        };
        match tokio::time::timeout(self.drain_timeout, dispatcher).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Cleanup dispatcher panicked"),
            Err(_) => tracing::warn!(
                timeout_secs = self.drain_timeout.as_secs_f64(),
                "Cleanup queue did not drain in time, abandoning remaining jobs"
            ),
        }
    }

    async fn dispatch(
        config: CleanupQueueConfig,
        handler: Arc<dyn CleanupHandler>,
        mut receiver: mpsc::Receiver<CleanupJob>,
        mut shutdown_rx: mpsc::Receiver<()>,
        counters: Arc<Counters>,
    ) {
        tracing::info!(
            max_workers = config.max_workers,
            capacity = config.capacity,
            max_retries = config.max_retries,
            "Cleanup queue started"
        );

        let semaphore = Arc::new(Semaphore::new(config.max_workers.max(1)));
        let mut workers = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Cleanup queue shutting down");
                    break;
                }
                Some(_) = workers.join_next(), if !workers.is_empty() => {}
                job = receiver.recv() => {
                    let Some(job) = job else { break };
                    Self::spawn_worker(&mut workers, &semaphore, job, &handler, &config, &counters)
                        .await;
                }
            }
        }

        // Anything already in the channel was accepted and still runs.
        receiver.close();
        let mut drained = 0_usize;
        while let Some(job) = receiver.recv().await {
            Self::spawn_worker(&mut workers, &semaphore, job, &handler, &config, &counters).await;
            drained += 1;
        }
        tracing::info!(
            queued = drained,
            in_flight = workers.len(),
            "Waiting for accepted cleanup jobs"
        );
        while workers.join_next().await.is_some() {}

        tracing::info!("Cleanup queue stopped");
    }

    async fn spawn_worker(
        workers: &mut JoinSet<()>,
        semaphore: &Arc<Semaphore>,
        job: CleanupJob,
        handler: &Arc<dyn CleanupHandler>,
        config: &CleanupQueueConfig,
        counters: &Arc<Counters>,
    ) {
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            return;
        };
        let handler = handler.clone();
        let counters = counters.clone();
        let config = config.clone();
        workers.spawn(async move {
            let _permit = permit;
            Self::process_with_retry(job, handler, &config, &counters).await;
        });
    }

    #[tracing::instrument(skip(handler, config, counters), fields(provider = %job.provider, path = %job.path))]
    async fn process_with_retry(
        mut job: CleanupJob,
        handler: Arc<dyn CleanupHandler>,
        config: &CleanupQueueConfig,
        counters: &Counters,
    ) {
        loop {
            job.attempt += 1;
            match handler.cleanup(&job).await {
                Ok(()) => {
                    counters.succeeded.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(
                        attempt = job.attempt,
                        reason = %job.reason,
                        "Superseded object deleted"
                    );
                    return;
                }
                Err(CleanupFailure::Retryable(message)) if job.attempt <= config.max_retries => {
                    let backoff_ms = compute_retry_backoff_ms(config.backoff_base_ms, job.attempt);
                    counters.retried.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        error = %message,
                        attempt = job.attempt,
                        backoff_ms = backoff_ms,
                        "Cleanup failed, scheduling retry"
                    );
                    sleep(Duration::from_millis(backoff_ms)).await;
                }
                Err(failure) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(
                        error = %failure,
                        attempt = job.attempt,
                        reason = %job.reason,
                        "Cleanup failed, giving up"
                    );
                    return;
                }
            }
        }
    }
}

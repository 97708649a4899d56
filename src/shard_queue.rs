//! Sharded Job Queue: confirm-before-respond operations.
//!
//! K independent queues, one dedicated worker task per shard, shard chosen by
//! hashing the username. Strict FIFO within a shard gives strict per-user
//! ordering; cross-user work runs in parallel. The HTTP caller blocks on the
//! job's result slot up to a timeout; timing out never cancels the job - it
//! keeps running and the caller must treat the outcome as unknown.
//!
//! Resubmission with an id that is in flight attaches to the existing result
//! slot; an id completed within the retention window returns the recorded
//! result without re-running the job.

use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cached::{Cached, TimedCache};
use dashmap::DashMap;
use rustc_hash::FxHasher;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::config::WalletConfig;
use crate::errors::WalletError;

#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    type Job: Send + Sync + 'static;
    type Output: Clone + Send + Sync + 'static;

    async fn handle(&self, job: &Self::Job) -> Result<Self::Output, WalletError>;
}

type JobResult<O> = Result<O, String>;
type ResultSlot<O> = watch::Receiver<Option<JobResult<O>>>;

struct QueuedJob<H: JobHandler> {
    id: String,
    job: H::Job,
    done: watch::Sender<Option<JobResult<H::Output>>>,
}

pub struct ShardedJobQueue<H: JobHandler> {
    senders: Vec<mpsc::UnboundedSender<QueuedJob<H>>>,
    inflight: Arc<DashMap<String, ResultSlot<H::Output>>>,
    completed: Arc<Mutex<TimedCache<String, JobResult<H::Output>>>>,
    wait_timeout: Duration,
}

impl<H: JobHandler> ShardedJobQueue<H> {
    /// Spawn one worker task per shard and return the submission handle.
    pub fn start(handler: Arc<H>, config: &WalletConfig) -> Self {
        let inflight: Arc<DashMap<String, ResultSlot<H::Output>>> = Arc::new(DashMap::new());
        // Completed results outlive the caller long enough for provider
        // retries; the durable idempotency markers cover everything after.
        let completed = Arc::new(Mutex::new(TimedCache::with_lifespan(
            config.fast_dedup_ttl_secs,
        )));

        let mut senders = Vec::with_capacity(config.job_shards);
        for shard in 0..config.job_shards {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.push(tx);
            tokio::spawn(worker_loop(
                shard,
                rx,
                handler.clone(),
                inflight.clone(),
                completed.clone(),
                config.job_max_attempts,
                config.job_backoff_ms,
            ));
        }
        info!(shards = config.job_shards, "sharded job queue started");

        Self {
            senders,
            inflight,
            completed,
            wait_timeout: Duration::from_millis(config.job_wait_timeout_ms),
        }
    }

    /// Stable shard assignment per partition key.
    pub fn shard_for(&self, key: &str) -> usize {
        let mut hasher = FxHasher::default();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.senders.len()
    }

    /// Enqueue and block until the job is durably resolved or the wait
    /// timeout elapses. `QueueTimeout` means outcome unknown: the job keeps
    /// running on its shard and may still mutate balance.
    pub async fn submit(
        &self,
        partition_key: &str,
        id: &str,
        job: H::Job,
    ) -> Result<H::Output, WalletError> {
        // Recently completed: return the recorded result, never re-run.
        let recorded = self
            .completed
            .lock()
            .unwrap()
            .cache_get(&id.to_string())
            .cloned();
        if let Some(result) = recorded {
            return result.map_err(WalletError::JobFailed);
        }

        let rx = match self.inflight.entry(id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => entry.get().clone(),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let (done, rx) = watch::channel(None);
                entry.insert(rx.clone());
                let shard = self.shard_for(partition_key);
                self.senders[shard]
                    .send(QueuedJob {
                        id: id.to_string(),
                        job,
                        done,
                    })
                    .map_err(|_| WalletError::Internal("shard worker gone".into()))?;
                rx
            }
        };

        let wait = async move {
            let mut rx = rx;
            loop {
                if let Some(result) = rx.borrow().clone() {
                    return result;
                }
                if rx.changed().await.is_err() {
                    return Err("shard worker dropped job".to_string());
                }
            }
        };

        match tokio::time::timeout(self.wait_timeout, wait).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(message)) => Err(WalletError::JobFailed(message)),
            Err(_) => Err(WalletError::QueueTimeout),
        }
    }
}

async fn worker_loop<H: JobHandler>(
    shard: usize,
    mut rx: mpsc::UnboundedReceiver<QueuedJob<H>>,
    handler: Arc<H>,
    inflight: Arc<DashMap<String, ResultSlot<H::Output>>>,
    completed: Arc<Mutex<TimedCache<String, JobResult<H::Output>>>>,
    max_attempts: u32,
    backoff_ms: u64,
) {
    while let Some(queued) = rx.recv().await {
        let mut attempt = 0u32;
        let result = loop {
            attempt += 1;
            match handler.handle(&queued.job).await {
                Ok(output) => break Ok(output),
                Err(e) if attempt < max_attempts => {
                    let delay = backoff_ms.saturating_mul(1 << (attempt - 1));
                    warn!(shard, job_id = %queued.id, attempt, error = %e, "job attempt failed, backing off {}ms", delay);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(e) => {
                    warn!(shard, job_id = %queued.id, attempts = attempt, error = %e, "job failed terminally");
                    break Err(e.to_string());
                }
            }
        };

        // Record before un-tracking so late subscribers always find a result.
        completed
            .lock()
            .unwrap()
            .cache_set(queued.id.clone(), result.clone());
        let _ = queued.done.send(Some(result));
        inflight.remove(&queued.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct RecordingHandler {
        calls: AtomicU32,
        fail_first: u32,
        delay: Duration,
        log: Mutex<Vec<String>>,
    }

    impl RecordingHandler {
        fn new() -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail_first: 0,
                delay: Duration::ZERO,
                log: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl JobHandler for RecordingHandler {
        type Job = String;
        type Output = String;

        async fn handle(&self, job: &String) -> Result<String, WalletError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if call <= self.fail_first {
                return Err(WalletError::Internal("induced failure".into()));
            }
            self.log.lock().unwrap().push(job.clone());
            Ok(format!("done:{}", job))
        }
    }

    fn config(shards: usize, timeout_ms: u64) -> WalletConfig {
        WalletConfig {
            job_shards: shards,
            job_wait_timeout_ms: timeout_ms,
            job_backoff_ms: 10,
            ..WalletConfig::default()
        }
    }

    #[tokio::test]
    async fn test_per_user_fifo_order() {
        let handler = Arc::new(RecordingHandler::new());
        let queue = ShardedJobQueue::start(handler.clone(), &config(4, 5_000));

        // Same user -> same shard -> strict submission order.
        let a = queue.submit("demo1", "tx-cancel", "cancel".to_string());
        let b = queue.submit("demo1", "tx-rollback", "rollback".to_string());
        let (ra, rb) = tokio::join!(a, b);
        ra.unwrap();
        rb.unwrap();

        let log = handler.log.lock().unwrap().clone();
        assert_eq!(log, vec!["cancel".to_string(), "rollback".to_string()]);
    }

    #[tokio::test]
    async fn test_duplicate_id_is_noop_enqueue() {
        let handler = Arc::new(RecordingHandler::new());
        let queue = ShardedJobQueue::start(handler.clone(), &config(2, 5_000));

        let first = queue.submit("demo1", "tx-1", "job".to_string()).await.unwrap();
        let second = queue.submit("demo1", "tx-1", "job".to_string()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_with_backoff_then_succeeds() {
        let mut handler = RecordingHandler::new();
        handler.fail_first = 2;
        let handler = Arc::new(handler);
        let queue = ShardedJobQueue::start(handler.clone(), &config(1, 5_000));

        let out = queue.submit("demo1", "tx-1", "job".to_string()).await.unwrap();
        assert_eq!(out, "done:job");
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_timeout_does_not_cancel_job() {
        let mut handler = RecordingHandler::new();
        handler.delay = Duration::from_millis(150);
        let handler = Arc::new(handler);
        let queue = ShardedJobQueue::start(handler.clone(), &config(1, 20));

        let err = queue
            .submit("demo1", "tx-slow", "job".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::QueueTimeout));

        // The job keeps running and completes; a retry gets the result.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        let out = queue.submit("demo1", "tx-slow", "job".to_string()).await.unwrap();
        assert_eq!(out, "done:job");
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stable_shard_assignment() {
        let handler = Arc::new(RecordingHandler::new());
        let queue = ShardedJobQueue::start(handler, &config(4, 1_000));
        let s1 = queue.shard_for("demo1");
        assert_eq!(s1, queue.shard_for("demo1"));
        assert!(s1 < 4);
    }
}

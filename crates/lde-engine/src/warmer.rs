//! Background cache warming
//!
//! Fire-and-forget re-resolution jobs:
//! - submission never blocks; a full queue drops the job with a warning
//! - a fixed set of workers drains one shared queue
//! - failures are logged and counted, never reported to the submitter

use crate::resolver::{ResolveOptions, Resolver};
use lde_document::{DocumentKind, NodeId, Reference};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One re-resolution request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmupJob {
    /// Node to resolve
    pub id: NodeId,
    /// Kind of that node
    pub kind: DocumentKind,
    /// Options of the resolution
    pub options: ResolveOptions,
}

impl WarmupJob {
    /// Forced rebuild of `id`
    #[inline]
    #[must_use]
    pub fn refresh(id: NodeId, kind: DocumentKind) -> Self {
        Self {
            id,
            kind,
            options: ResolveOptions::refresh(),
        }
    }
}

/// Messages sent to workers
#[derive(Debug, Clone)]
enum WarmupMessage {
    /// Resolve a node
    Warm(WarmupJob),
    /// Stop one worker
    Shutdown,
}

/// Pool statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmupStats {
    /// Jobs accepted into the queue
    pub submitted: usize,
    /// Jobs that resolved
    pub completed: usize,
    /// Jobs whose resolution failed
    pub failed: usize,
    /// Jobs dropped because the queue was full or closed
    pub rejected: usize,
    /// Jobs queued or running
    pub pending: usize,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    rejected: AtomicUsize,
    pending: AtomicUsize,
}

/// Worker pool re-resolving nodes in the background
#[derive(Debug)]
pub struct WarmupPool {
    /// Queue entry point, `None` once shut down
    sender: parking_lot::Mutex<Option<mpsc::Sender<WarmupMessage>>>,
    /// Worker tasks
    workers: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
    idle: Arc<Notify>,
}

impl WarmupPool {
    /// Start `workers` workers sharing a queue of `capacity` jobs
    ///
    /// Must be called inside a Tokio runtime.
    #[must_use]
    pub fn new(resolver: Arc<Resolver>, workers: usize, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let counters = Arc::new(Counters::default());
        let idle = Arc::new(Notify::new());

        let handles = (0..workers.max(1))
            .map(|worker| {
                tokio::spawn(warmup_task(
                    worker,
                    Arc::clone(&resolver),
                    Arc::clone(&rx),
                    Arc::clone(&counters),
                    Arc::clone(&idle),
                ))
            })
            .collect();

        Self {
            sender: parking_lot::Mutex::new(Some(tx)),
            workers: parking_lot::Mutex::new(handles),
            counters,
            idle,
        }
    }

    /// Queue a job without waiting
    ///
    /// Returns `false` if the job was dropped.
    pub fn submit(&self, job: WarmupJob) -> bool {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            debug!(node = %job.id, "warm-up pool shut down, job dropped");
            return false;
        };

        self.counters.pending.fetch_add(1, Ordering::AcqRel);
        let id = job.id.clone();
        match sender.try_send(WarmupMessage::Warm(job)) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                debug!(node = %id, "warm-up job queued");
                true
            }
            Err(error) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("lde_warmup_rejected_total").increment(1);
                if self.counters.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                    self.idle.notify_waiters();
                }
                let reason = match error {
                    mpsc::error::TrySendError::Full(_) => "queue full",
                    mpsc::error::TrySendError::Closed(_) => "queue closed",
                };
                warn!(node = %id, reason, "warm-up job dropped");
                false
            }
        }
    }

    /// Wait until no job is queued or running
    pub async fn idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.counters.pending.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Get pool statistics
    #[must_use]
    pub fn stats(&self) -> WarmupStats {
        WarmupStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            pending: self.counters.pending.load(Ordering::Acquire),
        }
    }

    /// Stop accepting jobs, let workers finish the queue, and wait for them
    pub async fn shutdown(&self) {
        let sender = self.sender.lock().take();
        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        if let Some(sender) = sender {
            for _ in 0..workers.len() {
                let _ = sender.send(WarmupMessage::Shutdown).await;
            }
        }
        for worker in workers {
            if let Err(error) = worker.await {
                warn!(%error, "warm-up worker ended abnormally");
            }
        }
    }
}

/// Worker loop (runs in its own tokio task)
async fn warmup_task(
    worker: usize,
    resolver: Arc<Resolver>,
    rx: Arc<Mutex<mpsc::Receiver<WarmupMessage>>>,
    counters: Arc<Counters>,
    idle: Arc<Notify>,
) {
    loop {
        let message = rx.lock().await.recv().await;
        let job = match message {
            Some(WarmupMessage::Warm(job)) => job,
            Some(WarmupMessage::Shutdown) | None => break,
        };

        match resolver
            .resolve(&Reference::Local(job.id.clone()), job.kind, job.options)
            .await
        {
            Ok(resolution) => {
                counters.completed.fetch_add(1, Ordering::Relaxed);
                debug!(worker, node = %job.id, stale = resolution.stale, "warm-up job done");
            }
            Err(error) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(worker, node = %job.id, %error, "warm-up job failed");
            }
        }

        if counters.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            idle.notify_waiters();
        }
    }
    debug!(worker, "warm-up worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use lde_cache::SnapshotCache;
    use lde_expand::Expander;
    use lde_store::InMemoryDocumentStore;
    use lde_test_utils::{fixtures, ScriptedFetcher};
    use std::time::Duration;

    async fn seeded() -> (Arc<Resolver>, NodeId) {
        let store = Arc::new(InMemoryDocumentStore::new());
        let protocol = fixtures::seed_local_protocol(store.as_ref()).await;
        let resolver = Resolver::new(
            store.clone(),
            Arc::new(ScriptedFetcher::new()),
            SnapshotCache::new(store.clone()),
            Expander::default(),
            Duration::from_secs(1),
            16,
        );
        (Arc::new(resolver), protocol)
    }

    #[tokio::test]
    async fn jobs_warm_the_cache() {
        let (resolver, protocol) = seeded().await;
        let pool = WarmupPool::new(Arc::clone(&resolver), 2, 8);

        assert!(pool.submit(WarmupJob::refresh(protocol.clone(), DocumentKind::Protocol)));
        pool.idle().await;

        assert!(resolver.cache().contains(&protocol));
        let stats = pool.stats();
        assert_eq!((stats.submitted, stats.completed, stats.pending), (1, 1, 0));
    }

    #[tokio::test]
    async fn failures_are_counted_not_returned() {
        let (resolver, _) = seeded().await;
        let pool = WarmupPool::new(resolver, 1, 8);

        assert!(pool.submit(WarmupJob::refresh(NodeId::new("missing"), DocumentKind::Activity)));
        pool.idle().await;
        assert_eq!(pool.stats().failed, 1);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_jobs() {
        let (resolver, protocol) = seeded().await;
        let pool = WarmupPool::new(resolver, 1, 8);
        pool.shutdown().await;

        assert!(!pool.submit(WarmupJob::refresh(protocol, DocumentKind::Protocol)));
        assert_eq!(pool.stats().rejected, 1);
        pool.idle().await;
    }

    #[tokio::test]
    async fn full_queue_drops_jobs() {
        let (resolver, protocol) = seeded().await;
        let pool = WarmupPool::new(resolver, 1, 1);

        // No await between submissions, so the single worker cannot drain
        let accepted = (0..16)
            .filter(|_| pool.submit(WarmupJob::refresh(protocol.clone(), DocumentKind::Protocol)))
            .count();
        assert!(accepted < 16);
        assert_eq!(pool.stats().rejected, 16 - accepted);
        pool.idle().await;
        assert_eq!(pool.stats().pending, 0);
    }
}

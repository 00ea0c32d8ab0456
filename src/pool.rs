//! Fixed-size worker pool fed by a bounded job queue.
//!
//! `size` worker tasks share one `mpsc` queue of capacity `queue_depth`.
//! Each worker runs exactly one job at a time, so `size` bounds the number
//! of jobs in flight. When every worker is busy, submitted jobs wait in the
//! queue; when the queue is full, `submit` waits for room.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// A unit of work executed inside one worker slot.
pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// The pool no longer accepts jobs.
#[derive(Debug, Error)]
#[error("worker pool is shut down")]
pub struct PoolClosed;

/// Shared slot bookkeeping.
#[derive(Debug, Default)]
struct SlotStats {
    busy: AtomicUsize,
}

/// Bounded concurrent executor.
pub struct WorkerPool {
    sender: Option<mpsc::Sender<Job>>,
    workers: JoinSet<()>,
    stats: Arc<SlotStats>,
    size: usize,
}

impl WorkerPool {
    /// Spawn `size` workers behind a queue holding up to `queue_depth` jobs.
    ///
    /// Must be called from within a Tokio runtime. Zero values are treated
    /// as one.
    pub fn new(size: usize, queue_depth: usize) -> Self {
        let size = size.max(1);
        let (sender, receiver) = mpsc::channel(queue_depth.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let stats = Arc::new(SlotStats::default());

        let mut workers = JoinSet::new();
        for worker_id in 0..size {
            workers.spawn(worker_loop(
                worker_id,
                Arc::clone(&receiver),
                Arc::clone(&stats),
            ));
        }

        debug!(workers = size, queue_depth, "Worker pool started");

        WorkerPool {
            sender: Some(sender),
            workers,
            stats,
            size,
        }
    }

    /// Queue a job for the next free worker.
    ///
    /// Waits while the queue is full.
    pub async fn submit<F>(&self, job: F) -> Result<(), PoolClosed>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(PoolClosed)?;
        sender.send(Box::pin(job)).await.map_err(|_| PoolClosed)
    }

    /// Number of worker slots.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of workers currently running a job.
    pub fn busy(&self) -> usize {
        self.stats.busy.load(Ordering::Acquire)
    }

    /// Stop accepting jobs and wait for the workers to finish.
    ///
    /// Jobs already queued still run. Workers still busy after `grace`
    /// are aborted together with their jobs.
    pub async fn shutdown(mut self, grace: Duration) {
        // Closing the queue lets idle workers exit once it is drained
        self.sender.take();

        let drained = tokio::time::timeout(grace, async {
            while self.workers.join_next().await.is_some() {}
        })
        .await;

        match drained {
            Ok(()) => info!("Worker pool stopped"),
            Err(_) => {
                warn!(
                    busy = self.busy(),
                    grace_secs = grace.as_secs_f64(),
                    "Aborting workers still busy after grace period"
                );
                self.workers.shutdown().await;
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    stats: Arc<SlotStats>,
) {
    loop {
        // Only one idle worker waits on the queue at a time
        let job = { receiver.lock().await.recv().await };
        let Some(job) = job else {
            debug!(worker = worker_id, "Job queue closed, worker exiting");
            return;
        };

        let busy = stats.busy.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(worker = worker_id, busy, "Worker picked up job");

        // Dropping the slot (worker aborted) aborts the job with it
        let mut slot = JoinSet::new();
        slot.spawn(job);
        if let Some(Err(e)) = slot.join_next().await {
            if e.is_panic() {
                error!(worker = worker_id, "Job panicked");
            }
        }

        stats.busy.fetch_sub(1, Ordering::AcqRel);
    }
}

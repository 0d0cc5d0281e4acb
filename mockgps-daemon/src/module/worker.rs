//! Bounded worker pool for fire-and-forget commands.
//!
//! A fixed set of long-lived workers pulls jobs from one bounded queue, so a
//! flood of commands can never grow the number of tasks. Each job carries a
//! [`PendingCommand`] that resolves its [`CompletionHandle`] exactly once.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::CommandError;

/// How a queued command ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Completed,
    Rejected(String),
    /// The command was dropped before a worker finished it
    Abandoned,
}

/// A job returns `Err(reason)` to reject its command
pub type Job = BoxFuture<'static, Result<(), String>>;

/// Caller side of a queued command
#[derive(Debug)]
pub struct CompletionHandle {
    command_id: String,
    rx: oneshot::Receiver<CommandOutcome>,
}

impl CompletionHandle {
    pub fn command_id(&self) -> &str {
        &self.command_id
    }

    pub async fn wait(self) -> CommandOutcome {
        self.rx.await.unwrap_or(CommandOutcome::Abandoned)
    }
}

/// Worker side of a queued command; resolves as abandoned when dropped unfinished.
pub struct PendingCommand {
    command_id: String,
    tx: Option<oneshot::Sender<CommandOutcome>>,
}

impl PendingCommand {
    pub fn new(command_id: impl Into<String>) -> (Self, CompletionHandle) {
        let command_id = command_id.into();
        let (tx, rx) = oneshot::channel();
        (
            Self { command_id: command_id.clone(), tx: Some(tx) },
            CompletionHandle { command_id, rx },
        )
    }

    pub fn command_id(&self) -> &str {
        &self.command_id
    }

    pub fn complete(mut self) {
        self.resolve(CommandOutcome::Completed);
    }

    pub fn reject(mut self, reason: impl Into<String>) {
        self.resolve(CommandOutcome::Rejected(reason.into()));
    }

    fn resolve(&mut self, outcome: CommandOutcome) {
        if let Some(tx) = self.tx.take() {
            // The caller may have stopped listening
            let _ = tx.send(outcome);
        }
    }
}

impl Drop for PendingCommand {
    fn drop(&mut self) {
        if self.tx.is_some() {
            debug!(command_id = %self.command_id, "Command abandoned before completion");
            self.resolve(CommandOutcome::Abandoned);
        }
    }
}

struct QueuedJob {
    pending: PendingCommand,
    job: Job,
}

pub struct WorkerPool {
    tx: mpsc::Sender<QueuedJob>,
    shutdown: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn `worker_count` workers sharing a queue of `capacity` jobs.
    pub fn new(worker_count: usize, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel::<QueuedJob>(capacity.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let shutdown = CancellationToken::new();

        let workers = (0..worker_count.max(1))
            .map(|index| tokio::spawn(Self::worker_loop(index, rx.clone(), shutdown.clone())))
            .collect();

        info!(
            "Command worker pool started ({} workers, queue capacity {})",
            worker_count.max(1),
            capacity.max(1)
        );

        Self {
            tx,
            shutdown,
            workers: Mutex::new(workers),
        }
    }

    /// Queue `job` without waiting. Fails when the queue is full or closed.
    pub fn submit(&self, command_id: impl Into<String>, job: Job) -> Result<CompletionHandle, CommandError> {
        if self.shutdown.is_cancelled() {
            return Err(CommandError::PoolClosed);
        }

        let (pending, handle) = PendingCommand::new(command_id);
        match self.tx.try_send(QueuedJob { pending, job }) {
            Ok(()) => Ok(handle),
            Err(mpsc::error::TrySendError::Full(queued)) => {
                warn!(command_id = %queued.pending.command_id(), "Command queue full, dropping command");
                Err(CommandError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(CommandError::PoolClosed),
        }
    }

    async fn worker_loop(
        index: usize,
        rx: Arc<tokio::sync::Mutex<mpsc::Receiver<QueuedJob>>>,
        shutdown: CancellationToken,
    ) {
        loop {
            let next = {
                let mut rx = rx.lock().await;
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => None,
                    job = rx.recv() => job,
                }
            };

            let Some(QueuedJob { pending, job }) = next else {
                break;
            };

            match AssertUnwindSafe(job).catch_unwind().await {
                Ok(Ok(())) => {
                    debug!(worker = index, command_id = %pending.command_id(), "Command completed");
                    pending.complete();
                }
                Ok(Err(reason)) => {
                    debug!(worker = index, command_id = %pending.command_id(), "Command rejected: {}", reason);
                    pending.reject(reason);
                }
                Err(_) => {
                    error!(worker = index, command_id = %pending.command_id(), "Command handler panicked");
                }
            }
        }
        debug!(worker = index, "Command worker exiting");
    }

    /// Stop taking commands and wait for the workers to finish their current job.
    ///
    /// Jobs still queued are abandoned.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let workers = match self.workers.lock() {
            Ok(mut workers) => std::mem::take(&mut *workers),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for worker in workers {
            if let Err(e) = worker.await {
                warn!("Command worker ended abnormally: {}", e);
            }
        }
        info!("Command worker pool stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_jobs_resolve_their_handles() {
        let pool = WorkerPool::new(2, 8);

        let ok = pool.submit("a", async { Ok(()) }.boxed()).unwrap();
        let rejected = pool.submit("b", async { Err("bad lat".to_string()) }.boxed()).unwrap();

        assert_eq!(ok.command_id(), "a");
        assert_eq!(ok.wait().await, CommandOutcome::Completed);
        assert_eq!(rejected.wait().await, CommandOutcome::Rejected("bad lat".to_string()));
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_panicking_job_is_abandoned_and_worker_survives() {
        let pool = WorkerPool::new(1, 8);

        let boom = pool
            .submit(
                "boom",
                async {
                    if true {
                        panic!("boom");
                    }
                    Ok(())
                }
                .boxed(),
            )
            .unwrap();
        assert_eq!(boom.wait().await, CommandOutcome::Abandoned);

        let next = pool.submit("next", async { Ok(()) }.boxed()).unwrap();
        assert_eq!(next.wait().await, CommandOutcome::Completed);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_full_queue_rejects_without_blocking() {
        let pool = WorkerPool::new(1, 1);
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let started = Arc::new(tokio::sync::Notify::new());

        let signal = started.clone();
        let blocker = pool
            .submit(
                "blocker",
                async move {
                    signal.notify_one();
                    let _ = release_rx.await;
                    Ok(())
                }
                .boxed(),
            )
            .unwrap();
        started.notified().await;

        let queued = pool.submit("queued", async { Ok(()) }.boxed()).unwrap();
        let overflow = pool.submit("overflow", async { Ok(()) }.boxed());
        assert_eq!(overflow.unwrap_err(), CommandError::QueueFull);

        release_tx.send(()).unwrap();
        assert_eq!(blocker.wait().await, CommandOutcome::Completed);
        assert_eq!(queued.wait().await, CommandOutcome::Completed);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_closes_pool() {
        let pool = WorkerPool::new(2, 4);
        let counter = Arc::new(AtomicUsize::new(0));

        let c = counter.clone();
        let handle = pool
            .submit(
                "count",
                async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
                .boxed(),
            )
            .unwrap();
        assert_eq!(handle.wait().await, CommandOutcome::Completed);

        pool.shutdown().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(
            pool.submit("late", async { Ok(()) }.boxed()).unwrap_err(),
            CommandError::PoolClosed
        );
    }

    #[tokio::test]
    async fn test_shutdown_abandons_queued_jobs() {
        let pool = WorkerPool::new(1, 4);
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let started = Arc::new(tokio::sync::Notify::new());

        let signal = started.clone();
        let running = pool
            .submit(
                "running",
                async move {
                    signal.notify_one();
                    let _ = release_rx.await;
                    Ok(())
                }
                .boxed(),
            )
            .unwrap();
        started.notified().await;
        let queued = pool.submit("queued", async { Ok(()) }.boxed()).unwrap();

        let release = async {
            tokio::task::yield_now().await;
            release_tx.send(()).unwrap();
        };
        tokio::join!(pool.shutdown(), release);
        drop(pool);

        assert_eq!(running.wait().await, CommandOutcome::Completed);
        assert_eq!(queued.wait().await, CommandOutcome::Abandoned);
    }
}

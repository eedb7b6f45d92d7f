//! Deferred background work
//!
//! Cache writes, response records and activity entries run after the
//! response is produced. Their failures go to a channel drained by a logging
//! task and never reach the caller. Synchronous storage work goes through
//! [`BackgroundTasks::defer_blocking`] so it never occupies a runtime worker.
//! Housekeeping loops registered with [`BackgroundTasks::every`] run until
//! [`BackgroundTasks::shutdown`] and are not waited on by a flush.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// A deferred task that failed
#[derive(Debug, Clone)]
pub struct TaskFailure {
    pub task: &'static str,
    pub error: String,
}

/// Tracked set of fire-and-forget tasks
#[derive(Clone)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
    periodic: TaskTracker,
    stop: CancellationToken,
    failures: mpsc::UnboundedSender<TaskFailure>,
    failed: Arc<AtomicU64>,
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundTasks {
    /// Creates the task set and its failure logger
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new() -> Self {
        let (failures, mut rx) = mpsc::unbounded_channel::<TaskFailure>();
        tokio::spawn(async move {
            while let Some(failure) = rx.recv().await {
                tracing::warn!(task = failure.task, error = %failure.error, "Background task failed");
            }
        });

        Self {
            tracker: TaskTracker::new(),
            periodic: TaskTracker::new(),
            stop: CancellationToken::new(),
            failures,
            failed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Runs `task` in the background
    pub fn defer<F, E>(&self, name: &'static str, task: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let failures = self.failures.clone();
        let failed = self.failed.clone();
        self.tracker.spawn(async move {
            if let Err(e) = task.await {
                failed.fetch_add(1, Ordering::SeqCst);
                let _ = failures.send(TaskFailure {
                    task: name,
                    error: e.to_string(),
                });
            }
        });
    }

    /// Runs the synchronous `task` on the blocking pool
    pub fn defer_blocking<F, E>(&self, name: &'static str, task: F)
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        self.defer(name, async move {
            match tokio::task::spawn_blocking(task).await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            }
        });
    }

    /// Calls `tick` every `period` until shutdown or until it returns `false`
    ///
    /// The first call happens one `period` after registration.
    pub fn every<F, Fut>(&self, name: &'static str, period: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let stop = self.stop.clone();
        self.periodic.spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = interval.tick() => {
                        if !tick().await {
                            break;
                        }
                    }
                }
            }
            tracing::debug!(task = name, "Periodic task stopped");
        });
    }

    /// Stops periodic tasks, then waits for deferred ones
    pub async fn shutdown(&self) {
        self.stop.cancel();
        self.periodic.close();
        self.periodic.wait().await;
        self.flush().await;
    }

    /// Waits for every task deferred so far
    pub async fn flush(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Deferred tasks still running
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Tasks that have failed since creation
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }
}

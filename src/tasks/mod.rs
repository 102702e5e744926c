//! Bounded background task group
//!
//! Both adapters push remote writes through a [`TaskGroup`]: submission is
//! non-blocking, at most `limit` tasks run at once, and `wait` drains
//! everything at shutdown. Spawned tasks are detached from the submitting
//! request, so a client that has already received its reply cannot abort its
//! own write-back; each task instead runs under [`UPLOAD_TIMEOUT`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::warn;

/// Deadline applied to each background remote write
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Default concurrency limit: the number of available CPUs
pub fn default_limit() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// A task group with a hard ceiling on concurrent tasks
pub struct TaskGroup {
    sem: Arc<Semaphore>,
    tasks: Mutex<JoinSet<()>>,
}

impl TaskGroup {
    /// Create a group running at most `limit` tasks at once
    ///
    /// A `limit` of zero falls back to [`default_limit`].
    pub fn new(limit: usize) -> Self {
        let limit = if limit == 0 { default_limit() } else { limit };
        Self {
            sem: Arc::new(Semaphore::new(limit)),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Submit a task; returns as soon as it is enqueued
    ///
    /// The task runs once it obtains one of the group's permits. Completed
    /// siblings are reaped here so the set stays bounded between waits.
    pub async fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sem = Arc::clone(&self.sem);
        let mut tasks = self.tasks.lock().await;
        while let Some(result) = tasks.try_join_next() {
            if let Err(e) = result {
                if e.is_panic() {
                    warn!("background task panicked: {}", e);
                }
            }
        }
        tasks.spawn(async move {
            // The semaphore is never closed, so acquisition only fails if
            // the runtime is tearing down; nothing left to do then.
            let Ok(_permit) = sem.acquire_owned().await else {
                return;
            };
            task.await;
        });
    }

    /// Block until every submitted task has completed
    ///
    /// Called exactly once at shutdown; panicked tasks are logged, not
    /// re-raised.
    pub async fn wait(&self) {
        let mut tasks = self.tasks.lock().await;
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                if e.is_panic() {
                    warn!("background task panicked: {}", e);
                }
            }
        }
    }
}

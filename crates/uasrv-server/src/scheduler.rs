// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Background scheduler thread loop.
//!
//! The server runs deferred and periodic work (the status clock, discovery
//! expiry) on one dedicated OS thread driving a current-thread tokio runtime.
//! Request threads hand closures to it through [`Scheduler::call_later`] and
//! [`Scheduler::call_every`].
//!
//! # Cancellation
//!
//! Stopping the scheduler drops every pending task. A task is only ever
//! cancelled while it is waiting for its timer, so a task whose body is
//! already executing runs to completion first.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use uasrv_core::error::{ServerError, UaResult};

/// Default name of the scheduler thread.
pub const DEFAULT_THREAD_NAME: &str = "uasrv-scheduler";

// =============================================================================
// TaskHandle
// =============================================================================

/// Handle to a scheduled task.
///
/// Dropping the handle does not cancel the task.
#[derive(Debug)]
pub struct TaskHandle {
    id: u64,
    handle: tokio::task::JoinHandle<()>,
}

impl TaskHandle {
    /// Returns the task id (unique per scheduler).
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Cancels the task if it has not started executing its body yet.
    ///
    /// For periodic tasks this stops all future runs.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Returns `true` once the task has completed or been cancelled.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

// =============================================================================
// Scheduler
// =============================================================================

struct Running {
    handle: Handle,
    shutdown: oneshot::Sender<()>,
    thread: JoinHandle<()>,
    thread_id: ThreadId,
}

/// A restartable background thread loop.
///
/// # Example
///
/// ```rust,ignore
/// let scheduler = Scheduler::new();
/// scheduler.start()?;
/// scheduler.call_later(Duration::from_secs(600), move || expire(uri))?;
/// scheduler.stop();
/// ```
pub struct Scheduler {
    name: String,
    running: Mutex<Option<Running>>,
    next_task_id: AtomicU64,
}

impl Scheduler {
    /// Creates a stopped scheduler.
    pub fn new() -> Self {
        Self::with_name(DEFAULT_THREAD_NAME)
    }

    /// Creates a stopped scheduler whose thread carries `name`.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            running: Mutex::new(None),
            next_task_id: AtomicU64::new(1),
        }
    }

    /// Starts the thread loop. Starting a running scheduler is a no-op.
    pub fn start(&self) -> UaResult<()> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Ok(());
        }

        let runtime = Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| ServerError::scheduler(format!("failed to build runtime: {}", e)))?;
        let handle = runtime.handle().clone();
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();

        let thread = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                runtime.block_on(async {
                    // A dropped sender also ends the loop.
                    let _ = shutdown_rx.await;
                });
                // Pending tasks are dropped with the runtime.
                drop(runtime);
            })
            .map_err(|e| ServerError::scheduler(format!("failed to spawn thread: {}", e)))?;

        let thread_id = thread.thread().id();
        *running = Some(Running {
            handle,
            shutdown,
            thread,
            thread_id,
        });

        info!(thread = %self.name, "Scheduler started");
        Ok(())
    }

    /// Stops the thread loop and cancels all pending tasks.
    ///
    /// Stopping a stopped scheduler is a no-op. When called from a task
    /// running on the scheduler thread, the loop ends after that task
    /// returns and the call does not wait for it.
    pub fn stop(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };

        let _ = running.shutdown.send(());
        if thread::current().id() == running.thread_id {
            debug!(thread = %self.name, "Scheduler stop requested from its own thread");
            return;
        }

        if running.thread.join().is_err() {
            warn!(thread = %self.name, "Scheduler thread panicked");
        }
        info!(thread = %self.name, "Scheduler stopped");
    }

    /// Returns `true` while the thread loop is running.
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Returns `true` if the caller is executing on the scheduler thread.
    pub fn is_scheduler_thread(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|r| r.thread_id == thread::current().id())
    }

    /// Runs `task` once after `delay`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotRunning`] if the scheduler is stopped.
    pub fn call_later<F>(&self, delay: Duration, task: F) -> UaResult<TaskHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        })
    }

    /// Runs `task` immediately and then every `period`.
    ///
    /// A run that overruns its period delays the next one instead of
    /// bunching up.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotRunning`] if the scheduler is stopped.
    pub fn call_every<F>(&self, period: Duration, task: F) -> UaResult<TaskHandle>
    where
        F: Fn() + Send + 'static,
    {
        let period = period.max(Duration::from_millis(1));
        self.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                task();
            }
        })
    }

    fn spawn<Fut>(&self, future: Fut) -> UaResult<TaskHandle>
    where
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let running = self.running.lock();
        let running = running.as_ref().ok_or(ServerError::NotRunning)?;
        let id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        let handle = running.handle.spawn(future);
        Ok(TaskHandle { id, handle })
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

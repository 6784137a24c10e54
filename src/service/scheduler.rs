//! Fixed-delay task loop.
//!
//! A scheduled task runs once immediately, then again `interval` after
//! each run completes, so runs never overlap. Cancelling a schedule stops
//! the next run from starting; a run already in progress is never
//! interrupted.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Spawns scheduled tasks on the current Tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scheduler;

/// Handle to a running schedule.
#[derive(Debug)]
pub struct ScheduleHandle {
    name: &'static str,
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl Scheduler {
    /// Starts running `task` every `interval` after the previous run
    /// completed.
    pub fn schedule<F, Fut>(name: &'static str, interval: Duration, mut task: F) -> ScheduleHandle
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let join = tokio::spawn(async move {
            tracing::info!(task = name, ?interval, "schedule started");
            while !cancelled.is_cancelled() {
                task().await;

                tokio::select! {
                    biased;

                    () = cancelled.cancelled() => break,
                    () = tokio::time::sleep(interval) => {}
                }
            }
            tracing::info!(task = name, "schedule stopped");
        });

        ScheduleHandle { name, token, join }
    }
}

impl ScheduleHandle {
    /// Task name given at scheduling time.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Prevents any further run from starting.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancels the schedule and waits for an in-flight run to finish.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(error) = self.join.await {
            tracing::error!(task = self.name, %error, "scheduled task terminated abnormally");
        }
    }
}

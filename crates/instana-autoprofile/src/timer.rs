// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delayed and periodic job execution.
//!
//! # Schedule
//!
//! ```text
//! new() ──delay──> job ──interval──> job ──interval──> job ...
//! ```
//!
//! - The first run happens once `delay` has elapsed, and only if `delay` is not zero.
//! - Periodic runs start one `interval` after the delay, and only if `interval`
//!   is not zero.
//!
//! Each run happens on Tokio's blocking thread pool. A panic inside the job is
//! caught and logged, and the schedule keeps running.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, Instrument, Span};

/// Runs a job after a delay, then periodically, until it is stopped or dropped.
#[derive(Debug)]
pub struct Timer {
    stopped: Arc<AtomicBool>,
    cancel_token: CancellationToken,
}

impl Timer {
    /// Schedules `job` on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn new<F>(delay: Duration, interval: Duration, job: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let stopped = Arc::new(AtomicBool::new(false));
        let cancel_token = CancellationToken::new();

        // the job's diagnostics belong to the span that scheduled it
        tokio::spawn(
            run_schedule(
                delay,
                interval,
                job,
                Arc::clone(&stopped),
                cancel_token.clone(),
            )
            .in_current_span(),
        );

        Self {
            stopped,
            cancel_token,
        }
    }

    /// Stops the job execution. A job that is already running completes.
    ///
    /// Calling `stop` again has no effect.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_schedule<F>(
    delay: Duration,
    interval: Duration,
    job: F,
    stopped: Arc<AtomicBool>,
    cancel_token: CancellationToken,
) where
    F: FnMut() + Send + 'static,
{
    tokio::select! {
        () = time::sleep(delay) => {}
        () = cancel_token.cancelled() => {
            debug!("Timer stopped before its first run");
            return;
        }
    }

    // periodic runs are anchored at the end of the delay, not at the end of the first run
    let start = Instant::now();

    let mut job = if delay.is_zero() {
        job
    } else {
        let Some(job) = run_blocking(job, &stopped).await else {
            return;
        };
        job
    };

    if interval.is_zero() {
        return;
    }

    let mut ticker = time::interval_at(start + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(next) = run_blocking(job, &stopped).await else {
                    break;
                };
                job = next;
            }
            () = cancel_token.cancelled() => {
                debug!("Timer stopped");
                break;
            }
        }
    }
}

/// Runs the job on the blocking thread pool so that a long run does not hold
/// up a runtime worker. Hands the job back if the schedule may go on.
async fn run_blocking<F>(mut job: F, stopped: &Arc<AtomicBool>) -> Option<F>
where
    F: FnMut() + Send + 'static,
{
    let stopped = Arc::clone(stopped);
    let span = Span::current();

    let res = tokio::task::spawn_blocking(move || {
        let go_on = span.in_scope(|| run_job(&mut job, &stopped));
        go_on.then_some(job)
    })
    .await;

    match res {
        Ok(job) => job,
        Err(e) => {
            debug!("Scheduled job did not complete: {e}");
            None
        }
    }
}

/// Runs the job unless the timer is stopped. Returns whether the schedule may go on.
fn run_job<F>(job: &mut F, stopped: &AtomicBool) -> bool
where
    F: FnMut(),
{
    if stopped.load(Ordering::SeqCst) {
        return false;
    }

    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(&mut *job)) {
        error!(
            "Recovered from panic in scheduled job: {}",
            panic_message(panic.as_ref())
        );
    }

    !stopped.load(Ordering::SeqCst)
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}

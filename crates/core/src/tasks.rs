//! Recurring background work.
//!
//! [`RecurringTask`] drives a [`RecurringJob`] on a fixed period with an
//! explicit start/stop lifecycle and a single cancellation token. Each tick
//! runs as its own task so a slow tick never delays the timer; jobs that
//! must not overlap guard themselves with a [`SingleSlot`].
//!
//! Tests call [`RecurringJob::tick`] directly instead of waiting on the
//! wall clock.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// A unit of periodic work.
#[async_trait]
pub trait RecurringJob: Send + Sync + 'static {
    /// Short name used in log fields.
    fn name(&self) -> &'static str;

    /// Run one iteration. Errors are the job's own business to log.
    async fn tick(&self);
}

// ---------------------------------------------------------------------------
// RecurringTask
// ---------------------------------------------------------------------------

/// A running periodic driver. The first tick fires immediately.
pub struct RecurringTask {
    name: &'static str,
    cancel: CancellationToken,
    tracker: TaskTracker,
    driver: JoinHandle<()>,
}

impl RecurringTask {
    /// Spawn the driver for `job`, ticking every `period`.
    pub fn start<J: RecurringJob>(job: Arc<J>, period: Duration) -> Self {
        let name = job.name();
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();

        tracing::info!(task = name, period_secs = period.as_secs(), "Recurring task started");

        let driver = tokio::spawn(drive(job, period, cancel.clone(), tracker.clone()));

        Self {
            name,
            cancel,
            tracker,
            driver,
        }
    }

    /// Stop the timer and wait for ticks already in flight to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.driver.await;

        self.tracker.close();
        self.tracker.wait().await;
        tracing::info!(task = self.name, "Recurring task stopped");
    }
}

async fn drive<J: RecurringJob>(
    job: Arc<J>,
    period: Duration,
    cancel: CancellationToken,
    tracker: TaskTracker,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let job = Arc::clone(&job);
                tracker.spawn(async move { job.tick().await });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SingleSlot
// ---------------------------------------------------------------------------

/// At most one holder at a time; a second claimant is turned away instead
/// of queued.
#[derive(Debug, Clone)]
pub struct SingleSlot {
    semaphore: Arc<Semaphore>,
}

/// Proof of holding the slot. Dropping it frees the slot.
#[derive(Debug)]
pub struct SlotGuard {
    _permit: OwnedSemaphorePermit,
}

impl SingleSlot {
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
        }
    }

    /// Claim the slot, or `None` if someone already holds it.
    pub fn try_claim(&self) -> Option<SlotGuard> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| SlotGuard { _permit: permit })
    }

    pub fn is_busy(&self) -> bool {
        self.semaphore.available_permits() == 0
    }
}

impl Default for SingleSlot {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! The poll cycle.
//!
//! One cycle lists PENDING requests and handles them strictly one after
//! another: mark RUNNING, run the test, mark COMPLETED. A request is
//! completed whatever the test outcome, and also when the runner exits
//! unexpectedly, so it is never picked up again. Any API error ends the
//! cycle; the next tick starts over.

use std::sync::Arc;

use async_trait::async_trait;
use pulseboard_core::retry::PendingRetryRequest;
use pulseboard_core::tasks::{RecurringJob, SingleSlot};

use crate::client::{ClientError, RetryQueue};
use crate::runner::TestExecutor;

/// What a call to [`RetryWatcher::poll_cycle`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another cycle was still in flight.
    Skipped,
    /// Number of requests taken to COMPLETED.
    Completed(usize),
}

pub struct RetryWatcher {
    queue: Arc<dyn RetryQueue>,
    executor: Arc<dyn TestExecutor>,
    slot: SingleSlot,
}

impl RetryWatcher {
    pub fn new(queue: Arc<dyn RetryQueue>, executor: Arc<dyn TestExecutor>) -> Self {
        Self {
            queue,
            executor,
            slot: SingleSlot::new(),
        }
    }

    /// Whether a cycle is currently in flight.
    pub fn is_busy(&self) -> bool {
        self.slot.is_busy()
    }

    /// Run one cycle unless one is already running.
    pub async fn poll_cycle(&self) -> Result<CycleOutcome, ClientError> {
        let Some(_guard) = self.slot.try_claim() else {
            tracing::debug!("Previous poll cycle still running, skipping tick");
            return Ok(CycleOutcome::Skipped);
        };

        let pending = self.queue.list_pending().await?;
        if pending.is_empty() {
            return Ok(CycleOutcome::Completed(0));
        }
        tracing::info!(count = pending.len(), "Found pending retry requests");

        let mut completed = 0;
        for item in &pending {
            self.process(item).await?;
            completed += 1;
        }
        Ok(CycleOutcome::Completed(completed))
    }

    async fn process(&self, item: &PendingRetryRequest) -> Result<(), ClientError> {
        let id = item.request.id;
        let title = item.test_title.as_str();

        self.queue.mark_running(id).await?;
        tracing::info!(retry_request_id = id, test_title = title, "Running retry");

        match self.executor.execute(title).await {
            Ok(outcome) => {
                tracing::info!(retry_request_id = id, ?outcome, "Retry execution finished");
            }
            Err(e) => {
                tracing::error!(
                    retry_request_id = id,
                    test_title = title,
                    error = %e,
                    "Retry execution failed, completing anyway",
                );
            }
        }

        let done = self.queue.mark_completed(id, None).await?;
        tracing::info!(retry_request_id = id, result_id = ?done.result_id, "Retry completed");
        Ok(())
    }
}

#[async_trait]
impl RecurringJob for RetryWatcher {
    fn name(&self) -> &'static str {
        "retry_watcher"
    }

    async fn tick(&self) {
        if let Err(e) = self.poll_cycle().await {
            tracing::error!(error = %e, "Poll cycle aborted");
        }
    }
}

//! Polling state machine for submitted tasks.
//!
//! After a successful submission the caller enters
//! [`wait_for_completion`]: poll, notify the observer, stop on a
//! terminal status, or give up once the configured deadline passes.
//! On timeout the remote task is asked to cancel (best-effort) so
//! server capacity is not left burning on a job nobody is waiting for.

use std::time::Duration;

use async_trait::async_trait;

use crate::client::{JobApi, RunningHubError};
use crate::response::{NormalizedStatus, RemoteStatus};

/// Synthesized progress never claims completion.
const ESTIMATE_CAP: i16 = 95;

/// Assumed average task duration for progress estimation, in seconds.
const ESTIMATE_FULL_SECS: f64 = 60.0;

/// Tunable parameters for the polling loop.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay between status polls.
    pub interval: Duration,
    /// Total time budget before the task is declared timed out.
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            timeout: Duration::from_secs(300),
        }
    }
}

impl PollConfig {
    /// Default interval with a caller-chosen deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }
}

/// Callback invoked once per poll.
///
/// Observer failures are logged and discarded; they never abort the
/// polling loop.
#[async_trait]
pub trait PollObserver: Send + Sync {
    async fn on_poll(
        &self,
        status: &NormalizedStatus,
        progress: i16,
        elapsed: Duration,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// How a polling loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// A terminal status (Success or Failed) was observed.
    Finished(NormalizedStatus),
    /// The deadline passed without a terminal status. A best-effort
    /// remote cancel has already been issued.
    TimedOut,
}

/// Progress to report when the server gives none: assume an average
/// run takes [`ESTIMATE_FULL_SECS`], capped at [`ESTIMATE_CAP`] so the
/// bar never claims completion before the server does.
pub fn estimate_progress(elapsed: Duration) -> i16 {
    let estimated = (elapsed.as_secs_f64() / ESTIMATE_FULL_SECS * 100.0) as i16;
    estimated.min(ESTIMATE_CAP)
}

/// Poll `task_id` until it reaches a terminal status or the deadline
/// passes.
///
/// Transport errors from the status endpoint propagate to the caller,
/// which records them as the step failure.
pub async fn wait_for_completion(
    client: &dyn JobApi,
    task_id: &str,
    config: &PollConfig,
    observer: Option<&dyn PollObserver>,
) -> Result<PollOutcome, RunningHubError> {
    let mut elapsed = Duration::ZERO;

    while elapsed < config.timeout {
        let status = client.task_status(task_id).await?;

        if let Some(observer) = observer {
            let progress = if status.progress == 0 && status.status == RemoteStatus::Running {
                estimate_progress(elapsed)
            } else {
                status.progress
            };
            if let Err(e) = observer.on_poll(&status, progress, elapsed).await {
                tracing::debug!(task_id, error = %e, "Poll observer failed; polling continues");
            }
        }

        if status.status.is_terminal() {
            return Ok(PollOutcome::Finished(status));
        }

        tokio::time::sleep(config.interval).await;
        elapsed += config.interval;
    }

    tracing::warn!(
        task_id,
        timeout_secs = config.timeout.as_secs(),
        "Task did not finish before the deadline; requesting remote cancel",
    );
    match client.cancel_task(task_id).await {
        Ok(cancelled) => {
            tracing::debug!(task_id, cancelled, "Remote cancel requested");
        }
        Err(e) => {
            tracing::debug!(task_id, error = %e, "Remote cancel failed; ignoring");
        }
    }

    Ok(PollOutcome::TimedOut)
}

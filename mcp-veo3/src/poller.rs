//! Long-running operation polling.
//!
//! The operation moves `SUBMITTED -> POLLING -> DONE_SUCCESS | DONE_FAILURE`.
//! Each iteration queries the provider once; while the operation is running
//! the poller sleeps for a fixed interval and emits a heartbeat. Polling ends
//! on completion, on timeout, or when the request's cancellation token fires.

use std::sync::Arc;
use std::time::Duration;

use mcp_veo3_common::error::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::provider::{OperationHandle, OperationStatus, VideoProvider, VideoReference};
use crate::reporter::ProgressReporter;

/// Heartbeat text sent while the operation is running.
pub const HEARTBEAT_MESSAGE: &str = "Still generating video...";

/// A finished operation with at least one video.
#[derive(Debug, Clone)]
pub struct CompletedOperation {
    pub handle: OperationHandle,
    pub videos: Vec<VideoReference>,
    /// Number of status queries made
    pub polls: u32,
    pub elapsed: Duration,
}

/// Polls operations at a fixed interval.
#[derive(Clone)]
pub struct OperationPoller {
    provider: Arc<dyn VideoProvider>,
    interval: Duration,
    timeout: Duration,
}

impl OperationPoller {
    pub fn new(provider: Arc<dyn VideoProvider>, interval: Duration, timeout: Duration) -> Self {
        Self {
            provider,
            interval,
            timeout,
        }
    }

    /// Upper bound on heartbeats before the timeout fires.
    pub fn max_attempts(&self) -> u32 {
        if self.interval.is_zero() {
            return 1;
        }
        let attempts = self.timeout.as_nanos().div_ceil(self.interval.as_nanos());
        u32::try_from(attempts).unwrap_or(u32::MAX).max(1)
    }

    /// Poll `handle` until the operation finishes.
    ///
    /// # Errors
    /// - `Error::ProviderError` if the operation reports a failure
    /// - `Error::EmptyResult` if it finishes without a video
    /// - `Error::PollTimeout` once the configured timeout elapses
    /// - `Error::Cancelled` when `cancel` fires; no further queries are made
    /// - any transport error from the provider
    pub async fn await_completion(
        &self,
        handle: OperationHandle,
        reporter: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<CompletedOperation, Error> {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let max_attempts = self.max_attempts();
        let mut handle = handle;
        let mut polls = 0u32;
        let mut heartbeats = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(self.cancelled(&handle));
            }

            // The deadline also bounds a status query that never answers.
            let status = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancelled(&handle)),
                status = self.provider.get_status(handle.clone()) => status?,
                _ = tokio::time::sleep_until(deadline) => return Err(self.timed_out(&handle, polls)),
            };
            polls += 1;

            if status.done {
                let elapsed = started.elapsed();
                return finish(status, polls, elapsed);
            }
            handle = status.handle;

            let wake = Instant::now() + self.interval;
            if wake > deadline {
                return Err(self.timed_out(&handle, polls));
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancelled(&handle)),
                _ = tokio::time::sleep_until(wake) => {}
            }

            heartbeats += 1;
            debug!(operation = %handle, attempt = heartbeats, max_attempts, "Operation still running");
            reporter.notify_info(HEARTBEAT_MESSAGE).await;
            reporter
                .notify_progress(heartbeats, Some(max_attempts), HEARTBEAT_MESSAGE)
                .await;
        }
    }

    fn timed_out(&self, handle: &OperationHandle, polls: u32) -> Error {
        warn!(operation = %handle, polls, "Video generation timed out");
        Error::PollTimeout(self.timeout.as_secs())
    }

    fn cancelled(&self, handle: &OperationHandle) -> Error {
        info!(operation = %handle, "Polling cancelled by caller");
        Error::Cancelled
    }
}

fn finish(status: OperationStatus, polls: u32, elapsed: Duration) -> Result<CompletedOperation, Error> {
    if let Some(message) = status.error {
        warn!(operation = %status.handle, error = %message, "Operation failed");
        return Err(Error::provider(message));
    }

    if status.videos.is_empty() {
        let message = match status.filtered_count {
            Some(count) if count > 0 => {
                let mut msg = format!("No videos generated; {} filtered by safety policies", count);
                if !status.filtered_reasons.is_empty() {
                    msg.push_str(&format!(": {}", status.filtered_reasons.join("; ")));
                }
                msg
            }
            _ => "No videos generated".to_string(),
        };
        return Err(Error::EmptyResult(message));
    }

    info!(
        operation = %status.handle,
        polls,
        elapsed_secs = elapsed.as_secs_f64(),
        videos = status.videos.len(),
        "Operation completed"
    );
    Ok(CompletedOperation {
        handle: status.handle,
        videos: status.videos,
        polls,
        elapsed,
    })
}

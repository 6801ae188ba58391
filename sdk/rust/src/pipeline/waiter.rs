use std::sync::Arc;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{PollConfig, cancellable};
use crate::backend::IngestBackend;
use crate::error::PipelineError;
use crate::metrics::{MetricsSink, PipelineEvent};
use crate::types::FileStatus;

/// Polls a file's status until the backend finishes processing it
pub struct ProcessingWaiter {
    backend: Arc<dyn IngestBackend>,
    config: PollConfig,
    sink: Arc<dyn MetricsSink>,
}

impl ProcessingWaiter {
    pub fn new(
        backend: Arc<dyn IngestBackend>,
        config: PollConfig,
        sink: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            backend,
            config,
            sink,
        }
    }

    /// Wait for a terminal status.
    ///
    /// The first query happens one interval after the call; queries never
    /// overlap. Returns the ready status, or fails on `ERROR`, on an
    /// exhausted budget, or on cancellation.
    pub async fn wait_until_processed(
        &self,
        file_id: &str,
        cancel: &CancellationToken,
    ) -> Result<FileStatus, PipelineError> {
        let interval = self.config.interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut attempts = 0u32;
        let mut last_error: Option<String> = None;

        loop {
            cancellable(cancel, ticker.tick()).await?;
            attempts += 1;

            match cancellable(cancel, self.backend.file_status(file_id)).await? {
                Ok(report) => {
                    self.sink.record(&PipelineEvent::StatusPolled {
                        attempt: attempts,
                        status: Some(report.status),
                    });
                    tracing::debug!(file_id, attempt = attempts, status = %report.status, "Polled file status");

                    if report.status.is_ready() {
                        return Ok(report.status);
                    }
                    if report.status == FileStatus::Error {
                        return Err(PipelineError::ProcessingFailure {
                            file_id: file_id.to_string(),
                            message: report
                                .error_message
                                .unwrap_or_else(|| "Unknown error".to_string()),
                        });
                    }
                }
                Err(e) => {
                    self.sink.record(&PipelineEvent::StatusPolled {
                        attempt: attempts,
                        status: None,
                    });
                    tracing::warn!(file_id, attempt = attempts, error = %e, "Status query failed");
                    last_error = Some(e.to_string());
                }
            }

            if attempts >= self.config.max_attempts {
                return Err(PipelineError::ProcessingTimeout {
                    file_id: file_id.to_string(),
                    attempts,
                    last_error,
                });
            }
        }
    }
}

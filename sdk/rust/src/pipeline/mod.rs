//! Upload → processing → discovery → preview pipeline
//!
//! Each stage is usable on its own; [`PipelineOrchestrator`] composes them
//! into one cancellable run bounded by an overall deadline.

mod assemble;
mod locator;
mod orchestrator;
mod upload;
mod waiter;

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;

pub use assemble::PreviewAssembler;
pub use locator::{DatasetLocator, Discovery};
pub use orchestrator::PipelineOrchestrator;
pub use upload::{UploadEvent, Uploader};
pub use waiter::ProcessingWaiter;

/// Status polling budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_millis(2000),
        }
    }
}

/// Dataset search and validation inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryConfig {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    /// Wait between a duplicate-state repair and the retried lookup
    pub repair_delay: Duration,
    pub inspect_validation: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            retry_delay: Duration::from_millis(2000),
            repair_delay: Duration::from_millis(500),
            inspect_validation: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub poll: PollConfig,
    /// Pause between processing completion and the first dataset lookup
    pub settle_delay: Duration,
    pub discovery: DiscoveryConfig,
    pub overall_timeout: Duration,
    pub upload_timeout: Duration,
    pub page: u32,
    pub page_size: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll: PollConfig::default(),
            settle_delay: Duration::from_millis(3000),
            discovery: DiscoveryConfig::default(),
            overall_timeout: Duration::from_millis(120_000),
            upload_timeout: Duration::from_secs(600),
            page: 0,
            page_size: 10_000,
        }
    }
}

/// Drive `fut` unless `cancel` fires first, dropping it on cancellation
pub(crate) async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, PipelineError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        output = fut => Ok(output),
    }
}

//! Pipeline observation
//!
//! Stages and backends never touch shared counters directly. They report
//! [`PipelineEvent`]s to an injected [`MetricsSink`]; callers pick the sink
//! (log them, aggregate them per endpoint, or capture them in tests).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::types::FileStatus;

/// Number of calls per endpoint between two summary log lines
const SUMMARY_EVERY_CALLS: u64 = 10;

/// Pipeline stage, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Upload,
    Processing,
    Settle,
    Discovery,
    Assembly,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Processing => "processing",
            Self::Settle => "settle",
            Self::Discovery => "discovery",
            Self::Assembly => "assembly",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend operation, used to key request metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Endpoint {
    Upload,
    FileStatus,
    ListDatasets,
    DatasetRows,
    DatasetColumns,
    ColumnValidation,
    RepairDuplicates,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "files.upload",
            Self::FileStatus => "files.status",
            Self::ListDatasets => "datasets.list",
            Self::DatasetRows => "datasets.rows",
            Self::DatasetColumns => "datasets.columns",
            Self::ColumnValidation => "validation.column",
            Self::RepairDuplicates => "validation.fix_duplicates",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    StageStarted(Stage),
    StageCompleted { stage: Stage, elapsed: Duration },
    UploadProgress(u8),
    /// `status` is `None` when the query itself failed
    StatusPolled {
        attempt: u32,
        status: Option<FileStatus>,
    },
    DatasetLookup { attempt: u32, found: bool },
    RepairIssued { dataset_id: String, success: bool },
    DiscoveryDegraded { dataset_id: String, reason: String },
    Request {
        endpoint: Endpoint,
        success: bool,
        elapsed: Duration,
    },
}

/// Receiver of pipeline events. Must be cheap; it is called inline.
pub trait MetricsSink: Send + Sync {
    fn record(&self, event: &PipelineEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn record(&self, _event: &PipelineEvent) {}
}

/// Logs every event through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn record(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::StageStarted(stage) => {
                tracing::debug!(stage = %stage, "Stage started");
            }
            PipelineEvent::StageCompleted { stage, elapsed } => {
                tracing::debug!(
                    stage = %stage,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Stage completed"
                );
            }
            PipelineEvent::UploadProgress(percent) => {
                tracing::trace!(percent, "Upload progress");
            }
            PipelineEvent::StatusPolled { attempt, status } => match status {
                Some(status) => tracing::debug!(attempt, status = %status, "File status polled"),
                None => tracing::debug!(attempt, "File status poll failed"),
            },
            PipelineEvent::DatasetLookup { attempt, found } => {
                tracing::debug!(attempt, found, "Dataset lookup");
            }
            PipelineEvent::RepairIssued {
                dataset_id,
                success,
            } => {
                tracing::info!(dataset_id = %dataset_id, success, "Duplicate-state repair issued");
            }
            PipelineEvent::DiscoveryDegraded { dataset_id, reason } => {
                tracing::warn!(
                    dataset_id = %dataset_id,
                    reason = %reason,
                    "Validation data degraded to placeholders"
                );
            }
            PipelineEvent::Request {
                endpoint,
                success,
                elapsed,
            } => {
                tracing::trace!(
                    endpoint = %endpoint,
                    success,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Backend request"
                );
            }
        }
    }
}

/// Captures events in memory, mostly for assertions
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<PipelineEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&PipelineEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl MetricsSink for RecordingSink {
    fn record(&self, event: &PipelineEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Aggregated request metrics of one endpoint
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EndpointSummary {
    pub total_calls: u64,
    pub success_calls: u64,
    pub error_calls: u64,
    pub total_time: Duration,
}

impl EndpointSummary {
    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            return 0.0;
        }
        self.success_calls as f64 / self.total_calls as f64 * 100.0
    }

    pub fn avg_response_time(&self) -> Duration {
        if self.total_calls == 0 {
            return Duration::ZERO;
        }
        self.total_time / self.total_calls as u32
    }
}

/// Per-endpoint call counts and latency, logged every few calls
#[derive(Debug, Default)]
pub struct EndpointStats {
    endpoints: Mutex<BTreeMap<Endpoint, EndpointSummary>>,
}

impl EndpointStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, endpoint: Endpoint) -> EndpointSummary {
        self.endpoints
            .lock()
            .get(&endpoint)
            .copied()
            .unwrap_or_default()
    }

    /// All endpoints seen so far, in a stable order
    pub fn snapshot(&self) -> Vec<(Endpoint, EndpointSummary)> {
        self.endpoints
            .lock()
            .iter()
            .map(|(endpoint, summary)| (*endpoint, *summary))
            .collect()
    }
}

impl MetricsSink for EndpointStats {
    fn record(&self, event: &PipelineEvent) {
        let PipelineEvent::Request {
            endpoint,
            success,
            elapsed,
        } = event
        else {
            return;
        };

        let summary = {
            let mut endpoints = self.endpoints.lock();
            let summary = endpoints.entry(*endpoint).or_default();
            summary.total_calls += 1;
            if *success {
                summary.success_calls += 1;
            } else {
                summary.error_calls += 1;
            }
            summary.total_time += *elapsed;
            *summary
        };

        if summary.total_calls % SUMMARY_EVERY_CALLS == 0 {
            tracing::info!(
                endpoint = %endpoint,
                total_calls = summary.total_calls,
                success_rate = format!("{:.1}%", summary.success_rate()),
                avg_response_ms = summary.avg_response_time().as_millis() as u64,
                "Endpoint metrics"
            );
        }
    }
}

/// Forwards every event to several sinks
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn MetricsSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl MetricsSink for FanoutSink {
    fn record(&self, event: &PipelineEvent) {
        for sink in &self.sinks {
            sink.record(event);
        }
    }
}

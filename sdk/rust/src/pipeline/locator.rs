use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{DiscoveryConfig, cancellable};
use crate::backend::IngestBackend;
use crate::error::{PipelineError, TransportError};
use crate::metrics::{MetricsSink, PipelineEvent};
use crate::retry::{RetryError, retry_fixed, sleep_or_cancel};
use crate::types::{ColumnValidation, DatasetColumn, DatasetHandle, DegradedDiscovery};

/// Outcome of a successful dataset search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub handle: DatasetHandle,
    /// Per-column validation summaries, in column order
    pub validations: Vec<ColumnValidation>,
    /// Set when some validation data fell back to placeholders
    pub degraded: Option<DegradedDiscovery>,
}

/// Why a single lookup did not produce a handle
enum LookupMiss {
    NotFound,
    Failed(TransportError),
}

impl fmt::Display for LookupMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("no dataset references the file yet"),
            Self::Failed(e) => write!(f, "{}", e),
        }
    }
}

/// Finds the dataset the backend derived from an uploaded file
pub struct DatasetLocator {
    backend: Arc<dyn IngestBackend>,
    config: DiscoveryConfig,
    sink: Arc<dyn MetricsSink>,
}

impl DatasetLocator {
    pub fn new(
        backend: Arc<dyn IngestBackend>,
        config: DiscoveryConfig,
        sink: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            backend,
            config,
            sink,
        }
    }

    /// Find the dataset, then read its validation data when enabled
    pub async fn locate(
        &self,
        file_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Discovery, PipelineError> {
        let handle = self.find_dataset(file_id, cancel).await?;

        let (validations, degraded) = if self.config.inspect_validation {
            self.inspect(&handle.id, cancel).await?
        } else {
            (Vec::new(), None)
        };

        Ok(Discovery {
            handle,
            validations,
            degraded,
        })
    }

    /// Search the dataset listing until an entry references `file_id`
    pub async fn find_dataset(
        &self,
        file_id: &str,
        cancel: &CancellationToken,
    ) -> Result<DatasetHandle, PipelineError> {
        let result = retry_fixed(
            self.config.max_attempts,
            self.config.retry_delay,
            cancel,
            |attempt| self.lookup_once(file_id, attempt),
        )
        .await;

        match result {
            Ok((handle, attempts)) => {
                tracing::info!(file_id, dataset_id = %handle.id, attempts, "Dataset found");
                Ok(handle)
            }
            Err(RetryError::Exhausted { error, attempts }) => {
                tracing::warn!(file_id, attempts, error = %error, "Dataset search exhausted");
                Err(PipelineError::DiscoveryTimeout {
                    file_id: file_id.to_string(),
                    attempts,
                    last_error: Some(error.to_string()),
                })
            }
            Err(RetryError::Cancelled { .. }) => Err(PipelineError::Cancelled),
        }
    }

    async fn lookup_once(&self, file_id: &str, attempt: u32) -> Result<DatasetHandle, LookupMiss> {
        let found = match self.backend.list_datasets().await {
            Ok(datasets) => datasets.iter().find_map(|d| d.handle_for(file_id)),
            Err(e) => {
                self.sink.record(&PipelineEvent::DatasetLookup {
                    attempt,
                    found: false,
                });
                return Err(LookupMiss::Failed(e));
            }
        };

        self.sink.record(&PipelineEvent::DatasetLookup {
            attempt,
            found: found.is_some(),
        });
        found.ok_or(LookupMiss::NotFound)
    }

    /// Read each column's validation summary.
    ///
    /// Lookup failures never propagate: the column gets a placeholder and the
    /// returned marker names it. A duplicate-state failure first triggers one
    /// repair for the dataset and a single retry. Only cancellation is an
    /// error.
    pub async fn inspect(
        &self,
        dataset_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(Vec<ColumnValidation>, Option<DegradedDiscovery>), PipelineError> {
        let columns = match cancellable(cancel, self.backend.dataset_columns(dataset_id)).await? {
            Ok(columns) => columns,
            Err(e) => {
                let degraded = DegradedDiscovery {
                    dataset_id: dataset_id.to_string(),
                    columns: Vec::new(),
                    reason: e.detail(),
                    repair_attempted: false,
                };
                self.report_degraded(&degraded);
                return Ok((Vec::new(), Some(degraded)));
            }
        };

        let mut validations = Vec::with_capacity(columns.len());
        let mut placeholders = Vec::new();
        let mut reason = None;
        let mut repaired = false;

        for column in &columns {
            let mut result = self.lookup_validation(dataset_id, column, cancel).await?;

            if let Err(e) = &result
                && e.is_duplicate_state()
            {
                if !repaired {
                    repaired = true;
                    self.repair(dataset_id, cancel).await?;
                }
                tracing::debug!(dataset_id, column = %column.name, "Retrying validation lookup");
                result = self.lookup_validation(dataset_id, column, cancel).await?;
            }

            match result {
                Ok(validation) => validations.push(validation),
                Err(e) => {
                    tracing::debug!(dataset_id, column = %column.name, error = %e, "Validation lookup failed");
                    validations.push(ColumnValidation::placeholder(column));
                    placeholders.push(column.name.clone());
                    reason = Some(e.detail());
                }
            }
        }

        let degraded = reason.map(|reason| DegradedDiscovery {
            dataset_id: dataset_id.to_string(),
            columns: placeholders,
            reason,
            repair_attempted: repaired,
        });
        if let Some(degraded) = &degraded {
            self.report_degraded(degraded);
        }

        Ok((validations, degraded))
    }

    async fn lookup_validation(
        &self,
        dataset_id: &str,
        column: &DatasetColumn,
        cancel: &CancellationToken,
    ) -> Result<Result<ColumnValidation, TransportError>, PipelineError> {
        cancellable(cancel, self.backend.column_validation(dataset_id, column)).await
    }

    async fn repair(&self, dataset_id: &str, cancel: &CancellationToken) -> Result<(), PipelineError> {
        let outcome = cancellable(cancel, self.backend.repair_duplicates(dataset_id)).await?;
        if let Err(e) = &outcome {
            tracing::warn!(dataset_id, error = %e, "Duplicate-state repair failed");
        }
        self.sink.record(&PipelineEvent::RepairIssued {
            dataset_id: dataset_id.to_string(),
            success: outcome.is_ok(),
        });

        if sleep_or_cancel(self.config.repair_delay, cancel).await {
            Ok(())
        } else {
            Err(PipelineError::Cancelled)
        }
    }

    fn report_degraded(&self, degraded: &DegradedDiscovery) {
        tracing::warn!(
            dataset_id = %degraded.dataset_id,
            columns = ?degraded.columns,
            reason = %degraded.reason,
            repair_attempted = degraded.repair_attempted,
            "Using placeholder validation data"
        );
        self.sink.record(&PipelineEvent::DiscoveryDegraded {
            dataset_id: degraded.dataset_id.clone(),
            reason: degraded.reason.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;

    use super::*;
    use crate::error::{DUPLICATE_STATE_SIGNATURE, ErrorKind};
    use crate::metrics::{Endpoint, RecordingSink};
    use crate::testing::ScriptedBackend;
    use crate::types::DatasetSummary;

    fn config(max_attempts: u32) -> DiscoveryConfig {
        DiscoveryConfig {
            max_attempts,
            ..DiscoveryConfig::default()
        }
    }

    fn duplicate_error() -> TransportError {
        TransportError::status(500, format!("{}: 7", DUPLICATE_STATE_SIGNATURE))
    }

    fn locator(backend: &Arc<ScriptedBackend>, config: DiscoveryConfig) -> (DatasetLocator, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        (DatasetLocator::new(backend.clone(), config, sink.clone()), sink)
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_match_found_on_first_lookup() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_datasets(Ok(vec![
            DatasetSummary::new("d0", Some("other")),
            DatasetSummary::new("d1", Some("f1")),
            DatasetSummary::new("d2", None),
        ]));
        let (locator, sink) = locator(&backend, config(10));

        let handle = locator
            .find_dataset("f1", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(handle.id, "d1");
        assert_eq!(handle.file_id, "f1");
        assert_eq!(backend.calls(Endpoint::ListDatasets), 1);
        assert_eq!(
            sink.events(),
            vec![PipelineEvent::DatasetLookup {
                attempt: 1,
                found: true
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_matches_exhaust_the_bound() {
        let backend = Arc::new(ScriptedBackend::new());
        let (locator, _sink) = locator(&backend, config(4));

        let start = Instant::now();
        let err = locator
            .find_dataset("f1", &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DiscoveryTimeout);
        assert!(matches!(
            err,
            PipelineError::DiscoveryTimeout { attempts: 4, .. }
        ));
        assert_eq!(backend.calls(Endpoint::ListDatasets), 4);
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_is_retried_and_reported() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_datasets(Err(TransportError::Network("reset".into())));
        backend.push_datasets(Ok(vec![DatasetSummary::new("d1", Some("f1"))]));
        let (locator, _sink) = locator(&backend, config(10));

        let handle = locator
            .find_dataset("f1", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(handle.id, "d1");
        assert_eq!(backend.calls(Endpoint::ListDatasets), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_carries_last_failure() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_datasets(Ok(vec![]));
        backend.push_datasets(Err(TransportError::status(503, "unavailable")));
        let (locator, _sink) = locator(&backend, config(2));

        let err = locator
            .find_dataset("f1", &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            PipelineError::DiscoveryTimeout {
                file_id: "f1".to_string(),
                attempts: 2,
                last_error: Some("Server returned 503: unavailable".to_string())
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_retry_delay() {
        let backend = Arc::new(ScriptedBackend::new());
        let (locator, _sink) = locator(&backend, config(10));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(3000)).await;
            trigger.cancel();
        });

        let result = locator.find_dataset("f1", &cancel).await;
        assert_eq!(result, Err(PipelineError::Cancelled));
        assert_eq!(backend.calls(Endpoint::ListDatasets), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_locate_collects_validations() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_datasets(Ok(vec![DatasetSummary::new("d1", Some("f1"))]));
        backend.push_columns(Ok(vec![
            DatasetColumn::new("c1", "name"),
            DatasetColumn::new("c2", "email"),
        ]));
        let (locator, sink) = locator(&backend, config(10));

        let discovery = locator.locate("f1", &CancellationToken::new()).await.unwrap();

        assert_eq!(discovery.handle.id, "d1");
        assert_eq!(discovery.validations.len(), 2);
        assert_eq!(discovery.validations[1].column_name, "email");
        assert_eq!(discovery.validations[1].valid_count, 1);
        assert!(discovery.degraded.is_none());
        assert_eq!(
            sink.count(|e| matches!(e, PipelineEvent::DiscoveryDegraded { .. })),
            0
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_state_repairs_once_and_retries() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_datasets(Ok(vec![DatasetSummary::new("d1", Some("f1"))]));
        backend.push_columns(Ok(vec![DatasetColumn::new("c1", "name")]));
        backend.push_validation(Err(duplicate_error()));
        let (locator, sink) = locator(&backend, config(10));

        let start = Instant::now();
        let discovery = locator.locate("f1", &CancellationToken::new()).await.unwrap();

        assert_eq!(backend.repaired(), vec!["d1".to_string()]);
        assert_eq!(backend.calls(Endpoint::ColumnValidation), 2);
        assert_eq!(discovery.validations[0].valid_count, 1);
        assert!(discovery.degraded.is_none());
        assert_eq!(start.elapsed(), Duration::from_millis(500));
        assert!(sink.events().contains(&PipelineEvent::RepairIssued {
            dataset_id: "d1".to_string(),
            success: true
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_duplicate_state_degrades() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_datasets(Ok(vec![DatasetSummary::new("d1", Some("f1"))]));
        backend.push_columns(Ok(vec![
            DatasetColumn::new("c1", "name"),
            DatasetColumn::new("c2", "email"),
        ]));
        backend.push_validation(Err(duplicate_error()));
        backend.push_validation(Err(duplicate_error()));
        let (locator, sink) = locator(&backend, config(10));

        let discovery = locator.locate("f1", &CancellationToken::new()).await.unwrap();

        assert_eq!(
            discovery.validations[0],
            ColumnValidation::placeholder(&DatasetColumn::new("c1", "name"))
        );
        assert_eq!(discovery.validations[1].valid_count, 1);
        let degraded = discovery.degraded.unwrap();
        assert_eq!(degraded.columns, vec!["name".to_string()]);
        assert!(degraded.repair_attempted);
        assert!(degraded.reason.contains(DUPLICATE_STATE_SIGNATURE));
        assert_eq!(backend.calls(Endpoint::RepairDuplicates), 1);
        assert_eq!(
            sink.count(|e| matches!(e, PipelineEvent::DiscoveryDegraded { .. })),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_repair_issued_at_most_once_per_locate() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_datasets(Ok(vec![DatasetSummary::new("d1", Some("f1"))]));
        backend.push_columns(Ok(vec![
            DatasetColumn::new("c1", "name"),
            DatasetColumn::new("c2", "email"),
        ]));
        backend.push_validation(Err(duplicate_error()));
        backend.push_validation(Ok(ColumnValidation::placeholder(&DatasetColumn::new(
            "c1", "name",
        ))));
        backend.push_validation(Err(duplicate_error()));
        let (locator, _sink) = locator(&backend, config(10));

        let discovery = locator.locate("f1", &CancellationToken::new()).await.unwrap();

        assert_eq!(backend.calls(Endpoint::RepairDuplicates), 1);
        assert_eq!(backend.calls(Endpoint::ColumnValidation), 4);
        assert!(discovery.degraded.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_errors_degrade_without_repair() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_datasets(Ok(vec![DatasetSummary::new("d1", Some("f1"))]));
        backend.push_columns(Ok(vec![DatasetColumn::new("c1", "name")]));
        backend.push_validation(Err(TransportError::status(404, "Column not found")));
        let (locator, _sink) = locator(&backend, config(10));

        let discovery = locator.locate("f1", &CancellationToken::new()).await.unwrap();

        let degraded = discovery.degraded.unwrap();
        assert!(!degraded.repair_attempted);
        assert_eq!(degraded.reason, "Column not found");
        assert_eq!(backend.calls(Endpoint::RepairDuplicates), 0);
        assert_eq!(backend.calls(Endpoint::ColumnValidation), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_column_listing_failure_degrades() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_datasets(Ok(vec![DatasetSummary::new("d1", Some("f1"))]));
        backend.push_columns(Err(TransportError::Timeout));
        let (locator, _sink) = locator(&backend, config(10));

        let discovery = locator.locate("f1", &CancellationToken::new()).await.unwrap();

        assert!(discovery.validations.is_empty());
        let degraded = discovery.degraded.unwrap();
        assert!(degraded.columns.is_empty());
        assert_eq!(degraded.reason, "Request timed out");
    }

    #[tokio::test(start_paused = true)]
    async fn test_inspection_disabled() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_datasets(Ok(vec![DatasetSummary::new("d1", Some("f1"))]));
        let (locator, _sink) = locator(
            &backend,
            DiscoveryConfig {
                inspect_validation: false,
                ..DiscoveryConfig::default()
            },
        );

        let discovery = locator.locate("f1", &CancellationToken::new()).await.unwrap();
        assert!(discovery.validations.is_empty());
        assert_eq!(backend.calls(Endpoint::DatasetColumns), 0);
    }
}

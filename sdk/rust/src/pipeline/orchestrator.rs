use std::future::Future;
use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{
    DatasetLocator, PipelineConfig, PreviewAssembler, ProcessingWaiter, Uploader, cancellable,
};
use crate::backend::IngestBackend;
use crate::error::PipelineError;
use crate::metrics::{MetricsSink, PipelineEvent, Stage};
use crate::retry::sleep_or_cancel;
use crate::types::{PreviewResult, UploadPayload};

/// Runs upload, processing wait, dataset discovery and preview assembly as
/// one cancellable operation under an overall deadline.
pub struct PipelineOrchestrator {
    backend: Arc<dyn IngestBackend>,
    config: PipelineConfig,
    sink: Arc<dyn MetricsSink>,
}

impl PipelineOrchestrator {
    pub fn new(
        backend: Arc<dyn IngestBackend>,
        config: PipelineConfig,
        sink: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            backend,
            config,
            sink,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Upload `payload` and return the preview of the dataset derived from it.
    ///
    /// The first failing stage ends the run. Cancelling `cancel` stops the
    /// active stage and yields [`PipelineError::Cancelled`].
    ///
    /// When the upload ticket already names a dataset, polling and discovery
    /// are skipped and the rows are assembled directly. Validation inspection
    /// is part of discovery, so on that path `validations` is always empty
    /// and `degraded` is never set.
    pub async fn run(
        &self,
        payload: UploadPayload,
        description: Option<String>,
        cancel: CancellationToken,
    ) -> Result<PreviewResult, PipelineError> {
        let started = Instant::now();
        let run_cancel = cancel.child_token();

        let outcome = tokio::time::timeout(
            self.config.overall_timeout,
            self.run_stages(payload, description, &run_cancel),
        )
        .await;

        match outcome {
            Ok(result) => {
                match &result {
                    Ok(preview) => tracing::info!(
                        dataset_id = %preview.dataset_id,
                        rows = preview.data.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Pipeline completed"
                    ),
                    Err(e) => tracing::warn!(kind = %e.kind(), error = %e, "Pipeline failed"),
                }
                result
            }
            Err(_) => {
                run_cancel.cancel();
                let elapsed_ms = started.elapsed().as_millis() as u64;
                tracing::warn!(elapsed_ms, "Pipeline exceeded its overall deadline");
                Err(PipelineError::OverallTimeout { elapsed_ms })
            }
        }
    }

    async fn run_stages(
        &self,
        payload: UploadPayload,
        description: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<PreviewResult, PipelineError> {
        let uploader = Uploader::new(self.backend.clone(), self.config.upload_timeout);
        let ticket = self
            .stage(Stage::Upload, async {
                uploader
                    .upload_to_completion(payload, description, cancel.clone(), |percent| {
                        self.sink.record(&PipelineEvent::UploadProgress(percent))
                    })
                    .await
                    .map_err(PipelineError::from)
            })
            .await?;

        if let Some(dataset_id) = ticket.dataset_id.as_deref() {
            tracing::info!(file_id = %ticket.file_id, dataset_id, "Dataset materialized during upload");
            return self.assemble(dataset_id, cancel).await;
        }

        let waiter = ProcessingWaiter::new(
            self.backend.clone(),
            self.config.poll,
            self.sink.clone(),
        );
        self.stage(
            Stage::Processing,
            waiter.wait_until_processed(&ticket.file_id, cancel),
        )
        .await?;

        self.stage(Stage::Settle, async {
            if sleep_or_cancel(self.config.settle_delay, cancel).await {
                Ok(())
            } else {
                Err(PipelineError::Cancelled)
            }
        })
        .await?;

        let locator = DatasetLocator::new(
            self.backend.clone(),
            self.config.discovery,
            self.sink.clone(),
        );
        let discovery = self
            .stage(Stage::Discovery, locator.locate(&ticket.file_id, cancel))
            .await?;

        let mut preview = self.assemble(&discovery.handle.id, cancel).await?;
        preview.validations = discovery.validations;
        preview.degraded = discovery.degraded;
        Ok(preview)
    }

    async fn assemble(
        &self,
        dataset_id: &str,
        cancel: &CancellationToken,
    ) -> Result<PreviewResult, PipelineError> {
        let assembler = PreviewAssembler::new(self.backend.clone());
        self.stage(Stage::Assembly, async {
            cancellable(
                cancel,
                assembler.assemble(dataset_id, self.config.page, self.config.page_size),
            )
            .await?
        })
        .await
    }

    async fn stage<T>(
        &self,
        stage: Stage,
        fut: impl Future<Output = Result<T, PipelineError>>,
    ) -> Result<T, PipelineError> {
        let started = Instant::now();
        self.sink.record(&PipelineEvent::StageStarted(stage));
        tracing::debug!(stage = %stage, "Stage started");

        let result = fut.await;
        if result.is_ok() {
            self.sink.record(&PipelineEvent::StageCompleted {
                stage,
                elapsed: started.elapsed(),
            });
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::{ErrorKind, TransportError};
    use crate::metrics::{Endpoint, RecordingSink};
    use crate::pipeline::PollConfig;
    use crate::testing::{ScriptedBackend, page, row};
    use crate::types::{
        DatasetColumn, DatasetSummary, FileStatus, FileStatusReport, UploadTicket,
    };

    fn payload() -> UploadPayload {
        UploadPayload::new("people.csv", b"name,email\nAda,ada@example.com\n".to_vec())
    }

    fn orchestrator(
        backend: &Arc<ScriptedBackend>,
        config: PipelineConfig,
    ) -> (PipelineOrchestrator, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        (
            PipelineOrchestrator::new(backend.clone(), config, sink.clone()),
            sink,
        )
    }

    fn people_page() -> crate::types::RowPage {
        page(
            vec![
                row(1, &[("name", "Ada"), ("email", "ada@example.com")]),
                row(2, &[("name", "Bob"), ("email", "bob@example.com")]),
            ],
            2,
            1,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticket_with_dataset_skips_to_assembly() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_upload(Ok(UploadTicket::new("f1", Some("d1".to_string()))));
        backend.push_rows(Ok(people_page()));
        let (pipeline, sink) = orchestrator(&backend, PipelineConfig::default());

        let start = Instant::now();
        let preview = pipeline
            .run(payload(), None, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(preview.dataset_id, "d1");
        assert_eq!(preview.headers, vec!["name", "email"]);
        assert_eq!(preview.total_rows, 2);
        assert_eq!(backend.calls(Endpoint::FileStatus), 0);
        assert_eq!(backend.calls(Endpoint::ListDatasets), 0);
        assert_eq!(backend.calls(Endpoint::DatasetColumns), 0);
        assert!(preview.validations.is_empty());
        assert!(preview.degraded.is_none());
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(
            sink.count(|e| matches!(e, PipelineEvent::StageStarted(_))),
            2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_materialization() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.set_upload_progress(&[50, 100]);
        backend.push_upload(Ok(UploadTicket::new("f1", None)));
        backend.push_status(Ok(FileStatusReport::new(FileStatus::Processing)));
        backend.push_status(Ok(FileStatusReport::new(FileStatus::Processed)));
        backend.push_datasets(Ok(vec![]));
        backend.push_datasets(Ok(vec![]));
        backend.push_datasets(Ok(vec![DatasetSummary::new("d7", Some("f1"))]));
        backend.push_columns(Ok(vec![DatasetColumn::new("c1", "name")]));
        backend.push_rows(Ok(people_page()));
        let (pipeline, sink) = orchestrator(&backend, PipelineConfig::default());

        let start = Instant::now();
        let preview = pipeline
            .run(payload(), Some("people".to_string()), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(preview.dataset_id, "d7");
        assert_eq!(preview.data.len(), 2);
        assert_eq!(preview.validations.len(), 1);
        assert!(preview.degraded.is_none());
        assert_eq!(backend.calls(Endpoint::FileStatus), 2);
        assert_eq!(backend.calls(Endpoint::ListDatasets), 3);
        // two polls at 2s, settle 3s, two discovery delays at 2s
        assert_eq!(start.elapsed(), Duration::from_secs(11));

        let events = sink.events();
        assert!(events.contains(&PipelineEvent::UploadProgress(100)));
        let completed: Vec<Stage> = events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::StageCompleted { stage, .. } => Some(*stage),
                _ => None,
            })
            .collect();
        assert_eq!(
            completed,
            vec![
                Stage::Upload,
                Stage::Processing,
                Stage::Settle,
                Stage::Discovery,
                Stage::Assembly
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_file_error_short_circuits() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_status(Ok(FileStatusReport::failed("Unsupported encoding")));
        let (pipeline, _sink) = orchestrator(&backend, PipelineConfig::default());

        let err = pipeline
            .run(payload(), None, CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ProcessingFailure);
        assert!(err.to_string().contains("Unsupported encoding"));
        assert_eq!(backend.calls(Endpoint::ListDatasets), 0);
        assert_eq!(backend.calls(Endpoint::DatasetRows), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overall_timeout_drops_active_stage() {
        let backend = Arc::new(ScriptedBackend::new());
        let config = PipelineConfig {
            poll: PollConfig {
                max_attempts: 1000,
                interval: Duration::from_secs(2),
            },
            overall_timeout: Duration::from_secs(10),
            ..PipelineConfig::default()
        };
        let (pipeline, _sink) = orchestrator(&backend, config);

        let err = pipeline
            .run(payload(), None, CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::OverallTimeout);
        assert_eq!(err, PipelineError::OverallTimeout { elapsed_ms: 10_000 });
        let polls = backend.calls(Endpoint::FileStatus);
        assert!((4..=5).contains(&polls));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(backend.calls(Endpoint::FileStatus), polls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_deadline_with_slow_polling() {
        let backend = Arc::new(ScriptedBackend::new());
        let config = PipelineConfig {
            poll: PollConfig {
                interval: Duration::from_secs(50),
                ..PollConfig::default()
            },
            ..PipelineConfig::default()
        };
        assert_eq!(config.overall_timeout, Duration::from_millis(120_000));
        let (pipeline, _sink) = orchestrator(&backend, config);

        let err = pipeline
            .run(payload(), None, CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err, PipelineError::OverallTimeout { elapsed_ms: 120_000 });
        assert_eq!(backend.calls(Endpoint::FileStatus), 2);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(backend.calls(Endpoint::FileStatus), 2);
        assert_eq!(backend.calls(Endpoint::ListDatasets), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_poll_yields_no_result() {
        let backend = Arc::new(ScriptedBackend::new());
        let (pipeline, _sink) = orchestrator(&backend, PipelineConfig::default());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            trigger.cancel();
        });

        let err = pipeline.run(payload(), None, cancel).await.unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(backend.calls(Endpoint::FileStatus), 3);
        assert_eq!(backend.calls(Endpoint::ListDatasets), 0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(backend.calls(Endpoint::FileStatus), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_upload() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.hang_upload();
        let (pipeline, _sink) = orchestrator(&backend, PipelineConfig::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = pipeline.run(payload(), None, cancel).await.unwrap_err();
        assert_eq!(err, PipelineError::Cancelled);
        assert_eq!(backend.calls(Endpoint::FileStatus), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_payload_is_transfer_failure() {
        let backend = Arc::new(ScriptedBackend::new());
        let (pipeline, _sink) = orchestrator(&backend, PipelineConfig::default());

        let err = pipeline
            .run(
                UploadPayload::new("empty.csv", vec![]),
                None,
                CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::TransferFailure);
        assert_eq!(backend.calls(Endpoint::Upload), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovery_degradation_is_surfaced_not_fatal() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_status(Ok(FileStatusReport::new(FileStatus::Uploaded)));
        backend.push_datasets(Ok(vec![DatasetSummary::new("d1", Some("f1"))]));
        backend.push_columns(Err(TransportError::status(500, "boom")));
        backend.push_rows(Ok(people_page()));
        let (pipeline, sink) = orchestrator(&backend, PipelineConfig::default());

        let preview = pipeline
            .run(payload(), None, CancellationToken::new())
            .await
            .unwrap();

        let degraded = preview.degraded.unwrap();
        assert_eq!(degraded.dataset_id, "d1");
        assert_eq!(degraded.reason, "boom");
        assert_eq!(
            sink.count(|e| matches!(e, PipelineEvent::DiscoveryDegraded { .. })),
            1
        );
    }
}

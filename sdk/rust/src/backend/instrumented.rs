use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use super::{IngestBackend, ProgressSender};
use crate::error::TransportError;
use crate::metrics::{Endpoint, MetricsSink, PipelineEvent};
use crate::types::{
    ColumnValidation, DatasetColumn, DatasetSummary, FileStatusReport, RowPage, UploadPayload,
    UploadTicket,
};

/// Times every call of the inner backend and reports it to a sink
pub struct InstrumentedBackend {
    inner: Arc<dyn IngestBackend>,
    sink: Arc<dyn MetricsSink>,
}

impl InstrumentedBackend {
    pub fn new(inner: Arc<dyn IngestBackend>, sink: Arc<dyn MetricsSink>) -> Self {
        Self { inner, sink }
    }

    fn observe<T>(
        &self,
        endpoint: Endpoint,
        started: Instant,
        result: Result<T, TransportError>,
    ) -> Result<T, TransportError> {
        self.sink.record(&PipelineEvent::Request {
            endpoint,
            success: result.is_ok(),
            elapsed: started.elapsed(),
        });
        result
    }
}

impl std::fmt::Debug for InstrumentedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentedBackend")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl IngestBackend for InstrumentedBackend {
    async fn upload(
        &self,
        payload: UploadPayload,
        description: Option<String>,
        progress: ProgressSender,
    ) -> Result<UploadTicket, TransportError> {
        let started = Instant::now();
        let result = self.inner.upload(payload, description, progress).await;
        self.observe(Endpoint::Upload, started, result)
    }

    async fn file_status(&self, file_id: &str) -> Result<FileStatusReport, TransportError> {
        let started = Instant::now();
        let result = self.inner.file_status(file_id).await;
        self.observe(Endpoint::FileStatus, started, result)
    }

    async fn list_datasets(&self) -> Result<Vec<DatasetSummary>, TransportError> {
        let started = Instant::now();
        let result = self.inner.list_datasets().await;
        self.observe(Endpoint::ListDatasets, started, result)
    }

    async fn dataset_rows(
        &self,
        dataset_id: &str,
        page: u32,
        size: u32,
    ) -> Result<RowPage, TransportError> {
        let started = Instant::now();
        let result = self.inner.dataset_rows(dataset_id, page, size).await;
        self.observe(Endpoint::DatasetRows, started, result)
    }

    async fn dataset_columns(
        &self,
        dataset_id: &str,
    ) -> Result<Vec<DatasetColumn>, TransportError> {
        let started = Instant::now();
        let result = self.inner.dataset_columns(dataset_id).await;
        self.observe(Endpoint::DatasetColumns, started, result)
    }

    async fn column_validation(
        &self,
        dataset_id: &str,
        column: &DatasetColumn,
    ) -> Result<ColumnValidation, TransportError> {
        let started = Instant::now();
        let result = self.inner.column_validation(dataset_id, column).await;
        self.observe(Endpoint::ColumnValidation, started, result)
    }

    async fn repair_duplicates(&self, dataset_id: &str) -> Result<(), TransportError> {
        let started = Instant::now();
        let result = self.inner.repair_duplicates(dataset_id).await;
        self.observe(Endpoint::RepairDuplicates, started, result)
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

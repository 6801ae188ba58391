//! Seam to the ingestion backend

mod http;
mod instrumented;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::types::{
    ColumnValidation, DatasetColumn, DatasetSummary, FileStatusReport, RowPage, UploadPayload,
    UploadTicket,
};

pub use http::{HttpBackend, HttpBackendConfig};
pub use instrumented::InstrumentedBackend;

/// Channel on which a backend reports upload progress in percent
pub type ProgressSender = mpsc::UnboundedSender<u8>;

/// Operations the pipeline needs from the backend.
///
/// Every call is a single request; retry policy belongs to the pipeline
/// stages. Dropping a returned future must abort the request.
#[async_trait]
pub trait IngestBackend: Send + Sync + std::fmt::Debug {
    /// Transfer a file, reporting progress while the body is sent
    async fn upload(
        &self,
        payload: UploadPayload,
        description: Option<String>,
        progress: ProgressSender,
    ) -> Result<UploadTicket, TransportError>;

    /// Current processing status of an uploaded file
    async fn file_status(&self, file_id: &str) -> Result<FileStatusReport, TransportError>;

    /// All datasets owned by the current principal
    async fn list_datasets(&self) -> Result<Vec<DatasetSummary>, TransportError>;

    /// One page of a dataset's rows
    async fn dataset_rows(
        &self,
        dataset_id: &str,
        page: u32,
        size: u32,
    ) -> Result<RowPage, TransportError>;

    async fn dataset_columns(&self, dataset_id: &str)
    -> Result<Vec<DatasetColumn>, TransportError>;

    async fn column_validation(
        &self,
        dataset_id: &str,
        column: &DatasetColumn,
    ) -> Result<ColumnValidation, TransportError>;

    /// Idempotent repair of duplicated derived state for a dataset
    async fn repair_duplicates(&self, dataset_id: &str) -> Result<(), TransportError>;

    /// Human-readable backend name
    fn name(&self) -> &'static str;
}

//! # tabpreview
//!
//! Upload a tabular file (CSV/spreadsheet) to an ingestion backend and get a
//! preview of the dataset the backend derives from it.
//!
//! The backend processes uploads asynchronously: the file is parsed
//! out-of-band and its dataset only becomes queryable some time after the
//! file reports being processed. [`PipelineOrchestrator`] hides that behind a
//! single cancellable call with an overall deadline:
//!
//! 1. [`Uploader`] transfers the file, reporting progress
//! 2. [`ProcessingWaiter`] polls the file status until it is terminal
//! 3. [`DatasetLocator`] searches the caller's datasets for the derived one
//! 4. [`PreviewAssembler`] fetches a page of rows and reshapes it
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tabpreview::{
//!     HttpBackend, HttpBackendConfig, NoopSink, PipelineConfig, PipelineOrchestrator,
//!     UploadPayload,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = HttpBackend::new(HttpBackendConfig::new("http://localhost:8080/api"))?;
//! let pipeline = PipelineOrchestrator::new(
//!     Arc::new(backend),
//!     PipelineConfig::default(),
//!     Arc::new(NoopSink),
//! );
//! let payload = UploadPayload::new("people.csv", b"name,age\nada,36\n".to_vec());
//! let preview = pipeline.run(payload, None, CancellationToken::new()).await?;
//! println!("{} rows, columns: {:?}", preview.total_rows, preview.headers);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod retry;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{
    HttpBackend, HttpBackendConfig, IngestBackend, InstrumentedBackend, ProgressSender,
};
pub use error::{ErrorKind, PipelineError, TransportError, UploadError};
pub use metrics::{
    Endpoint, EndpointStats, EndpointSummary, FanoutSink, MetricsSink, NoopSink, PipelineEvent,
    RecordingSink, Stage, TracingSink,
};
pub use pipeline::{
    DatasetLocator, Discovery, DiscoveryConfig, PipelineConfig, PipelineOrchestrator,
    PollConfig, PreviewAssembler, ProcessingWaiter, UploadEvent, Uploader,
};
pub use types::{
    ColumnValidation, DatasetColumn, DatasetHandle, DatasetSummary, DegradedDiscovery,
    FileStatus, FileStatusReport, PreviewResult, Row, RowPage, UploadPayload, UploadTicket,
};

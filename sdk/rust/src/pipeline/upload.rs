use std::sync::Arc;
use std::time::Duration;

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backend::IngestBackend;
use crate::error::{TransportError, UploadError};
use crate::types::{UploadPayload, UploadTicket};

/// One item of an upload stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    /// Percentage of the body handed to the transport
    Progress(u8),
    /// Terminal success, always the last item
    Completed(UploadTicket),
}

enum Step {
    Progress(u8),
    Finished(Result<UploadTicket, TransportError>),
    Cancelled,
    TimedOut,
}

/// Transfers one file per call. Never retries.
#[derive(Debug, Clone)]
pub struct Uploader {
    backend: Arc<dyn IngestBackend>,
    timeout: Duration,
}

impl Uploader {
    pub fn new(backend: Arc<dyn IngestBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// Start a transfer. The stream yields progress events and ends with
    /// either `Completed` or a single error.
    ///
    /// Dropping the stream, cancelling `cancel` or hitting the transfer
    /// timeout aborts the request in flight.
    pub fn upload(
        &self,
        payload: UploadPayload,
        description: Option<String>,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<UploadEvent, UploadError>> + Send + 'static {
        let backend = self.backend.clone();
        let timeout = self.timeout;

        try_stream! {
            if payload.is_empty() {
                Err::<(), _>(UploadError::EmptyPayload)?;
            }
            tracing::info!(
                file_name = %payload.file_name,
                bytes = payload.len(),
                backend = backend.name(),
                "Uploading file"
            );

            let secs = timeout.as_secs();
            let (tx, mut rx) = mpsc::unbounded_channel();
            let transfer = backend.upload(payload, description, tx);
            tokio::pin!(transfer);
            let deadline = tokio::time::sleep(timeout);
            tokio::pin!(deadline);

            let result = loop {
                let step = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Step::Cancelled,
                    _ = &mut deadline => Step::TimedOut,
                    Some(percent) = rx.recv() => Step::Progress(percent),
                    result = &mut transfer => Step::Finished(result),
                };
                match step {
                    Step::Progress(percent) => yield UploadEvent::Progress(percent),
                    Step::Finished(result) => break result,
                    Step::Cancelled => Err::<(), _>(UploadError::Cancelled)?,
                    Step::TimedOut => Err::<(), _>(UploadError::Timeout { secs })?,
                }
            };

            let ticket = result.map_err(|e| UploadError::from_transport(e, secs))?;
            while let Ok(percent) = rx.try_recv() {
                yield UploadEvent::Progress(percent);
            }
            tracing::info!(
                file_id = %ticket.file_id,
                dataset_id = ticket.dataset_id.as_deref().unwrap_or("-"),
                "Upload completed"
            );
            yield UploadEvent::Completed(ticket);
        }
    }

    /// Drive an upload to its ticket, handing every progress value to
    /// `on_progress`.
    pub async fn upload_to_completion(
        &self,
        payload: UploadPayload,
        description: Option<String>,
        cancel: CancellationToken,
        mut on_progress: impl FnMut(u8),
    ) -> Result<UploadTicket, UploadError> {
        let stream = self.upload(payload, description, cancel);
        futures::pin_mut!(stream);

        while let Some(event) = stream.next().await {
            match event? {
                UploadEvent::Progress(percent) => on_progress(percent),
                UploadEvent::Completed(ticket) => return Ok(ticket),
            }
        }
        Err(UploadError::InvalidResponse(
            "upload ended without a response".to_string(),
        ))
    }
}

use std::sync::Arc;

use crate::backend::IngestBackend;
use crate::error::PipelineError;
use crate::types::{PreviewResult, RowPage};

/// Turns one page of dataset rows into a preview
#[derive(Debug, Clone)]
pub struct PreviewAssembler {
    backend: Arc<dyn IngestBackend>,
}

impl PreviewAssembler {
    pub fn new(backend: Arc<dyn IngestBackend>) -> Self {
        Self { backend }
    }

    pub async fn assemble(
        &self,
        dataset_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<PreviewResult, PipelineError> {
        let rows = self
            .backend
            .dataset_rows(dataset_id, page, page_size)
            .await
            .map_err(|source| PipelineError::AssemblyFailure {
                dataset_id: dataset_id.to_string(),
                source,
            })?;

        let preview = Self::shape(dataset_id, rows);
        tracing::debug!(
            dataset_id,
            rows = preview.data.len(),
            total_rows = preview.total_rows,
            "Preview assembled"
        );
        Ok(preview)
    }

    /// Reshape a row page. Headers come from the first row's keys in backend
    /// order; an empty page gives empty headers.
    pub fn shape(dataset_id: &str, page: RowPage) -> PreviewResult {
        let headers = page
            .content
            .first()
            .map(|row| row.data.keys().cloned().collect())
            .unwrap_or_default();

        PreviewResult {
            dataset_id: dataset_id.to_string(),
            headers,
            data: page.content.into_iter().map(|row| row.data).collect(),
            total_rows: page.total_elements,
            current_page: page.current_page,
            total_pages: page.total_pages.max(1),
            validations: Vec::new(),
            degraded: None,
        }
    }
}

//! Scripted in-memory backend for unit tests

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::backend::{IngestBackend, ProgressSender};
use crate::error::TransportError;
use crate::metrics::Endpoint;
use crate::types::{
    ColumnValidation, DatasetColumn, DatasetSummary, FileStatus, FileStatusReport, Row, RowPage,
    UploadPayload, UploadTicket,
};

type Scripted<T> = Mutex<VecDeque<Result<T, TransportError>>>;

/// Backend answering from per-endpoint queues.
///
/// An empty queue falls back to a benign default: status `PROCESSING`, no
/// datasets, an empty row page, no columns, a clean validation summary and a
/// successful repair.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    uploads: Scripted<UploadTicket>,
    statuses: Scripted<FileStatusReport>,
    datasets: Scripted<Vec<DatasetSummary>>,
    rows: Scripted<RowPage>,
    columns: Scripted<Vec<DatasetColumn>>,
    validations: Scripted<ColumnValidation>,
    repairs: Scripted<()>,
    upload_progress: Mutex<Vec<u8>>,
    hang_upload: Mutex<bool>,
    calls: Mutex<HashMap<Endpoint, u32>>,
    repaired: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_upload(&self, result: Result<UploadTicket, TransportError>) {
        self.uploads.lock().push_back(result);
    }

    pub fn push_status(&self, result: Result<FileStatusReport, TransportError>) {
        self.statuses.lock().push_back(result);
    }

    pub fn push_datasets(&self, result: Result<Vec<DatasetSummary>, TransportError>) {
        self.datasets.lock().push_back(result);
    }

    pub fn push_rows(&self, result: Result<RowPage, TransportError>) {
        self.rows.lock().push_back(result);
    }

    pub fn push_columns(&self, result: Result<Vec<DatasetColumn>, TransportError>) {
        self.columns.lock().push_back(result);
    }

    pub fn push_validation(&self, result: Result<ColumnValidation, TransportError>) {
        self.validations.lock().push_back(result);
    }

    pub fn push_repair(&self, result: Result<(), TransportError>) {
        self.repairs.lock().push_back(result);
    }

    /// Percentages reported on the progress channel by each upload
    pub fn set_upload_progress(&self, steps: &[u8]) {
        *self.upload_progress.lock() = steps.to_vec();
    }

    /// Make uploads report their progress and then never complete
    pub fn hang_upload(&self) {
        *self.hang_upload.lock() = true;
    }

    pub fn calls(&self, endpoint: Endpoint) -> u32 {
        self.calls.lock().get(&endpoint).copied().unwrap_or(0)
    }

    pub fn repaired(&self) -> Vec<String> {
        self.repaired.lock().clone()
    }

    fn hit(&self, endpoint: Endpoint) {
        *self.calls.lock().entry(endpoint).or_insert(0) += 1;
    }
}

fn next<T>(queue: &Scripted<T>, fallback: impl FnOnce() -> T) -> Result<T, TransportError> {
    queue.lock().pop_front().unwrap_or_else(|| Ok(fallback()))
}

#[async_trait]
impl IngestBackend for ScriptedBackend {
    async fn upload(
        &self,
        _payload: UploadPayload,
        _description: Option<String>,
        progress: ProgressSender,
    ) -> Result<UploadTicket, TransportError> {
        self.hit(Endpoint::Upload);
        let steps = self.upload_progress.lock().clone();
        for percent in steps {
            let _ = progress.send(percent);
        }
        let hang = *self.hang_upload.lock();
        if hang {
            std::future::pending::<()>().await;
        }
        next(&self.uploads, || UploadTicket::new("f1", None))
    }

    async fn file_status(&self, _file_id: &str) -> Result<FileStatusReport, TransportError> {
        self.hit(Endpoint::FileStatus);
        next(&self.statuses, || FileStatusReport::new(FileStatus::Processing))
    }

    async fn list_datasets(&self) -> Result<Vec<DatasetSummary>, TransportError> {
        self.hit(Endpoint::ListDatasets);
        next(&self.datasets, Vec::new)
    }

    async fn dataset_rows(
        &self,
        _dataset_id: &str,
        page: u32,
        _size: u32,
    ) -> Result<RowPage, TransportError> {
        self.hit(Endpoint::DatasetRows);
        next(&self.rows, || RowPage {
            content: Vec::new(),
            total_elements: 0,
            current_page: page,
            total_pages: 0,
        })
    }

    async fn dataset_columns(
        &self,
        _dataset_id: &str,
    ) -> Result<Vec<DatasetColumn>, TransportError> {
        self.hit(Endpoint::DatasetColumns);
        next(&self.columns, Vec::new)
    }

    async fn column_validation(
        &self,
        _dataset_id: &str,
        column: &DatasetColumn,
    ) -> Result<ColumnValidation, TransportError> {
        self.hit(Endpoint::ColumnValidation);
        next(&self.validations, || ColumnValidation {
            valid_count: 1,
            ..ColumnValidation::placeholder(column)
        })
    }

    async fn repair_duplicates(&self, dataset_id: &str) -> Result<(), TransportError> {
        self.hit(Endpoint::RepairDuplicates);
        self.repaired.lock().push(dataset_id.to_string());
        next(&self.repairs, || ())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Row with the given `(column, value)` pairs, in order
pub fn row(number: u64, fields: &[(&str, &str)]) -> Row {
    Row {
        id: format!("r{}", number),
        row_number: number,
        data: fields
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
            .collect(),
    }
}

pub fn page(content: Vec<Row>, total_elements: u64, total_pages: u32) -> RowPage {
    RowPage {
        content,
        total_elements,
        current_page: 0,
        total_pages,
    }
}

//! Data model shared by the backend seam and the pipeline stages

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// Upload
// =============================================================================

/// Raw file handed to the uploader
#[derive(Debug, Clone)]
pub struct UploadPayload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl UploadPayload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// MIME type guessed from the file extension
    pub fn content_type(&self) -> String {
        mime_guess::from_path(&self.file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }
}

/// Result of a completed transfer.
///
/// `dataset_id` is only present when the backend materialized the dataset
/// while handling the upload request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTicket {
    pub file_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<FileStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl UploadTicket {
    pub fn new(file_id: impl Into<String>, dataset_id: Option<String>) -> Self {
        Self {
            file_id: file_id.into(),
            dataset_id,
            original_name: None,
            status: None,
            message: None,
        }
    }
}

// =============================================================================
// File status
// =============================================================================

/// Processing status of an uploaded file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileStatus {
    Waiting,
    Processing,
    Processed,
    Uploaded,
    Error,
    /// Any status this client does not know about; never terminal
    #[serde(other)]
    Unknown,
}

impl FileStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed | Self::Uploaded | Self::Error)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Processed | Self::Uploaded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::Processing => "PROCESSING",
            Self::Processed => "PROCESSED",
            Self::Uploaded => "UPLOADED",
            Self::Error => "ERROR",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One answer of the status endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStatusReport {
    pub status: FileStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
}

impl FileStatusReport {
    pub fn new(status: FileStatus) -> Self {
        Self {
            status,
            error_message: None,
            original_name: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: FileStatus::Error,
            error_message: Some(message.into()),
            original_name: None,
        }
    }
}

// =============================================================================
// Datasets
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub id: String,
}

/// Entry of the dataset listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSummary {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileRef>,
}

impl DatasetSummary {
    pub fn new(id: impl Into<String>, file_id: Option<&str>) -> Self {
        Self {
            id: id.into(),
            name: None,
            file: file_id.map(|id| FileRef { id: id.to_string() }),
        }
    }

    pub fn file_id(&self) -> Option<&str> {
        self.file.as_ref().map(|f| f.id.as_str())
    }

    /// Handle for this dataset if it is backed by `file_id`
    pub fn handle_for(&self, file_id: &str) -> Option<DatasetHandle> {
        (self.file_id() == Some(file_id)).then(|| DatasetHandle {
            id: self.id.clone(),
            file_id: file_id.to_string(),
        })
    }
}

/// Correlation between an uploaded file and its derived dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetHandle {
    pub id: String,
    pub file_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetColumn {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
}

impl DatasetColumn {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            data_type: None,
            position: None,
        }
    }
}

/// Validation summary of one column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnValidation {
    pub column_id: String,
    pub column_name: String,
    pub valid_count: u64,
    pub invalid_count: u64,
    pub empty_count: u64,
    pub pattern: String,
}

impl ColumnValidation {
    /// Zero-valued stand-in used when the real summary could not be read
    pub fn placeholder(column: &DatasetColumn) -> Self {
        Self {
            column_id: column.id.clone(),
            column_name: column.name.clone(),
            valid_count: 0,
            invalid_count: 0,
            empty_count: 0,
            pattern: String::new(),
        }
    }
}

/// Marks a discovery whose validation data fell back to placeholders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DegradedDiscovery {
    pub dataset_id: String,
    /// Names of the columns that received placeholders
    pub columns: Vec<String>,
    pub reason: String,
    pub repair_attempted: bool,
}

// =============================================================================
// Rows and preview
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    pub id: String,
    pub row_number: u64,
    /// `null` and a missing key both decode as an empty mapping
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: Map<String, Value>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Map<String, Value>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// One page of dataset rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowPage {
    #[serde(default)]
    pub content: Vec<Row>,
    #[serde(default)]
    pub total_elements: u64,
    #[serde(default)]
    pub current_page: u32,
    #[serde(default)]
    pub total_pages: u32,
}

/// Preview of a dataset, recomputed on every pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResult {
    pub dataset_id: String,
    pub headers: Vec<String>,
    pub data: Vec<Map<String, Value>>,
    pub total_rows: u64,
    pub current_page: u32,
    pub total_pages: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validations: Vec<ColumnValidation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded: Option<DegradedDiscovery>,
}

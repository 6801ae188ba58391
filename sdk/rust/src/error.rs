//! Error types for backend calls, the uploader and the pipeline

use std::fmt;

use thiserror::Error;

/// Error signature the backend reports when a logically singleton record
/// exists more than once.
pub const DUPLICATE_STATE_SIGNATURE: &str = "More than one row with the given identifier was found";

/// Errors from a single backend call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response from server: {0}")]
    Decode(String),

    #[error("Backend configuration error: {0}")]
    Config(String),
}

impl TransportError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Deepest human-readable detail of the error
    pub fn detail(&self) -> String {
        match self {
            Self::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Whether this is the backend's duplicate derived-state defect
    pub fn is_duplicate_state(&self) -> bool {
        match self {
            Self::Status { message, .. } | Self::Decode(message) | Self::Network(message) => {
                message.contains(DUPLICATE_STATE_SIGNATURE)
            }
            Self::Timeout | Self::Config(_) => false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else if e.is_builder() {
            Self::Config(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Errors from the uploader. None of them are retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("File is empty")]
    EmptyPayload,

    #[error("Network error occurred during upload: {0}")]
    Network(String),

    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Upload timed out after {secs}s - file may be too large or connection too slow")]
    Timeout { secs: u64 },

    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),

    #[error("Upload cancelled")]
    Cancelled,
}

impl UploadError {
    pub(crate) fn from_transport(e: TransportError, timeout_secs: u64) -> Self {
        match e {
            TransportError::Network(msg) | TransportError::Config(msg) => Self::Network(msg),
            TransportError::Timeout => Self::Timeout { secs: timeout_secs },
            TransportError::Status { status, message } => Self::Status { status, message },
            TransportError::Decode(msg) => Self::InvalidResponse(msg),
        }
    }
}

/// Failure category reported to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TransferFailure,
    ProcessingFailure,
    ProcessingTimeout,
    DiscoveryTimeout,
    /// Non-fatal: validation data fell back to placeholders
    DiscoveryDegraded,
    AssemblyFailure,
    OverallTimeout,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransferFailure => "transfer_failure",
            Self::ProcessingFailure => "processing_failure",
            Self::ProcessingTimeout => "processing_timeout",
            Self::DiscoveryTimeout => "discovery_timeout",
            Self::DiscoveryDegraded => "discovery_degraded",
            Self::AssemblyFailure => "assembly_failure",
            Self::OverallTimeout => "overall_timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of a pipeline run
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Upload failed: {0}")]
    Transfer(UploadError),

    #[error("File processing failed: {message}")]
    ProcessingFailure { file_id: String, message: String },

    #[error("File processing timed out after {attempts} attempts{}", suffix(.last_error))]
    ProcessingTimeout {
        file_id: String,
        attempts: u32,
        last_error: Option<String>,
    },

    #[error("No dataset found for file {file_id} after {attempts} attempts{}", suffix(.last_error))]
    DiscoveryTimeout {
        file_id: String,
        attempts: u32,
        last_error: Option<String>,
    },

    #[error("Failed to fetch rows for dataset {dataset_id}: {source}")]
    AssemblyFailure {
        dataset_id: String,
        #[source]
        source: TransportError,
    },

    #[error("Operation timed out after {elapsed_ms}ms. The server may still be processing your file.")]
    OverallTimeout { elapsed_ms: u64 },

    #[error("Operation cancelled")]
    Cancelled,
}

fn suffix(detail: &Option<String>) -> String {
    detail
        .as_ref()
        .map(|d| format!(" (last error: {})", d))
        .unwrap_or_default()
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transfer(UploadError::Cancelled) | Self::Cancelled => ErrorKind::Cancelled,
            Self::Transfer(_) => ErrorKind::TransferFailure,
            Self::ProcessingFailure { .. } => ErrorKind::ProcessingFailure,
            Self::ProcessingTimeout { .. } => ErrorKind::ProcessingTimeout,
            Self::DiscoveryTimeout { .. } => ErrorKind::DiscoveryTimeout,
            Self::AssemblyFailure { .. } => ErrorKind::AssemblyFailure,
            Self::OverallTimeout { .. } => ErrorKind::OverallTimeout,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }
}

impl From<UploadError> for PipelineError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::Cancelled => Self::Cancelled,
            other => Self::Transfer(other),
        }
    }
}

use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::{IngestBackend, ProgressSender};
use crate::error::TransportError;
use crate::types::{
    ColumnValidation, DatasetColumn, DatasetSummary, FileStatusReport, RowPage, UploadPayload,
    UploadTicket,
};

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 600;
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;
const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Connection settings for [`HttpBackend`]
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    /// API root, e.g. `http://localhost:8080/api`
    pub base_url: String,
    /// Bearer token sent on every request
    pub token: Option<String>,
    /// Sent as the `userId` query parameter on every request
    pub user_id: Option<String>,
    pub request_timeout: Duration,
    pub upload_timeout: Duration,
}

impl HttpBackendConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            user_id: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            upload_timeout: Duration::from_secs(DEFAULT_UPLOAD_TIMEOUT_SECS),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// [`IngestBackend`] over the backend's REST API
#[derive(Debug)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    user_id: Option<String>,
    upload_timeout: Duration,
}

impl HttpBackend {
    pub fn new(config: HttpBackendConfig) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &config.token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| TransportError::Config(format!("invalid token: {}", e)))?,
            );
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(format!("tabpreview/{}", CURRENT_VERSION))
            .default_headers(headers)
            .build()
            .map_err(|e| TransportError::Config(format!("failed to build HTTP client: {}", e)))?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        tracing::debug!(
            base_url = %base_url,
            authenticated = config.token.is_some(),
            "HTTP backend initialized"
        );

        Ok(Self {
            client,
            base_url,
            user_id: config.user_id,
            upload_timeout: config.upload_timeout,
        })
    }

    /// Full request URL with the `userId` parameter and any extra query pairs
    fn url(&self, path: &str, params: &[(&str, String)]) -> Result<Url, TransportError> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| TransportError::Config(format!("invalid URL for {}: {}", path, e)))?;
        if self.user_id.is_some() || !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            if let Some(user_id) = &self.user_id {
                pairs.append_pair("userId", user_id);
            }
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, TransportError> {
        let url = self.url(path, params)?;
        let resp = self.client.get(url).send().await?;
        read_json(resp).await
    }
}

#[async_trait]
impl IngestBackend for HttpBackend {
    async fn upload(
        &self,
        payload: UploadPayload,
        description: Option<String>,
        progress: ProgressSender,
    ) -> Result<UploadTicket, TransportError> {
        let total = payload.len() as u64;
        let content_type = payload.content_type();
        let file_name = payload.file_name.clone();

        let body = reqwest::Body::wrap_stream(progress_stream(payload.bytes, progress));
        let part = Part::stream_with_length(body, total)
            .file_name(file_name)
            .mime_str(&content_type)?;
        let mut form = Form::new().part("file", part);
        if let Some(description) = description {
            form = form.text("description", description);
        }

        let url = self.url("/files/upload", &[])?;
        let resp = self
            .client
            .post(url)
            .timeout(self.upload_timeout)
            .multipart(form)
            .send()
            .await?;
        read_json(resp).await
    }

    async fn file_status(&self, file_id: &str) -> Result<FileStatusReport, TransportError> {
        self.get_json(&format!("/files/{}", file_id), &[]).await
    }

    async fn list_datasets(&self) -> Result<Vec<DatasetSummary>, TransportError> {
        self.get_json("/datasets", &[]).await
    }

    async fn dataset_rows(
        &self,
        dataset_id: &str,
        page: u32,
        size: u32,
    ) -> Result<RowPage, TransportError> {
        self.get_json(
            &format!("/datasets/{}/rows", dataset_id),
            &[("page", page.to_string()), ("size", size.to_string())],
        )
        .await
    }

    async fn dataset_columns(
        &self,
        dataset_id: &str,
    ) -> Result<Vec<DatasetColumn>, TransportError> {
        self.get_json(&format!("/datasets/{}/columns", dataset_id), &[])
            .await
    }

    async fn column_validation(
        &self,
        dataset_id: &str,
        column: &DatasetColumn,
    ) -> Result<ColumnValidation, TransportError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct ValidationInfo {
            column: Option<String>,
            valid_count: Option<u64>,
            invalid_count: Option<u64>,
            null_count: Option<u64>,
            pattern: Option<String>,
        }

        let info: ValidationInfo = self
            .get_json(
                &format!("/validation/datasets/{}/columns/{}", dataset_id, column.id),
                &[],
            )
            .await?;

        Ok(ColumnValidation {
            column_id: column.id.clone(),
            column_name: info.column.unwrap_or_else(|| column.name.clone()),
            valid_count: info.valid_count.unwrap_or(0),
            invalid_count: info.invalid_count.unwrap_or(0),
            empty_count: info.null_count.unwrap_or(0),
            pattern: info.pattern.unwrap_or_default(),
        })
    }

    async fn repair_duplicates(&self, dataset_id: &str) -> Result<(), TransportError> {
        let url = self.url(
            &format!("/validation/datasets/{}/fix-duplicates", dataset_id),
            &[],
        )?;
        let resp = self.client.post(url).send().await?;
        check_status(resp).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Body stream that reports progress as the transport pulls each chunk
fn progress_stream(
    bytes: Vec<u8>,
    progress: ProgressSender,
) -> impl Stream<Item = Result<Vec<u8>, std::io::Error>> + Send + 'static {
    async_stream::stream! {
        let total = bytes.len();
        let mut sent = 0usize;
        for chunk in bytes.chunks(UPLOAD_CHUNK_SIZE) {
            yield Ok(chunk.to_vec());
            sent += chunk.len();
            // Receiver gone means nobody is watching; keep sending the body
            let _ = progress.send(percent(sent, total));
        }
    }
}

fn percent(sent: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((sent as f64 / total as f64) * 100.0).round().min(100.0) as u8
}

async fn check_status(resp: Response) -> Result<Response, TransportError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(TransportError::status(
        status.as_u16(),
        error_message(status, &body),
    ))
}

async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T, TransportError> {
    let resp = check_status(resp).await?;
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))
}

/// Most specific message available in an error response
fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(body) {
        for key in ["message", "error"] {
            if let Some(serde_json::Value::String(msg)) = map.get(key)
                && !msg.is_empty()
            {
                return msg.clone();
            }
        }
    }
    let body = body.trim();
    if !body.is_empty() {
        return body.to_string();
    }
    status
        .canonical_reason()
        .unwrap_or("Unknown error")
        .to_string()
}

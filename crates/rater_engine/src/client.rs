//! Remote batch service: the trait the pipeline talks to and its HTTP implementation.

use std::fmt;
use std::time::Duration;

use futures_util::StreamExt;
use rater_core::{BatchJob, CompletionWindow};
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceErrorKind {
    InvalidUrl,
    Network,
    Timeout,
    HttpStatus(u16),
    Decode,
    TooLarge { max_bytes: u64, actual: Option<u64> },
}

impl fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceErrorKind::InvalidUrl => write!(f, "invalid url"),
            ServiceErrorKind::Network => write!(f, "network error"),
            ServiceErrorKind::Timeout => write!(f, "timeout"),
            ServiceErrorKind::HttpStatus(code) => write!(f, "http status {code}"),
            ServiceErrorKind::Decode => write!(f, "unexpected response body"),
            ServiceErrorKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    pub message: String,
}

impl ServiceError {
    pub fn new(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Network trouble, timeouts, throttling and server-side failures may succeed on a later try.
    pub fn is_transient(&self) -> bool {
        match self.kind {
            ServiceErrorKind::Network | ServiceErrorKind::Timeout => true,
            ServiceErrorKind::HttpStatus(code) => code == 408 || code == 429 || code >= 500,
            ServiceErrorKind::InvalidUrl
            | ServiceErrorKind::Decode
            | ServiceErrorKind::TooLarge { .. } => false,
        }
    }
}

/// Uploaded file as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileHandle {
    pub id: String,
    #[serde(default)]
    pub bytes: Option<u64>,
    #[serde(default)]
    pub filename: Option<String>,
}

/// Operations consumed from the remote batch service.
#[async_trait::async_trait]
pub trait BatchService: Send + Sync {
    async fn upload_file(&self, filename: &str, content: Vec<u8>)
        -> Result<FileHandle, ServiceError>;

    async fn create_batch(
        &self,
        input_file_id: &str,
        endpoint: &str,
        window: CompletionWindow,
    ) -> Result<BatchJob, ServiceError>;

    async fn retrieve_batch(&self, batch_id: &str) -> Result<BatchJob, ServiceError>;

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, ServiceError>;
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub api_key: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_download_bytes: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(120),
            max_download_bytes: 512 * 1024 * 1024,
        }
    }
}

/// [`BatchService`] over the OpenAI-compatible Files and Batches HTTP API.
#[derive(Debug, Clone)]
pub struct OpenAiBatchClient {
    settings: ClientSettings,
    base: Url,
    client: reqwest::Client,
}

impl OpenAiBatchClient {
    pub fn new(settings: ClientSettings) -> Result<Self, ServiceError> {
        // A trailing slash makes `Url::join` append instead of replacing the last segment.
        let mut base = settings.base_url.trim_end_matches('/').to_string();
        base.push('/');
        let base = Url::parse(&base)
            .map_err(|err| ServiceError::new(ServiceErrorKind::InvalidUrl, err.to_string()))?;

        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| ServiceError::new(ServiceErrorKind::Network, err.to_string()))?;

        Ok(Self {
            settings,
            base,
            client,
        })
    }

    fn url(&self, path: &str) -> Result<Url, ServiceError> {
        self.base
            .join(path)
            .map_err(|err| ServiceError::new(ServiceErrorKind::InvalidUrl, err.to_string()))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ServiceError> {
        let response = request
            .bearer_auth(&self.settings.api_key)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ServiceError::new(
            ServiceErrorKind::HttpStatus(status.as_u16()),
            remote_error_message(&body).unwrap_or_else(|| status.to_string()),
        ))
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ServiceError> {
        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        serde_json::from_slice(&bytes)
            .map_err(|err| ServiceError::new(ServiceErrorKind::Decode, err.to_string()))
    }
}

#[async_trait::async_trait]
impl BatchService for OpenAiBatchClient {
    async fn upload_file(
        &self,
        filename: &str,
        content: Vec<u8>,
    ) -> Result<FileHandle, ServiceError> {
        let form = Form::new()
            .text("purpose", "batch")
            .part("file", Part::bytes(content).file_name(filename.to_string()));
        let url = self.url("files")?;
        let response = self.send(self.client.post(url).multipart(form)).await?;
        Self::read_json(response).await
    }

    async fn create_batch(
        &self,
        input_file_id: &str,
        endpoint: &str,
        window: CompletionWindow,
    ) -> Result<BatchJob, ServiceError> {
        let payload = json!({
            "input_file_id": input_file_id,
            "endpoint": endpoint,
            "completion_window": window.as_str(),
        });
        let url = self.url("batches")?;
        let request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload.to_string());
        let response = self.send(request).await?;
        Self::read_json(response).await
    }

    async fn retrieve_batch(&self, batch_id: &str) -> Result<BatchJob, ServiceError> {
        let url = self.url(&format!("batches/{batch_id}"))?;
        let response = self.send(self.client.get(url)).await?;
        Self::read_json(response).await
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, ServiceError> {
        let url = self.url(&format!("files/{file_id}/content"))?;
        let response = self.send(self.client.get(url)).await?;

        let max_bytes = self.settings.max_download_bytes;
        if let Some(content_len) = response.content_length() {
            if content_len > max_bytes {
                return Err(ServiceError::new(
                    ServiceErrorKind::TooLarge {
                        max_bytes,
                        actual: Some(content_len),
                    },
                    "result file too large",
                ));
            }
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk: bytes::Bytes = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > max_bytes {
                return Err(ServiceError::new(
                    ServiceErrorKind::TooLarge {
                        max_bytes,
                        actual: Some(next_len),
                    },
                    "result file too large",
                ));
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }
}

/// Pull `error.message` out of an API error body.
fn remote_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/error/message")
        .and_then(|m| m.as_str())
        .map(str::to_string)
}

fn map_reqwest_error(err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        return ServiceError::new(ServiceErrorKind::Timeout, err.to_string());
    }
    if err.is_decode() {
        return ServiceError::new(ServiceErrorKind::Decode, err.to_string());
    }
    ServiceError::new(ServiceErrorKind::Network, err.to_string())
}

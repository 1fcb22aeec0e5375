//! Yandex Disk REST API surface
//!
//! `DiskApi` is the seam between the filesystem adapter and the wire. The
//! adapter only ever talks to this trait; `RestClient` is the default
//! reqwest binding against `https://cloud-api.yandex.net/v1/disk`.
//!
//! Endpoints used:
//! - `GET    /resources`           metadata + embedded children
//! - `GET    /resources/files`     flat, paginated listing of every file
//! - `PUT    /resources`           create directory (201, or 409 + error body)
//! - `GET    /resources/upload`    upload link, then `PUT <href>`
//! - `GET    /resources/download`  download link, then `GET <href>`
//! - `DELETE /resources`           delete (recursive for directories)
//! - `PATCH  /resources`           set `custom_properties`

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::debug;

use super::{sanitize_api_error, send_with_retry, HttpRetryConfig, ProviderError, Token};

pub const DEFAULT_API_BASE: &str = "https://cloud-api.yandex.net/v1/disk";

/// Error code reported when creating a directory that already exists
pub const ERR_EXISTING_DIRECTORY: &str = "DiskPathPointsToExistentDirectoryError";
/// Error code reported when an intermediate directory is missing
pub const ERR_PATH_MISSING: &str = "DiskPathDoesntExistsError";

/// Byte stream read back from the disk
pub type ByteReader = Box<dyn AsyncRead + Send + Unpin>;

/// Byte stream sent to the disk
pub type UploadReader = Box<dyn AsyncRead + Send + Sync + Unpin>;

// ─── API Response Types ──────────────────────────────────────────────────

/// Kind of a resource as reported by the `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Dir,
    File,
    Unknown,
}

/// Metadata of a single resource (file or directory)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(rename = "type", default)]
    pub resource_type: String,
    #[serde(default)]
    pub size: u64,
    /// Native modification time (RFC 3339)
    #[serde(default)]
    pub modified: String,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub md5: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub custom_properties: HashMap<String, serde_json::Value>,
    /// Children of a directory, one page of them
    #[serde(rename = "_embedded", default, skip_serializing_if = "Option::is_none")]
    pub embedded: Option<ResourceList>,
}

impl ResourceInfo {
    pub fn kind(&self) -> ResourceKind {
        match self.resource_type.as_str() {
            "dir" => ResourceKind::Dir,
            "file" => ResourceKind::File,
            _ => ResourceKind::Unknown,
        }
    }
}

/// One page of a directory's children
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceList {
    #[serde(default)]
    pub items: Vec<ResourceInfo>,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(default)]
    pub total: u32,
}

/// One page of the flat whole-disk file listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilesResourceList {
    #[serde(default)]
    pub items: Vec<ResourceInfo>,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

/// Pagination window for listing requests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ListOptions {
    pub fn page(limit: u32, offset: u32) -> Self {
        Self {
            limit: Some(limit),
            offset: Some(offset),
        }
    }

    fn query(&self) -> String {
        let mut q = String::new();
        if let Some(limit) = self.limit {
            q.push_str(&format!("&limit={}", limit));
        }
        if let Some(offset) = self.offset {
            q.push_str(&format!("&offset={}", offset));
        }
        q
    }
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
    #[serde(default)]
    method: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Extract the `error` code from a JSON error body
pub fn parse_api_error(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body).ok()?.error
}

/// Build the error for a non-success response
pub fn error_from_response(status: u16, body: &str) -> ProviderError {
    let code = parse_api_error(body);
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .description
        .or(parsed.message)
        .map(|m| sanitize_api_error(&m))
        .unwrap_or_else(|| sanitize_api_error(body));
    match status {
        401 => ProviderError::AuthenticationFailed(message),
        404 => ProviderError::NotFound(message),
        _ => ProviderError::Api { status, code, message },
    }
}

// ─── Collaborator Trait ──────────────────────────────────────────────────

/// Remote disk operations consumed by the filesystem adapter.
///
/// Every method is one logical request; retries, if any, happen inside the
/// implementation.
#[async_trait]
pub trait DiskApi: Send + Sync {
    /// Metadata of `path`, with one page of children for directories
    async fn resource_info(&self, path: &str, opts: ListOptions) -> Result<ResourceInfo, ProviderError>;

    /// One page of the flat file listing of the whole disk
    async fn flat_file_list(&self, opts: ListOptions) -> Result<FilesResourceList, ProviderError>;

    /// Create a single directory. Fails with `ProviderError::Api` carrying
    /// the parsed error code when the directory exists or its parent does
    /// not.
    async fn create_dir(&self, path: &str) -> Result<(), ProviderError>;

    async fn upload(&self, reader: UploadReader, path: &str, overwrite: bool) -> Result<(), ProviderError>;

    async fn download(&self, path: &str) -> Result<ByteReader, ProviderError>;

    /// Delete a file or a whole directory tree. `permanently` bypasses the trash.
    async fn delete(&self, path: &str, permanently: bool) -> Result<(), ProviderError>;

    async fn set_custom_property(&self, path: &str, key: &str, value: &str) -> Result<(), ProviderError>;
}

// ─── REST Binding ────────────────────────────────────────────────────────

/// Connection settings for `RestClient`
#[derive(Debug, Clone)]
pub struct RestOptions {
    pub api_base: String,
    pub timeout: Duration,
    pub retry: HttpRetryConfig,
}

impl Default for RestOptions {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(300),
            retry: HttpRetryConfig::default(),
        }
    }
}

pub struct RestClient {
    client: reqwest::Client,
    token: Token,
    options: RestOptions,
}

impl RestClient {
    pub fn new(token: Token, options: RestOptions) -> Result<Self, ProviderError> {
        url::Url::parse(&options.api_base)
            .map_err(|e| ProviderError::InvalidConfig(format!("Invalid API base URL: {}", e)))?;
        if token.is_expired(chrono::Utc::now()) {
            tracing::warn!("Access token expired at {:?}; requests will likely be rejected", token.expiry());
        }
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ProviderError::NetworkError(format!("HTTP client init failed: {}", e)))?;
        Ok(Self { client, token, options })
    }

    fn auth_header(&self) -> Result<HeaderValue, ProviderError> {
        HeaderValue::from_str(&self.token.authorization())
            .map_err(|e| ProviderError::AuthenticationFailed(format!("Invalid characters in token: {}", e)))
    }

    fn resources_url(&self, endpoint: &str, path: &str) -> String {
        format!(
            "{}{}?path={}",
            self.options.api_base.trim_end_matches('/'),
            endpoint,
            urlencoding::encode(path)
        )
    }

    /// Send an authorized API request through the retry wrapper
    async fn send(&self, method: Method, url: &str, json_body: Option<Vec<u8>>) -> Result<reqwest::Response, ProviderError> {
        let mut builder = self
            .client
            .request(method.clone(), url)
            .header(AUTHORIZATION, self.auth_header()?);
        if let Some(body) = json_body {
            builder = builder.header(CONTENT_TYPE, "application/json").body(body);
        }
        let request = builder
            .build()
            .map_err(|e| ProviderError::NetworkError(format!("Build request failed: {}", e)))?;
        debug!("{} {}", method, request.url().path());
        Ok(send_with_retry(&self.client, request, &self.options.retry).await?)
    }

    async fn expect_success(resp: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(error_from_response(status.as_u16(), &body))
    }

    async fn link(&self, url: &str) -> Result<Link, ProviderError> {
        let resp = Self::expect_success(self.send(Method::GET, url, None).await?).await?;
        Ok(resp.json::<Link>().await?)
    }
}

#[async_trait]
impl DiskApi for RestClient {
    async fn resource_info(&self, path: &str, opts: ListOptions) -> Result<ResourceInfo, ProviderError> {
        let url = format!("{}{}", self.resources_url("/resources", path), opts.query());
        let resp = Self::expect_success(self.send(Method::GET, &url, None).await?).await?;
        Ok(resp.json().await?)
    }

    async fn flat_file_list(&self, opts: ListOptions) -> Result<FilesResourceList, ProviderError> {
        let query = opts.query();
        let url = format!(
            "{}/resources/files?{}",
            self.options.api_base.trim_end_matches('/'),
            query.trim_start_matches('&')
        );
        let resp = Self::expect_success(self.send(Method::GET, &url, None).await?).await?;
        Ok(resp.json().await?)
    }

    async fn create_dir(&self, path: &str) -> Result<(), ProviderError> {
        let url = self.resources_url("/resources", path);
        let resp = self.send(Method::PUT, &url, None).await?;
        if resp.status() == StatusCode::CREATED {
            return Ok(());
        }
        Self::expect_success(resp).await.map(|_| ())
    }

    async fn upload(&self, reader: UploadReader, path: &str, overwrite: bool) -> Result<(), ProviderError> {
        let url = format!("{}&overwrite={}", self.resources_url("/resources/upload", path), overwrite);
        let link = self.link(&url).await?;
        let method = link
            .method
            .as_deref()
            .and_then(|m| Method::from_bytes(m.as_bytes()).ok())
            .unwrap_or(Method::PUT);

        // Streaming bodies cannot be replayed, so the transfer is sent once
        let body = reqwest::Body::wrap_stream(ReaderStream::new(reader));
        let resp = self
            .client
            .request(method, &link.href)
            .body(body)
            .send()
            .await
            .map_err(|e| ProviderError::TransferFailed(format!("Upload of {} failed: {}", path, e)))?;
        Self::expect_success(resp).await?;
        debug!("Uploaded {}", path);
        Ok(())
    }

    async fn download(&self, path: &str) -> Result<ByteReader, ProviderError> {
        let url = self.resources_url("/resources/download", path);
        let link = self.link(&url).await?;
        let resp = self
            .client
            .get(&link.href)
            .send()
            .await
            .map_err(|e| ProviderError::TransferFailed(format!("Download of {} failed: {}", path, e)))?;
        let resp = Self::expect_success(resp).await?;
        let stream = resp.bytes_stream().map_err(std::io::Error::other).boxed();
        Ok(Box::new(StreamReader::new(stream)))
    }

    async fn delete(&self, path: &str, permanently: bool) -> Result<(), ProviderError> {
        let url = format!("{}&permanently={}", self.resources_url("/resources", path), permanently);
        let resp = Self::expect_success(self.send(Method::DELETE, &url, None).await?).await?;
        if resp.status() == StatusCode::ACCEPTED {
            // Large directories are removed by a background operation
            debug!("Delete of {} continues asynchronously", path);
        }
        Ok(())
    }

    async fn set_custom_property(&self, path: &str, key: &str, value: &str) -> Result<(), ProviderError> {
        let url = self.resources_url("/resources", path);
        let body = serde_json::json!({ "custom_properties": { key: value } });
        let bytes = serde_json::to_vec(&body).map_err(|e| ProviderError::ParseError(e.to_string()))?;
        Self::expect_success(self.send(Method::PATCH, &url, Some(bytes)).await?).await?;
        Ok(())
    }
}

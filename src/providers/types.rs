//! Shared types for the Yandex Disk provider
//!
//! This module contains the types shared across the adapter layers:
//! the error taxonomy, listing granularity, hash kinds and the directory
//! entries handed back to the sync engine.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

/// How deep a listing should go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListDepth {
    /// Immediate children only (files and directories)
    One,
    /// Every file below the directory, via the flat listing
    Full,
    /// Any other bounded depth; not supported by this store
    Levels(u32),
}

/// Content hash algorithms a caller may ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashType {
    Md5,
    Sha1,
    Sha256,
}

impl fmt::Display for HashType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashType::Md5 => write!(f, "MD5"),
            HashType::Sha1 => write!(f, "SHA-1"),
            HashType::Sha256 => write!(f, "SHA-256"),
        }
    }
}

/// Directory entry produced by a listing
///
/// Directories on this store carry no metadata beyond name, size and time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Path relative to the filesystem root
    pub name: String,
    /// Resolved modification time, if the store reported a parseable one
    pub modified: Option<DateTime<Utc>>,
    /// Size reported by the store (usually 0 for directories)
    pub size: u64,
    /// Number of children, when known
    pub count: Option<u64>,
}

/// Description of a local source object being written to the remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    /// Path relative to the filesystem root
    pub remote: String,
    /// Declared size in bytes
    pub size: u64,
    /// Source modification time, stored in the override property
    pub mod_time: DateTime<Utc>,
}

impl SourceInfo {
    pub fn new(remote: impl Into<String>, size: u64, mod_time: DateTime<Utc>) -> Self {
        Self {
            remote: remote.into(),
            size,
            mod_time,
        }
    }
}

/// Provider error types
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Non-success response from the REST API. `code` is the `error` field
    /// of the JSON error body (e.g. `DiskNotFoundError`), when present.
    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Hash type not supported")]
    HashUnsupported,

    #[error("Listing depth not supported")]
    LevelNotSupported,

    #[error("Listing aborted")]
    ListAborted,

    /// The upload succeeded but writing the override timestamp did not.
    /// The uploaded object is left in place.
    #[error("Uploaded, but failed to set modification time: {0}")]
    ModTimeNotSet(Box<ProviderError>),

    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    /// API error code carried by the response body, if any
    pub fn api_code(&self) -> Option<&str> {
        match self {
            ProviderError::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ProviderError::ParseError(e.to_string())
        } else {
            ProviderError::NetworkError(e.to_string())
        }
    }
}

/// Maximum number of characters of a response body kept in error messages
const MAX_ERROR_BODY_CHARS: usize = 300;

/// Credential shapes that proxies and error pages echo back
const TOKEN_PATTERNS: &[&str] = &[
    r"(?i)\b((?:OAuth|Bearer)[\s:]+)\S+",
    r#"(?i)(access_token["=:\s]+)[^"&\s]+"#,
];

static TOKEN_REGEXES: LazyLock<Vec<Regex>> =
    LazyLock::new(|| TOKEN_PATTERNS.iter().filter_map(|p| Regex::new(p).ok()).collect());

/// Make a response body safe to embed in an error message.
///
/// Redacts `OAuth`/`Bearer` credentials and `access_token` values, then
/// truncates long bodies. Everything else is kept as sent.
pub fn sanitize_api_error(body: &str) -> String {
    let mut out = body.to_string();
    for re in TOKEN_REGEXES.iter() {
        out = re.replace_all(&out, "${1}[REDACTED]").into_owned();
    }
    if out.chars().count() > MAX_ERROR_BODY_CHARS {
        let truncated: String = out.chars().take(MAX_ERROR_BODY_CHARS).collect();
        return format!("{}...", truncated);
    }
    out
}

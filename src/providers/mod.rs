//! Storage Provider Module
//!
//! Presents Yandex Disk, a flat and paginated object store, as a directory
//! tree a sync engine can walk, read and write.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │        RemoteFs / RemoteObject traits       │
//! │  list, new_object, put, mkdir, rmdir, ...   │
//! └─────────────────────────────────────────────┘
//!                      │
//!               ┌──────┴──────┐
//!               ▼             ▼
//!          ┌─────────┐  ┌─────────────┐
//!          │YandexFs │  │YandexObject │
//!          └─────────┘  └─────────────┘
//!               │
//!   ┌───────────┼──────────────┬───────────────┐
//!   ▼           ▼              ▼               ▼
//! ┌──────┐ ┌──────────┐ ┌─────────────┐ ┌──────────┐
//! │ path │ │ listing  │ │ materialize │ │ metadata │
//! └──────┘ └──────────┘ └─────────────┘ └──────────┘
//!               │              │
//!               ▼              ▼
//!        ┌──────────────────────────────┐
//!        │   DiskApi (RestClient, ...)  │
//!        └──────────────────────────────┘
//! ```

pub mod http_retry;
pub mod listing;
pub mod materialize;
pub mod metadata;
pub mod path;
pub mod token;
pub mod types;
pub mod yandex;
pub mod yandex_api;

#[cfg(test)]
pub(crate) mod fake_disk;

pub use http_retry::{send_with_retry, HttpRetryConfig};
pub use token::Token;
pub use types::*;
pub use yandex::{FsOptions, Opened, YandexFs, YandexObject};
pub use yandex_api::{ByteReader, DiskApi, RestClient, RestOptions, UploadReader};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// One entry produced by a listing: a directory, or an object handle
pub enum ListItem<O> {
    Dir(DirEntry),
    Object(O),
}

/// Handle on a single remote file
#[async_trait]
pub trait RemoteObject: Send + Sync {
    /// Path relative to the filesystem root
    fn remote(&self) -> &str;

    fn size(&self) -> u64;

    /// Resolved modification time, `None` when no source could be parsed
    fn mod_time(&self) -> Option<DateTime<Utc>>;

    /// Content hash as a lowercase hex string; empty when not yet known
    fn hash(&self, kind: HashType) -> Result<String, ProviderError>;

    fn storable(&self) -> bool {
        true
    }

    /// Re-read size, hash and modification time from the store
    async fn refresh(&mut self) -> Result<(), ProviderError>;

    async fn open(&self) -> Result<ByteReader, ProviderError>;

    /// Replace the content and record the source modification time
    async fn update(&mut self, reader: UploadReader, src: &SourceInfo) -> Result<(), ProviderError>;

    async fn set_mod_time(&mut self, mod_time: DateTime<Utc>) -> Result<(), ProviderError>;

    async fn remove(&self) -> Result<(), ProviderError>;
}

/// Boxed object handle borrowing its filesystem
pub type BoxObject<'a> = Box<dyn RemoteObject + 'a>;

/// Filesystem contract consumed by the sync engine
#[async_trait]
pub trait RemoteFs: Send + Sync {
    /// Name of the configured remote
    fn name(&self) -> &str;

    /// Root within the store, without surrounding separators
    fn root(&self) -> &str;

    /// Smallest modification time difference the remote can represent
    fn precision(&self) -> Duration;

    fn hashes(&self) -> &'static [HashType];

    /// List `dir` (relative to the root), handing each entry to `visit`.
    /// Returning an error from `visit` stops the listing with that error.
    async fn list<'a>(
        &'a self,
        dir: &str,
        depth: ListDepth,
        visit: &mut (dyn FnMut(ListItem<BoxObject<'a>>) -> Result<(), ProviderError> + Send),
    ) -> Result<(), ProviderError>;

    async fn new_object<'a>(&'a self, remote: &str) -> Result<BoxObject<'a>, ProviderError>;

    async fn put<'a>(&'a self, reader: UploadReader, src: &SourceInfo) -> Result<BoxObject<'a>, ProviderError>;

    async fn mkdir(&self, dir: &str) -> Result<(), ProviderError>;

    /// Remove an empty directory
    async fn rmdir(&self, dir: &str) -> Result<(), ProviderError>;

    /// Remove a directory and everything in it
    async fn purge(&self, dir: &str) -> Result<(), ProviderError>;
}

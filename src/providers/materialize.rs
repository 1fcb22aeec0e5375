//! Ancestor directory creation
//!
//! The store has no "create parents" primitive. Before an upload every
//! ancestor of the target must exist, so the materializer first tries the
//! whole directory in one call and falls back to creating it segment by
//! segment from the container down. Per-segment failures are only logged:
//! the upload that follows is the operation that must succeed, and it
//! fails on its own if a directory is really missing.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

use super::path::CONTAINER;
use super::yandex_api::{DiskApi, ERR_EXISTING_DIRECTORY, ERR_PATH_MISSING};
use super::ProviderError;

/// Cap on remembered directories; the set is cleared when it fills up.
const KNOWN_DIRS_MAX_ENTRIES: usize = 10_000;

fn already_exists(err: &ProviderError) -> bool {
    err.api_code() == Some(ERR_EXISTING_DIRECTORY)
}

/// Creates missing ancestor directories.
///
/// Directories seen to exist are remembered so the segment-by-segment
/// fallback can skip them. The set is only a hint: the direct attempt on
/// the full ancestor is always made, and a stale entry costs one extra
/// pass over the segments.
#[derive(Debug, Default)]
pub struct DirectoryMaterializer {
    known: Mutex<HashSet<String>>,
}

impl DirectoryMaterializer {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_known<R>(&self, f: impl FnOnce(&mut HashSet<String>) -> R) -> R {
        let mut known = self.known.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut known)
    }

    fn is_known(&self, dir: &str) -> bool {
        self.with_known(|known| known.contains(dir))
    }

    fn remember(&self, dir: &str) {
        self.with_known(|known| {
            if known.len() >= KNOWN_DIRS_MAX_ENTRIES {
                debug!("Known directory set reached {} entries, clearing", known.len());
                known.clear();
            }
            known.insert(dir.to_string());
        });
    }

    /// Drop `dir_path` and everything below it from the known set
    pub fn forget_under(&self, dir_path: &str) {
        let dir = dir_path.trim_end_matches('/');
        let below = format!("{}/", dir);
        self.with_known(|known| known.retain(|d| d != dir && !d.starts_with(&below)));
    }

    /// Drop every ancestor of `path` from the known set
    pub fn forget_ancestors(&self, path: &str) {
        self.with_known(|known| {
            known.retain(|d| !path.starts_with(&format!("{}/", d.trim_end_matches('/'))))
        });
    }

    /// Directory part of an absolute path, relative to the container and
    /// without surrounding separators. A path ending in `/` is itself the
    /// directory.
    pub fn ancestor_of(path: &str) -> Result<String, ProviderError> {
        let rest = path
            .strip_prefix(CONTAINER)
            .ok_or_else(|| ProviderError::InvalidPath(format!("{} is outside {}", path, CONTAINER)))?;
        let dir = if rest.ends_with('/') {
            rest
        } else {
            rest.rfind('/').map(|pos| &rest[..pos]).unwrap_or("")
        };
        Ok(dir.trim_matches('/').to_string())
    }

    /// Make sure every directory above `path` exists.
    ///
    /// Only a path outside the container is reported as an error. Creation
    /// failures are left for the subsequent upload to surface.
    pub async fn ensure_ancestors(&self, api: &dyn DiskApi, path: &str) -> Result<(), ProviderError> {
        let dir = Self::ancestor_of(path)?;
        if dir.is_empty() {
            return Ok(());
        }

        let full = format!("{}{}", CONTAINER, dir);
        match api.create_dir(&full).await {
            Ok(()) => {
                debug!("Created directory {}", full);
                self.remember(&full);
                return Ok(());
            }
            Err(e) if already_exists(&e) => {
                self.remember(&full);
                return Ok(());
            }
            Err(e) => debug!("Creating {} failed ({}), creating it segment by segment", full, e),
        }

        if !self.create_segments(api, &dir, true).await {
            debug!("Known directories above {} are stale, retrying without them", full);
            self.forget_ancestors(&format!("{}/", full));
            self.create_segments(api, &dir, false).await;
        }
        Ok(())
    }

    /// Create each cumulative prefix of `dir` from the container down.
    ///
    /// Returns false when a segment reported a missing parent although an
    /// ancestor was skipped as known, i.e. the known set was stale.
    async fn create_segments(&self, api: &dyn DiskApi, dir: &str, use_known: bool) -> bool {
        let mut cumulative = CONTAINER.to_string();
        let mut skipped = false;
        for segment in dir.split('/').filter(|s| !s.is_empty()) {
            if !cumulative.ends_with('/') {
                cumulative.push('/');
            }
            cumulative.push_str(segment);
            if use_known && self.is_known(&cumulative) {
                skipped = true;
                continue;
            }
            match api.create_dir(&cumulative).await {
                Ok(()) => {
                    debug!("Created directory {}", cumulative);
                    self.remember(&cumulative);
                }
                Err(e) if already_exists(&e) => self.remember(&cumulative),
                Err(e) if skipped && e.api_code() == Some(ERR_PATH_MISSING) => return false,
                Err(e) => warn!("Could not create directory {}: {}", cumulative, e),
            }
        }
        true
    }
}

//! Paginated listing over the flat file index and directory children

use std::collections::HashSet;
use tracing::debug;

use super::path::relativize;
use super::yandex_api::{DiskApi, ListOptions, ResourceInfo, ResourceKind};
use super::ProviderError;

/// Maximum number of entries requested per page
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

/// Drives listing requests page by page, handing entries to a callback as
/// they arrive so memory stays bounded by one page.
pub struct PageLister<'a> {
    api: &'a dyn DiskApi,
    limit: u32,
}

impl<'a> PageLister<'a> {
    pub fn new(api: &'a dyn DiskApi, limit: u32) -> Self {
        Self {
            api,
            limit: limit.max(1),
        }
    }

    /// Walk the flat listing of the whole disk, keeping entries whose path
    /// starts with `prefix`.
    ///
    /// The handler receives the path with `prefix` stripped. Pagination ends
    /// on the first page shorter than the limit. A handler error stops the
    /// walk at once and is returned as is.
    ///
    /// Inserts that land before the current offset shift the window, so a
    /// page can repeat the tail of the one before. Entries already seen on
    /// the previous page are skipped.
    pub async fn list_flat<F>(&self, prefix: &str, mut handle: F) -> Result<(), ProviderError>
    where
        F: FnMut(&str, ResourceInfo) -> Result<(), ProviderError> + Send,
    {
        let mut offset: u32 = 0;
        let mut previous: HashSet<String> = HashSet::new();
        loop {
            let page = self
                .api
                .flat_file_list(ListOptions::page(self.limit, offset))
                .await?;
            let count = page.items.len() as u32;
            debug!("Flat listing page at offset {}: {} items", offset, count);

            let mut current = HashSet::with_capacity(page.items.len());
            for item in page.items {
                if !current.insert(item.path.clone()) || previous.contains(&item.path) {
                    debug!("Skipping repeated entry {}", item.path);
                    continue;
                }
                let Some(relative) = relativize(&item.path, prefix).map(str::to_string) else {
                    continue;
                };
                handle(&relative, item)?;
            }
            previous = current;

            offset += count;
            if count < self.limit {
                break;
            }
        }
        Ok(())
    }

    /// Walk the immediate children of a directory.
    ///
    /// A directory that fits in one page costs one request; larger ones are
    /// continued by offset until the reported total is reached.
    pub async fn list_children<F>(&self, dir_path: &str, mut handle: F) -> Result<(), ProviderError>
    where
        F: FnMut(ResourceInfo, bool) -> Result<(), ProviderError> + Send,
    {
        let mut offset: u32 = 0;
        loop {
            let info = self
                .api
                .resource_info(dir_path, ListOptions::page(self.limit, offset))
                .await?;
            if info.kind() != ResourceKind::Dir {
                debug!("{} is not a directory, nothing to list", dir_path);
                return Ok(());
            }
            let Some(list) = info.embedded else {
                return Ok(());
            };
            let count = list.items.len() as u32;

            for item in list.items {
                match item.kind() {
                    ResourceKind::Dir => handle(item, true)?,
                    ResourceKind::File => handle(item, false)?,
                    ResourceKind::Unknown => {
                        debug!("Unknown resource type {:?} for {}", item.resource_type, item.path)
                    }
                }
            }

            offset += count;
            if count == 0 || offset >= list.total {
                return Ok(());
            }
        }
    }

    /// Whether a directory has at least one immediate child.
    ///
    /// Fails with `InvalidPath` when `dir_path` is not a directory.
    pub async fn has_children(&self, dir_path: &str) -> Result<bool, ProviderError> {
        let info = self
            .api
            .resource_info(dir_path, ListOptions::page(1, 0))
            .await?;
        if info.kind() != ResourceKind::Dir {
            return Err(ProviderError::InvalidPath(format!("{} is not a directory", dir_path)));
        }
        Ok(info
            .embedded
            .map(|list| list.total > 0 || !list.items.is_empty())
            .unwrap_or(false))
    }
}

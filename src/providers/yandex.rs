//! Yandex Disk filesystem adapter
//!
//! Composes path resolution, paginated listing, ancestor materialization
//! and metadata resolution into the `RemoteFs`/`RemoteObject` contract.
//!
//! Writes are two-phase: the content is uploaded first and the source
//! modification time is stored in a custom property afterwards, because
//! the store's own timestamp is the upload time. If the property write
//! fails the object stays uploaded and `ModTimeNotSet` is returned.
//!
//! `rmdir` checks for children and then deletes. Nothing on the store makes
//! that atomic, so a concurrent writer can slip a file in between.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::listing::{PageLister, DEFAULT_PAGE_SIZE};
use super::materialize::DirectoryMaterializer;
use super::metadata::{format_time, resolve_mod_time, ObjectMeta, DEFAULT_MODTIME_PROPERTY};
use super::path::{join, PathResolver, CONTAINER};
use super::yandex_api::{ByteReader, DiskApi, ListOptions, ResourceInfo, ResourceKind, UploadReader};
use super::{
    BoxObject, DirEntry, HashType, ListDepth, ListItem, ProviderError, RemoteFs, RemoteObject, SourceInfo,
};

const SUPPORTED_HASHES: &[HashType] = &[HashType::Md5];

/// Tunables of the adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsOptions {
    /// Entries requested per listing page
    pub page_size: u32,
    /// Custom property carrying the source modification time
    pub modtime_property: String,
}

impl Default for FsOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            modtime_property: DEFAULT_MODTIME_PROPERTY.to_string(),
        }
    }
}

/// Result of opening a filesystem on a root path
pub enum Opened {
    /// The root is a directory, or does not exist yet
    Directory(YandexFs),
    /// The root named a file; the filesystem is rooted at its parent
    FileRoot(YandexFs),
}

impl Opened {
    pub fn root_is_file(&self) -> bool {
        matches!(self, Opened::FileRoot(_))
    }

    pub fn into_fs(self) -> YandexFs {
        match self {
            Opened::Directory(fs) | Opened::FileRoot(fs) => fs,
        }
    }
}

pub struct YandexFs {
    name: String,
    api: Arc<dyn DiskApi>,
    paths: PathResolver,
    materializer: DirectoryMaterializer,
    options: FsOptions,
}

impl YandexFs {
    /// Build an adapter without touching the network
    pub fn new(name: &str, root: &str, api: Arc<dyn DiskApi>, options: FsOptions) -> Self {
        Self {
            name: name.to_string(),
            api,
            paths: PathResolver::new(root),
            materializer: DirectoryMaterializer::new(),
            options,
        }
    }

    /// Build an adapter and check whether the root names a file.
    ///
    /// A root that cannot be read (typically because it does not exist yet)
    /// is treated as a directory; only authentication failures abort.
    pub async fn open(name: &str, root: &str, api: Arc<dyn DiskApi>, options: FsOptions) -> Result<Opened, ProviderError> {
        let fs = Self::new(name, root, api, options);
        let root_path = fs.paths.dir_path("");
        let probe = fs.api.resource_info(&root_path, ListOptions::page(1, 0)).await;
        match probe {
            Ok(info) if info.kind() == ResourceKind::File => {
                let parent = fs.paths.parent_root();
                info!("Root {} is a file, using parent {:?}", root_path, parent);
                Ok(Opened::FileRoot(Self::new(&fs.name, &parent, fs.api, fs.options)))
            }
            Ok(_) => Ok(Opened::Directory(fs)),
            Err(e @ ProviderError::AuthenticationFailed(_)) => Err(e),
            Err(e) => {
                debug!("Root {} not readable ({}), assuming directory", root_path, e);
                Ok(Opened::Directory(fs))
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &str {
        self.paths.root()
    }

    pub fn precision(&self) -> Duration {
        Duration::from_nanos(1)
    }

    pub fn hashes(&self) -> &'static [HashType] {
        SUPPORTED_HASHES
    }

    fn lister(&self) -> PageLister<'_> {
        PageLister::new(self.api.as_ref(), self.options.page_size)
    }

    fn dir_entry(&self, remote: String, info: &ResourceInfo) -> DirEntry {
        let property = info.custom_properties.get(&self.options.modtime_property);
        DirEntry {
            name: remote,
            modified: resolve_mod_time(&info.modified, property).time(),
            size: info.size,
            count: None,
        }
    }

    fn object_from_info(&self, remote: String, info: &ResourceInfo) -> YandexObject<'_> {
        YandexObject {
            fs: self,
            remote,
            meta: ObjectMeta::from_info(info, &self.options.modtime_property),
        }
    }

    /// List `dir` relative to the root.
    ///
    /// `ListDepth::One` yields files and directories from the directory's
    /// own child list. `ListDepth::Full` walks the flat file index and so
    /// yields files only, with paths relative to the root.
    pub async fn list<'a, F>(&'a self, dir: &str, depth: ListDepth, mut visit: F) -> Result<(), ProviderError>
    where
        F: FnMut(ListItem<YandexObject<'a>>) -> Result<(), ProviderError> + Send,
    {
        let dir = dir.trim_matches('/');
        match depth {
            ListDepth::One => {
                let dir_path = self.paths.dir_path(dir);
                self.lister()
                    .list_children(&dir_path, |item, is_dir| {
                        let remote = join(dir, &item.name);
                        if is_dir {
                            visit(ListItem::Dir(self.dir_entry(remote, &item)))
                        } else {
                            visit(ListItem::Object(self.object_from_info(remote, &item)))
                        }
                    })
                    .await
            }
            ListDepth::Full => {
                let prefix = self.paths.dir_prefix(dir);
                self.lister()
                    .list_flat(&prefix, |relative, item| {
                        let remote = join(dir, relative);
                        visit(ListItem::Object(self.object_from_info(remote, &item)))
                    })
                    .await
            }
            ListDepth::Levels(_) => Err(ProviderError::LevelNotSupported),
        }
    }

    /// Fetch an object's metadata (one round trip)
    pub async fn new_object(&self, remote: &str) -> Result<YandexObject<'_>, ProviderError> {
        let mut object = YandexObject {
            fs: self,
            remote: remote.to_string(),
            meta: ObjectMeta {
                size: 0,
                md5: String::new(),
                mod_time: None,
            },
        };
        let info = object.fetch_info().await?;
        if info.kind() == ResourceKind::Dir {
            return Err(ProviderError::NotFound(format!("{} is a directory", remote)));
        }
        object.apply(&info);
        Ok(object)
    }

    /// Upload a new object.
    ///
    /// The returned handle carries the declared size and modification time;
    /// its hash stays empty until `refresh`.
    pub async fn put(&self, reader: UploadReader, src: &SourceInfo) -> Result<YandexObject<'_>, ProviderError> {
        let mut object = YandexObject {
            fs: self,
            remote: src.remote.clone(),
            meta: ObjectMeta {
                size: src.size,
                md5: String::new(),
                mod_time: Some(src.mod_time),
            },
        };
        object.update(reader, src).await?;
        Ok(object)
    }

    /// Create `dir` and all of its ancestors
    pub async fn mkdir(&self, dir: &str) -> Result<(), ProviderError> {
        let dir_path = self.paths.dir_path(dir);
        let target = format!("{}/", dir_path.trim_end_matches('/'));
        self.materializer.ensure_ancestors(self.api.as_ref(), &target).await
    }

    /// Remove `dir` if it has no children
    pub async fn rmdir(&self, dir: &str) -> Result<(), ProviderError> {
        self.purge_check(dir, true).await
    }

    /// Remove the directory `dir` with everything in it
    pub async fn purge(&self, dir: &str) -> Result<(), ProviderError> {
        self.purge_check(dir, false).await
    }

    async fn purge_check(&self, dir: &str, check: bool) -> Result<(), ProviderError> {
        let dir_path = self.paths.dir_path(dir);
        if dir_path == CONTAINER {
            return Err(ProviderError::InvalidPath("refusing to delete the disk root".to_string()));
        }
        let non_empty = self.lister().has_children(&dir_path).await?;
        if check && non_empty {
            return Err(ProviderError::DirectoryNotEmpty(dir_path));
        }
        self.api.delete(&dir_path, true).await?;
        self.materializer.forget_under(&dir_path);
        info!("Removed directory {}", dir_path);
        Ok(())
    }
}

impl std::fmt::Display for YandexFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Yandex {}", self.paths.root())
    }
}

/// A file on the disk, borrowing the filesystem it belongs to
pub struct YandexObject<'a> {
    fs: &'a YandexFs,
    remote: String,
    meta: ObjectMeta,
}

impl<'a> YandexObject<'a> {
    fn remote_path(&self) -> String {
        self.fs.paths.resolve(&self.remote)
    }

    async fn fetch_info(&self) -> Result<ResourceInfo, ProviderError> {
        self.fs
            .api
            .resource_info(&self.remote_path(), ListOptions::default())
            .await
    }

    fn apply(&mut self, info: &ResourceInfo) {
        self.meta = ObjectMeta::from_info(info, &self.fs.options.modtime_property);
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn size(&self) -> u64 {
        self.meta.size
    }

    pub fn mod_time(&self) -> Option<DateTime<Utc>> {
        self.meta.mod_time
    }

    /// MD5 of the content, empty if the store has not reported one yet
    pub fn hash(&self, kind: HashType) -> Result<String, ProviderError> {
        match kind {
            HashType::Md5 => Ok(self.meta.md5.clone()),
            _ => Err(ProviderError::HashUnsupported),
        }
    }

    pub async fn refresh(&mut self) -> Result<(), ProviderError> {
        let info = self.fetch_info().await?;
        self.apply(&info);
        Ok(())
    }

    pub async fn open(&self) -> Result<ByteReader, ProviderError> {
        self.fs.api.download(&self.remote_path()).await
    }

    pub async fn remove(&self) -> Result<(), ProviderError> {
        let path = self.remote_path();
        self.fs.api.delete(&path, true).await?;
        self.fs.materializer.forget_under(&path);
        Ok(())
    }

    /// Store `mod_time` in the override property
    pub async fn set_mod_time(&mut self, mod_time: DateTime<Utc>) -> Result<(), ProviderError> {
        self.fs
            .api
            .set_custom_property(&self.remote_path(), &self.fs.options.modtime_property, &format_time(mod_time))
            .await?;
        self.meta.mod_time = Some(mod_time);
        Ok(())
    }

    /// Upload new content, then record the source modification time.
    ///
    /// Size and time are taken from `src` once the upload succeeded; the
    /// hash is cleared since the store computes it after the fact.
    pub async fn update(&mut self, reader: UploadReader, src: &SourceInfo) -> Result<(), ProviderError> {
        let path = self.remote_path();
        self.fs.materializer.ensure_ancestors(self.fs.api.as_ref(), &path).await?;
        self.fs.api.upload(reader, &path, true).await?;

        self.meta = ObjectMeta {
            size: src.size,
            md5: String::new(),
            mod_time: Some(src.mod_time),
        };

        if let Err(e) = self.set_mod_time(src.mod_time).await {
            warn!("Uploaded {} but could not store its modification time: {}", path, e);
            return Err(ProviderError::ModTimeNotSet(Box::new(e)));
        }
        debug!("Updated {} ({} bytes)", path, src.size);
        Ok(())
    }
}

impl std::fmt::Display for YandexObject<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.remote)
    }
}

// ─── Trait Implementations ───────────────────────────────────────────────

#[async_trait]
impl RemoteObject for YandexObject<'_> {
    fn remote(&self) -> &str {
        YandexObject::remote(self)
    }

    fn size(&self) -> u64 {
        YandexObject::size(self)
    }

    fn mod_time(&self) -> Option<DateTime<Utc>> {
        YandexObject::mod_time(self)
    }

    fn hash(&self, kind: HashType) -> Result<String, ProviderError> {
        YandexObject::hash(self, kind)
    }

    async fn refresh(&mut self) -> Result<(), ProviderError> {
        YandexObject::refresh(self).await
    }

    async fn open(&self) -> Result<ByteReader, ProviderError> {
        YandexObject::open(self).await
    }

    async fn update(&mut self, reader: UploadReader, src: &SourceInfo) -> Result<(), ProviderError> {
        YandexObject::update(self, reader, src).await
    }

    async fn set_mod_time(&mut self, mod_time: DateTime<Utc>) -> Result<(), ProviderError> {
        YandexObject::set_mod_time(self, mod_time).await
    }

    async fn remove(&self) -> Result<(), ProviderError> {
        YandexObject::remove(self).await
    }
}

#[async_trait]
impl RemoteFs for YandexFs {
    fn name(&self) -> &str {
        YandexFs::name(self)
    }

    fn root(&self) -> &str {
        YandexFs::root(self)
    }

    fn precision(&self) -> Duration {
        YandexFs::precision(self)
    }

    fn hashes(&self) -> &'static [HashType] {
        YandexFs::hashes(self)
    }

    async fn list<'a>(
        &'a self,
        dir: &str,
        depth: ListDepth,
        visit: &mut (dyn FnMut(ListItem<BoxObject<'a>>) -> Result<(), ProviderError> + Send),
    ) -> Result<(), ProviderError> {
        YandexFs::list(self, dir, depth, |item| match item {
            ListItem::Dir(entry) => visit(ListItem::Dir(entry)),
            ListItem::Object(object) => visit(ListItem::Object(Box::new(object))),
        })
        .await
    }

    async fn new_object<'a>(&'a self, remote: &str) -> Result<BoxObject<'a>, ProviderError> {
        Ok(Box::new(YandexFs::new_object(self, remote).await?))
    }

    async fn put<'a>(&'a self, reader: UploadReader, src: &SourceInfo) -> Result<BoxObject<'a>, ProviderError> {
        Ok(Box::new(YandexFs::put(self, reader, src).await?))
    }

    async fn mkdir(&self, dir: &str) -> Result<(), ProviderError> {
        YandexFs::mkdir(self, dir).await
    }

    async fn rmdir(&self, dir: &str) -> Result<(), ProviderError> {
        YandexFs::rmdir(self, dir).await
    }

    async fn purge(&self, dir: &str) -> Result<(), ProviderError> {
        YandexFs::purge(self, dir).await
    }
}

//! In-memory `DiskApi` used by the unit tests.
//!
//! Mirrors the store's observable behavior: 409 conflicts with error codes
//! for directory creation, embedded child pages on `resource_info`, a flat
//! file listing sorted by path, and upload refusal under missing parents.

use async_trait::async_trait;
use md5::{Digest, Md5};
use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::sync::Mutex;
use tokio::io::AsyncReadExt;

use super::yandex_api::{
    ByteReader, DiskApi, FilesResourceList, ListOptions, ResourceInfo, ResourceList, UploadReader,
    ERR_EXISTING_DIRECTORY, ERR_PATH_MISSING,
};
use super::ProviderError;

pub const FAKE_NOW: &str = "2024-03-01T12:00:00+00:00";

const ROOT: &str = "disk:/";

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File {
        data: Vec<u8>,
        modified: String,
        md5: String,
        props: HashMap<String, serde_json::Value>,
    },
}

#[derive(Default)]
struct State {
    nodes: BTreeMap<String, Node>,
    flat_requests: Vec<ListOptions>,
    info_requests: usize,
    mkdir_calls: Vec<String>,
    delete_calls: Vec<String>,
    upload_calls: usize,
    fail_flat_page: Option<usize>,
    insert_before_flat: Option<(usize, String)>,
    fail_property: bool,
    fail_mkdir: bool,
}

#[derive(Default)]
pub struct FakeDisk {
    state: Mutex<State>,
}

/// Canonical `disk:/a/b` form of any accepted path spelling
pub fn norm(path: &str) -> String {
    let rest = path.strip_prefix("disk:").unwrap_or(path).trim_matches('/');
    if rest.is_empty() {
        ROOT.to_string()
    } else {
        format!("{}{}", ROOT, rest)
    }
}

fn parent(path: &str) -> Option<String> {
    if path == ROOT {
        return None;
    }
    let rest = &path[ROOT.len()..];
    Some(match rest.rfind('/') {
        Some(pos) => format!("{}{}", ROOT, &rest[..pos]),
        None => ROOT.to_string(),
    })
}

fn name_of(path: &str) -> String {
    path.rsplit('/').next().unwrap_or_default().to_string()
}

fn conflict(code: &str) -> ProviderError {
    ProviderError::Api {
        status: 409,
        code: Some(code.to_string()),
        message: code.to_string(),
    }
}

impl FakeDisk {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn add_dir(&self, path: &str) {
        let path = norm(path);
        self.with_state(|s| {
            let mut cur = Some(path);
            while let Some(p) = cur {
                if p == ROOT {
                    break;
                }
                cur = parent(&p);
                s.nodes.entry(p).or_insert(Node::Dir);
            }
        });
    }

    pub fn add_file(&self, path: &str, data: &[u8], modified: &str) {
        let path = norm(path);
        if let Some(p) = parent(&path) {
            self.add_dir(&p);
        }
        let md5 = hex::encode(Md5::digest(data));
        self.with_state(|s| {
            s.nodes.insert(
                path,
                Node::File {
                    data: data.to_vec(),
                    modified: modified.to_string(),
                    md5,
                    props: HashMap::new(),
                },
            );
        });
    }

    pub fn set_property(&self, path: &str, key: &str, value: serde_json::Value) {
        self.with_state(|s| {
            if let Some(Node::File { props, .. }) = s.nodes.get_mut(&norm(path)) {
                props.insert(key.to_string(), value);
            }
        });
    }

    pub fn property(&self, path: &str, key: &str) -> Option<serde_json::Value> {
        self.with_state(|s| match s.nodes.get(&norm(path)) {
            Some(Node::File { props, .. }) => props.get(key).cloned(),
            _ => None,
        })
    }

    pub fn is_dir(&self, path: &str) -> bool {
        let path = norm(path);
        path == ROOT || self.with_state(|s| matches!(s.nodes.get(&path), Some(Node::Dir)))
    }

    pub fn exists(&self, path: &str) -> bool {
        let path = norm(path);
        path == ROOT || self.with_state(|s| s.nodes.contains_key(&path))
    }

    pub fn file_data(&self, path: &str) -> Option<Vec<u8>> {
        self.with_state(|s| match s.nodes.get(&norm(path)) {
            Some(Node::File { data, .. }) => Some(data.clone()),
            _ => None,
        })
    }

    pub fn flat_requests(&self) -> Vec<ListOptions> {
        self.with_state(|s| s.flat_requests.clone())
    }

    pub fn info_requests(&self) -> usize {
        self.with_state(|s| s.info_requests)
    }

    pub fn mkdir_calls(&self) -> Vec<String> {
        self.with_state(|s| s.mkdir_calls.clone())
    }

    pub fn delete_calls(&self) -> Vec<String> {
        self.with_state(|s| s.delete_calls.clone())
    }

    pub fn upload_calls(&self) -> usize {
        self.with_state(|s| s.upload_calls)
    }

    /// Make the flat listing request with this zero-based index fail
    pub fn fail_flat_page(&self, index: usize) {
        self.with_state(|s| s.fail_flat_page = Some(index));
    }

    /// Add an empty file right before the flat listing request with this
    /// zero-based index is served
    pub fn insert_before_flat_page(&self, index: usize, path: &str) {
        self.with_state(|s| s.insert_before_flat = Some((index, norm(path))));
    }

    pub fn fail_property_writes(&self) {
        self.with_state(|s| s.fail_property = true);
    }

    /// Reject every directory creation with a server error
    pub fn fail_mkdir(&self) {
        self.with_state(|s| s.fail_mkdir = true);
    }

    fn info_for(path: &str, node: &Node) -> ResourceInfo {
        match node {
            Node::Dir => ResourceInfo {
                name: name_of(path),
                path: path.to_string(),
                resource_type: "dir".to_string(),
                modified: FAKE_NOW.to_string(),
                ..ResourceInfo::default()
            },
            Node::File { data, modified, md5, props } => ResourceInfo {
                name: name_of(path),
                path: path.to_string(),
                resource_type: "file".to_string(),
                size: data.len() as u64,
                modified: modified.clone(),
                md5: Some(md5.clone()),
                custom_properties: props.clone(),
                ..ResourceInfo::default()
            },
        }
    }
}

#[async_trait]
impl DiskApi for FakeDisk {
    async fn resource_info(&self, path: &str, opts: ListOptions) -> Result<ResourceInfo, ProviderError> {
        let path = norm(path);
        self.with_state(|s| {
            s.info_requests += 1;
            let node = if path == ROOT {
                Node::Dir
            } else {
                s.nodes
                    .get(&path)
                    .cloned()
                    .ok_or_else(|| ProviderError::NotFound(path.clone()))?
            };
            let mut info = Self::info_for(&path, &node);
            if let Node::Dir = node {
                let children: Vec<ResourceInfo> = s
                    .nodes
                    .iter()
                    .filter(|(p, _)| parent(p).as_deref() == Some(path.as_str()))
                    .map(|(p, n)| Self::info_for(p, n))
                    .collect();
                let limit = opts.limit.unwrap_or(20);
                let offset = opts.offset.unwrap_or(0);
                let items = children
                    .iter()
                    .skip(offset as usize)
                    .take(limit as usize)
                    .cloned()
                    .collect();
                info.embedded = Some(ResourceList {
                    items,
                    path: path.clone(),
                    limit,
                    offset,
                    total: children.len() as u32,
                });
            }
            Ok(info)
        })
    }

    async fn flat_file_list(&self, opts: ListOptions) -> Result<FilesResourceList, ProviderError> {
        self.with_state(|s| {
            let index = s.flat_requests.len();
            s.flat_requests.push(opts);
            if s.fail_flat_page == Some(index) {
                return Err(ProviderError::NetworkError("connection reset".to_string()));
            }
            if let Some((at, path)) = s.insert_before_flat.clone() {
                if at == index {
                    s.insert_before_flat = None;
                    s.nodes.insert(
                        path,
                        Node::File {
                            data: Vec::new(),
                            modified: FAKE_NOW.to_string(),
                            md5: hex::encode(Md5::digest(b"")),
                            props: HashMap::new(),
                        },
                    );
                }
            }
            let limit = opts.limit.unwrap_or(20);
            let offset = opts.offset.unwrap_or(0);
            let items = s
                .nodes
                .iter()
                .filter(|(_, n)| matches!(n, Node::File { .. }))
                .skip(offset as usize)
                .take(limit as usize)
                .map(|(p, n)| Self::info_for(p, n))
                .collect();
            Ok(FilesResourceList { items, limit, offset })
        })
    }

    async fn create_dir(&self, path: &str) -> Result<(), ProviderError> {
        let path = norm(path);
        self.with_state(|s| {
            s.mkdir_calls.push(path.clone());
            if s.fail_mkdir {
                return Err(ProviderError::Api {
                    status: 503,
                    code: None,
                    message: "unavailable".to_string(),
                });
            }
            if path == ROOT {
                return Err(conflict(ERR_EXISTING_DIRECTORY));
            }
            match s.nodes.get(&path) {
                Some(Node::Dir) => return Err(conflict(ERR_EXISTING_DIRECTORY)),
                Some(Node::File { .. }) => return Err(conflict("DiskPathPointsToExistentFileError")),
                None => {}
            }
            let parent_ok = parent(&path)
                .map(|p| p == ROOT || matches!(s.nodes.get(&p), Some(Node::Dir)))
                .unwrap_or(true);
            if !parent_ok {
                return Err(conflict(ERR_PATH_MISSING));
            }
            s.nodes.insert(path, Node::Dir);
            Ok(())
        })
    }

    async fn upload(&self, mut reader: UploadReader, path: &str, overwrite: bool) -> Result<(), ProviderError> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        let path = norm(path);
        let md5 = hex::encode(Md5::digest(&data));
        self.with_state(|s| {
            s.upload_calls += 1;
            let parent_ok = parent(&path)
                .map(|p| p == ROOT || matches!(s.nodes.get(&p), Some(Node::Dir)))
                .unwrap_or(false);
            if !parent_ok {
                return Err(conflict(ERR_PATH_MISSING));
            }
            if s.nodes.contains_key(&path) && !overwrite {
                return Err(conflict("DiskResourceAlreadyExistsError"));
            }
            s.nodes.insert(
                path,
                Node::File {
                    data,
                    modified: FAKE_NOW.to_string(),
                    md5,
                    props: HashMap::new(),
                },
            );
            Ok(())
        })
    }

    async fn download(&self, path: &str) -> Result<ByteReader, ProviderError> {
        let path = norm(path);
        self.with_state(|s| match s.nodes.get(&path) {
            Some(Node::File { data, .. }) => Ok(Box::new(Cursor::new(data.clone())) as ByteReader),
            _ => Err(ProviderError::NotFound(path.clone())),
        })
    }

    async fn delete(&self, path: &str, _permanently: bool) -> Result<(), ProviderError> {
        let path = norm(path);
        self.with_state(|s| {
            s.delete_calls.push(path.clone());
            if !s.nodes.contains_key(&path) {
                return Err(ProviderError::NotFound(path.clone()));
            }
            let below = format!("{}/", path);
            s.nodes.retain(|p, _| p != &path && !p.starts_with(&below));
            Ok(())
        })
    }

    async fn set_custom_property(&self, path: &str, key: &str, value: &str) -> Result<(), ProviderError> {
        let path = norm(path);
        self.with_state(|s| {
            if s.fail_property {
                return Err(ProviderError::Api {
                    status: 500,
                    code: None,
                    message: "property store down".to_string(),
                });
            }
            match s.nodes.get_mut(&path) {
                Some(Node::File { props, .. }) => {
                    props.insert(key.to_string(), serde_json::Value::String(value.to_string()));
                    Ok(())
                }
                _ => Err(ProviderError::NotFound(path.clone())),
            }
        })
    }
}

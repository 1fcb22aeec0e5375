//! Mapping between root-relative paths and the store's `disk:/` namespace

/// Container prefix every absolute path on the disk starts with
pub const CONTAINER: &str = "disk:/";

/// Resolves root-relative paths into absolute disk paths.
///
/// The root is trimmed once at construction. Relative paths are appended
/// verbatim; callers hand in already-normalized paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    root: String,
    disk_root: String,
}

impl PathResolver {
    pub fn new(root: &str) -> Self {
        let root = root.trim_matches('/').to_string();
        let disk_root = if root.is_empty() {
            CONTAINER.to_string()
        } else {
            format!("{}{}/", CONTAINER, root)
        };
        Self { root, disk_root }
    }

    /// Root as configured, without surrounding separators
    pub fn root(&self) -> &str {
        &self.root
    }

    /// `disk:/<root>/`, or `disk:/` for the empty root
    pub fn disk_root(&self) -> &str {
        &self.disk_root
    }

    /// Absolute path of an object below the root
    pub fn resolve(&self, relative: &str) -> String {
        format!("{}{}", self.disk_root, relative)
    }

    /// Absolute path of a directory below the root, without a trailing
    /// separator unless it is the container itself
    pub fn dir_path(&self, relative: &str) -> String {
        let full = self.resolve(relative);
        let trimmed = full.trim_end_matches('/');
        if trimmed.len() < CONTAINER.len() {
            CONTAINER.to_string()
        } else {
            trimmed.to_string()
        }
    }

    /// Prefix matching every entry inside a directory below the root
    pub fn dir_prefix(&self, relative: &str) -> String {
        let relative = relative.trim_matches('/');
        if relative.is_empty() {
            self.disk_root.clone()
        } else {
            format!("{}{}/", self.disk_root, relative)
        }
    }

    /// Root to use when the configured root turned out to name a file
    pub fn parent_root(&self) -> String {
        match self.root.rfind('/') {
            Some(pos) => self.root[..pos].to_string(),
            None => String::new(),
        }
    }
}

/// Strip `prefix` from an absolute path, or `None` if it lies elsewhere
pub fn relativize<'p>(absolute: &'p str, prefix: &str) -> Option<&'p str> {
    absolute.strip_prefix(prefix)
}

/// Join a directory and a name relative to the same base
pub fn join(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

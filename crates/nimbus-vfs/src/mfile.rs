use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use crate::error::{Result, VfsError};
use crate::local;
use crate::store::{ObjectMetadata, ObjectStore};
use crate::uri::ObjectUri;

/// Opaque per-file payload attached by higher layers (for example a parsed record index).
pub type AuxInfo = Arc<dyn Any + Send + Sync>;

/// Backends available when opening a location string.
#[derive(Clone, Debug, Default)]
pub struct Backends {
    object_store: Option<Arc<dyn ObjectStore>>,
}

impl Backends {
    pub fn local_only() -> Self {
        Self::default()
    }

    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(store);
        self
    }

    pub fn object_store(&self) -> Option<&Arc<dyn ObjectStore>> {
        self.object_store.as_ref()
    }

    /// Open `location`, dispatching on its scheme. `file:` prefixes and bare paths are local.
    pub fn open(&self, location: &str) -> Result<MFile> {
        if ObjectUri::is_object_uri(location) {
            let uri = ObjectUri::parse(location)?;
            let store = self
                .object_store
                .clone()
                .ok_or_else(|| VfsError::NoObjectStore { uri: uri.redacted() })?;
            return Ok(MFile::object(uri, store));
        }
        let path = location.strip_prefix("file:").unwrap_or(location);
        Ok(MFile::local(path))
    }
}

/// A file addressed either by a local path or by a `cdms3:` object URI.
///
/// Identity (equality, hashing, ordering in maps) is the canonical path string. Object
/// handles memoize the first successful `HEAD`; local handles stat the filesystem on every
/// call.
#[derive(Clone)]
pub struct MFile {
    backend: Backend,
    aux_info: Option<AuxInfo>,
}

#[derive(Clone, Debug)]
enum Backend {
    Local(LocalFile),
    Object(ObjectFile),
}

#[derive(Clone, Debug)]
struct LocalFile {
    path: PathBuf,
    path_str: String,
}

#[derive(Clone, Debug)]
struct ObjectFile {
    uri: ObjectUri,
    store: Arc<dyn ObjectStore>,
    metadata: OnceLock<Option<ObjectMetadata>>,
    prefix: OnceLock<bool>,
}

impl ObjectFile {
    fn new(uri: ObjectUri, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            uri,
            store,
            metadata: OnceLock::new(),
            prefix: OnceLock::new(),
        }
    }

    fn metadata(&self) -> Result<Option<ObjectMetadata>> {
        if let Some(meta) = self.metadata.get() {
            return Ok(*meta);
        }
        let meta = self.store.head(self.uri.bucket(), self.uri.key())?;
        tracing::trace!(
            target = "nimbus.vfs",
            uri = %self.uri.redacted(),
            found = meta.is_some(),
            "object head"
        );
        Ok(*self.metadata.get_or_init(|| meta))
    }

    fn is_directory(&self) -> Result<bool> {
        if let Some(prefix) = self.prefix.get() {
            return Ok(*prefix);
        }
        let prefix = match self.uri.delimiter() {
            None => false,
            Some(_) if self.uri.is_prefix_address() => true,
            Some(d) => {
                if self.uri.key().is_empty() || self.metadata()?.is_some() {
                    false
                } else {
                    let listing_prefix = format!("{}{d}", self.uri.key());
                    !self
                        .store
                        .list(self.uri.bucket(), &listing_prefix, Some(d))?
                        .is_empty()
                }
            }
        };
        Ok(*self.prefix.get_or_init(|| prefix))
    }

    fn not_found(&self) -> VfsError {
        VfsError::NotFound {
            path: self.uri.redacted(),
        }
    }

    fn derived(&self, uri: ObjectUri) -> ObjectFile {
        ObjectFile::new(uri, Arc::clone(&self.store))
    }
}

impl MFile {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let path_str = path.to_string_lossy().into_owned();
        Self {
            backend: Backend::Local(LocalFile { path, path_str }),
            aux_info: None,
        }
    }

    pub fn object(uri: ObjectUri, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            backend: Backend::Object(ObjectFile::new(uri, store)),
            aux_info: None,
        }
    }

    pub fn open(location: &str, backends: &Backends) -> Result<Self> {
        backends.open(location)
    }

    /// Canonical path: the local path, or the full object URI including its fragment.
    pub fn path(&self) -> &str {
        match &self.backend {
            Backend::Local(file) => &file.path_str,
            Backend::Object(file) => file.uri.as_str(),
        }
    }

    /// Last path segment (for flat object keys, the whole key).
    pub fn name(&self) -> &str {
        match &self.backend {
            Backend::Local(file) => Path::new(&file.path_str)
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or(""),
            Backend::Object(file) => file.uri.name(),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self.backend, Backend::Local(_))
    }

    pub fn as_local_path(&self) -> Option<&Path> {
        match &self.backend {
            Backend::Local(file) => Some(&file.path),
            Backend::Object(_) => None,
        }
    }

    pub fn as_object_uri(&self) -> Option<&ObjectUri> {
        match &self.backend {
            Backend::Local(_) => None,
            Backend::Object(file) => Some(&file.uri),
        }
    }

    /// Location with any fragment removed, used to derive cache paths.
    pub fn location(&self) -> &str {
        match &self.backend {
            Backend::Local(file) => &file.path_str,
            Backend::Object(file) => file.uri.location(),
        }
    }

    pub fn parent(&self) -> Option<MFile> {
        match &self.backend {
            Backend::Local(file) => file
                .path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .map(MFile::local),
            Backend::Object(file) => Some(MFile {
                backend: Backend::Object(file.derived(file.uri.parent()?)),
                aux_info: None,
            }),
        }
    }

    /// `name` inside this directory (or object prefix).
    pub fn child(&self, name: &str) -> MFile {
        match &self.backend {
            Backend::Local(file) => MFile::local(file.path.join(name)),
            Backend::Object(file) => MFile {
                backend: Backend::Object(file.derived(file.uri.child(name))),
                aux_info: None,
            },
        }
    }

    /// `name` next to this file. Flat object keys have no parent, so `name` replaces the
    /// whole key.
    pub fn sibling(&self, name: &str) -> MFile {
        match &self.backend {
            Backend::Local(file) => {
                let parent = file.path.parent().unwrap_or_else(|| Path::new(""));
                MFile::local(parent.join(name))
            }
            Backend::Object(file) => MFile {
                backend: Backend::Object(file.derived(file.uri.sibling(name))),
                aux_info: None,
            },
        }
    }

    /// Whether the file exists. For objects this is a `HEAD` on the exact key, so prefix
    /// addresses report `false`.
    pub fn exists(&self) -> Result<bool> {
        match &self.backend {
            Backend::Local(file) => Ok(local::metadata(&file.path)?.is_some()),
            Backend::Object(file) => Ok(file.metadata()?.is_some()),
        }
    }

    pub fn is_directory(&self) -> Result<bool> {
        match &self.backend {
            Backend::Local(file) => {
                Ok(local::metadata(&file.path)?.is_some_and(|meta| meta.is_dir()))
            }
            Backend::Object(file) => file.is_directory(),
        }
    }

    /// Size in bytes. Directories report 0.
    pub fn length(&self) -> Result<u64> {
        match &self.backend {
            Backend::Local(file) => {
                let meta = local::metadata(&file.path)?.ok_or_else(|| VfsError::NotFound {
                    path: file.path_str.clone(),
                })?;
                Ok(if meta.is_dir() { 0 } else { meta.len() })
            }
            Backend::Object(file) => match file.metadata()? {
                Some(meta) => Ok(meta.length),
                None if file.is_directory()? => Ok(0),
                None => Err(file.not_found()),
            },
        }
    }

    /// Modification time in milliseconds since the Unix epoch. Object prefixes report 0.
    pub fn last_modified_millis(&self) -> Result<u64> {
        match &self.backend {
            Backend::Local(file) => {
                let meta = local::metadata(&file.path)?.ok_or_else(|| VfsError::NotFound {
                    path: file.path_str.clone(),
                })?;
                Ok(local::modified_millis(&meta))
            }
            Backend::Object(file) => match file.metadata()? {
                Some(meta) => Ok(meta.last_modified_millis),
                None if file.is_directory()? => Ok(0),
                None => Err(file.not_found()),
            },
        }
    }

    /// Copy bytes `[offset, offset + max_bytes)` (or through the end) into `out`.
    ///
    /// Directories and missing files fail with [`VfsError::NotFound`].
    pub fn write_to_stream(
        &self,
        out: &mut dyn Write,
        offset: u64,
        max_bytes: Option<u64>,
    ) -> Result<u64> {
        match &self.backend {
            Backend::Local(file) => local::write_range(&file.path, offset, max_bytes, out),
            Backend::Object(file) => {
                if file.uri.is_prefix_address() {
                    return Err(file.not_found());
                }
                let meta = file.metadata()?.ok_or_else(|| file.not_found())?;
                let available = meta.length.saturating_sub(offset);
                let len = max_bytes.map_or(available, |max| max.min(available));
                if len == 0 {
                    return Ok(0);
                }
                file.store
                    .get_range(file.uri.bucket(), file.uri.key(), offset, Some(len), out)
            }
        }
    }

    pub fn read_all(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.write_to_stream(&mut bytes, 0, None)?;
        Ok(bytes)
    }

    /// Replace this file's contents with those of a local `source` file.
    ///
    /// The target's directory (or bucket) must already exist; a missing one fails with
    /// [`VfsError::NamespaceNotFound`], a missing source with [`VfsError::NotFound`].
    pub fn create_from(&self, source: &Path) -> Result<bool> {
        if !source.is_file() {
            return Err(VfsError::NotFound {
                path: source.to_string_lossy().into_owned(),
            });
        }
        match &self.backend {
            Backend::Local(file) => {
                let parent = file
                    .path
                    .parent()
                    .filter(|parent| !parent.as_os_str().is_empty())
                    .unwrap_or_else(|| Path::new("."));
                if !parent.is_dir() {
                    return Err(VfsError::NamespaceNotFound {
                        bucket: parent.to_string_lossy().into_owned(),
                    });
                }
                local::atomic_copy(&file.path, source)?;
            }
            Backend::Object(file) => {
                file.store
                    .put_file(file.uri.bucket(), file.uri.key(), source)?;
            }
        }
        tracing::debug!(target = "nimbus.vfs", path = %self.display_path(), "created from local file");
        Ok(true)
    }

    /// Replace this file's contents with `bytes`. Local parent directories are created as
    /// needed; object writes are staged through a local temporary file.
    pub fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        match &self.backend {
            Backend::Local(file) => local::atomic_write(&file.path, bytes)?,
            Backend::Object(file) => {
                let mut staged = tempfile::NamedTempFile::new()
                    .map_err(|err| VfsError::from_io("temporary file", err))?;
                staged
                    .write_all(bytes)
                    .and_then(|()| staged.flush())
                    .map_err(|err| VfsError::from_io(staged.path().to_string_lossy(), err))?;
                file.store
                    .put_file(file.uri.bucket(), file.uri.key(), staged.path())?;
            }
        }
        tracing::debug!(target = "nimbus.vfs", path = %self.display_path(), bytes = bytes.len(), "wrote file");
        Ok(())
    }

    /// Remove the file. Removing something that does not exist succeeds.
    pub fn delete(&self) -> Result<bool> {
        match &self.backend {
            Backend::Local(file) => local::remove_file(&file.path),
            Backend::Object(file) => {
                file.store.delete(file.uri.bucket(), file.uri.key())?;
                Ok(true)
            }
        }
    }

    /// Whether a new file could be created at this location.
    ///
    /// Locally this probes the parent directory; for objects it asks the store.
    pub fn can_create(&self) -> bool {
        match &self.backend {
            Backend::Local(file) => {
                let parent = file
                    .path
                    .parent()
                    .filter(|parent| !parent.as_os_str().is_empty())
                    .unwrap_or_else(|| Path::new("."));
                local::dir_is_writable(parent)
            }
            Backend::Object(file) => file.store.allows_writes(file.uri.bucket()),
        }
    }

    pub fn set_aux_info(&mut self, info: AuxInfo) {
        self.aux_info = Some(info);
    }

    pub fn aux_info(&self) -> Option<&AuxInfo> {
        self.aux_info.as_ref()
    }

    pub fn aux_info_as<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.aux_info.as_deref()?.downcast_ref::<T>()
    }

    /// The same location with memoized object metadata dropped, so the next query sees the
    /// current state of the store.
    pub fn refreshed(&self) -> MFile {
        let backend = match &self.backend {
            Backend::Local(file) => Backend::Local(file.clone()),
            Backend::Object(file) => Backend::Object(file.derived(file.uri.clone())),
        };
        MFile {
            backend,
            aux_info: self.aux_info.clone(),
        }
    }

    /// Path rendering for logs and errors.
    pub fn display_path(&self) -> String {
        match &self.backend {
            Backend::Local(file) => file.path_str.clone(),
            Backend::Object(file) => file.uri.redacted(),
        }
    }
}

impl PartialEq for MFile {
    fn eq(&self, other: &Self) -> bool {
        self.path() == other.path()
    }
}

impl Eq for MFile {}

impl Hash for MFile {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path().hash(state);
    }
}

impl PartialOrd for MFile {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MFile {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.path().cmp(other.path())
    }
}

impl fmt::Debug for MFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MFile")
            .field("path", &self.display_path())
            .field("has_aux_info", &self.aux_info.is_some())
            .finish()
    }
}

impl fmt::Display for MFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryObjectStore;

    #[test]
    fn identity_is_the_path_string() {
        let mut a = MFile::local("/data/a.grib2");
        let b = MFile::local("/data/a.grib2");
        a.set_aux_info(Arc::new(7u32));
        assert_eq!(a, b);
        assert_eq!(a.aux_info_as::<u32>(), Some(&7));
        assert_eq!(a.aux_info_as::<String>(), None);
        assert!(b.aux_info().is_none());
    }

    #[test]
    fn head_is_memoized_per_handle() {
        let store = Arc::new(InMemoryObjectStore::new().with_bucket("b"));
        store.insert("b", "k", b"abc".to_vec()).unwrap();
        let file = MFile::object(ObjectUri::parse("cdms3:b?k").unwrap(), store.clone());

        assert!(file.exists().unwrap());
        assert_eq!(file.length().unwrap(), 3);
        file.last_modified_millis().unwrap();
        assert_eq!(store.head_requests(), 1);

        store.delete("b", "k").unwrap();
        assert!(file.exists().unwrap());
        assert!(!file.refreshed().exists().unwrap());
        assert_eq!(store.head_requests(), 2);
    }

    #[test]
    fn sibling_of_flat_key_stays_in_bucket() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new().with_bucket("b"));
        let file = MFile::object(ObjectUri::parse("cdms3:b?dir/a.grib2").unwrap(), store);
        assert_eq!(file.name(), "dir/a.grib2");
        let index = file.sibling(&format!("{}.gbx9", file.name()));
        assert_eq!(index.path(), "cdms3:b?dir/a.grib2.gbx9");
        assert!(file.parent().is_none());
    }

    #[test]
    fn open_requires_an_object_store_for_cdms3() {
        let err = Backends::local_only().open("cdms3:b?k").unwrap_err();
        assert!(matches!(err, VfsError::NoObjectStore { .. }));
        let file = Backends::local_only().open("file:/tmp/x").unwrap();
        assert_eq!(file.path(), "/tmp/x");
    }
}

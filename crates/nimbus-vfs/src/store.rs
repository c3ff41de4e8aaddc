use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::error::{Result, VfsError};
use crate::local::now_millis;

/// Metadata returned by an object `HEAD`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub length: u64,
    pub last_modified_millis: u64,
}

/// A single listing result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObjectEntry {
    Object {
        key: String,
        metadata: ObjectMetadata,
    },
    /// A common prefix, including its trailing delimiter.
    Prefix { prefix: String },
}

impl ObjectEntry {
    pub fn key(&self) -> &str {
        match self {
            ObjectEntry::Object { key, .. } => key,
            ObjectEntry::Prefix { prefix } => prefix,
        }
    }
}

/// Minimal object-store surface needed to treat `cdms3:` objects as files.
///
/// Implementations are synchronous; async clients block on an internal runtime.
pub trait ObjectStore: Send + Sync + fmt::Debug {
    /// `Ok(None)` when the object does not exist.
    fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectMetadata>>;

    /// Stream `len` bytes starting at `offset` (or through the end when `len` is `None`) into
    /// `out`, returning the number of bytes written.
    fn get_range(
        &self,
        bucket: &str,
        key: &str,
        offset: u64,
        len: Option<u64>,
        out: &mut dyn Write,
    ) -> Result<u64>;

    /// Upload the contents of a local file. Fails with [`VfsError::NamespaceNotFound`] when the
    /// bucket is missing.
    fn put_file(&self, bucket: &str, key: &str, source: &Path) -> Result<()>;

    /// Deleting a missing object succeeds.
    fn delete(&self, bucket: &str, key: &str) -> Result<()>;

    /// List keys under `prefix`. With a delimiter, keys that continue past the next delimiter
    /// are rolled up into [`ObjectEntry::Prefix`] entries.
    fn list(&self, bucket: &str, prefix: &str, delimiter: Option<&str>) -> Result<Vec<ObjectEntry>>;

    /// Cheap hint used when choosing where to place a new index.
    fn allows_writes(&self, _bucket: &str) -> bool {
        true
    }
}

#[derive(Clone, Debug)]
struct StoredObject {
    bytes: Vec<u8>,
    last_modified_millis: u64,
}

/// Process-local [`ObjectStore`] used in tests and for offline runs.
///
/// Counts `HEAD` and `PUT` requests so callers can assert how much traffic an operation
/// generated.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    buckets: RwLock<BTreeMap<String, BTreeMap<String, StoredObject>>>,
    read_only: AtomicBool,
    head_requests: AtomicUsize,
    put_requests: AtomicUsize,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bucket(self, bucket: &str) -> Self {
        self.create_bucket(bucket);
        self
    }

    pub fn create_bucket(&self, bucket: &str) {
        self.buckets.write().entry(bucket.to_owned()).or_default();
    }

    /// Store `bytes` under `key`, stamped with the current time.
    pub fn insert(&self, bucket: &str, key: &str, bytes: impl Into<Vec<u8>>) -> Result<()> {
        self.insert_with_mtime(bucket, key, bytes, now_millis())
    }

    pub fn insert_with_mtime(
        &self,
        bucket: &str,
        key: &str,
        bytes: impl Into<Vec<u8>>,
        last_modified_millis: u64,
    ) -> Result<()> {
        let mut buckets = self.buckets.write();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| VfsError::NamespaceNotFound {
                bucket: bucket.to_owned(),
            })?;
        objects.insert(
            key.to_owned(),
            StoredObject {
                bytes: bytes.into(),
                last_modified_millis,
            },
        );
        Ok(())
    }

    /// Overwrite the recorded modification time. Returns `false` if the object is missing.
    pub fn set_last_modified(&self, bucket: &str, key: &str, millis: u64) -> bool {
        let mut buckets = self.buckets.write();
        match buckets.get_mut(bucket).and_then(|objects| objects.get_mut(key)) {
            Some(object) => {
                object.last_modified_millis = millis;
                true
            }
            None => false,
        }
    }

    pub fn object_bytes(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        let buckets = self.buckets.read();
        buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|object| object.bytes.clone())
    }

    /// Reject every subsequent upload with [`VfsError::PermissionDenied`].
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::Relaxed);
    }

    pub fn head_requests(&self) -> usize {
        self.head_requests.load(Ordering::Relaxed)
    }

    pub fn put_requests(&self) -> usize {
        self.put_requests.load(Ordering::Relaxed)
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectMetadata>> {
        self.head_requests.fetch_add(1, Ordering::Relaxed);
        let buckets = self.buckets.read();
        Ok(buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|object| ObjectMetadata {
                length: object.bytes.len() as u64,
                last_modified_millis: object.last_modified_millis,
            }))
    }

    fn get_range(
        &self,
        bucket: &str,
        key: &str,
        offset: u64,
        len: Option<u64>,
        out: &mut dyn Write,
    ) -> Result<u64> {
        let slice = {
            let buckets = self.buckets.read();
            let object = buckets
                .get(bucket)
                .and_then(|objects| objects.get(key))
                .ok_or_else(|| VfsError::NotFound {
                    path: format!("{bucket}/{key}"),
                })?;
            let total = object.bytes.len();
            let start = usize::try_from(offset).unwrap_or(usize::MAX).min(total);
            let end = match len {
                Some(len) => start.saturating_add(usize::try_from(len).unwrap_or(usize::MAX)),
                None => total,
            }
            .min(total);
            object.bytes[start..end].to_vec()
        };

        out.write_all(&slice)
            .map_err(|err| VfsError::from_io(format!("{bucket}/{key}"), err))?;
        Ok(slice.len() as u64)
    }

    fn put_file(&self, bucket: &str, key: &str, source: &Path) -> Result<()> {
        self.put_requests.fetch_add(1, Ordering::Relaxed);
        if self.read_only.load(Ordering::Relaxed) {
            return Err(VfsError::PermissionDenied {
                path: format!("{bucket}/{key}"),
            });
        }
        if !self.buckets.read().contains_key(bucket) {
            return Err(VfsError::NamespaceNotFound {
                bucket: bucket.to_owned(),
            });
        }
        let bytes = fs::read(source).map_err(|err| {
            VfsError::from_io(source.to_string_lossy().into_owned(), err)
        })?;
        self.insert(bucket, key, bytes)
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        if self.read_only.load(Ordering::Relaxed) {
            return Err(VfsError::PermissionDenied {
                path: format!("{bucket}/{key}"),
            });
        }
        if let Some(objects) = self.buckets.write().get_mut(bucket) {
            objects.remove(key);
        }
        Ok(())
    }

    fn list(&self, bucket: &str, prefix: &str, delimiter: Option<&str>) -> Result<Vec<ObjectEntry>> {
        let buckets = self.buckets.read();
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| VfsError::NamespaceNotFound {
                bucket: bucket.to_owned(),
            })?;

        let mut entries = Vec::new();
        for (key, object) in objects.range(prefix.to_owned()..) {
            let Some(rest) = key.strip_prefix(prefix) else {
                break;
            };
            let rolled_up = delimiter
                .filter(|d| !d.is_empty())
                .and_then(|d| rest.find(d).map(|idx| &key[..prefix.len() + idx + d.len()]));
            match rolled_up {
                Some(common) => {
                    let already = matches!(
                        entries.last(),
                        Some(ObjectEntry::Prefix { prefix }) if prefix == common
                    );
                    if !already {
                        entries.push(ObjectEntry::Prefix {
                            prefix: common.to_owned(),
                        });
                    }
                }
                None => entries.push(ObjectEntry::Object {
                    key: key.clone(),
                    metadata: ObjectMetadata {
                        length: object.bytes.len() as u64,
                        last_modified_millis: object.last_modified_millis,
                    },
                }),
            }
        }
        Ok(entries)
    }

    fn allows_writes(&self, _bucket: &str) -> bool {
        !self.read_only.load(Ordering::Relaxed)
    }
}

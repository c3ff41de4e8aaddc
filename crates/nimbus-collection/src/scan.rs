use std::path::Path;

use nimbus_core::{GBX9_SUFFIX, NCX_SUFFIX};
use nimbus_vfs::{Backends, MFile, ObjectEntry, ObjectUri, VfsError};
use walkdir::WalkDir;

use crate::error::{CollectionSpecError, Result};
use crate::spec::CollectionSpec;

/// List the data files belonging to a collection, sorted by path.
///
/// Local roots are walked (recursively only when the collection wants subdirectories); object
/// store roots are listed by prefix. Derived index files are never members.
pub fn scan_collection(spec: &CollectionSpec, backends: &Backends) -> Result<Vec<MFile>> {
    let mut files = if spec.is_object_store() {
        scan_object_store(spec, backends)?
    } else {
        scan_local(spec)?
    };
    files.sort();
    tracing::debug!(
        target = "nimbus.collection",
        root = %spec.root_dir(),
        files = files.len(),
        "scanned collection"
    );
    Ok(files)
}

fn is_derived_index(name: &str) -> bool {
    name.ends_with(GBX9_SUFFIX) || name.ends_with(NCX_SUFFIX)
}

fn scan_local(spec: &CollectionSpec) -> Result<Vec<MFile>> {
    let root = Path::new(spec.root_dir());
    if !root.is_dir() {
        return Err(CollectionSpecError::RootNotFound {
            root: spec.root_dir().to_owned(),
        });
    }

    let max_depth = if spec.want_subdirs() { usize::MAX } else { 1 };
    let mut files = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(max_depth).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!(
                    target = "nimbus.collection",
                    root = %root.display(),
                    error = %err,
                    "skipping unreadable entry during scan"
                );
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let file = MFile::local(entry.into_path());
        if !is_derived_index(file.name()) && spec.path_matcher().matches(&file) {
            files.push(file);
        }
    }
    Ok(files)
}

fn scan_object_store(spec: &CollectionSpec, backends: &Backends) -> Result<Vec<MFile>> {
    let root = ObjectUri::parse(&spec.root_location())?;
    let store = backends
        .object_store()
        .cloned()
        .ok_or_else(|| VfsError::NoObjectStore {
            uri: root.redacted(),
        })?;

    let delimiter = (!spec.delimiter().is_empty() && !spec.want_subdirs()).then(|| spec.delimiter());
    let entries = store.list(root.bucket(), root.key(), delimiter)?;

    let mut files = Vec::new();
    for entry in entries {
        let ObjectEntry::Object { key, .. } = entry else {
            continue;
        };
        let file = MFile::object(root.with_key(&key), store.clone());
        if !is_derived_index(file.name()) && spec.path_matcher().matches(&file) {
            files.push(file);
        }
    }
    Ok(files)
}

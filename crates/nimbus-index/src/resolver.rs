//! Where an index lives: next to its data, or in the cache.

use nimbus_cache::{CacheMode, DiskCache};
use nimbus_core::IndexKind;
use nimbus_vfs::MFile;

use crate::error::{IndexError, Result, Step};

/// What an index covers.
#[derive(Clone, Copy, Debug)]
pub enum IndexSubject<'a> {
    /// A single data file; its index is `<file name><suffix>` next to it.
    File(&'a MFile),
    /// A collection (or partition) named `name`, indexed as `<name><suffix>` in `root`.
    Collection { name: &'a str, root: &'a MFile },
}

impl IndexSubject<'_> {
    pub fn describe(&self) -> String {
        match self {
            IndexSubject::File(file) => file.display_path(),
            IndexSubject::Collection { name, root } => format!("{name} in {}", root.display_path()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexLocation {
    Colocated,
    Cache,
}

#[derive(Clone, Debug)]
pub struct ResolvedIndex {
    /// The chosen index file.
    pub file: MFile,
    pub location: IndexLocation,
    pub colocated: MFile,
    pub cached: MFile,
}

impl ResolvedIndex {
    /// Switch to the cache candidate.
    pub(crate) fn into_cache(self) -> Self {
        Self {
            file: self.cached.clone(),
            location: IndexLocation::Cache,
            ..self
        }
    }
}

/// Both candidate locations for `subject`'s index, without touching storage.
pub fn candidates(subject: &IndexSubject<'_>, kind: IndexKind, cache: &DiskCache) -> (MFile, MFile) {
    let colocated = match subject {
        IndexSubject::File(file) => file.sibling(&format!("{}{}", file.name(), kind.suffix())),
        IndexSubject::Collection { name, root } => root.child(&format!("{name}{}", kind.suffix())),
    };
    let cached = MFile::local(cache.cache_path(colocated.location()));
    (colocated, cached)
}

/// Pick the index location for `subject`.
///
/// With the default cache mode the data location wins when it already holds the index or
/// accepts new files; otherwise the index goes to the cache. The result depends only on the
/// state of storage, so resolving twice gives the same answer.
pub fn resolve(subject: &IndexSubject<'_>, kind: IndexKind, cache: &DiskCache) -> Result<ResolvedIndex> {
    let (colocated, cached) = candidates(subject, kind, cache);
    let exists = |file: &MFile| file.exists().map_err(|err| IndexError::vfs(Step::Resolve, err));

    let location = match cache.mode() {
        CacheMode::AlwaysUseCache => IndexLocation::Cache,
        CacheMode::NeverUseCache => IndexLocation::Colocated,
        CacheMode::Default => {
            if exists(&colocated)? || colocated.can_create() {
                IndexLocation::Colocated
            } else {
                IndexLocation::Cache
            }
        }
    };

    let file = match location {
        IndexLocation::Colocated => colocated.clone(),
        IndexLocation::Cache => cached.clone(),
    };
    tracing::debug!(
        target = "nimbus.index",
        subject = %subject.describe(),
        index = %file,
        ?location,
        mode = ?cache.mode(),
        "resolved index location"
    );

    Ok(ResolvedIndex {
        file,
        location,
        colocated,
        cached,
    })
}

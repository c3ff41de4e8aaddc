//! Applies an [`UpdatePolicy`] to a resolved index: reuse it, rebuild it, or refuse.

use nimbus_cache::{CacheMode, DiskCache};
use nimbus_core::{IndexKind, UpdatePolicy};
use nimbus_vfs::{Backends, MFile, VfsError};

use crate::builder::IndexBuilder;
use crate::error::{IndexError, Result, Step};
use crate::format::{self, FormatError};
use crate::resolver::{self, IndexLocation, IndexSubject, ResolvedIndex};

/// What the engine found at the resolved index location.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexState {
    Absent,
    /// Present, but its envelope does not decode.
    Unreadable,
    /// Present and at least as new as every source.
    Fresh,
    /// Present but older than some source.
    Stale,
    /// Present; timestamps were not compared.
    Unchecked,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Decision {
    Reuse,
    Rebuild,
    FailNotFound,
    FailStaleFormat,
}

/// The policy table. `Always` never needs a state; callers skip inspecting the index.
pub fn decide(policy: UpdatePolicy, state: IndexState) -> Decision {
    match (policy, state) {
        (UpdatePolicy::Always, _) => Decision::Rebuild,

        (UpdatePolicy::Never, IndexState::Absent) => Decision::FailNotFound,
        (UpdatePolicy::Never, IndexState::Unreadable) => Decision::FailStaleFormat,
        (UpdatePolicy::Never, _) => Decision::Reuse,

        (UpdatePolicy::NoCheck, IndexState::Absent | IndexState::Unreadable) => Decision::Rebuild,
        (UpdatePolicy::NoCheck, _) => Decision::Reuse,

        (UpdatePolicy::Test | UpdatePolicy::TestIndexOnly, IndexState::Fresh) => Decision::Reuse,
        (UpdatePolicy::Test | UpdatePolicy::TestIndexOnly, _) => Decision::Rebuild,
    }
}

/// An index ready for use.
#[derive(Clone, Debug)]
pub struct OpenedIndex {
    pub file: MFile,
    pub location: IndexLocation,
    pub rebuilt: bool,
    /// The builder's payload, envelope removed.
    pub payload: Vec<u8>,
}

#[derive(Debug)]
struct Inspection {
    state: IndexState,
    payload: Option<Vec<u8>>,
    format_error: Option<FormatError>,
}

impl Inspection {
    fn without_payload(state: IndexState) -> Self {
        Self {
            state,
            payload: None,
            format_error: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpdatePolicyEngine {
    cache: DiskCache,
    backends: Backends,
}

impl UpdatePolicyEngine {
    pub fn new(cache: DiskCache, backends: Backends) -> Self {
        Self { cache, backends }
    }

    pub fn cache(&self) -> &DiskCache {
        &self.cache
    }

    /// Mutable access for toggling the cache mode. Restoring the previous mode is the
    /// caller's job.
    pub fn cache_mut(&mut self) -> &mut DiskCache {
        &mut self.cache
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    /// Open (building if needed) the `.gbx9` index of a single data file.
    pub fn open_file_index(
        &self,
        source: &MFile,
        policy: UpdatePolicy,
        builder: &dyn IndexBuilder,
    ) -> Result<OpenedIndex> {
        let sources = std::slice::from_ref(source);
        self.open_index(IndexSubject::File(source), IndexKind::File, sources, policy, builder)
    }

    /// Open (building if needed) the index of `subject`, which covers `sources`.
    pub fn open_index(
        &self,
        subject: IndexSubject<'_>,
        kind: IndexKind,
        sources: &[MFile],
        policy: UpdatePolicy,
        builder: &dyn IndexBuilder,
    ) -> Result<OpenedIndex> {
        self.open_with(subject, kind, sources, sources, policy, builder)
    }

    /// Like [`Self::open_index`], but freshness is judged against `stale_sources` rather
    /// than the files handed to the builder.
    pub(crate) fn open_with(
        &self,
        subject: IndexSubject<'_>,
        kind: IndexKind,
        build_sources: &[MFile],
        stale_sources: &[MFile],
        policy: UpdatePolicy,
        builder: &dyn IndexBuilder,
    ) -> Result<OpenedIndex> {
        let resolved = resolver::resolve(&subject, kind, &self.cache)?;

        let inspection = if policy == UpdatePolicy::Always {
            Inspection::without_payload(IndexState::Absent)
        } else {
            inspect(&resolved.file, kind, policy, stale_sources)?
        };
        let decision = decide(policy, inspection.state);
        tracing::debug!(
            target = "nimbus.index",
            index = %resolved.file,
            %policy,
            state = ?inspection.state,
            ?decision,
            "update policy decision"
        );

        match decision {
            Decision::Reuse => {
                let payload = match inspection.payload {
                    Some(payload) => payload,
                    None => read_payload(&resolved.file, kind)?.map_err(|source| {
                        IndexError::StaleFormat {
                            step: Step::StaleCheck,
                            path: resolved.file.display_path(),
                            source,
                        }
                    })?,
                };
                Ok(OpenedIndex {
                    file: resolved.file,
                    location: resolved.location,
                    rebuilt: false,
                    payload,
                })
            }
            Decision::Rebuild => self.rebuild(resolved, kind, build_sources, builder),
            Decision::FailNotFound => Err(IndexError::NotFound {
                step: Step::StaleCheck,
                path: resolved.file.display_path(),
            }),
            Decision::FailStaleFormat => Err(IndexError::StaleFormat {
                step: Step::StaleCheck,
                path: resolved.file.display_path(),
                source: inspection
                    .format_error
                    .unwrap_or(FormatError::BadMagic),
            }),
        }
    }

    fn rebuild(
        &self,
        resolved: ResolvedIndex,
        kind: IndexKind,
        sources: &[MFile],
        builder: &dyn IndexBuilder,
    ) -> Result<OpenedIndex> {
        let payload = builder
            .build(kind, sources)
            .map_err(|source| IndexError::BuildFailure {
                step: Step::Build,
                path: resolved.file.display_path(),
                source,
            })?;
        let bytes = format::encode(kind, &payload);

        let resolved = match resolved.file.write_bytes(&bytes) {
            Ok(()) => resolved,
            Err(VfsError::PermissionDenied { path })
                if resolved.location == IndexLocation::Colocated
                    && self.cache.mode() != CacheMode::NeverUseCache =>
            {
                tracing::debug!(
                    target = "nimbus.index",
                    path = %path,
                    cache = %resolved.cached,
                    "colocated index not writable; falling back to cache"
                );
                let resolved = resolved.into_cache();
                resolved
                    .file
                    .write_bytes(&bytes)
                    .map_err(|err| IndexError::vfs(Step::Persist, err))?;
                resolved
            }
            Err(err) => return Err(IndexError::vfs(Step::Persist, err)),
        };

        tracing::info!(
            target = "nimbus.index",
            index = %resolved.file,
            ?kind,
            sources = sources.len(),
            bytes = payload.len(),
            "rebuilt index"
        );
        Ok(OpenedIndex {
            file: resolved.file.refreshed(),
            location: resolved.location,
            rebuilt: true,
            payload,
        })
    }
}

fn inspect(
    index: &MFile,
    kind: IndexKind,
    policy: UpdatePolicy,
    stale_sources: &[MFile],
) -> Result<Inspection> {
    let vfs = |err: VfsError| IndexError::vfs(Step::StaleCheck, err);

    if !index.exists().map_err(vfs)? {
        return Ok(Inspection::without_payload(IndexState::Absent));
    }

    if policy.checks_staleness() {
        let index_modified = index.last_modified_millis().map_err(vfs)?;
        let mut newest_source = 0;
        for source in stale_sources {
            newest_source = newest_source.max(source.last_modified_millis().map_err(vfs)?);
        }
        // Ties count as fresh.
        if index_modified < newest_source {
            return Ok(Inspection::without_payload(IndexState::Stale));
        }
    }

    let state = if policy.checks_staleness() {
        IndexState::Fresh
    } else {
        IndexState::Unchecked
    };
    Ok(match read_payload(index, kind)? {
        Ok(payload) => Inspection {
            state,
            payload: Some(payload),
            format_error: None,
        },
        Err(err) => {
            tracing::debug!(
                target = "nimbus.index",
                path = %index,
                error = %err,
                "index envelope does not decode"
            );
            Inspection {
                state: IndexState::Unreadable,
                payload: None,
                format_error: Some(err),
            }
        }
    })
}

/// Outer error: the index could not be read at all. Inner: it was read but does not decode.
fn read_payload(
    index: &MFile,
    kind: IndexKind,
) -> Result<std::result::Result<Vec<u8>, FormatError>> {
    let bytes = index
        .read_all()
        .map_err(|err| IndexError::vfs(Step::StaleCheck, err))?;
    Ok(format::decode(&bytes, kind).map(<[u8]>::to_vec))
}

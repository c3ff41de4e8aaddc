use std::fmt;

use nimbus_collection::CollectionSpecError;
use nimbus_vfs::VfsError;

use crate::builder::BuildError;
use crate::format::FormatError;

pub type Result<T> = std::result::Result<T, IndexError>;

/// The stage of opening an index at which a failure happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Step {
    Resolve,
    StaleCheck,
    Build,
    Persist,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::Resolve => "resolve",
            Step::StaleCheck => "stale check",
            Step::Build => "build",
            Step::Persist => "persist",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("{step}: index {path} not found")]
    NotFound { step: Step, path: String },

    #[error("{step}: permission denied writing {path}")]
    PermissionDenied { step: Step, path: String },

    #[error("{step}: index {path} is unreadable or incompatible: {source}")]
    StaleFormat {
        step: Step,
        path: String,
        #[source]
        source: FormatError,
    },

    #[error("{step}: storage backend unavailable: {source}")]
    BackendUnavailable {
        step: Step,
        #[source]
        source: VfsError,
    },

    #[error("{step}: building index {path} failed: {source}")]
    BuildFailure {
        step: Step,
        path: String,
        #[source]
        source: BuildError,
    },

    #[error("{step}: collection {name} has no files")]
    EmptyCollection { step: Step, name: String },

    #[error("{step}: {source}")]
    Collection {
        step: Step,
        #[source]
        source: CollectionSpecError,
    },

    #[error("{step}: {source}")]
    Vfs {
        step: Step,
        #[source]
        source: VfsError,
    },
}

impl IndexError {
    pub fn step(&self) -> Step {
        match self {
            IndexError::NotFound { step, .. }
            | IndexError::PermissionDenied { step, .. }
            | IndexError::StaleFormat { step, .. }
            | IndexError::BackendUnavailable { step, .. }
            | IndexError::BuildFailure { step, .. }
            | IndexError::EmptyCollection { step, .. }
            | IndexError::Collection { step, .. }
            | IndexError::Vfs { step, .. } => *step,
        }
    }

    pub(crate) fn vfs(step: Step, err: VfsError) -> Self {
        match err {
            VfsError::NotFound { path } => IndexError::NotFound { step, path },
            VfsError::PermissionDenied { path } => IndexError::PermissionDenied { step, path },
            VfsError::Backend { .. } => IndexError::BackendUnavailable { step, source: err },
            other => IndexError::Vfs {
                step,
                source: other,
            },
        }
    }

    pub(crate) fn collection(step: Step, err: CollectionSpecError) -> Self {
        match err {
            CollectionSpecError::Vfs(err) => IndexError::vfs(step, err),
            other => IndexError::Collection {
                step,
                source: other,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vfs_errors_keep_their_category() {
        let err = IndexError::vfs(
            Step::Persist,
            VfsError::PermissionDenied {
                path: "/data/a.gbx9".into(),
            },
        );
        assert!(matches!(err, IndexError::PermissionDenied { .. }));
        assert_eq!(err.step(), Step::Persist);
        assert_eq!(
            err.to_string(),
            "persist: permission denied writing /data/a.gbx9"
        );

        let err = IndexError::vfs(
            Step::StaleCheck,
            VfsError::Backend {
                message: "timeout".into(),
            },
        );
        assert!(matches!(err, IndexError::BackendUnavailable { .. }));
    }
}

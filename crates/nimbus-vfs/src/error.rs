use std::io;

pub type Result<T> = std::result::Result<T, VfsError>;

/// Errors produced by virtual file operations.
///
/// Object-store transport failures surface as [`VfsError::Backend`] and are never retried
/// here; retrying is a transport concern.
#[derive(Debug, thiserror::Error)]
pub enum VfsError {
    #[error("{path} not found")]
    NotFound { path: String },

    #[error("bucket {bucket} does not exist")]
    NamespaceNotFound { bucket: String },

    #[error("permission denied writing {path}")]
    PermissionDenied { path: String },

    #[error("invalid object store uri {uri}: {reason}")]
    InvalidUri { uri: String, reason: &'static str },

    #[error("no object store is configured to open {uri}")]
    NoObjectStore { uri: String },

    #[error("object store unavailable: {message}")]
    Backend { message: String },

    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl VfsError {
    /// Map an `io::Error` raised while touching `path` onto the typed variants.
    pub(crate) fn from_io(path: impl Into<String>, err: io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            io::ErrorKind::NotFound => VfsError::NotFound { path },
            io::ErrorKind::PermissionDenied => VfsError::PermissionDenied { path },
            _ => VfsError::Io { path, source: err },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, VfsError::NotFound { .. })
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, VfsError::PermissionDenied { .. })
    }

    pub fn is_backend_unavailable(&self) -> bool {
        matches!(self, VfsError::Backend { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_kinds_map_onto_typed_variants() {
        let err = VfsError::from_io("/a", io::Error::from(io::ErrorKind::NotFound));
        assert!(err.is_not_found());

        let err = VfsError::from_io("/a", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(err.is_permission_denied());

        let err = VfsError::from_io("/a", io::Error::other("disk on fire"));
        assert!(matches!(err, VfsError::Io { .. }));
        assert!(err.to_string().contains("/a"));
    }
}

use nimbus_vfs::VfsError;

pub type Result<T> = std::result::Result<T, CollectionSpecError>;

#[derive(Debug, thiserror::Error)]
pub enum CollectionSpecError {
    #[error("collection spec is empty")]
    Empty,

    #[error("invalid filter regex {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: Box<regex::Error>,
    },

    #[error("invalid glob {pattern:?}: {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("unsupported date format {mark:?}: {reason}")]
    UnsupportedDateFormat { mark: String, reason: String },

    #[error("collection root {root} does not exist")]
    RootNotFound { root: String },

    #[error(transparent)]
    Vfs(#[from] VfsError),
}

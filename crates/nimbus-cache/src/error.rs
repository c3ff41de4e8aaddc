pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors produced while setting up the on-disk cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("failed to determine home directory for default cache path")]
    MissingHomeDir,

    #[error("cache path policy {policy} requires a parameter")]
    MissingPolicyParam { policy: &'static str },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

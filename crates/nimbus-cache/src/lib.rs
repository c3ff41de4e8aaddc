//! Placement of derived files in a shared cache directory.
//!
//! The cache answers one question, "where would a derived copy of this path live?", and
//! carries the [`CacheMode`] that tells index resolution whether to prefer, avoid, or fall
//! back to it.

mod cache_dir;
mod error;

pub use crate::cache_dir::{default_cache_root, CacheConfig, CacheMode, CachePathPolicy, DiskCache};
pub use crate::error::{CacheError, Result};

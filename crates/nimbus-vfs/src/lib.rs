//! Uniform file handles over local disk and S3-compatible object storage.
//!
//! [`MFile`] is the only type most callers need: it names a data file or a derived index,
//! answers metadata questions, streams byte ranges, and can be written atomically. Object
//! storage is reached through the [`ObjectStore`] trait; the in-memory implementation is
//! always available and the AWS-backed one sits behind the `s3` feature.

mod error;
mod local;
mod mfile;
mod store;
mod uri;

#[cfg(feature = "s3")]
mod s3;

pub use crate::error::{Result, VfsError};
pub use crate::local::now_millis;
pub use crate::mfile::{AuxInfo, Backends, MFile};
pub use crate::store::{InMemoryObjectStore, ObjectEntry, ObjectMetadata, ObjectStore};
pub use crate::uri::{ObjectUri, CDMS3_SCHEME};

#[cfg(feature = "s3")]
pub use crate::s3::{S3ObjectStore, S3Settings};

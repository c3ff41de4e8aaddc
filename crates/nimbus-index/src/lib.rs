//! Derived index placement and freshness.
//!
//! Every data file (and every collection of data files) can have a derived index: a
//! `.gbx9` record index per file, a `.ncx4` index per collection or partition. This crate
//! decides where such an index lives ([`resolve`]), whether an existing one may be reused
//! under an [`UpdatePolicy`](nimbus_core::UpdatePolicy) ([`UpdatePolicyEngine`]), and
//! persists freshly built ones inside a small versioned envelope ([`format`]).
//!
//! Building the payload itself is delegated to an [`IndexBuilder`].

mod builder;
mod collection;
mod engine;
mod error;
pub mod format;
mod resolver;

pub use builder::{BuildError, IndexBuilder};
pub use collection::{CollectionUpdate, FeatureCollection};
pub use engine::{decide, Decision, IndexState, OpenedIndex, UpdatePolicyEngine};
pub use error::{IndexError, Result, Step};
pub use format::FormatError;
pub use resolver::{candidates, resolve, IndexLocation, IndexSubject, ResolvedIndex};

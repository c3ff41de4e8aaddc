//! Core shared types for Nimbus.
//!
//! This crate is intentionally small and dependency-light. It holds the vocabulary that
//! every other crate agrees on: which kinds of derived index exist (and the suffix each one
//! is stored under), how a collection is partitioned, and which freshness policy governs an
//! index update.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Version string embedded into persisted index envelopes.
pub const NIMBUS_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Suffix of a per-file record index (`<data file name>.gbx9`).
pub const GBX9_SUFFIX: &str = ".gbx9";

/// Suffix of a collection or partition index (`<collection name>.ncx4`).
pub const NCX_SUFFIX: &str = ".ncx4";

/// The two kinds of derived index Nimbus knows how to place.
///
/// The suffixes are a bit-exact contract with existing deployments: both are appended
/// verbatim to the covered file's (or collection's) name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Index over the records of a single data file.
    File,
    /// Index over a collection, or over one partition of a collection.
    Collection,
}

impl IndexKind {
    pub fn suffix(self) -> &'static str {
        match self {
            IndexKind::File => GBX9_SUFFIX,
            IndexKind::Collection => NCX_SUFFIX,
        }
    }

    /// Stable numeric tag stored in index envelopes.
    pub fn tag(self) -> u32 {
        match self {
            IndexKind::File => 1,
            IndexKind::Collection => 2,
        }
    }

    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            1 => Some(IndexKind::File),
            2 => Some(IndexKind::Collection),
            _ => None,
        }
    }
}

/// Freshness policy applied when opening an index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdatePolicy {
    /// Unconditionally rebuild.
    #[serde(rename = "always")]
    Always,
    /// Never rebuild; use the existing index or fail if it is absent.
    #[serde(rename = "never")]
    Never,
    /// Use an existing index without checking timestamps; build it if absent.
    #[serde(rename = "nocheck")]
    NoCheck,
    /// Rebuild when the index is missing or older than any covered source.
    #[serde(rename = "test")]
    Test,
    /// Like [`UpdatePolicy::Test`], but a partitioned collection only checks its top-level
    /// index against the files directly under the collection root.
    #[serde(rename = "testIndexOnly")]
    TestIndexOnly,
}

impl UpdatePolicy {
    pub const ALL: [UpdatePolicy; 5] = [
        UpdatePolicy::Always,
        UpdatePolicy::Never,
        UpdatePolicy::NoCheck,
        UpdatePolicy::Test,
        UpdatePolicy::TestIndexOnly,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            UpdatePolicy::Always => "always",
            UpdatePolicy::Never => "never",
            UpdatePolicy::NoCheck => "nocheck",
            UpdatePolicy::Test => "test",
            UpdatePolicy::TestIndexOnly => "testIndexOnly",
        }
    }

    /// Whether this policy compares index and source timestamps.
    pub fn checks_staleness(self) -> bool {
        matches!(self, UpdatePolicy::Test | UpdatePolicy::TestIndexOnly)
    }
}

impl fmt::Display for UpdatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdatePolicy {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UpdatePolicy::ALL
            .into_iter()
            .find(|policy| policy.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseEnumError {
                kind: "update policy",
                value: s.to_owned(),
            })
    }
}

/// How a collection is split into separately indexed partitions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionType {
    /// One index for the whole collection.
    #[default]
    None,
    /// One index per directory, plus a top-level index.
    Directory,
    /// One index per data file, plus a top-level index.
    File,
    /// Every file in a single partition under the top-level index.
    All,
}

impl PartitionType {
    pub fn as_str(self) -> &'static str {
        match self {
            PartitionType::None => "none",
            PartitionType::Directory => "directory",
            PartitionType::File => "file",
            PartitionType::All => "all",
        }
    }
}

impl fmt::Display for PartitionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartitionType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(PartitionType::None),
            "directory" => Ok(PartitionType::Directory),
            "file" => Ok(PartitionType::File),
            "all" => Ok(PartitionType::All),
            _ => Err(ParseEnumError {
                kind: "partition type",
                value: s.to_owned(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} {value:?}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

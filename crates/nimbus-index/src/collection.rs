use std::collections::BTreeMap;

use nimbus_collection::{scan_collection, CollectionSpec};
use nimbus_core::{IndexKind, PartitionType, UpdatePolicy};
use nimbus_vfs::{MFile, ObjectUri};

use crate::builder::IndexBuilder;
use crate::engine::{OpenedIndex, UpdatePolicyEngine};
use crate::error::{IndexError, Result, Step};
use crate::resolver::IndexSubject;

/// A named collection of data files and how it is partitioned.
#[derive(Clone, Debug)]
pub struct FeatureCollection {
    pub name: String,
    pub spec: CollectionSpec,
    pub partition: PartitionType,
}

impl FeatureCollection {
    pub fn new(name: impl Into<String>, spec: CollectionSpec) -> Self {
        Self {
            name: name.into(),
            spec,
            partition: PartitionType::None,
        }
    }

    pub fn with_partition(mut self, partition: PartitionType) -> Self {
        self.partition = partition;
        self
    }
}

#[derive(Clone, Debug)]
pub struct CollectionUpdate {
    /// The collection-level index.
    pub top: OpenedIndex,
    /// Partition indexes, in path order. Empty for unpartitioned collections.
    pub children: Vec<OpenedIndex>,
    /// Whether any index, top or partition, was rebuilt.
    pub rebuilt: bool,
}

impl UpdatePolicyEngine {
    /// Bring every index of `collection` up to date under `policy`.
    ///
    /// Partitioned collections get one child index per partition and a top-level index built
    /// from the child indexes. Under `testIndexOnly` the children are reused without a
    /// timestamp check and the top-level index is only compared against data files sitting
    /// directly in the collection root.
    pub fn update_collection(
        &self,
        collection: &FeatureCollection,
        policy: UpdatePolicy,
        builder: &dyn IndexBuilder,
    ) -> Result<CollectionUpdate> {
        let spec = &collection.spec;
        let files = scan_collection(spec, self.backends())
            .map_err(|err| IndexError::collection(Step::Resolve, err))?;
        if files.is_empty() {
            return Err(IndexError::EmptyCollection {
                step: Step::Resolve,
                name: collection.name.clone(),
            });
        }
        let root = MFile::open(&spec.root_location(), self.backends())
            .map_err(|err| IndexError::vfs(Step::Resolve, err))?;

        tracing::debug!(
            target = "nimbus.index",
            collection = %collection.name,
            partition = %collection.partition,
            %policy,
            files = files.len(),
            "updating collection"
        );

        let children = match collection.partition {
            PartitionType::None | PartitionType::All => Vec::new(),
            PartitionType::Directory => {
                self.update_directory_partitions(collection, &root, &files, policy, builder)?
            }
            PartitionType::File => self.update_file_partitions(&root, &files, policy, builder)?,
        };

        let top_subject = IndexSubject::Collection {
            name: &collection.name,
            root: &root,
        };
        let top = if children.is_empty() {
            let stale_sources = top_stale_sources(policy, &root, &files, &files);
            self.open_with(
                top_subject,
                IndexKind::Collection,
                &files,
                &stale_sources,
                policy,
                builder,
            )?
        } else {
            let child_files: Vec<MFile> = children.iter().map(|child| child.file.clone()).collect();
            let stale_sources = top_stale_sources(policy, &root, &files, &child_files);
            self.open_with(
                top_subject,
                IndexKind::Collection,
                &child_files,
                &stale_sources,
                policy,
                builder,
            )?
        };

        let rebuilt = top.rebuilt || children.iter().any(|child| child.rebuilt);
        Ok(CollectionUpdate {
            top,
            children,
            rebuilt,
        })
    }

    fn update_directory_partitions(
        &self,
        collection: &FeatureCollection,
        root: &MFile,
        files: &[MFile],
        policy: UpdatePolicy,
        builder: &dyn IndexBuilder,
    ) -> Result<Vec<OpenedIndex>> {
        let mut groups: BTreeMap<String, (MFile, Vec<MFile>)> = BTreeMap::new();
        for file in files {
            let dir = file.parent().unwrap_or_else(|| root.clone());
            groups
                .entry(dir.location().to_owned())
                .or_insert_with(|| (dir, Vec::new()))
                .1
                .push(file.clone());
        }

        let child_policy = child_policy(policy);
        let mut children = Vec::with_capacity(groups.len());
        for (dir, members) in groups.values() {
            let name = format!("{}-{}", collection.name, dir.name());
            let subject = IndexSubject::Collection { name: &name, root: dir };
            children.push(self.open_index(
                subject,
                IndexKind::Collection,
                members,
                child_policy,
                builder,
            )?);
        }
        Ok(children)
    }

    fn update_file_partitions(
        &self,
        root: &MFile,
        files: &[MFile],
        policy: UpdatePolicy,
        builder: &dyn IndexBuilder,
    ) -> Result<Vec<OpenedIndex>> {
        let child_policy = child_policy(policy);
        let mut children = Vec::with_capacity(files.len());
        for file in files {
            let dir = file.parent().unwrap_or_else(|| root.clone());
            let subject = IndexSubject::Collection {
                name: file.name(),
                root: &dir,
            };
            children.push(self.open_index(
                subject,
                IndexKind::Collection,
                std::slice::from_ref(file),
                child_policy,
                builder,
            )?);
        }
        Ok(children)
    }
}

/// Partition indexes are not checked under `testIndexOnly`.
fn child_policy(policy: UpdatePolicy) -> UpdatePolicy {
    match policy {
        UpdatePolicy::TestIndexOnly => UpdatePolicy::NoCheck,
        other => other,
    }
}

fn top_stale_sources(
    policy: UpdatePolicy,
    root: &MFile,
    files: &[MFile],
    build_sources: &[MFile],
) -> Vec<MFile> {
    match policy {
        UpdatePolicy::TestIndexOnly => files
            .iter()
            .filter(|file| is_direct_child(file, root))
            .cloned()
            .collect(),
        _ => build_sources.to_vec(),
    }
}

/// Flat object keys have no parent and count as direct children.
fn is_direct_child(file: &MFile, root: &MFile) -> bool {
    let Some(parent) = file.parent() else {
        return true;
    };
    match (parent.as_local_path(), root.as_local_path()) {
        (Some(parent), Some(root)) => parent == root,
        _ => match (parent.as_object_uri(), root.as_object_uri()) {
            (Some(parent), Some(root)) => {
                parent.bucket() == root.bucket() && prefix_key(parent) == prefix_key(root)
            }
            _ => false,
        },
    }
}

fn prefix_key(uri: &ObjectUri) -> &str {
    match uri.delimiter() {
        Some(d) => uri.key().trim_end_matches(d),
        None => uri.key(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_skip_checks_under_test_index_only() {
        assert_eq!(child_policy(UpdatePolicy::TestIndexOnly), UpdatePolicy::NoCheck);
        for policy in [
            UpdatePolicy::Always,
            UpdatePolicy::Never,
            UpdatePolicy::NoCheck,
            UpdatePolicy::Test,
        ] {
            assert_eq!(child_policy(policy), policy);
        }
    }

    #[test]
    fn direct_children_of_local_root() {
        let root = MFile::local("/data/gfs");
        assert!(is_direct_child(&MFile::local("/data/gfs/a.grib2"), &root));
        assert!(!is_direct_child(&MFile::local("/data/gfs/2024/a.grib2"), &root));
    }
}

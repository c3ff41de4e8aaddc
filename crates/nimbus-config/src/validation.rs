use std::collections::BTreeSet;

use nimbus_cache::CachePathPolicy;
use nimbus_collection::CollectionSpec;

use crate::{LoggingConfig, NimbusConfig};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationDiagnostics {
    pub warnings: Vec<ConfigWarning>,
    pub errors: Vec<ConfigValidationError>,
}

impl ValidationDiagnostics {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    LoggingLevelInvalid { value: String, normalized: String },
    /// `path_policy_param` is set but the policy ignores it.
    UnusedPathPolicyParam,
    /// `[object_store]` is configured in a build without S3 support.
    ObjectStoreUnsupported,
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("cache.path_policy = \"nestedTruncate\" requires cache.path_policy_param")]
    MissingPathPolicyParam,
    #[error("collections[{index}] has an empty name")]
    EmptyCollectionName { index: usize },
    #[error("collection {name} is defined more than once")]
    DuplicateCollection { name: String },
    #[error("collection {name} has an invalid spec: {message}")]
    InvalidCollectionSpec { name: String, message: String },
}

impl NimbusConfig {
    /// Check what deserialization cannot: cross-field constraints and collection specs.
    #[must_use]
    pub fn validate(&self) -> ValidationDiagnostics {
        let mut out = ValidationDiagnostics::default();
        validate_logging(self, &mut out);
        validate_cache(self, &mut out);
        validate_object_store(self, &mut out);
        validate_collections(self, &mut out);
        out
    }
}

fn validate_logging(config: &NimbusConfig, out: &mut ValidationDiagnostics) {
    let normalized = LoggingConfig::normalize_level_directives(&config.logging.level);
    if !config.logging.level.trim().is_empty()
        && tracing_subscriber::EnvFilter::try_new(normalized.clone()).is_err()
    {
        out.warnings.push(ConfigWarning::LoggingLevelInvalid {
            value: config.logging.level.clone(),
            normalized,
        });
    }
}

fn validate_cache(config: &NimbusConfig, out: &mut ValidationDiagnostics) {
    let has_param = config
        .cache
        .path_policy_param
        .as_deref()
        .is_some_and(|param| !param.is_empty());
    match config.cache.path_policy {
        CachePathPolicy::NestedTruncate if !has_param => {
            out.errors.push(ConfigValidationError::MissingPathPolicyParam)
        }
        CachePathPolicy::NestedDirectory | CachePathPolicy::OneDirectory if has_param => {
            out.warnings.push(ConfigWarning::UnusedPathPolicyParam)
        }
        _ => {}
    }
}

fn validate_object_store(config: &NimbusConfig, out: &mut ValidationDiagnostics) {
    if config.object_store.is_some() && !cfg!(feature = "s3") {
        out.warnings.push(ConfigWarning::ObjectStoreUnsupported);
    }
}

fn validate_collections(config: &NimbusConfig, out: &mut ValidationDiagnostics) {
    let mut seen = BTreeSet::new();
    for (index, collection) in config.collections.iter().enumerate() {
        if collection.name.trim().is_empty() {
            out.errors
                .push(ConfigValidationError::EmptyCollectionName { index });
        } else if !seen.insert(collection.name.as_str()) {
            out.errors.push(ConfigValidationError::DuplicateCollection {
                name: collection.name.clone(),
            });
        }

        if let Err(err) = CollectionSpec::parse(&collection.spec) {
            out.errors.push(ConfigValidationError::InvalidCollectionSpec {
                name: collection.name.clone(),
                message: err.to_string(),
            });
        }
    }
}

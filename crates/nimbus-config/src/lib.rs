//! `nimbus.toml` loading, validation and logging setup.
//!
//! ```toml
//! [cache]
//! dir = "/var/cache/nimbus"
//! mode = "default"                 # or "alwaysUseCache" / "neverUseCache"
//! path_policy = "nestedDirectory"  # or "oneDirectory" / "nestedTruncate"
//!
//! [logging]
//! level = "nimbus.index=debug,info"
//!
//! [object_store]
//! region = "us-east-1"
//!
//! [[collections]]
//! name = "gfs"
//! spec = "/data/gfs/**/gfs_#yyyyMMdd_HH#.*\\.grib2$"
//! partition = "directory"
//! update = "test"
//! ```

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use nimbus_cache::{CacheConfig, CacheError, CacheMode, CachePathPolicy, DiskCache};
use nimbus_collection::{CollectionSpec, CollectionSpecError};
use nimbus_core::{PartitionType, UpdatePolicy};
use nimbus_index::{FeatureCollection, UpdatePolicyEngine};
use nimbus_vfs::{Backends, VfsError};
use parking_lot::ReentrantMutex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod logging;
mod schema;
mod validation;

pub use logging::{init_tracing, LoggingConfig};
pub use schema::json_schema;
pub use validation::{ConfigValidationError, ConfigWarning, ValidationDiagnostics};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
#[schemars(deny_unknown_fields)]
pub struct NimbusConfig {
    /// Where derived indexes go when they cannot (or should not) sit next to the data.
    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// S3-compatible object store used for `cdms3:` locations.
    #[serde(default)]
    pub object_store: Option<ObjectStoreConfig>,

    #[serde(default)]
    pub collections: Vec<CollectionConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
#[schemars(deny_unknown_fields)]
pub struct CacheSettings {
    /// Cache root. Falls back to `NIMBUS_CACHE_DIR`, then `~/.nimbus/cache`.
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub dir: Option<PathBuf>,

    #[serde(default)]
    #[schemars(with = "String")]
    pub mode: CacheMode,

    #[serde(default)]
    #[schemars(with = "String")]
    pub path_policy: CachePathPolicy,

    /// Prefix dropped from original paths under `nestedTruncate`.
    #[serde(default)]
    pub path_policy_param: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
#[schemars(deny_unknown_fields)]
pub struct ObjectStoreConfig {
    #[serde(default)]
    pub region: Option<String>,

    /// Custom endpoint, e.g. a MinIO deployment.
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub force_path_style: bool,
}

#[cfg(feature = "s3")]
impl ObjectStoreConfig {
    pub fn s3_settings(&self) -> nimbus_vfs::S3Settings {
        nimbus_vfs::S3Settings {
            region: self.region.clone(),
            endpoint: self.endpoint.clone(),
            force_path_style: self.force_path_style,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
#[schemars(deny_unknown_fields)]
pub struct CollectionConfig {
    pub name: String,

    /// Collection spec, e.g. `/data/gfs/**/.*\.grib2$` or `cdms3:bucket?gfs/#delimiter=/`.
    pub spec: String,

    #[serde(default)]
    #[schemars(with = "String")]
    pub partition: PartitionType,

    /// Update policy applied when the collection's indexes are opened.
    #[serde(default = "CollectionConfig::default_update")]
    #[schemars(with = "String")]
    pub update: UpdatePolicy,
}

impl CollectionConfig {
    fn default_update() -> UpdatePolicy {
        UpdatePolicy::Test
    }

    pub fn feature_collection(&self) -> Result<FeatureCollection, ConfigError> {
        let spec = CollectionSpec::parse(&self.spec).map_err(|source| ConfigError::Collection {
            name: self.name.clone(),
            source,
        })?;
        Ok(FeatureCollection::new(self.name.clone(), spec).with_partition(self.partition))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
    #[error("invalid collection {name}: {source}")]
    Collection {
        name: String,
        #[source]
        source: CollectionSpecError,
    },
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    ObjectStore(#[from] VfsError),
}

/// Redact user-provided values from a TOML error message.
///
/// Messages such as ``invalid type: string "secret", expected a boolean`` quote the offending
/// value; quoted strings and the backticked value of unknown keys/variants are replaced with
/// `<redacted>`.
fn sanitize_toml_error_message(message: &str) -> String {
    static QUOTED_RE: OnceLock<regex::Regex> = OnceLock::new();
    static UNKNOWN_RE: OnceLock<regex::Regex> = OnceLock::new();

    let quoted = QUOTED_RE.get_or_init(|| {
        regex::Regex::new(r#""(?:\\.|[^"\\])*"|'(?:\\.|[^'\\])*'"#)
            .expect("quoted-string regex should compile")
    });
    let out = quoted.replace_all(message, "\"<redacted>\"");

    let unknown = UNKNOWN_RE.get_or_init(|| {
        regex::Regex::new(r"(unknown (?:field|variant)|invalid (?:type|value): [a-z ]+) `[^`]*`")
            .expect("unknown-key regex should compile")
    });
    unknown.replace_all(&out, "$1 `<redacted>`").into_owned()
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // `Display` includes a source snippet; keep only the message.
        ConfigError::Toml(sanitize_toml_error_message(err.message()))
    }
}

impl NimbusConfig {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::load_from_str(&text)?;
        tracing::debug!(
            target = "nimbus.config",
            path = %path.display(),
            collections = config.collections.len(),
            "loaded config"
        );
        Ok(config)
    }

    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn collection(&self, name: &str) -> Option<&CollectionConfig> {
        self.collections.iter().find(|collection| collection.name == name)
    }

    /// Cache settings as configured in the file; no environment lookups.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            cache_root_override: self.cache.dir.clone(),
            mode: self.cache.mode,
            path_policy: self.cache.path_policy,
            path_policy_param: self.cache.path_policy_param.clone(),
        }
    }

    /// Open the configured cache, creating its root. An explicit `cache.dir` wins over
    /// `NIMBUS_CACHE_DIR`.
    pub fn disk_cache(&self) -> Result<DiskCache, ConfigError> {
        let mut config = self.cache_config();
        if config.cache_root_override.is_none() {
            config.cache_root_override = CacheConfig::from_env().cache_root_override;
        }
        Ok(DiskCache::new(config)?)
    }

    #[cfg(feature = "s3")]
    pub fn backends(&self) -> Result<Backends, ConfigError> {
        let Some(store) = &self.object_store else {
            return Ok(Backends::local_only());
        };
        let store = nimbus_vfs::S3ObjectStore::new(&store.s3_settings())?;
        Ok(Backends::local_only().with_object_store(std::sync::Arc::new(store)))
    }

    #[cfg(not(feature = "s3"))]
    pub fn backends(&self) -> Result<Backends, ConfigError> {
        if self.object_store.is_some() {
            tracing::warn!(
                target = "nimbus.config",
                "object_store is configured but S3 support is not compiled in; cdms3: locations will fail"
            );
        }
        Ok(Backends::local_only())
    }

    pub fn engine(&self) -> Result<UpdatePolicyEngine, ConfigError> {
        Ok(UpdatePolicyEngine::new(self.disk_cache()?, self.backends()?))
    }
}

pub const NIMBUS_CONFIG_ENV_VAR: &str = "NIMBUS_CONFIG_PATH";

static CONFIG_ENV_LOCK: OnceLock<ReentrantMutex<()>> = OnceLock::new();

fn config_env_lock() -> &'static ReentrantMutex<()> {
    CONFIG_ENV_LOCK.get_or_init(|| ReentrantMutex::new(()))
}

/// Run `f` while holding the lock that guards reads of [`NIMBUS_CONFIG_ENV_VAR`].
///
/// Tests that set the variable should do so inside this lock so concurrent discovery does
/// not observe the override.
pub fn with_config_env_lock<R>(f: impl FnOnce() -> R) -> R {
    let _guard = config_env_lock().lock();
    f()
}

/// Find the config file for `root`.
///
/// Search order:
/// 1) `NIMBUS_CONFIG_PATH` (absolute or relative to `root`)
/// 2) `nimbus.toml` in `root`
/// 3) `.nimbus.toml` in `root`
pub fn discover_config_path(root: &Path) -> Option<PathBuf> {
    let _guard = config_env_lock().lock();
    if let Some(value) = std::env::var_os(NIMBUS_CONFIG_ENV_VAR) {
        let candidate = PathBuf::from(value);
        let path = if candidate.is_absolute() {
            candidate
        } else {
            root.join(candidate)
        };
        return Some(path.canonicalize().unwrap_or(path));
    }

    ["nimbus.toml", ".nimbus.toml"]
        .into_iter()
        .map(|name| root.join(name))
        .find(|path| path.is_file())
        .map(|path| path.canonicalize().unwrap_or(path))
}

/// Load the config for `root`, or the defaults (and `None`) when there is no config file.
pub fn load_for_root(root: &Path) -> Result<(NimbusConfig, Option<PathBuf>), ConfigError> {
    let Some(path) = discover_config_path(root) else {
        return Ok((NimbusConfig::default(), None));
    };
    let config = NimbusConfig::load_from_path(&path)?;
    Ok((config, Some(path)))
}

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// Whether index resolution prefers, avoids, or merely falls back to the cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CacheMode {
    /// Use the location next to the data when it is usable, the cache otherwise.
    #[default]
    Default,
    /// Always place indexes in the cache.
    AlwaysUseCache,
    /// Never place indexes in the cache, even when the data location is read-only.
    NeverUseCache,
}

/// How an original path is turned into a relative path under the cache root.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CachePathPolicy {
    /// Mirror the original directory structure below the cache root.
    #[default]
    NestedDirectory,
    /// Flatten everything into the cache root, joining path segments with `-`.
    OneDirectory,
    /// Drop everything up to and including a configured marker, then nest the remainder.
    NestedTruncate,
}

impl CachePathPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            CachePathPolicy::NestedDirectory => "nestedDirectory",
            CachePathPolicy::OneDirectory => "oneDirectory",
            CachePathPolicy::NestedTruncate => "nestedTruncate",
        }
    }
}

/// Configuration for the on-disk cache.
#[derive(Clone, Debug, Default)]
pub struct CacheConfig {
    /// Override the cache directory. Defaults to `~/.nimbus/cache`.
    pub cache_root_override: Option<PathBuf>,
    pub mode: CacheMode,
    pub path_policy: CachePathPolicy,
    /// Marker used by [`CachePathPolicy::NestedTruncate`].
    pub path_policy_param: Option<String>,
}

impl CacheConfig {
    pub fn from_env() -> Self {
        Self {
            cache_root_override: std::env::var_os("NIMBUS_CACHE_DIR").map(PathBuf::from),
            ..Self::default()
        }
    }
}

/// Maps original file locations onto paths under a cache root.
#[derive(Clone, Debug)]
pub struct DiskCache {
    root: PathBuf,
    mode: CacheMode,
    path_policy: CachePathPolicy,
    path_policy_param: Option<String>,
}

impl DiskCache {
    /// Resolve the cache root and make sure it exists.
    pub fn new(config: CacheConfig) -> Result<Self> {
        if config.path_policy == CachePathPolicy::NestedTruncate
            && config.path_policy_param.as_deref().map_or(true, str::is_empty)
        {
            return Err(CacheError::MissingPolicyParam {
                policy: CachePathPolicy::NestedTruncate.as_str(),
            });
        }

        let root = match config.cache_root_override {
            Some(root) => root,
            None => default_cache_root()?,
        };
        std::fs::create_dir_all(&root)?;
        tracing::debug!(
            target = "nimbus.cache",
            root = %root.display(),
            mode = ?config.mode,
            policy = config.path_policy.as_str(),
            "disk cache ready"
        );

        Ok(Self {
            root,
            mode: config.mode,
            path_policy: config.path_policy,
            path_policy_param: config.path_policy_param,
        })
    }

    /// A nested-directory cache rooted at `root`. The directory is created on first write.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            mode: CacheMode::Default,
            path_policy: CachePathPolicy::NestedDirectory,
            path_policy_param: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: CacheMode) {
        self.mode = mode;
    }

    /// Turning this on clears `never_use_cache`; turning it off only clears this flag.
    pub fn set_always_use_cache(&mut self, always: bool) {
        if always {
            self.mode = CacheMode::AlwaysUseCache;
        } else if self.mode == CacheMode::AlwaysUseCache {
            self.mode = CacheMode::Default;
        }
    }

    pub fn set_never_use_cache(&mut self, never: bool) {
        if never {
            self.mode = CacheMode::NeverUseCache;
        } else if self.mode == CacheMode::NeverUseCache {
            self.mode = CacheMode::Default;
        }
    }

    pub fn path_policy(&self) -> CachePathPolicy {
        self.path_policy
    }

    /// Where a derived copy of `original` lives in this cache. Nothing is created.
    ///
    /// `:`, `?` and `=` are removed, backslashes are treated as separators, and `.`/`..`
    /// segments are dropped so the result always stays under [`DiskCache::root`].
    pub fn cache_path(&self, original: &str) -> PathBuf {
        let normalized = original.replace('\\', "/");
        let mut relative: &str = &normalized;
        if self.path_policy == CachePathPolicy::NestedTruncate {
            if let Some(marker) = self.path_policy_param.as_deref().filter(|m| !m.is_empty()) {
                if let Some(pos) = relative.find(marker) {
                    relative = &relative[pos + marker.len()..];
                }
            }
        }

        let stripped: String = relative
            .chars()
            .filter(|c| !matches!(c, ':' | '?' | '='))
            .collect();
        let segments = stripped
            .split('/')
            .filter(|segment| !matches!(*segment, "" | "." | ".."));

        match self.path_policy {
            CachePathPolicy::OneDirectory => {
                let flat = segments.collect::<Vec<_>>().join("-");
                self.root.join(flat)
            }
            CachePathPolicy::NestedDirectory | CachePathPolicy::NestedTruncate => {
                segments.fold(self.root.clone(), |path, segment| path.join(segment))
            }
        }
    }
}

/// `~/.nimbus/cache`, using `HOME` or `USERPROFILE`.
pub fn default_cache_root() -> Result<PathBuf> {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .ok_or(CacheError::MissingHomeDir)?;

    Ok(home.join(".nimbus").join("cache"))
}

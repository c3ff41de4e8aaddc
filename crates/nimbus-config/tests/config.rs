use std::ffi::OsString;
use std::path::Path;

use nimbus_cache::{CacheMode, CachePathPolicy};
use nimbus_config::{
    discover_config_path, json_schema, load_for_root, with_config_env_lock, ConfigError,
    ConfigValidationError, ConfigWarning, NimbusConfig, NIMBUS_CONFIG_ENV_VAR,
};
use nimbus_core::{PartitionType, UpdatePolicy};
use tempfile::tempdir;

struct EnvVarGuard {
    key: &'static str,
    prev: Option<OsString>,
}

impl EnvVarGuard {
    fn set(key: &'static str, value: &Path) -> Self {
        let prev = std::env::var_os(key);
        std::env::set_var(key, value);
        Self { key, prev }
    }

    fn unset(key: &'static str) -> Self {
        let prev = std::env::var_os(key);
        std::env::remove_var(key);
        Self { key, prev }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        match &self.prev {
            Some(v) => std::env::set_var(self.key, v),
            None => std::env::remove_var(self.key),
        }
    }
}

const FULL: &str = r#"
[cache]
dir = "/var/cache/nimbus"
mode = "alwaysUseCache"
path_policy = "nestedTruncate"
path_policy_param = "/data/"

[logging]
level = "nimbus.index=debug,info"
json = true

[object_store]
region = "us-east-1"
endpoint = "http://localhost:9000"
force_path_style = true

[[collections]]
name = "gfs"
spec = "/data/gfs/**/gfs_#yyyyMMdd_HH#.*\\.grib2$"
partition = "directory"
update = "testIndexOnly"

[[collections]]
name = "nam"
spec = "cdms3:model-output?nam/#delimiter=/"
"#;

#[test]
fn full_config_round_trips_into_runtime_types() {
    let config = NimbusConfig::load_from_str(FULL).unwrap();

    let cache = config.cache_config();
    assert_eq!(cache.cache_root_override.as_deref(), Some(Path::new("/var/cache/nimbus")));
    assert_eq!(cache.mode, CacheMode::AlwaysUseCache);
    assert_eq!(cache.path_policy, CachePathPolicy::NestedTruncate);
    assert_eq!(cache.path_policy_param.as_deref(), Some("/data/"));

    assert!(config.logging.json);
    assert!(config.logging.stderr);
    let store = config.object_store.as_ref().unwrap();
    assert_eq!(store.region.as_deref(), Some("us-east-1"));
    assert!(store.force_path_style);

    let gfs = config.collection("gfs").unwrap();
    assert_eq!(gfs.update, UpdatePolicy::TestIndexOnly);
    let collection = gfs.feature_collection().unwrap();
    assert_eq!(collection.name, "gfs");
    assert_eq!(collection.partition, PartitionType::Directory);
    assert_eq!(collection.spec.root_dir(), "/data/gfs");
    assert!(collection.spec.want_subdirs());
    assert_eq!(collection.spec.date_format_mark(), Some("gfs_#yyyyMMdd_HH#"));

    let nam = config.collection("nam").unwrap();
    assert_eq!(nam.update, UpdatePolicy::Test);
    assert_eq!(nam.partition, PartitionType::None);
    assert!(nam.feature_collection().unwrap().spec.is_object_store());

    assert!(config.validate().is_ok());
}

#[test]
fn empty_config_uses_defaults() {
    let config = NimbusConfig::load_from_str("").unwrap();
    assert_eq!(config, NimbusConfig::default());
    assert_eq!(config.cache.mode, CacheMode::Default);
    assert_eq!(config.logging.level, "info");
    assert!(config.collections.is_empty());
    assert!(config.validate().is_ok());
}

#[test]
fn unknown_keys_are_rejected() {
    for text in [
        "[cache]\nroot = \"/tmp\"\n",
        "[caches]\n",
        "[[collections]]\nname = \"a\"\nspec = \"/d/.*\"\nrefresh = \"1 hour\"\n",
    ] {
        let err = NimbusConfig::load_from_str(text).unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)), "{text}: {err}");
    }
}

#[test]
fn bad_enum_values_are_reported_without_the_value() {
    let err = NimbusConfig::load_from_str(
        "[[collections]]\nname = \"a\"\nspec = \"/d/.*\"\nupdate = \"sometimes\"\n",
    )
    .unwrap_err();
    let message = err.to_string();
    assert!(!message.contains("sometimes"), "{message}");
}

#[test]
fn validation_reports_cross_field_problems() {
    let config = NimbusConfig::load_from_str(
        r#"
[cache]
path_policy = "nestedTruncate"

[logging]
level = "nimbus=[["

[[collections]]
name = "gfs"
spec = "/data/(unclosed"

[[collections]]
name = "gfs"
spec = "/data/.*"

[[collections]]
name = " "
spec = "/data/.*"
"#,
    )
    .unwrap();

    let diagnostics = config.validate();
    assert!(!diagnostics.is_ok());
    assert!(diagnostics
        .errors
        .contains(&ConfigValidationError::MissingPathPolicyParam));
    assert!(diagnostics.errors.contains(&ConfigValidationError::DuplicateCollection {
        name: "gfs".into()
    }));
    assert!(diagnostics
        .errors
        .contains(&ConfigValidationError::EmptyCollectionName { index: 2 }));
    assert!(diagnostics.errors.iter().any(|err| matches!(
        err,
        ConfigValidationError::InvalidCollectionSpec { name, .. } if name == "gfs"
    )));
    assert!(diagnostics
        .warnings
        .iter()
        .any(|warning| matches!(warning, ConfigWarning::LoggingLevelInvalid { .. })));
}

#[test]
fn invalid_collection_spec_surfaces_on_conversion() {
    let config =
        NimbusConfig::load_from_str("[[collections]]\nname = \"bad\"\nspec = \"/d/[\"\n").unwrap();
    let err = config.collections[0].feature_collection().unwrap_err();
    assert!(matches!(err, ConfigError::Collection { ref name, .. } if name == "bad"), "{err}");
}

#[test]
fn engine_uses_the_configured_cache_root() {
    let dir = tempdir().unwrap();
    let cache_root = dir.path().join("cache");
    let text = format!("[cache]\ndir = {:?}\nmode = \"neverUseCache\"\n", cache_root);
    let config = NimbusConfig::load_from_str(&text).unwrap();

    let engine = config.engine().unwrap();
    assert_eq!(engine.cache().root(), cache_root);
    assert_eq!(engine.cache().mode(), CacheMode::NeverUseCache);
    assert!(cache_root.is_dir());
}

#[test]
fn discovers_nimbus_toml_then_dotfile() {
    with_config_env_lock(|| {
        let _env = EnvVarGuard::unset(NIMBUS_CONFIG_ENV_VAR);
        let dir = tempdir().unwrap();
        assert_eq!(discover_config_path(dir.path()), None);

        let dotfile = dir.path().join(".nimbus.toml");
        std::fs::write(&dotfile, "").unwrap();
        assert_eq!(
            discover_config_path(dir.path()),
            Some(dotfile.canonicalize().unwrap())
        );

        let primary = dir.path().join("nimbus.toml");
        std::fs::write(&primary, "[logging]\nlevel = \"debug\"\n").unwrap();
        assert_eq!(
            discover_config_path(dir.path()),
            Some(primary.canonicalize().unwrap())
        );

        let (config, path) = load_for_root(dir.path()).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(path, Some(primary.canonicalize().unwrap()));
    });
}

#[test]
fn env_override_wins_over_root_file() {
    with_config_env_lock(|| {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("nimbus.toml"), "").unwrap();
        let override_path = dir.path().join("override.toml");
        std::fs::write(&override_path, "[logging]\njson = true\n").unwrap();

        let _env = EnvVarGuard::set(NIMBUS_CONFIG_ENV_VAR, Path::new("override.toml"));
        let (config, path) = load_for_root(dir.path()).unwrap();
        assert!(config.logging.json);
        assert_eq!(path, Some(override_path.canonicalize().unwrap()));
    });
}

#[test]
fn missing_config_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    let err = NimbusConfig::load_from_path(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }), "{err}");
}

#[test]
fn json_schema_lists_policy_names() {
    let schema = serde_json::to_value(json_schema()).unwrap();

    let update = schema
        .pointer("/definitions/CollectionConfig/properties/update/enum")
        .expect("update enum present");
    assert_eq!(
        update,
        &serde_json::json!(["always", "never", "nocheck", "test", "testIndexOnly"])
    );
    let mode = schema
        .pointer("/definitions/CacheSettings/properties/mode/enum")
        .expect("mode enum present");
    assert_eq!(
        mode,
        &serde_json::json!(["default", "alwaysUseCache", "neverUseCache"])
    );
    assert!(schema.pointer("/allOf/0/if").is_some());
}

use nimbus_cache::{CacheConfig, CacheMode, DiskCache};

#[test]
fn env_override_selects_and_creates_the_root() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("nimbus-cache");
    std::env::set_var("NIMBUS_CACHE_DIR", &root);

    let config = CacheConfig::from_env();
    std::env::remove_var("NIMBUS_CACHE_DIR");
    assert_eq!(config.cache_root_override.as_deref(), Some(root.as_path()));

    let cache = DiskCache::new(config).unwrap();
    assert!(root.is_dir());
    assert_eq!(cache.root(), root);
    assert_eq!(cache.mode(), CacheMode::Default);

    assert_eq!(
        cache.cache_path("/data/gfs/a.grib2.gbx9"),
        root.join("data").join("gfs").join("a.grib2.gbx9")
    );
}

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use nimbus_vfs::{Backends, InMemoryObjectStore, MFile, ObjectStore, VfsError};

const BUCKET: &str = "grib-archive";

fn store() -> Arc<InMemoryObjectStore> {
    let store = InMemoryObjectStore::new().with_bucket(BUCKET);
    store
        .insert_with_mtime(BUCKET, "gfs/00/a.grib2", b"GRIB-a".to_vec(), 1_000)
        .unwrap();
    store
        .insert_with_mtime(BUCKET, "gfs/00/b.grib2", b"GRIB-bb".to_vec(), 2_000)
        .unwrap();
    store
        .insert_with_mtime(BUCKET, "gfs/06/c.grib2", b"GRIB-ccc".to_vec(), 3_000)
        .unwrap();
    Arc::new(store)
}

fn open(store: &Arc<InMemoryObjectStore>, location: &str) -> MFile {
    let dyn_store: Arc<dyn ObjectStore> = store.clone();
    Backends::local_only()
        .with_object_store(dyn_store)
        .open(location)
        .unwrap()
}

#[test]
fn delimited_object_reports_metadata_and_navigation() {
    let store = store();
    let file = open(&store, "cdms3:grib-archive?gfs/00/b.grib2#delimiter=/");

    assert_eq!(file.path(), "cdms3:grib-archive?gfs/00/b.grib2#delimiter=/");
    assert_eq!(file.name(), "b.grib2");
    assert!(file.exists().unwrap());
    assert!(!file.is_directory().unwrap());
    assert_eq!(file.length().unwrap(), 7);
    assert_eq!(file.last_modified_millis().unwrap(), 2_000);

    let parent = file.parent().unwrap();
    assert_eq!(parent.path(), "cdms3:grib-archive?gfs/00/#delimiter=/");
    assert_eq!(parent.name(), "00");
    assert!(parent.is_directory().unwrap());
    assert!(!parent.exists().unwrap());
    assert_eq!(parent.length().unwrap(), 0);
}

#[test]
fn prefix_without_trailing_delimiter_is_discovered_by_listing() {
    let store = store();
    let dir = open(&store, "cdms3:grib-archive?gfs/06#delimiter=/");
    assert!(dir.is_directory().unwrap());

    let missing = open(&store, "cdms3:grib-archive?gfs/12#delimiter=/");
    assert!(!missing.is_directory().unwrap());
}

#[test]
fn flat_keys_have_no_parent_and_are_never_directories() {
    let store = store();
    let file = open(&store, "cdms3:grib-archive?gfs/00/a.grib2");
    assert_eq!(file.name(), "gfs/00/a.grib2");
    assert!(file.parent().is_none());
    assert!(!file.is_directory().unwrap());

    let bucket = open(&store, "cdms3:grib-archive");
    assert_eq!(bucket.name(), "");
    assert!(bucket.parent().is_none());
    assert!(!bucket.is_directory().unwrap());
}

#[test]
fn write_to_stream_reads_ranges() {
    let store = store();
    let file = open(&store, "cdms3:grib-archive?gfs/06/c.grib2#delimiter=/");

    let mut out = Vec::new();
    assert_eq!(file.write_to_stream(&mut out, 5, Some(2)).unwrap(), 2);
    assert_eq!(out, b"cc");

    let mut out = Vec::new();
    assert_eq!(file.write_to_stream(&mut out, 0, None).unwrap(), 8);
    assert_eq!(out, b"GRIB-ccc");

    let mut out = Vec::new();
    assert_eq!(file.write_to_stream(&mut out, 100, None).unwrap(), 0);
}

#[test]
fn write_to_stream_rejects_directories_and_missing_keys() {
    let store = store();
    let dir = open(&store, "cdms3:grib-archive?gfs/00/#delimiter=/");
    let err = dir.write_to_stream(&mut Vec::new(), 0, None).unwrap_err();
    assert!(err.is_not_found(), "{err}");

    let missing = open(&store, "cdms3:grib-archive?gfs/00/zzz.grib2#delimiter=/");
    let err = missing.write_to_stream(&mut Vec::new(), 0, None).unwrap_err();
    assert!(err.is_not_found(), "{err}");

    // Consoles create empty `folder/` objects; they are still directories.
    store.insert(BUCKET, "gfs/06/", Vec::new()).unwrap();
    let placeholder = open(&store, "cdms3:grib-archive?gfs/06/#delimiter=/");
    assert!(placeholder.is_directory().unwrap());
    let err = placeholder
        .write_to_stream(&mut Vec::new(), 0, None)
        .unwrap_err();
    assert!(err.is_not_found(), "{err}");
}

#[test]
fn create_from_uploads_and_reports_missing_pieces() {
    let store = store();
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("upload.gbx9");
    std::fs::write(&source, b"index bytes").unwrap();

    let target = open(&store, "cdms3:grib-archive?gfs/00/a.grib2.gbx9#delimiter=/");
    assert!(target.create_from(&source).unwrap());
    assert_eq!(
        store.object_bytes(BUCKET, "gfs/00/a.grib2.gbx9").unwrap(),
        b"index bytes"
    );

    let no_bucket = open(&store, "cdms3:no-such-bucket?x.gbx9");
    let err = no_bucket.create_from(&source).unwrap_err();
    assert!(matches!(err, VfsError::NamespaceNotFound { .. }), "{err}");

    let err = target.create_from(&tmp.path().join("absent")).unwrap_err();
    assert!(err.is_not_found(), "{err}");
}

#[test]
fn delete_is_idempotent() {
    let store = store();
    let file = open(&store, "cdms3:grib-archive?gfs/00/a.grib2");
    assert!(file.delete().unwrap());
    assert!(file.delete().unwrap());
    assert!(store.object_bytes(BUCKET, "gfs/00/a.grib2").is_none());

    let fresh = open(&store, "cdms3:grib-archive?gfs/00/a.grib2");
    assert!(!fresh.exists().unwrap());
}

#[test]
fn read_only_store_refuses_writes() {
    let store = store();
    store.set_read_only(true);
    let target = open(&store, "cdms3:grib-archive?gfs/00/a.grib2.gbx9#delimiter=/");
    assert!(!target.can_create());
    let err = target.write_bytes(b"x").unwrap_err();
    assert!(err.is_permission_denied(), "{err}");
}

#[test]
fn write_bytes_round_trips_through_a_fresh_handle() {
    let store = store();
    let target = open(&store, "cdms3:grib-archive?gfs/index.ncx4#delimiter=/");
    target.write_bytes(b"collection").unwrap();

    let reopened = open(&store, target.path());
    assert_eq!(reopened.read_all().unwrap(), b"collection");
    assert_eq!(store.put_requests(), 1);
}

fn hash_of(file: &MFile) -> u64 {
    let mut hasher = DefaultHasher::new();
    file.hash(&mut hasher);
    hasher.finish()
}

#[test]
fn identity_is_the_case_sensitive_path() {
    let store = store();
    let lower = open(&store, "cdms3:grib-archive?gfs/00/a.grib2#delimiter=/");
    let again = open(&store, "cdms3:grib-archive?gfs/00/a.grib2#delimiter=/");
    let upper = open(&store, "cdms3:grib-archive?GFS/00/a.grib2#delimiter=/");

    assert_eq!(lower, again);
    assert_eq!(hash_of(&lower), hash_of(&again));
    assert_ne!(lower, upper);
    assert_ne!(hash_of(&lower), hash_of(&upper));
    assert!(!upper.exists().unwrap());
}

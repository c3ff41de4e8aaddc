use std::fs;
use std::time::{Duration, SystemTime};

use nimbus_vfs::{Backends, MFile, VfsError};

#[test]
fn local_file_metadata_tracks_the_filesystem() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("gfs.grib2");
    let file = MFile::local(&path);

    assert!(!file.exists().unwrap());
    assert!(file.length().unwrap_err().is_not_found());

    fs::write(&path, b"GRIB").unwrap();
    assert!(file.exists().unwrap());
    assert_eq!(file.length().unwrap(), 4);
    assert_eq!(file.name(), "gfs.grib2");

    let when = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
    fs::File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(when)
        .unwrap();
    assert_eq!(file.last_modified_millis().unwrap(), 1_600_000_000_000);
}

#[test]
fn navigation_mirrors_paths() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = MFile::local(tmp.path());
    assert!(dir.is_directory().unwrap());

    let child = dir.child("a.grib2");
    assert_eq!(child.parent().unwrap(), dir);
    let index = child.sibling(&format!("{}.gbx9", child.name()));
    assert_eq!(index.name(), "a.grib2.gbx9");
    assert_eq!(index.parent().unwrap(), dir);
}

#[test]
fn create_from_requires_existing_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("source");
    fs::write(&source, b"bytes").unwrap();

    let target = MFile::local(tmp.path().join("target"));
    assert!(target.create_from(&source).unwrap());
    assert_eq!(target.read_all().unwrap(), b"bytes");

    let orphan = MFile::local(tmp.path().join("missing/target"));
    let err = orphan.create_from(&source).unwrap_err();
    assert!(matches!(err, VfsError::NamespaceNotFound { .. }), "{err}");
}

#[test]
fn write_bytes_creates_missing_directories() {
    let tmp = tempfile::tempdir().unwrap();
    let target = MFile::local(tmp.path().join("cache/nested/x.ncx4"));
    target.write_bytes(b"abc").unwrap();
    assert_eq!(fs::read(tmp.path().join("cache/nested/x.ncx4")).unwrap(), b"abc");
    assert!(target.delete().unwrap());
    assert!(target.delete().unwrap());
}

#[test]
fn directories_cannot_be_streamed() {
    let tmp = tempfile::tempdir().unwrap();
    let file = Backends::local_only()
        .open(&tmp.path().to_string_lossy())
        .unwrap();
    let err = file.write_to_stream(&mut Vec::new(), 0, None).unwrap_err();
    assert!(err.is_not_found());
}

#[cfg(unix)]
#[test]
fn read_only_directory_is_not_creatable() {
    use std::os::unix::fs::{MetadataExt, PermissionsExt};

    let tmp = tempfile::tempdir().unwrap();
    // Root ignores directory permissions.
    if fs::metadata(tmp.path()).unwrap().uid() == 0 {
        return;
    }
    let ro = tmp.path().join("ro");
    fs::create_dir(&ro).unwrap();
    fs::set_permissions(&ro, fs::Permissions::from_mode(0o555)).unwrap();

    let target = MFile::local(ro.join("a.grib2.gbx9"));
    let writable = target.can_create();
    fs::set_permissions(&ro, fs::Permissions::from_mode(0o755)).unwrap();
    assert!(!writable);
}

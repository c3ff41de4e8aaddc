//! Local filesystem primitives backing [`crate::MFile`].

use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Result, VfsError};

pub fn now_millis() -> u64 {
    system_time_millis(SystemTime::now())
}

pub(crate) fn system_time_millis(time: SystemTime) -> u64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as u64,
        Err(err) => {
            static REPORTED: OnceLock<()> = OnceLock::new();
            if REPORTED.set(()).is_ok() {
                tracing::debug!(
                    target = "nimbus.vfs",
                    error = %err,
                    "timestamp is before unix epoch; using 0"
                );
            }
            0
        }
    }
}

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// `Ok(None)` when nothing exists at `path`.
pub(crate) fn metadata(path: &Path) -> Result<Option<fs::Metadata>> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(meta)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(VfsError::from_io(display(path), err)),
    }
}

pub(crate) fn modified_millis(meta: &fs::Metadata) -> u64 {
    meta.modified().map(system_time_millis).unwrap_or(0)
}

pub(crate) fn write_range(
    path: &Path,
    offset: u64,
    max_bytes: Option<u64>,
    out: &mut dyn Write,
) -> Result<u64> {
    let io_err = |err| VfsError::from_io(display(path), err);

    let meta = metadata(path)?.ok_or_else(|| VfsError::NotFound {
        path: display(path),
    })?;
    if meta.is_dir() {
        return Err(VfsError::NotFound {
            path: display(path),
        });
    }

    let mut file = fs::File::open(path).map_err(io_err)?;
    file.seek(SeekFrom::Start(offset)).map_err(io_err)?;
    let copied = match max_bytes {
        Some(max) => io::copy(&mut file.take(max), out),
        None => io::copy(&mut file, out),
    };
    copied.map_err(io_err)
}

/// Atomically replace `dest` with `bytes`, creating parent directories as needed.
pub(crate) fn atomic_write(dest: &Path, bytes: &[u8]) -> Result<()> {
    let parent = parent_dir(dest);
    fs::create_dir_all(parent).map_err(|err| VfsError::from_io(display(parent), err))?;
    atomic_write_with(dest, |file| file.write_all(bytes))
}

/// Atomically replace `dest` with a copy of `source`. The parent of `dest` must exist.
pub(crate) fn atomic_copy(dest: &Path, source: &Path) -> Result<()> {
    let mut input =
        fs::File::open(source).map_err(|err| VfsError::from_io(display(source), err))?;
    atomic_write_with(dest, |file| io::copy(&mut input, file).map(|_| ()))
}

pub(crate) fn remove_file(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(true),
        Err(err) => Err(VfsError::from_io(display(path), err)),
    }
}

/// Whether a new file can be created in `dir`, checked by creating and removing a probe.
pub(crate) fn dir_is_writable(dir: &Path) -> bool {
    match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => {}
        _ => return false,
    }
    match tempfile::Builder::new().prefix(".nimbus-probe").tempfile_in(dir) {
        Ok(probe) => {
            if let Err(err) = probe.close() {
                tracing::debug!(
                    target = "nimbus.vfs",
                    dir = %dir.display(),
                    error = %err,
                    "failed to remove write probe"
                );
            }
            true
        }
        Err(_) => false,
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn atomic_write_with(
    dest: &Path,
    write: impl FnOnce(&mut fs::File) -> io::Result<()>,
) -> Result<()> {
    let parent = parent_dir(dest);
    if !parent.is_dir() {
        return Err(VfsError::NotFound {
            path: display(parent),
        });
    }

    let (tmp_path, mut file) =
        open_unique_tmp_file(dest, parent).map_err(|err| VfsError::from_io(display(dest), err))?;
    let write_result = write(&mut file).and_then(|()| file.sync_all());
    drop(file);
    if let Err(err) = write_result {
        remove_tmp_best_effort(&tmp_path);
        return Err(VfsError::from_io(display(dest), err));
    }

    if let Err(err) = rename_over(&tmp_path, dest) {
        remove_tmp_best_effort(&tmp_path);
        return Err(VfsError::from_io(display(dest), err));
    }
    Ok(())
}

fn rename_over(from: &Path, to: &Path) -> io::Result<()> {
    const MAX_RENAME_ATTEMPTS: usize = 1024;
    let mut attempts = 0usize;
    loop {
        match fs::rename(from, to) {
            Ok(()) => return Ok(()),
            Err(err)
                if cfg!(windows) && (err.kind() == io::ErrorKind::AlreadyExists || to.exists()) =>
            {
                // Windows `rename` does not replace an existing file.
                match fs::remove_file(to) {
                    Ok(()) => {}
                    Err(remove_err) if remove_err.kind() == io::ErrorKind::NotFound => {}
                    Err(remove_err) => return Err(remove_err),
                }
                attempts += 1;
                if attempts >= MAX_RENAME_ATTEMPTS {
                    return Err(err);
                }
            }
            Err(err) => return Err(err),
        }
    }
}

fn remove_tmp_best_effort(tmp_path: &Path) {
    if let Err(err) = fs::remove_file(tmp_path) {
        if err.kind() != io::ErrorKind::NotFound {
            tracing::debug!(
                target = "nimbus.vfs",
                path = %tmp_path.display(),
                error = %err,
                "failed to remove temporary file"
            );
        }
    }
}

fn open_unique_tmp_file(dest: &Path, parent: &Path) -> io::Result<(PathBuf, fs::File)> {
    let file_name = dest
        .file_name()
        .ok_or_else(|| io::Error::other("destination path has no file name"))?;
    let pid = std::process::id();

    loop {
        let counter = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(format!(".tmp.{pid}.{counter}"));
        let tmp_path = parent.join(tmp_name);

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
        {
            Ok(file) => return Ok((tmp_path, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    }
}

//! Atomic file replacement primitives.
//!
//! Config files are replaced with a TOCTOU-safe sequence using a directory handle:
//! `open_dir_nofollow(parent) -> write+fsync(tmp) -> renameat(tmp, final) -> fsync(dirfd)`.
//! Readers therefore observe either the old or the new file, never a torn write.
use std::ffi::CString;
use std::fs;
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use rustix::fd::OwnedFd;
use rustix::fs::{openat, renameat, unlinkat, AtFlags, Mode, OFlags, CWD};
use rustix::io::Errno;

use crate::constants::TMP_SUFFIX;

fn errno_to_io(e: Errno) -> std::io::Error {
    std::io::Error::from_raw_os_error(e.raw_os_error())
}

fn cstring(bytes: &[u8]) -> std::io::Result<CString> {
    CString::new(bytes)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid cstring"))
}

// Unique temporary names within a process.
static NEXT_TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Open a directory with `O_DIRECTORY | O_NOFOLLOW`.
///
/// # Errors
///
/// Returns an IO error if the directory cannot be opened.
pub fn open_dir_nofollow(dir: &Path) -> std::io::Result<OwnedFd> {
    let c = cstring(dir.as_os_str().as_bytes())?;
    openat(
        CWD,
        c.as_c_str(),
        OFlags::RDONLY | OFlags::DIRECTORY | OFlags::CLOEXEC | OFlags::NOFOLLOW,
        Mode::empty(),
    )
    .map_err(errno_to_io)
}

/// Fsync the parent directory of `path` for durability.
///
/// # Errors
///
/// Returns an IO error if the parent directory cannot be opened or fsynced.
pub fn fsync_parent_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        let dir = fs::File::open(parent)?;
        dir.sync_all()?;
    }
    Ok(())
}

/// Atomically replace `path` with `contents`, creating parent directories as needed.
/// `mode` applies to the new file (e.g. `0o600` for private keys).
///
/// # Errors
///
/// Returns an IO error if any step of the write/rename sequence fails; the
/// original file is left untouched in that case.
pub fn write_atomic(path: &Path, contents: &[u8], mode: u32) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let fname = path
        .file_name()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "no file name"))?;
    let ctr = NEXT_TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        ".{}.{}.{ctr}{TMP_SUFFIX}",
        fname.to_string_lossy(),
        std::process::id()
    );
    let tmp_path = parent.join(&tmp_name);

    let dirfd = open_dir_nofollow(parent)?;
    let tmp_c = cstring(tmp_name.as_bytes())?;
    match unlinkat(&dirfd, tmp_c.as_c_str(), AtFlags::empty()) {
        Ok(()) => {}
        Err(e) if e == Errno::NOENT => {}
        Err(e) => return Err(errno_to_io(e)),
    }

    {
        let mut f = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(mode)
            .open(&tmp_path)?;
        f.write_all(contents)?;
        f.sync_all()?;
    }

    let new_c = cstring(fname.as_bytes())?;
    if let Err(e) = renameat(&dirfd, tmp_c.as_c_str(), &dirfd, new_c.as_c_str()) {
        let _ = unlinkat(&dirfd, tmp_c.as_c_str(), AtFlags::empty());
        return Err(errno_to_io(e));
    }
    let _ = rustix::fs::fsync(&dirfd);
    Ok(())
}

/// Remove `path` if present; absence is not an error.
///
/// # Errors
///
/// Returns an IO error for any failure other than `NotFound`.
pub fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            let _ = fsync_parent_dir(path);
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

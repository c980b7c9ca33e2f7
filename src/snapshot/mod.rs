//! Config snapshot store: capture and restore a site's pre-swap state.
//!
//! Capture is a consistent read (read, checksum, re-read, compare) of every file the
//! transaction may touch, including files that do not exist yet. Restore writes each
//! blob back verbatim (or removes files that were absent) and reports per-file
//! outcomes instead of failing fast.
//!
//! At most one snapshot may be pending per site; it is released by `discard` or `retain`.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::constants::CAPTURE_READ_ATTEMPTS;
use crate::fs::{remove_if_exists, write_atomic, SiteLayout};
use crate::logging::now_iso;
use crate::types::errors::{Result, SwapError};
use crate::types::{CapturedFile, ConfigSnapshot, FileRole, Site};

mod prune;

pub use prune::prune_snapshots;

/// Files and values a capture must record.
#[derive(Clone, Debug, Default)]
pub struct CapturePlan {
    pub files: Vec<(FileRole, PathBuf)>,
    pub db_url: Option<String>,
}

/// Per-file outcome of a restore.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: Vec<PathBuf>,
    pub failures: Vec<(PathBuf, String)>,
}

impl RestoreReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    #[must_use]
    pub fn error_messages(&self) -> Vec<String> {
        self.failures
            .iter()
            .map(|(p, e)| format!("snapshot restore of {} failed: {e}", p.display()))
            .collect()
    }
}

#[derive(Debug)]
pub struct SnapshotStore {
    root: PathBuf,
    pending: Mutex<HashMap<String, Uuid>>,
}

impl SnapshotStore {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            root: config.root.clone(),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// # Errors
    ///
    /// Returns `SwapError::Snapshot` if a snapshot is already pending for the site,
    /// or if any file cannot be read consistently.
    pub fn capture(&self, site: &Site, plan: &CapturePlan) -> Result<ConfigSnapshot> {
        let id = Uuid::new_v4();
        {
            let mut pending = self.lock_pending()?;
            if let Some(existing) = pending.get(&site.id) {
                return Err(SwapError::Snapshot(format!(
                    "snapshot {existing} already pending for site {}",
                    site.id
                )));
            }
            pending.insert(site.id.clone(), id);
        }

        let mut files = Vec::with_capacity(plan.files.len());
        for (role, path) in &plan.files {
            match read_consistent(path) {
                Ok(contents) => {
                    let sha256 = contents.as_deref().map(sha256_hex);
                    files.push(CapturedFile {
                        role: *role,
                        path: path.clone(),
                        contents,
                        sha256,
                        redacted: false,
                    });
                }
                Err(e) => {
                    self.release(&site.id, id);
                    return Err(e);
                }
            }
        }
        let cert_paths = files
            .iter()
            .filter(|f| f.role == FileRole::Certificate)
            .map(|f| f.path.clone())
            .collect();

        let captured_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Ok(ConfigSnapshot {
            id,
            site_id: site.id.clone(),
            captured_at: now_iso(),
            captured_at_ms,
            web_server: site.web_server,
            php_version: site.php_version.clone(),
            files,
            cert_paths,
            db_url_backup: plan.db_url.clone(),
        })
    }

    /// Write every captured blob back verbatim; files that were absent are removed.
    /// Never fails as a whole; inspect the report.
    #[must_use]
    pub fn restore(&self, snapshot: &ConfigSnapshot) -> RestoreReport {
        let mut report = RestoreReport::default();
        for f in &snapshot.files {
            match restore_one(f) {
                Ok(()) => report.restored.push(f.path.clone()),
                Err(e) => report.failures.push((f.path.clone(), e)),
            }
        }
        report
    }

    /// Drop a snapshot without keeping it.
    pub fn discard(&self, snapshot: &ConfigSnapshot) {
        self.release(&snapshot.site_id, snapshot.id);
    }

    /// Persist a snapshot under the site's snapshot dir, release it, and prune to `retention`.
    /// Certificate contents are not persisted.
    ///
    /// # Errors
    ///
    /// Returns `SwapError::Snapshot` if the snapshot cannot be serialized or written.
    /// The snapshot is released either way.
    pub fn retain(&self, snapshot: &ConfigSnapshot, retention: Option<usize>) -> Result<PathBuf> {
        let result = self.persist(snapshot);
        self.release(&snapshot.site_id, snapshot.id);
        let path = result?;
        prune_snapshots(&self.snapshot_dir(&snapshot.site_id), retention)
            .map_err(|e| SwapError::Snapshot(format!("prune: {e}")))?;
        Ok(path)
    }

    /// Retained snapshot files for a site, newest first.
    ///
    /// # Errors
    ///
    /// Returns `SwapError::Io` if the snapshot dir exists but cannot be listed.
    pub fn list(&self, site_id: &str) -> Result<Vec<PathBuf>> {
        let dir = self.snapshot_dir(site_id);
        let mut out: Vec<(u128, PathBuf)> = Vec::new();
        let rd = match std::fs::read_dir(&dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SwapError::Io(e)),
        };
        for entry in rd.flatten() {
            let path = entry.path();
            if let Some(ts) = prune::stamp_of(&path) {
                out.push((ts, path));
            }
        }
        out.sort_unstable_by_key(|(ts, _)| std::cmp::Reverse(*ts));
        Ok(out.into_iter().map(|(_, p)| p).collect())
    }

    /// # Errors
    ///
    /// Returns `SwapError::Snapshot` if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<ConfigSnapshot> {
        let f = std::fs::File::open(path)
            .map_err(|e| SwapError::Snapshot(format!("open {}: {e}", path.display())))?;
        serde_json::from_reader(f)
            .map_err(|e| SwapError::Snapshot(format!("parse {}: {e}", path.display())))
    }

    #[must_use]
    pub fn is_pending(&self, site_id: &str) -> bool {
        self.pending
            .lock()
            .map(|p| p.contains_key(site_id))
            .unwrap_or(false)
    }

    fn snapshot_dir(&self, site_id: &str) -> PathBuf {
        SiteLayout::new(&self.root, site_id).snapshot_dir()
    }

    fn persist(&self, snapshot: &ConfigSnapshot) -> Result<PathBuf> {
        let mut stored = snapshot.clone();
        for f in &mut stored.files {
            if f.role == FileRole::Certificate && f.contents.is_some() {
                f.contents = None;
                f.redacted = true;
            }
        }
        let bytes = serde_json::to_vec_pretty(&stored)
            .map_err(|e| SwapError::Snapshot(format!("serialize: {e}")))?;
        let path = self
            .snapshot_dir(&snapshot.site_id)
            .join(format!("{}-{}.json", snapshot.captured_at_ms, snapshot.id));
        write_atomic(&path, &bytes, 0o600)
            .map_err(|e| SwapError::Snapshot(format!("write {}: {e}", path.display())))?;
        Ok(path)
    }

    fn release(&self, site_id: &str, id: Uuid) {
        if let Ok(mut pending) = self.pending.lock() {
            if pending.get(site_id) == Some(&id) {
                pending.remove(site_id);
            }
        }
    }

    fn lock_pending(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Uuid>>> {
        self.pending
            .lock()
            .map_err(|_| SwapError::Snapshot("pending-snapshot registry poisoned".into()))
    }
}

fn sha256_hex(s: &str) -> String {
    hex::encode(Sha256::digest(s.as_bytes()))
}

/// Read a file twice and accept it only when both reads hash identically.
/// `Ok(None)` means the file is absent.
fn read_consistent(path: &Path) -> Result<Option<String>> {
    for _ in 0..CAPTURE_READ_ATTEMPTS {
        let first = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SwapError::Snapshot(format!("read {}: {e}", path.display())))
            }
        };
        let second = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => {
                return Err(SwapError::Snapshot(format!("read {}: {e}", path.display())))
            }
        };
        if Sha256::digest(&first) == Sha256::digest(&second) {
            return String::from_utf8(first).map(Some).map_err(|_| {
                SwapError::Snapshot(format!("{} is not valid UTF-8", path.display()))
            });
        }
    }
    Err(SwapError::Snapshot(format!(
        "{} kept changing during capture",
        path.display()
    )))
}

fn restore_one(f: &CapturedFile) -> std::result::Result<(), String> {
    if f.redacted {
        return Err("contents were not retained".to_string());
    }
    match &f.contents {
        Some(contents) => {
            let mode = if f.role == FileRole::Certificate { 0o600 } else { 0o644 };
            write_atomic(&f.path, contents.as_bytes(), mode).map_err(|e| e.to_string())?;
            let back = std::fs::read_to_string(&f.path).map_err(|e| e.to_string())?;
            if f.sha256.as_deref() != Some(sha256_hex(&back).as_str()) {
                return Err("checksum mismatch after restore".to_string());
            }
            Ok(())
        }
        None => remove_if_exists(&f.path).map_err(|e| e.to_string()),
    }
}

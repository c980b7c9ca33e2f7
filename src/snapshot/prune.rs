use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::types::PruneResult;

/// Millisecond stamp encoded in a retained snapshot file name `<ms>-<uuid>.json`.
pub(super) fn stamp_of(path: &Path) -> Option<u128> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(".json")?;
    let (ts, _id) = stem.split_once('-')?;
    ts.parse().ok()
}

/// Prune retained snapshots in `dir` down to `count_limit` newest entries.
///
/// # Errors
///
/// Returns an IO error if the directory cannot be listed. Individual deletions are
/// best-effort. The newest snapshot is never deleted.
///
/// - `count_limit = Some(N)`: retain the N newest; N is clamped to at least 1.
/// - `count_limit = None`: retain everything.
pub fn prune_snapshots(dir: &Path, count_limit: Option<usize>) -> io::Result<PruneResult> {
    let rd = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(PruneResult::default()),
        Err(e) => return Err(e),
    };
    let mut stamps: Vec<(u128, PathBuf)> = rd
        .flatten()
        .map(|e| e.path())
        .filter_map(|p| stamp_of(&p).map(|ts| (ts, p)))
        .collect();
    stamps.sort_unstable_by_key(|(ts, _)| std::cmp::Reverse(*ts));

    let keep = count_limit.map_or(usize::MAX, |n| n.max(1));
    let mut pruned = 0usize;
    let mut retained = 0usize;
    for (idx, (_, path)) in stamps.iter().enumerate() {
        if idx < keep {
            retained += 1;
            continue;
        }
        if fs::remove_file(path).is_ok() {
            pruned += 1;
        }
    }
    if pruned > 0 {
        if let Ok(d) = fs::File::open(dir) {
            let _ = d.sync_all();
        }
    }
    Ok(PruneResult {
        pruned_count: pruned,
        retained_count: retained,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_newest_and_ignores_foreign_files() {
        let td = tempfile::tempdir().unwrap();
        for ts in [100u128, 300, 200] {
            fs::write(td.path().join(format!("{ts}-abc.json")), "{}").unwrap();
        }
        fs::write(td.path().join("notes.txt"), "keep me").unwrap();

        let res = prune_snapshots(td.path(), Some(1)).unwrap();
        assert_eq!(res, PruneResult { pruned_count: 2, retained_count: 1 });
        assert!(td.path().join("300-abc.json").exists());
        assert!(td.path().join("notes.txt").exists());
    }

    #[test]
    fn zero_limit_is_clamped_and_none_keeps_all() {
        let td = tempfile::tempdir().unwrap();
        for ts in [1u128, 2] {
            fs::write(td.path().join(format!("{ts}-x.json")), "{}").unwrap();
        }
        assert_eq!(prune_snapshots(td.path(), None).unwrap().pruned_count, 0);
        let res = prune_snapshots(td.path(), Some(0)).unwrap();
        assert_eq!(res.retained_count, 1);
        assert!(prune_snapshots(&td.path().join("missing"), Some(1)).is_ok());
    }
}

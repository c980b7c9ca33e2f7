use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::constants::LOCK_POLL_MS;
use crate::fs::{check_site_id, SiteLayout};
use crate::types::errors::{Result, SwapError};

use super::{LockGuard, LockManager};

/// Advisory `flock` on `<root>/sites/<id>/.stackswap.lock`.
#[derive(Debug)]
pub struct FileLockManager {
    root: PathBuf,
}

impl FileLockManager {
    #[must_use]
    pub const fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

struct FileGuard {
    file: File,
}

impl Drop for FileGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

impl LockGuard for FileGuard {}

impl LockManager for FileLockManager {
    fn acquire_site_lock(&self, site_id: &str, timeout_ms: u64) -> Result<Box<dyn LockGuard>> {
        check_site_id(site_id)?;
        let t0 = Instant::now();
        let layout = SiteLayout::new(&self.root, site_id);
        std::fs::create_dir_all(layout.site_dir())?;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(layout.lock_file())?;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(Box::new(FileGuard { file })),
                Err(_e) => {
                    if t0.elapsed() >= Duration::from_millis(timeout_ms) {
                        log::warn!(target: "stackswap", "site lock for {site_id} still held after {timeout_ms}ms");
                        return Err(SwapError::TransactionInProgress(site_id.to_string()));
                    }
                    thread::sleep(Duration::from_millis(LOCK_POLL_MS));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};

    #[test]
    fn second_holder_times_out_until_release() {
        let td = tempfile::tempdir().unwrap();
        let mgr = FileLockManager::new(td.path().to_path_buf());

        let g = mgr.acquire_site_lock("s1", 200).expect("first lock");

        let barrier = Arc::new(Barrier::new(2));
        let b2 = barrier.clone();
        let root = td.path().to_path_buf();
        let h = thread::spawn(move || {
            let mgr2 = FileLockManager::new(root);
            b2.wait();
            let res = mgr2.acquire_site_lock("s1", 150);
            assert!(matches!(res, Err(SwapError::TransactionInProgress(_))));
            // other sites are independent
            assert!(mgr2.acquire_site_lock("s2", 150).is_ok());
        });
        barrier.wait();
        h.join().unwrap();

        drop(g);
        let g2 = mgr.acquire_site_lock("s1", 200).expect("lock after release");
        drop(g2);
    }
}

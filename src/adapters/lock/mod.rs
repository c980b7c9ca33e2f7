//! Per-site mutual exclusion.
//!
//! `SiteLocks` rejects a second transaction for a site inside this process without
//! waiting. A `LockManager` extends the exclusion across processes that share the
//! same engine root.
use crate::types::errors::Result;

pub mod file;
pub mod site;

pub use file::FileLockManager;
pub use site::{SiteGuard, SiteLocks};

pub trait LockGuard: Send {}

pub trait LockManager: Send + Sync {
    /// Acquire the lock for `site_id`, waiting at most `timeout_ms`.
    /// # Errors
    /// Returns `SwapError::TransactionInProgress` if another holder keeps the lock past the timeout.
    fn acquire_site_lock(&self, site_id: &str, timeout_ms: u64) -> Result<Box<dyn LockGuard>>;
}

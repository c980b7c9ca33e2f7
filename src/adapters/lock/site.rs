use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use crate::types::errors::{Result, SwapError};

/// In-process registry of sites with a transaction in flight.
#[derive(Clone, Debug, Default)]
pub struct SiteLocks {
    held: Arc<Mutex<HashSet<String>>>,
}

/// Releases the site when dropped.
#[derive(Debug)]
pub struct SiteGuard {
    held: Arc<Mutex<HashSet<String>>>,
    site_id: String,
}

impl SiteLocks {
    /// Claim `site_id` or fail immediately; never waits.
    ///
    /// # Errors
    ///
    /// Returns `SwapError::TransactionInProgress` if the site is already claimed.
    pub fn try_acquire(&self, site_id: &str) -> Result<SiteGuard> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(site_id.to_string()) {
            return Err(SwapError::TransactionInProgress(site_id.to_string()));
        }
        Ok(SiteGuard {
            held: Arc::clone(&self.held),
            site_id: site_id.to_string(),
        })
    }

    #[must_use]
    pub fn is_held(&self, site_id: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(site_id)
    }

    /// Sites currently claimed, sorted.
    #[must_use]
    pub fn held(&self) -> Vec<String> {
        let mut v: Vec<String> = self
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();
        v.sort();
        v
    }
}

impl Drop for SiteGuard {
    fn drop(&mut self) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.site_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_is_rejected_until_guard_drops() {
        let locks = SiteLocks::default();
        let g = locks.try_acquire("s1").unwrap();
        assert!(matches!(
            locks.try_acquire("s1"),
            Err(SwapError::TransactionInProgress(ref id)) if id == "s1"
        ));
        let other = locks.try_acquire("s2").unwrap();
        assert_eq!(locks.held(), vec!["s1".to_string(), "s2".to_string()]);
        drop(g);
        assert!(!locks.is_held("s1"));
        assert!(locks.try_acquire("s1").is_ok());
        drop(other);
    }
}

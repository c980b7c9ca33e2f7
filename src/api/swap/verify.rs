use std::thread;
use std::time::Duration;

use crate::adapters::ServiceController;
use crate::config::HealthPolicy;
use crate::types::errors::{Result, SwapError};
use crate::types::{ServiceTarget, Site};

/// Bounded health probe: at most `max_attempts` checks with a fixed backoff between them.
/// Returns the number of attempts used.
pub(super) fn probe(
    controller: &dyn ServiceController,
    site: &Site,
    target: &ServiceTarget,
    policy: &HealthPolicy,
) -> Result<u32> {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        if controller.health_check(site, target) {
            return Ok(attempt);
        }
        if attempt < attempts {
            thread::sleep(Duration::from_millis(policy.backoff_ms));
        }
    }
    Err(SwapError::ServiceControl(format!(
        "{target} failed health check after {attempts} attempts"
    )))
}

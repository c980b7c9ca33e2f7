use crate::types::errors::Result;
use crate::types::{ServiceStats, ServiceTarget, Site};

/// How a stop request ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopOutcome {
    /// Exited within the timeout after SIGTERM.
    Graceful,
    /// Still alive at the timeout and force-killed; recorded as degraded.
    Forced,
    /// Nothing was running for the site.
    NotRunning,
}

impl StopOutcome {
    #[must_use]
    pub const fn is_degraded(self) -> bool {
        matches!(self, StopOutcome::Forced)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            StopOutcome::Graceful => "graceful",
            StopOutcome::Forced => "forced",
            StopOutcome::NotRunning => "not_running",
        }
    }
}

/// Lifecycle control of one site's services.
///
/// Every call is bounded by its timeout or by the implementation's probe timeouts.
/// Failures are returned as `SwapError::ServiceControl` with an operator-facing message,
/// for example `"apache failed to start: port in use"`.
pub trait ServiceController: Send + Sync {
    /// # Errors
    /// Returns an error only if the stop request itself cannot be issued.
    fn stop(&self, site: &Site, target: &ServiceTarget, timeout_ms: u64) -> Result<StopOutcome>;

    /// Starting a target that is already running for the site succeeds without a second spawn.
    /// # Errors
    /// Returns an error if the service cannot be brought up within `timeout_ms`.
    fn start(&self, site: &Site, target: &ServiceTarget, timeout_ms: u64) -> Result<()>;

    /// # Errors
    /// Propagates the first failing stop or start.
    fn restart(
        &self,
        site: &Site,
        target: &ServiceTarget,
        stop_timeout_ms: u64,
        start_timeout_ms: u64,
    ) -> Result<StopOutcome> {
        let outcome = self.stop(site, target, stop_timeout_ms)?;
        self.start(site, target, start_timeout_ms)?;
        Ok(outcome)
    }

    /// A single probe attempt. Retry policy belongs to the caller.
    fn health_check(&self, site: &Site, target: &ServiceTarget) -> bool;

    fn is_running(&self, site: &Site, target: &ServiceTarget) -> bool;

    /// # Errors
    /// Returns an error if the target is not running for the site.
    fn stats(&self, site: &Site, target: &ServiceTarget) -> Result<ServiceStats>;
}

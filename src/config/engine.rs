use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_TABLE_PREFIX, SUPPORTED_PHP_VERSIONS};
use crate::types::errors::{Result, SwapError};

use super::types::{HealthPolicy, Ports, SnapshotRetention, Timeouts};

/// Engine configuration. Every knob has a default; see `constants.rs` for values.
///
/// Grouped fields mirror the concern they govern; YAML files may set any subset.
///
/// ```rust
/// use stackswap::config::EngineConfig;
/// let cfg = EngineConfig::from_yaml_str("root: /var/lib/stackswap\nhealth:\n  max_attempts: 5\n").unwrap();
/// assert_eq!(cfg.health.max_attempts, 5);
/// assert_eq!(cfg.timeouts.stop_ms, 10_000);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// State root; site config directories live under `<root>/sites/<site_id>/`.
    pub root: PathBuf,
    pub timeouts: Timeouts,
    pub health: HealthPolicy,
    pub ports: Ports,
    pub supported_php: Vec<String>,
    pub snapshot: SnapshotRetention,
    pub table_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/var/lib/stackswap"),
            timeouts: Timeouts::default(),
            health: HealthPolicy::default(),
            ports: Ports::default(),
            supported_php: SUPPORTED_PHP_VERSIONS.iter().map(|s| (*s).to_string()).collect(),
            snapshot: SnapshotRetention::default(),
            table_prefix: DEFAULT_TABLE_PREFIX.to_string(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// # Errors
    ///
    /// Returns `SwapError::Validation` if the YAML is malformed or the result fails [`validate`](Self::validate).
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_yaml::from_str(s)
            .map_err(|e| SwapError::Validation(format!("config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// # Errors
    ///
    /// Returns `SwapError::Io` if the file cannot be read, otherwise as [`from_yaml_str`](Self::from_yaml_str).
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&s)
    }

    /// # Errors
    ///
    /// Rejects zero timeouts, zero probe attempts, and an empty supported PHP set.
    pub fn validate(&self) -> Result<()> {
        if self.timeouts.stop_ms == 0 || self.timeouts.start_ms == 0 || self.timeouts.db_ms == 0 {
            return Err(SwapError::Validation("config: timeouts must be non-zero".into()));
        }
        if self.health.max_attempts == 0 {
            return Err(SwapError::Validation(
                "config: health.max_attempts must be at least 1".into(),
            ));
        }
        if self.supported_php.is_empty() {
            return Err(SwapError::Validation("config: supported_php is empty".into()));
        }
        for v in &self.supported_php {
            crate::types::options::validate_php_version(v)?;
        }
        if self.ports.http == self.ports.https {
            return Err(SwapError::Validation("config: http and https ports collide".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn supports_php(&self, version: &str) -> bool {
        self.supported_php.iter().any(|v| v == version)
    }

    /// Upper bound on one transaction's blocking time, rollback included.
    ///
    /// Forward and rollback paths each stop, start and probe once, and the
    /// database may be touched on both.
    #[must_use]
    pub fn budget_ms(&self) -> u64 {
        let probe = u64::from(self.health.max_attempts)
            .saturating_mul(self.health.connect_timeout_ms + self.health.backoff_ms);
        let one_way = self
            .timeouts
            .stop_ms
            .saturating_add(self.timeouts.start_ms)
            .saturating_add(probe)
            .saturating_add(self.timeouts.db_ms);
        one_way.saturating_mul(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = EngineConfig::default();
        assert_eq!(c.timeouts.stop_ms, 10_000);
        assert_eq!(c.health.max_attempts, 3);
        assert_eq!(c.health.backoff_ms, 500);
        assert!(c.supports_php("8.1"));
        assert!(!c.supports_php("5.6"));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn yaml_partial_override_keeps_other_defaults() {
        let c = EngineConfig::from_yaml_str(
            "root: /tmp/x\ntimeouts:\n  stop_ms: 250\nsupported_php: ['8.2']\n",
        )
        .unwrap();
        assert_eq!(c.root, PathBuf::from("/tmp/x"));
        assert_eq!(c.timeouts.stop_ms, 250);
        assert_eq!(c.timeouts.start_ms, 5_000);
        assert_eq!(c.supported_php, vec!["8.2".to_string()]);
        assert_eq!(c.table_prefix, "wp_");
    }

    #[test]
    fn invalid_configs_are_rejected() {
        assert!(EngineConfig::from_yaml_str("health:\n  max_attempts: 0\n").is_err());
        assert!(EngineConfig::from_yaml_str("supported_php: []\n").is_err());
        assert!(EngineConfig::from_yaml_str("supported_php: ['eight']\n").is_err());
        assert!(EngineConfig::from_yaml_str("timeouts: [1, 2]\n").is_err());
    }

    #[test]
    fn budget_is_bounded_sum_of_step_timeouts() {
        let c = EngineConfig::default();
        let probe = 3 * (1_000 + 500);
        assert_eq!(c.budget_ms(), 2 * (10_000 + 5_000 + probe + 5_000));
    }
}

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_DB_TIMEOUT_MS, DEFAULT_HEALTH_ATTEMPTS,
    DEFAULT_HEALTH_BACKOFF_MS, DEFAULT_HTTPS_PORT, DEFAULT_HTTP_PORT, DEFAULT_SNAPSHOT_RETENTION,
    DEFAULT_START_TIMEOUT_MS, DEFAULT_STOP_TIMEOUT_MS,
};
use crate::types::Site;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub stop_ms: u64,
    pub start_ms: u64,
    pub db_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            stop_ms: DEFAULT_STOP_TIMEOUT_MS,
            start_ms: DEFAULT_START_TIMEOUT_MS,
            db_ms: DEFAULT_DB_TIMEOUT_MS,
        }
    }
}

/// Bounded health probing: `max_attempts` tries separated by a fixed `backoff_ms`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthPolicy {
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_HEALTH_ATTEMPTS,
            backoff_ms: DEFAULT_HEALTH_BACKOFF_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ports {
    pub http: u16,
    pub https: u16,
}

impl Ports {
    /// `(http, https)` for `site`, falling back to these defaults.
    #[must_use]
    pub fn for_site(&self, site: &Site) -> (u16, u16) {
        (
            site.http_port.unwrap_or(self.http),
            site.https_port.unwrap_or(self.https),
        )
    }
}

impl Default for Ports {
    fn default() -> Self {
        Self {
            http: DEFAULT_HTTP_PORT,
            https: DEFAULT_HTTPS_PORT,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotRetention {
    /// Retained snapshots per site; `None` keeps everything.
    pub retention_count: Option<usize>,
}

impl Default for SnapshotRetention {
    fn default() -> Self {
        Self {
            retention_count: Some(DEFAULT_SNAPSHOT_RETENTION),
        }
    }
}

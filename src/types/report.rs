use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::site::WebServer;

/// Summary returned to the caller for every swap request.
///
/// Serializes to the boundary shape `{success, duration, errors}` plus the
/// post-swap values the caller should persist in its site registry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSwapResult {
    pub success: bool,
    #[serde(rename = "duration")]
    pub duration_ms: u64,
    pub errors: Vec<String>,
    /// Set when rollback could not restore a running stack; manual recovery is required.
    #[serde(default)]
    pub fatal: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_server: Option<WebServer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub php_version: Option<String>,
}

/// Point-in-time statistics for a running service; polled, never pushed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStats {
    pub uptime: String,
    pub memory: String,
    pub cpu: String,
    pub requests: u64,
}

/// Outcome of pruning retained snapshots for one site.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PruneResult {
    pub pruned_count: usize,
    pub retained_count: usize,
}

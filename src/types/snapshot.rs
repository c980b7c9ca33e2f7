use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::site::WebServer;

/// Role a captured file plays in the site's stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileRole {
    WebServerConfig,
    PhpFpmPool,
    PhpIni,
    Certificate,
}

/// Exact pre-transaction state of one file. `contents = None` records absence,
/// so restore removes whatever the transaction created there.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedFile {
    pub role: FileRole,
    pub path: PathBuf,
    pub contents: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    /// Contents were withheld when the snapshot was persisted.
    #[serde(default)]
    pub redacted: bool,
}

/// Restorable copy of a site's pre-swap configuration and relevant DB state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub id: Uuid,
    pub site_id: String,
    pub captured_at: String,
    pub captured_at_ms: u128,
    pub web_server: WebServer,
    pub php_version: String,
    pub files: Vec<CapturedFile>,
    pub cert_paths: Vec<PathBuf>,
    pub db_url_backup: Option<String>,
}

impl ConfigSnapshot {
    /// Contents of the captured web-server config for the server that was live.
    #[must_use]
    pub fn web_server_config_blob(&self) -> Option<&str> {
        self.files
            .iter()
            .find(|f| f.role == FileRole::WebServerConfig && f.contents.is_some())
            .and_then(|f| f.contents.as_deref())
    }

    /// Contents of the captured PHP-FPM pool config for the version that was live.
    #[must_use]
    pub fn php_fpm_config_blob(&self) -> Option<&str> {
        self.files
            .iter()
            .find(|f| f.role == FileRole::PhpFpmPool && f.contents.is_some())
            .and_then(|f| f.contents.as_deref())
    }
}

//! On-disk layout of a site's engine-owned state.
//!
//! ```text
//! <root>/sites/<site_id>/
//!   conf/<server>/site.conf        web-server config per implementation
//!   php/<version>/pool.conf        PHP-FPM pool per version
//!   php/<version>/php.ini          per-version ini overrides
//!   certs/<server>/<domain>.crt    TLS material per server store
//!   run/php-fpm.sock               FPM socket (version independent)
//!   run/health.php                 script run by the PHP health probe
//!   logs/access.log
//!   snapshots/                     retained pre-swap snapshots
//!   wordpress.sqlite               site database (SQLite backend)
//! ```
use std::path::{Path, PathBuf};

use crate::constants::SITE_LOCK_FILE;
use crate::types::errors::{Result, SwapError};
use crate::types::WebServer;

/// `true` when `id` is a single safe path component: ASCII alphanumerics plus `-`, `_`, `.`.
#[must_use]
pub fn is_valid_site_id(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.')
}

/// # Errors
///
/// Returns `SwapError::Validation` unless `id` passes [`is_valid_site_id`].
pub fn check_site_id(id: &str) -> Result<()> {
    if is_valid_site_id(id) {
        Ok(())
    } else {
        Err(SwapError::Validation(format!("invalid site id '{id}'")))
    }
}

#[derive(Clone, Debug)]
pub struct SiteLayout {
    site_dir: PathBuf,
}

impl SiteLayout {
    #[must_use]
    pub fn new(root: &Path, site_id: &str) -> Self {
        Self {
            site_dir: root.join("sites").join(site_id),
        }
    }

    #[must_use]
    pub fn site_dir(&self) -> &Path {
        &self.site_dir
    }

    #[must_use]
    pub fn web_config(&self, server: WebServer) -> PathBuf {
        self.site_dir.join("conf").join(server.as_str()).join("site.conf")
    }

    #[must_use]
    pub fn php_pool(&self, version: &str) -> PathBuf {
        self.site_dir.join("php").join(version).join("pool.conf")
    }

    #[must_use]
    pub fn php_ini(&self, version: &str) -> PathBuf {
        self.site_dir.join("php").join(version).join("php.ini")
    }

    #[must_use]
    pub fn cert_dir(&self, server: WebServer) -> PathBuf {
        self.site_dir.join("certs").join(server.as_str())
    }

    #[must_use]
    pub fn cert_file(&self, server: WebServer, domain: &str) -> PathBuf {
        self.cert_dir(server).join(format!("{domain}.crt"))
    }

    #[must_use]
    pub fn key_file(&self, server: WebServer, domain: &str) -> PathBuf {
        self.cert_dir(server).join(format!("{domain}.key"))
    }

    #[must_use]
    pub fn fpm_socket(&self) -> PathBuf {
        self.site_dir.join("run").join("php-fpm.sock")
    }

    #[must_use]
    pub fn access_log(&self) -> PathBuf {
        self.site_dir.join("logs").join("access.log")
    }

    #[must_use]
    pub fn error_log(&self) -> PathBuf {
        self.site_dir.join("logs").join("error.log")
    }

    #[must_use]
    pub fn snapshot_dir(&self) -> PathBuf {
        self.site_dir.join("snapshots")
    }

    #[must_use]
    pub fn database(&self) -> PathBuf {
        self.site_dir.join("wordpress.sqlite")
    }

    /// Script the PHP health probe runs through the FPM pool.
    #[must_use]
    pub fn probe_script(&self) -> PathBuf {
        self.site_dir.join("run").join("health.php")
    }

    #[must_use]
    pub fn lock_file(&self) -> PathBuf {
        self.site_dir.join(SITE_LOCK_FILE)
    }
}

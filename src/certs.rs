//! TLS material migration between web-server certificate stores.
//!
//! Material is copied, never moved: the source store stays intact, so pointing the old
//! server back at it is enough to roll back.
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::config::EngineConfig;
use crate::fs::{write_atomic, SiteLayout};
use crate::types::errors::{Result, SwapError};
use crate::types::{Site, WebServer};

/// Paths written (or already identical) in the target store.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CertMigration {
    pub copied: Vec<PathBuf>,
    pub unchanged: Vec<PathBuf>,
}

impl CertMigration {
    #[must_use]
    pub fn touched(&self) -> bool {
        !self.copied.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct CertificateMigrator {
    root: PathBuf,
}

fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

impl CertificateMigrator {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            root: config.root.clone(),
        }
    }

    /// Paths in `to`'s store that a migration for `site` may write.
    #[must_use]
    pub fn target_paths(&self, site: &Site, to: WebServer) -> Vec<PathBuf> {
        let layout = SiteLayout::new(&self.root, &site.id);
        vec![layout.cert_file(to, &site.domain), layout.key_file(to, &site.domain)]
    }

    /// Copy the site's certificate and key from `from`'s store into `to`'s.
    ///
    /// # Errors
    ///
    /// Returns `SwapError::CertificateMigration` if the source material is missing
    /// or the target store cannot be written.
    pub fn migrate(&self, site: &Site, from: WebServer, to: WebServer) -> Result<CertMigration> {
        let layout = SiteLayout::new(&self.root, &site.id);
        let pairs = [
            (layout.cert_file(from, &site.domain), layout.cert_file(to, &site.domain), 0o644),
            (layout.key_file(from, &site.domain), layout.key_file(to, &site.domain), 0o600),
        ];
        let mut out = CertMigration::default();
        if from == to {
            return Ok(out);
        }
        for (src, dst, mode) in &pairs {
            let bytes = read_source(src)?;
            if let Ok(existing) = std::fs::read(dst) {
                if digest(&existing) == digest(&bytes) {
                    out.unchanged.push(dst.clone());
                    continue;
                }
            }
            write_atomic(dst, &bytes, *mode).map_err(|e| {
                SwapError::CertificateMigration(format!("cannot write {}: {e}", dst.display()))
            })?;
            out.copied.push(dst.clone());
        }
        log::debug!(
            target: "stackswap",
            "certificates for {} migrated {from} -> {to}: {} copied, {} unchanged",
            site.id,
            out.copied.len(),
            out.unchanged.len()
        );
        Ok(out)
    }
}

fn read_source(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        SwapError::CertificateMigration(format!("cannot read {}: {e}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn site() -> Site {
        Site {
            id: "s1".into(),
            domain: "blog.test".into(),
            web_server: WebServer::Nginx,
            php_version: "8.1".into(),
            ssl: true,
            doc_root: PathBuf::from("/srv/blog"),
            http_port: None,
            https_port: None,
        }
    }

    fn seed(root: &Path) -> SiteLayout {
        let layout = SiteLayout::new(root, "s1");
        write_atomic(&layout.cert_file(WebServer::Nginx, "blog.test"), b"CERT", 0o644).unwrap();
        write_atomic(&layout.key_file(WebServer::Nginx, "blog.test"), b"KEY", 0o600).unwrap();
        layout
    }

    #[test]
    fn copies_material_and_keeps_source() {
        let td = tempfile::tempdir().unwrap();
        let layout = seed(td.path());
        let m = CertificateMigrator::new(&EngineConfig::with_root(td.path()));
        let res = m.migrate(&site(), WebServer::Nginx, WebServer::Apache).unwrap();
        assert_eq!(res.copied.len(), 2);
        let key = layout.key_file(WebServer::Apache, "blog.test");
        assert_eq!(std::fs::read(&key).unwrap(), b"KEY");
        assert_eq!(std::fs::metadata(&key).unwrap().permissions().mode() & 0o777, 0o600);
        assert!(layout.cert_file(WebServer::Nginx, "blog.test").exists());

        let again = m.migrate(&site(), WebServer::Nginx, WebServer::Apache).unwrap();
        assert!(!again.touched());
        assert_eq!(again.unchanged.len(), 2);
    }

    #[test]
    fn missing_source_is_a_migration_error() {
        let td = tempfile::tempdir().unwrap();
        let m = CertificateMigrator::new(&EngineConfig::with_root(td.path()));
        assert!(matches!(
            m.migrate(&site(), WebServer::Nginx, WebServer::Apache),
            Err(SwapError::CertificateMigration(_))
        ));
    }
}

use std::path::PathBuf;

use crate::api::StackSwap;
use crate::db::SiteDatabase;
use crate::logging::{AuditSink, FactsEmitter};
use crate::snapshot::CapturePlan;
use crate::types::errors::{Result, SwapError};
use crate::types::options::validate_php_version;
use crate::types::{FileRole, ServiceTarget, Site, WebServer};

use super::SwapRequest;

/// Everything the later stages need, resolved while nothing has been touched.
pub(super) struct SwapPlan {
    pub from: ServiceTarget,
    pub to: ServiceTarget,
    /// Whose prior config supplies carried-over custom lines and extensions.
    pub extras_source: ServiceTarget,
    pub preserve_config: bool,
    pub migrate_extensions: bool,
    pub migrate_certs: Option<(WebServer, WebServer)>,
    /// Web server to restart after a runtime swap.
    pub restart_web: Option<ServiceTarget>,
    pub new_url: Option<String>,
    pub db: Option<Box<dyn SiteDatabase>>,
    pub retain_snapshot: bool,
    pub next_web: WebServer,
    pub next_php: String,
}

/// Check the request against the site and the engine, and resolve it into a plan.
pub(super) fn plan<E: FactsEmitter, A: AuditSink>(
    api: &StackSwap<E, A>,
    site: &Site,
    req: &SwapRequest,
) -> Result<SwapPlan> {
    if site.id.trim().is_empty() {
        return Err(SwapError::Validation("site id is empty".into()));
    }
    validate_php_version(&site.php_version)?;
    let plan = match req {
        SwapRequest::WebServer(opts) => {
            opts.validate()?;
            if site.web_server != opts.from_server {
                return Err(SwapError::Validation(format!(
                    "site {} is served by {}, not {}",
                    site.id, site.web_server, opts.from_server
                )));
            }
            let migrate_certs = (site.ssl && opts.migrate_ssl_certs)
                .then_some((opts.from_server, opts.to_server));
            if site.ssl {
                let required = if opts.migrate_ssl_certs {
                    api.certs.target_paths(site, opts.from_server)
                } else {
                    api.certs.target_paths(site, opts.to_server)
                };
                if let Some(missing) = required.iter().find(|p| !p.exists()) {
                    return Err(SwapError::Validation(format!(
                        "tls material missing at {}; enable migrateSslCerts or install it for {}",
                        missing.display(),
                        opts.to_server
                    )));
                }
            }
            let to = ServiceTarget::web(opts.to_server);
            SwapPlan {
                from: ServiceTarget::web(opts.from_server),
                extras_source: to.clone(),
                to,
                preserve_config: opts.preserve_config,
                migrate_extensions: false,
                migrate_certs,
                restart_web: None,
                new_url: opts.new_url.clone(),
                db: None,
                retain_snapshot: opts.backup_configs,
                next_web: opts.to_server,
                next_php: site.php_version.clone(),
            }
        }
        SwapRequest::PhpVersion(opts) => {
            opts.validate()?;
            if !api.config.supports_php(&opts.new_version) {
                return Err(SwapError::Validation(format!(
                    "php {} is not a supported version",
                    opts.new_version
                )));
            }
            if opts.new_version == site.php_version {
                return Err(SwapError::Validation(format!(
                    "php {} is already the current version",
                    opts.new_version
                )));
            }
            let from = ServiceTarget::php(&site.php_version);
            SwapPlan {
                extras_source: from.clone(),
                from,
                to: ServiceTarget::php(&opts.new_version),
                preserve_config: opts.preserve_config,
                migrate_extensions: opts.migrate_extensions,
                migrate_certs: None,
                restart_web: opts
                    .restart_services
                    .then(|| ServiceTarget::web(site.web_server)),
                new_url: None,
                db: None,
                // runtime swaps keep their snapshot like any other
                retain_snapshot: true,
                next_web: site.web_server,
                next_php: opts.new_version.clone(),
            }
        }
    };

    // Malformed descriptors surface here, before any side effect.
    api.translator.translate(site, &plan.to)?;

    let mut plan = plan;
    if plan.new_url.is_some() {
        let locator = api.databases.as_ref().ok_or_else(|| {
            SwapError::Validation("url rewrite requested but no database is configured".into())
        })?;
        let db = locator.open(site)?.ok_or_else(|| {
            SwapError::Validation(format!("url rewrite requested but site {} has no database", site.id))
        })?;
        plan.db = Some(db);
    }
    Ok(plan)
}

impl SwapPlan {
    /// Every file the transaction may write, captured whether or not it exists yet.
    pub(super) fn capture_plan<E: FactsEmitter, A: AuditSink>(
        &self,
        api: &StackSwap<E, A>,
        site: &Site,
        db_url: Option<String>,
    ) -> CapturePlan {
        let layout = api.translator.layout(site);
        let mut files: Vec<(FileRole, PathBuf)> = Vec::new();
        match (self.from.web_server(), self.to.web_server()) {
            (Some(from), Some(to)) => {
                files.push((FileRole::WebServerConfig, layout.web_config(from)));
                files.push((FileRole::WebServerConfig, layout.web_config(to)));
                files.push((FileRole::PhpFpmPool, layout.php_pool(&site.php_version)));
            }
            _ => {
                files.push((FileRole::WebServerConfig, layout.web_config(site.web_server)));
                for version in [&self.from.identifier, &self.to.identifier] {
                    files.push((FileRole::PhpFpmPool, layout.php_pool(version)));
                    files.push((FileRole::PhpIni, layout.php_ini(version)));
                }
            }
        }
        if let Some((_, to)) = self.migrate_certs {
            for p in api.certs.target_paths(site, to) {
                files.push((FileRole::Certificate, p));
            }
        }
        CapturePlan { files, db_url }
    }
}

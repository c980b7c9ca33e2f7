//! Config translation: a site's logical descriptor to the target stack's config files.
//!
//! `translate`/`translate_with` are pure and deterministic: identical input yields
//! byte-identical output. Reading prior configs (`gather_extras`) and writing the
//! result (`materialize`) are separate, explicit I/O steps.
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::{EngineConfig, Ports};
use crate::fs::{is_valid_site_id, write_atomic, SiteLayout};
use crate::types::errors::{Result, SwapError};
use crate::types::{FileRole, ServiceTarget, Site, TargetKind, WebServer};

mod apache;
pub mod managed;
mod nginx;
pub mod php;

/// Comment prefix used by each config file role.
#[must_use]
pub const fn comment_for(role: FileRole) -> &'static str {
    match role {
        FileRole::WebServerConfig | FileRole::Certificate => "#",
        FileRole::PhpFpmPool | FileRole::PhpIni => ";",
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigFile {
    pub role: FileRole,
    pub path: PathBuf,
    pub contents: String,
}

/// Config files produced for one target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigArtifacts {
    pub target: ServiceTarget,
    pub files: Vec<ConfigFile>,
}

/// Inputs carried over from the prior config.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TranslateExtras {
    /// Operator-owned lines per role, re-injected verbatim after the managed block.
    pub custom: HashMap<FileRole, String>,
    /// Normalized extension lines for the PHP ini.
    pub extensions: Vec<String>,
}

pub(crate) struct RenderCtx<'a> {
    pub site: &'a Site,
    pub http_port: u16,
    pub https_port: u16,
    pub socket: PathBuf,
    pub access_log: PathBuf,
    pub error_log: PathBuf,
    pub tls: Option<(PathBuf, PathBuf)>,
}

#[derive(Clone, Debug)]
pub struct ConfigTranslator {
    root: PathBuf,
    ports: Ports,
}

impl ConfigTranslator {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            root: config.root.clone(),
            ports: config.ports.clone(),
        }
    }

    #[must_use]
    pub fn layout(&self, site: &Site) -> SiteLayout {
        SiteLayout::new(&self.root, &site.id)
    }

    /// # Errors
    ///
    /// Returns `SwapError::ConfigTranslation` for a malformed descriptor or target.
    pub fn translate(&self, site: &Site, target: &ServiceTarget) -> Result<ConfigArtifacts> {
        self.translate_with(site, target, &TranslateExtras::default())
    }

    /// # Errors
    ///
    /// Returns `SwapError::ConfigTranslation` for a malformed descriptor or target.
    pub fn translate_with(
        &self,
        site: &Site,
        target: &ServiceTarget,
        extras: &TranslateExtras,
    ) -> Result<ConfigArtifacts> {
        validate_descriptor(site)?;
        let (http_port, https_port) = self.ports.for_site(site);
        if site.ssl && http_port == https_port {
            return Err(SwapError::ConfigTranslation(format!(
                "site {} would listen on port {http_port} for both http and https",
                site.id
            )));
        }
        let layout = self.layout(site);
        let files = match target.kind {
            TargetKind::WebServer => {
                let server = target.web_server().ok_or_else(|| {
                    SwapError::ConfigTranslation(format!("unknown web server '{}'", target.identifier))
                })?;
                let ctx = self.render_ctx(site, &layout, Some(server));
                let body = match server {
                    WebServer::Nginx => nginx::render(&ctx),
                    WebServer::Apache => apache::render(&ctx),
                };
                vec![finish(FileRole::WebServerConfig, layout.web_config(server), &body, extras)]
            }
            TargetKind::PhpRuntime => {
                let version = target.identifier.as_str();
                crate::types::options::validate_php_version(version)
                    .map_err(|e| SwapError::ConfigTranslation(e.to_string()))?;
                let ctx = self.render_ctx(site, &layout, None);
                let pool = php::render_pool(&ctx);
                let mut exts = extras.extensions.clone();
                exts.sort();
                exts.dedup();
                let ini = php::render_ini(&ctx, version, &exts);
                vec![
                    finish(FileRole::PhpFpmPool, layout.php_pool(version), &pool, extras),
                    finish(FileRole::PhpIni, layout.php_ini(version), &ini, extras),
                ]
            }
        };
        Ok(ConfigArtifacts {
            target: target.clone(),
            files,
        })
    }

    /// Read the prior config for `from` and collect what should carry over to the next translation.
    ///
    /// # Errors
    ///
    /// Returns `SwapError::ConfigTranslation` if a prior config has a malformed managed block,
    /// or `SwapError::Io` if it exists but cannot be read.
    pub fn gather_extras(
        &self,
        site: &Site,
        from: &ServiceTarget,
        preserve_config: bool,
        migrate_extensions: bool,
    ) -> Result<TranslateExtras> {
        let layout = self.layout(site);
        let mut extras = TranslateExtras::default();
        match from.kind {
            TargetKind::WebServer => {
                if let Some(server) = from.web_server() {
                    if preserve_config {
                        if let Some(text) = read_optional(&layout.web_config(server))? {
                            let custom = managed::extract_custom(&text, "#")?;
                            extras.custom.insert(FileRole::WebServerConfig, custom);
                        }
                    }
                }
            }
            TargetKind::PhpRuntime => {
                let version = from.identifier.as_str();
                if preserve_config {
                    if let Some(text) = read_optional(&layout.php_pool(version))? {
                        let custom = managed::extract_custom(&text, ";")?;
                        extras.custom.insert(FileRole::PhpFpmPool, custom);
                    }
                }
                if let Some(text) = read_optional(&layout.php_ini(version))? {
                    let custom = managed::extract_custom(&text, ";")?;
                    if migrate_extensions {
                        let in_custom = php::extract_extensions(&custom);
                        let managed_lines = managed::managed_section(&text, ";").join("\n");
                        extras.extensions = php::extract_extensions(&managed_lines)
                            .into_iter()
                            .filter(|e| !(preserve_config && in_custom.contains(e)))
                            .collect();
                        if !preserve_config {
                            extras.extensions.extend(in_custom);
                            extras.extensions.sort();
                            extras.extensions.dedup();
                        }
                    }
                    if preserve_config {
                        extras.custom.insert(FileRole::PhpIni, custom);
                    }
                }
            }
        }
        Ok(extras)
    }

    /// Write every artifact atomically.
    ///
    /// # Errors
    ///
    /// Returns `SwapError::ConfigTranslation` naming the first path that could not be written.
    pub fn materialize(&self, artifacts: &ConfigArtifacts) -> Result<()> {
        for f in &artifacts.files {
            write_atomic(&f.path, f.contents.as_bytes(), 0o644).map_err(|e| {
                SwapError::ConfigTranslation(format!("cannot write {}: {e}", f.path.display()))
            })?;
        }
        Ok(())
    }

    fn render_ctx<'a>(
        &self,
        site: &'a Site,
        layout: &SiteLayout,
        server: Option<WebServer>,
    ) -> RenderCtx<'a> {
        let tls = match server {
            Some(s) if site.ssl => Some((
                layout.cert_file(s, &site.domain),
                layout.key_file(s, &site.domain),
            )),
            _ => None,
        };
        let (http_port, https_port) = self.ports.for_site(site);
        RenderCtx {
            site,
            http_port,
            https_port,
            socket: layout.fpm_socket(),
            access_log: layout.access_log(),
            error_log: layout.error_log(),
            tls,
        }
    }
}

fn finish(role: FileRole, path: PathBuf, body: &str, extras: &TranslateExtras) -> ConfigFile {
    let comment = comment_for(role);
    let generated = managed::wrap(comment, body);
    let contents = match extras.custom.get(&role) {
        Some(custom) => managed::merge(&generated, custom),
        None => generated,
    };
    ConfigFile {
        role,
        path,
        contents,
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SwapError::Io(e)),
    }
}

fn validate_descriptor(site: &Site) -> Result<()> {
    if !is_valid_site_id(&site.id) {
        return Err(SwapError::ConfigTranslation(format!("invalid site id '{}'", site.id)));
    }
    let domain_ok = !site.domain.is_empty()
        && !site.domain.starts_with(['.', '-'])
        && site
            .domain
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'.');
    if !domain_ok {
        return Err(SwapError::ConfigTranslation(format!("invalid domain '{}'", site.domain)));
    }
    if !site.doc_root.is_absolute() {
        return Err(SwapError::ConfigTranslation(format!(
            "document root must be absolute: {}",
            site.doc_root.display()
        )));
    }
    let root_str = site.doc_root.to_string_lossy();
    if root_str.contains(['"', '\n', ';', '{', '}']) {
        return Err(SwapError::ConfigTranslation(format!(
            "document root contains config metacharacters: {root_str}"
        )));
    }
    Ok(())
}

//! Command contracts accepted at the engine boundary.
//!
//! Every recognized option is enumerated here with its default; `validate()`
//! performs the structural checks that do not need the site or the engine config.
use serde::{Deserialize, Serialize};

use super::errors::{Result, SwapError};
use super::site::WebServer;

/// Options for `SwapWebServer`.
///
/// Defaults (via [`SwapServerOptions::new`]):
/// - `preserve_config = true`: directives outside the managed block are carried over.
/// - `migrate_ssl_certs = false`
/// - `backup_configs = true`: the pre-swap snapshot is retained on disk after commit.
/// - `new_url = None`: no database URL rewrite.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapServerOptions {
    pub from_server: WebServer,
    pub to_server: WebServer,
    #[serde(default = "default_true")]
    pub preserve_config: bool,
    #[serde(default)]
    pub migrate_ssl_certs: bool,
    #[serde(default = "default_true")]
    pub backup_configs: bool,
    #[serde(default)]
    pub new_url: Option<String>,
}

impl SwapServerOptions {
    #[must_use]
    pub fn new(from_server: WebServer, to_server: WebServer) -> Self {
        Self {
            from_server,
            to_server,
            preserve_config: true,
            migrate_ssl_certs: false,
            backup_configs: true,
            new_url: None,
        }
    }

    /// # Errors
    ///
    /// Returns `SwapError::Validation` when source and target coincide or `new_url` is malformed.
    pub fn validate(&self) -> Result<()> {
        if self.from_server == self.to_server {
            return Err(SwapError::Validation(format!(
                "target {} is already the current web server",
                self.to_server
            )));
        }
        if let Some(url) = &self.new_url {
            validate_url(url)?;
        }
        Ok(())
    }
}

/// Options for `ChangePHPVersion`.
///
/// Defaults (via [`PhpVersionChangeOptions::new`]):
/// - `migrate_extensions = true`: `extension=` lines follow the site to the new version.
/// - `preserve_config = true`
/// - `restart_services = true`: the web server is restarted after the runtime swap.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhpVersionChangeOptions {
    pub new_version: String,
    #[serde(default = "default_true")]
    pub migrate_extensions: bool,
    #[serde(default = "default_true")]
    pub preserve_config: bool,
    #[serde(default = "default_true")]
    pub restart_services: bool,
}

impl PhpVersionChangeOptions {
    #[must_use]
    pub fn new(new_version: impl Into<String>) -> Self {
        Self {
            new_version: new_version.into(),
            migrate_extensions: true,
            preserve_config: true,
            restart_services: true,
        }
    }

    /// # Errors
    ///
    /// Returns `SwapError::Validation` when `new_version` is not of the form `MAJOR.MINOR`.
    pub fn validate(&self) -> Result<()> {
        validate_php_version(&self.new_version)
    }
}

const fn default_true() -> bool {
    true
}

pub(crate) fn validate_php_version(v: &str) -> Result<()> {
    let ok = v
        .split_once('.')
        .is_some_and(|(major, minor)| {
            !major.is_empty()
                && !minor.is_empty()
                && major.bytes().all(|b| b.is_ascii_digit())
                && minor.bytes().all(|b| b.is_ascii_digit())
        });
    if ok {
        Ok(())
    } else {
        Err(SwapError::Validation(format!("malformed PHP version '{v}'")))
    }
}

pub(crate) fn validate_url(url: &str) -> Result<()> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| SwapError::Validation(format!("url '{url}' must start with http:// or https://")))?;
    if rest.is_empty() || rest.contains(char::is_whitespace) {
        return Err(SwapError::Validation(format!("malformed url '{url}'")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_defaults_are_documented_values() {
        let o = SwapServerOptions::new(WebServer::Nginx, WebServer::Apache);
        assert!(o.preserve_config);
        assert!(!o.migrate_ssl_certs);
        assert!(o.backup_configs);
        assert!(o.new_url.is_none());
        assert!(o.validate().is_ok());
    }

    #[test]
    fn same_server_is_rejected() {
        let o = SwapServerOptions::new(WebServer::Nginx, WebServer::Nginx);
        assert!(matches!(o.validate(), Err(SwapError::Validation(_))));
    }

    #[test]
    fn php_version_shape() {
        assert!(PhpVersionChangeOptions::new("8.2").validate().is_ok());
        assert!(PhpVersionChangeOptions::new("8").validate().is_err());
        assert!(PhpVersionChangeOptions::new("8.x").validate().is_err());
        assert!(PhpVersionChangeOptions::new("").validate().is_err());
    }

    #[test]
    fn url_shape() {
        assert!(validate_url("https://example.test").is_ok());
        assert!(validate_url("ftp://example.test").is_err());
        assert!(validate_url("http://").is_err());
    }

    #[test]
    fn options_deserialize_from_camel_case_with_defaults() {
        let o: SwapServerOptions =
            serde_json::from_str(r#"{"fromServer":"nginx","toServer":"apache"}"#).unwrap();
        assert_eq!(o, SwapServerOptions::new(WebServer::Nginx, WebServer::Apache));
        let p: PhpVersionChangeOptions =
            serde_json::from_str(r#"{"newVersion":"8.3","restartServices":false}"#).unwrap();
        assert!(!p.restart_services);
        assert!(p.migrate_extensions);
    }
}

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::SwapError;

/// Web-server implementations a site can be served by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebServer {
    Nginx,
    Apache,
}

impl WebServer {
    pub const ALL: [WebServer; 2] = [WebServer::Nginx, WebServer::Apache];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            WebServer::Nginx => "nginx",
            WebServer::Apache => "apache",
        }
    }
}

impl fmt::Display for WebServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebServer {
    type Err = SwapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nginx" => Ok(WebServer::Nginx),
            "apache" | "apache2" | "httpd" => Ok(WebServer::Apache),
            other => Err(SwapError::Validation(format!("unknown web server '{other}'"))),
        }
    }
}

/// Read-only site descriptor handed in by the site registry for one operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub id: String,
    pub domain: String,
    pub web_server: WebServer,
    pub php_version: String,
    pub ssl: bool,
    pub doc_root: PathBuf,
    /// Listen ports for this site; the engine-wide `ports` apply when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https_port: Option<u16>,
}

impl Site {
    /// Canonical site URL as WordPress stores it in `siteurl`/`home`.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.ssl { "https" } else { "http" };
        format!("{scheme}://{}", self.domain)
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

use super::site::WebServer;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TargetKind {
    WebServer,
    PhpRuntime,
}

/// What a swap moves from or to: a web-server name or a PHP version.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceTarget {
    pub kind: TargetKind,
    pub identifier: String,
}

impl ServiceTarget {
    #[must_use]
    pub fn web(server: WebServer) -> Self {
        Self {
            kind: TargetKind::WebServer,
            identifier: server.as_str().to_string(),
        }
    }

    #[must_use]
    pub fn php(version: &str) -> Self {
        Self {
            kind: TargetKind::PhpRuntime,
            identifier: version.to_string(),
        }
    }

    /// The web server named by this target, if it is a web-server target.
    #[must_use]
    pub fn web_server(&self) -> Option<WebServer> {
        match self.kind {
            TargetKind::WebServer => self.identifier.parse().ok(),
            TargetKind::PhpRuntime => None,
        }
    }
}

impl fmt::Display for ServiceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TargetKind::WebServer => f.write_str(&self.identifier),
            TargetKind::PhpRuntime => write!(f, "php-fpm {}", self.identifier),
        }
    }
}

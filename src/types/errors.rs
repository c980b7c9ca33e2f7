//! Error types used across stackswap.
use thiserror::Error;

/// Error taxonomy for swap operations and the leaf components they drive.
///
/// `ServiceControl` carries a fully formed, operator-facing message (e.g.
/// `"apache failed to start: port in use"`) and displays it verbatim.
#[derive(Debug, Error)]
pub enum SwapError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("transaction already in progress for site {0}")]
    TransactionInProgress(String),
    #[error("snapshot error: {0}")]
    Snapshot(String),
    #[error("{0}")]
    ServiceControl(String),
    #[error("config translation error: {0}")]
    ConfigTranslation(String),
    #[error("database rewrite error: {0}")]
    DatabaseRewrite(String),
    #[error("certificate migration error: {0}")]
    CertificateMigration(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for SwapError {
    fn from(e: rusqlite::Error) -> Self {
        SwapError::DatabaseRewrite(e.to_string())
    }
}

/// Convenient alias for results returning a `SwapError`.
pub type Result<T> = std::result::Result<T, SwapError>;

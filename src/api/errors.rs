use crate::types::errors::SwapError;

// Stable identifiers attached to failure facts.
// SCREAMING_SNAKE_CASE matches the emitted ids.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorId {
    E_VALIDATION,
    E_IN_PROGRESS,
    E_SNAPSHOT,
    E_SERVICE,
    E_TRANSLATE,
    E_DB_REWRITE,
    E_CERT,
    E_ROLLBACK_FAILED,
    E_HEALTH,
    E_GENERIC,
}

#[must_use]
pub const fn id_str(id: ErrorId) -> &'static str {
    match id {
        ErrorId::E_VALIDATION => "E_VALIDATION",
        ErrorId::E_IN_PROGRESS => "E_IN_PROGRESS",
        ErrorId::E_SNAPSHOT => "E_SNAPSHOT",
        ErrorId::E_SERVICE => "E_SERVICE",
        ErrorId::E_TRANSLATE => "E_TRANSLATE",
        ErrorId::E_DB_REWRITE => "E_DB_REWRITE",
        ErrorId::E_CERT => "E_CERT",
        ErrorId::E_ROLLBACK_FAILED => "E_ROLLBACK_FAILED",
        ErrorId::E_HEALTH => "E_HEALTH",
        ErrorId::E_GENERIC => "E_GENERIC",
    }
}

#[must_use]
pub const fn exit_code_for(id: ErrorId) -> i32 {
    match id {
        ErrorId::E_VALIDATION => 10,
        ErrorId::E_IN_PROGRESS => 15,
        ErrorId::E_SNAPSHOT => 20,
        ErrorId::E_SERVICE => 30,
        ErrorId::E_TRANSLATE => 40,
        ErrorId::E_DB_REWRITE => 50,
        ErrorId::E_CERT => 60,
        ErrorId::E_ROLLBACK_FAILED => 70,
        ErrorId::E_HEALTH => 80,
        ErrorId::E_GENERIC => 1,
    }
}

impl SwapError {
    #[must_use]
    pub const fn error_id(&self) -> ErrorId {
        match self {
            SwapError::Validation(_) => ErrorId::E_VALIDATION,
            SwapError::TransactionInProgress(_) => ErrorId::E_IN_PROGRESS,
            SwapError::Snapshot(_) => ErrorId::E_SNAPSHOT,
            SwapError::ServiceControl(_) => ErrorId::E_SERVICE,
            SwapError::ConfigTranslation(_) => ErrorId::E_TRANSLATE,
            SwapError::DatabaseRewrite(_) => ErrorId::E_DB_REWRITE,
            SwapError::CertificateMigration(_) => ErrorId::E_CERT,
            SwapError::Io(_) => ErrorId::E_GENERIC,
        }
    }
}

/// Best-effort mapping from collected error strings to an ordered chain of stable ids.
/// The chain is de-duplicated and never empty.
#[must_use]
pub fn infer_summary_error_ids(errors: &[String]) -> Vec<&'static str> {
    let mut out: Vec<&'static str> = Vec::new();
    let joined = errors.join("; ").to_lowercase();
    if joined.contains("validation failed") {
        out.push(id_str(ErrorId::E_VALIDATION));
    }
    if joined.contains("in progress") {
        out.push(id_str(ErrorId::E_IN_PROGRESS));
    }
    if joined.contains("snapshot") {
        out.push(id_str(ErrorId::E_SNAPSHOT));
    }
    if joined.contains("failed to start") || joined.contains("failed to stop") {
        out.push(id_str(ErrorId::E_SERVICE));
    }
    if joined.contains("health check") {
        out.push(id_str(ErrorId::E_HEALTH));
    }
    if joined.contains("config translation") {
        out.push(id_str(ErrorId::E_TRANSLATE));
    }
    if joined.contains("database rewrite") {
        out.push(id_str(ErrorId::E_DB_REWRITE));
    }
    if joined.contains("certificate") {
        out.push(id_str(ErrorId::E_CERT));
    }
    if joined.contains("manual recovery") || joined.contains("rollback") {
        out.push(id_str(ErrorId::E_ROLLBACK_FAILED));
    }
    if out.is_empty() {
        out.push(id_str(ErrorId::E_GENERIC));
    }
    let mut seen = std::collections::HashSet::new();
    out.into_iter().filter(|id| seen.insert(*id)).collect()
}

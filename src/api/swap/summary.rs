use serde_json::json;

use crate::api::errors::{infer_summary_error_ids, ErrorId};
use crate::logging::StageLogger;
use crate::types::{ServiceSwapResult, SwapTransaction, TxState, WebServer};

/// Builder for the `swap.result` fact and the caller-facing result.
pub(super) struct SwapSummary {
    budget_ms: u64,
    degraded: bool,
    primary: Option<ErrorId>,
    post_state: Option<(WebServer, String)>,
}

impl SwapSummary {
    pub(super) fn new(budget_ms: u64) -> Self {
        Self {
            budget_ms,
            degraded: false,
            primary: None,
            post_state: None,
        }
    }

    pub(super) fn degraded(mut self, degraded: bool) -> Self {
        self.degraded = degraded;
        self
    }

    /// Id of the error that ended the transaction.
    pub(super) fn primary(mut self, id: ErrorId) -> Self {
        self.primary = Some(id);
        self
    }

    /// Web server and PHP version serving the site once the transaction is terminal.
    pub(super) fn post_state(mut self, web: WebServer, php: &str) -> Self {
        self.post_state = Some((web, php.to_string()));
        self
    }

    pub(super) fn emit(
        self,
        slog: &StageLogger<'_>,
        tx: &SwapTransaction,
        duration_ms: u64,
    ) -> ServiceSwapResult {
        let success = tx.state == TxState::Committed;
        let fatal = tx.state == TxState::Failed && self.primary == Some(ErrorId::E_ROLLBACK_FAILED);
        let mut ev = slog
            .result()
            .field("from", json!(tx.from_target.to_string()))
            .field("to", json!(tx.to_target.to_string()))
            .field("state", json!(tx.state.as_str()))
            .field("fatal", json!(fatal))
            .field("degraded", json!(self.degraded))
            .field("duration_ms", json!(duration_ms))
            .field("budget_ms", json!(self.budget_ms));
        if success {
            ev.emit_success();
        } else {
            ev = ev
                .field("errors", json!(tx.errors))
                .field("summary_error_ids", json!(infer_summary_error_ids(&tx.errors)));
            if let Some(id) = self.primary {
                ev = ev.error_id(id);
            }
            ev.emit_failure();
        }

        let (web_server, php_version) = match self.post_state {
            Some((w, p)) => (Some(w), Some(p)),
            None => (None, None),
        };
        ServiceSwapResult {
            success,
            duration_ms,
            errors: tx.errors.clone(),
            fatal,
            transaction_id: Some(tx.id),
            web_server,
            php_version,
        }
    }
}

use serde_json::json;

use crate::api::errors::ErrorId;
use crate::api::StackSwap;
use crate::logging::{AuditSink, FactsEmitter, StageLogger};
use crate::types::{ConfigSnapshot, Site};

use super::validate::SwapPlan;
use super::verify;
use super::Progress;

pub(super) struct RollbackOutcome {
    /// The original stack is running, healthy, and its config and data are restored.
    pub restored: bool,
    pub errors: Vec<String>,
}

/// Undo a failed swap: stop the target, restore the snapshot, reverse the URL rewrite,
/// bring the original stack back and probe it. Every step runs even if an earlier one fails.
pub(super) fn run<E: FactsEmitter, A: AuditSink>(
    api: &StackSwap<E, A>,
    site: &Site,
    plan: &SwapPlan,
    snapshot: &ConfigSnapshot,
    progress: &mut Progress,
    slog: &StageLogger<'_>,
) -> RollbackOutcome {
    let mut errors: Vec<String> = Vec::new();
    let mut unknown: Vec<String> = Vec::new();
    let timeouts = &api.config.timeouts;

    match api.controller.stop(site, &plan.to, timeouts.stop_ms) {
        Ok(outcome) => slog
            .rollback()
            .target(&plan.to)
            .field("step", json!("stop"))
            .field("outcome", json!(outcome.as_str()))
            .emit_success(),
        Err(e) => {
            slog.rollback()
                .target(&plan.to)
                .field("step", json!("stop"))
                .error(&e)
                .emit_failure();
            errors.push(format!("rollback: {e}"));
            unknown.push(format!("{} may still be running", plan.to));
        }
    }

    let report = api.snapshots.restore(snapshot);
    if report.is_complete() {
        slog.rollback()
            .field("step", json!("restore"))
            .field("files", json!(report.restored.len()))
            .emit_success();
    } else {
        for msg in report.error_messages() {
            errors.push(format!("rollback: {msg}"));
        }
        for (path, _) in &report.failures {
            unknown.push(format!("{} is in an unknown state", path.display()));
        }
        slog.rollback()
            .field("step", json!("restore"))
            .field("files", json!(report.restored.len()))
            .field("failed", json!(report.failures.len()))
            .error_id(ErrorId::E_SNAPSHOT)
            .emit_failure();
    }

    if let (Some(rewrite), Some(db)) = (progress.rewrite.take(), plan.db.as_deref()) {
        match api.rewriter.reverse(db, &rewrite) {
            Ok(rows) => slog
                .rollback()
                .field("step", json!("db_reverse"))
                .field("rows", json!(rows))
                .emit_success(),
            Err(e) => {
                slog.rollback()
                    .field("step", json!("db_reverse"))
                    .error(&e)
                    .error_id(ErrorId::E_DB_REWRITE)
                    .emit_failure();
                errors.push(format!("rollback: {e}"));
                unknown.push(format!(
                    "database still points at {} ({} rows)",
                    rewrite.new_url, rewrite.rows_changed
                ));
            }
        }
    }

    let mut bring_up = vec![plan.from.clone()];
    if progress.web_restarted {
        if let Some(web) = &plan.restart_web {
            bring_up.push(web.clone());
        }
    }
    for target in &bring_up {
        let started = if progress.web_restarted && Some(target) == plan.restart_web.as_ref() {
            api.controller
                .restart(site, target, timeouts.stop_ms, timeouts.start_ms)
                .map(|_| ())
        } else {
            api.controller.start(site, target, timeouts.start_ms)
        };
        let healthy = started.and_then(|()| {
            verify::probe(api.controller.as_ref(), site, target, &api.config.health).map(|_| ())
        });
        match healthy {
            Ok(()) => slog
                .rollback()
                .target(target)
                .field("step", json!("start"))
                .emit_success(),
            Err(e) => {
                slog.rollback()
                    .target(target)
                    .field("step", json!("start"))
                    .error(&e)
                    .error_id(ErrorId::E_SERVICE)
                    .emit_failure();
                errors.push(format!("rollback: {e}"));
                unknown.push(format!("{target} is not serving site {}", site.id));
            }
        }
    }

    let restored = unknown.is_empty();
    if !restored {
        errors.push(format!("manual recovery required: {}", unknown.join("; ")));
    }
    let summary = slog.rollback_summary().field("restored", json!(restored));
    if restored {
        summary.emit_success();
    } else {
        summary
            .field("unknown_state", json!(unknown))
            .error_id(ErrorId::E_ROLLBACK_FAILED)
            .emit_failure();
    }
    RollbackOutcome { restored, errors }
}

//! Swap transaction: validate, snapshot, stop, apply, start, verify, then commit or roll back.
//!
//! Side-effects:
//! - Emits one fact per stage (`swap.validate` .. `swap.verify`), rollback step facts with a
//!   `swap.rollback.summary`, and a final `swap.result`.
//! - Holds the per-site lock (and the cross-process lock when configured) for the whole run.
//! - Steps run strictly in order; any failure at or after `Stopping` triggers rollback.
use std::time::Instant;

use log::Level;
use serde_json::json;

use crate::api::errors::ErrorId;
use crate::api::StackSwap;
use crate::db::RewriteReport;
use crate::fs::check_site_id;
use crate::logging::audit::AuditCtx;
use crate::logging::{now_iso, AuditSink, FactsEmitter, StageLogger};
use crate::types::errors::{Result, SwapError};
use crate::types::{
    ConfigSnapshot, PhpVersionChangeOptions, ServiceSwapResult, ServiceTarget, Site,
    SwapServerOptions, SwapTransaction, TxState,
};

mod rollback;
mod summary;
mod validate;
mod verify;

use summary::SwapSummary;
use validate::SwapPlan;

/// A swap request as accepted at the engine boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SwapRequest {
    WebServer(SwapServerOptions),
    PhpVersion(PhpVersionChangeOptions),
}

impl SwapRequest {
    fn targets(&self, site: &Site) -> (ServiceTarget, ServiceTarget) {
        match self {
            SwapRequest::WebServer(o) => {
                (ServiceTarget::web(o.from_server), ServiceTarget::web(o.to_server))
            }
            SwapRequest::PhpVersion(o) => (
                ServiceTarget::php(&site.php_version),
                ServiceTarget::php(&o.new_version),
            ),
        }
    }
}

/// What has been done to live state so far; drives rollback.
#[derive(Default)]
pub(super) struct Progress {
    pub rewrite: Option<RewriteReport>,
    pub web_restarted: bool,
    pub degraded: bool,
}

fn ms(t0: Instant) -> u64 {
    u64::try_from(t0.elapsed().as_millis()).unwrap_or(u64::MAX)
}

pub(crate) fn run<E: FactsEmitter, A: AuditSink>(
    api: &StackSwap<E, A>,
    site: &Site,
    req: SwapRequest,
) -> ServiceSwapResult {
    let t0 = Instant::now();
    let budget_ms = api.config.budget_ms();
    let (from, to) = req.targets(site);
    let mut tx = SwapTransaction::new(&site.id, from, to, now_iso());
    let tctx = AuditCtx::new(&api.facts, tx.id.to_string(), site.id.clone());
    let slog = StageLogger::new(&tctx);

    // The id names directories; nothing may touch the filesystem before it is checked.
    if let Err(e) = check_site_id(&site.id) {
        tx.advance(TxState::Validating);
        slog.validate().error(&e).error_id(e.error_id()).emit_failure();
        return fail_without_side_effects(api, site, &slog, tx, &e, t0, budget_ms);
    }

    // Reject, never queue, while another transaction holds the site.
    let _site_guard = match api.locks.try_acquire(&site.id) {
        Ok(g) => g,
        Err(e) => return reject(api, site, &slog, &mut tx, &e, t0, budget_ms),
    };
    let _process_guard = match &api.lock {
        Some(mgr) => match mgr.acquire_site_lock(&site.id, api.lock_timeout_ms) {
            Ok(g) => Some(g),
            Err(e) => return reject(api, site, &slog, &mut tx, &e, t0, budget_ms),
        },
        None => None,
    };
    api.audit.log(
        Level::Info,
        &format!("swap {} for {}: {} -> {}", tx.id, site.id, tx.from_target, tx.to_target),
    );

    tx.advance(TxState::Validating);
    let plan = match validate::plan(api, site, &req) {
        Ok(p) => p,
        Err(e) => {
            slog.validate().error(&e).error_id(e.error_id()).emit_failure();
            return fail_without_side_effects(api, site, &slog, tx, &e, t0, budget_ms);
        }
    };
    tx.record("success", "request valid", ms(t0));
    slog.validate()
        .field("preserve_config", json!(plan.preserve_config))
        .field("migrate_certs", json!(plan.migrate_certs.is_some()))
        .field("url_rewrite", json!(plan.new_url.is_some()))
        .emit_success();

    tx.advance(TxState::Snapshotting);
    let snapshot = match capture(api, site, &plan) {
        Ok(s) => s,
        Err(e) => {
            slog.snapshot().error(&e).error_id(e.error_id()).emit_failure();
            return fail_without_side_effects(api, site, &slog, tx, &e, t0, budget_ms);
        }
    };
    tx.record("success", format!("snapshot {}", snapshot.id), ms(t0));
    slog.snapshot()
        .field("snapshot_id", json!(snapshot.id.to_string()))
        .field("files", json!(snapshot.files.len()))
        .emit_success();

    let mut progress = Progress::default();
    let outcome = execute(api, site, &plan, &snapshot, &mut tx, &slog, &mut progress, t0);

    let summary = SwapSummary::new(budget_ms).degraded(progress.degraded);
    let summary = match outcome {
        Ok(()) => {
            tx.advance(TxState::Committed);
            commit(api, &plan, &snapshot, &mut tx, &slog);
            tx.finish(TxState::Committed, now_iso());
            summary.post_state(plan.next_web, &plan.next_php)
        }
        Err(e) => {
            let failed_at = tx.state;
            tx.record("failure", e.to_string(), ms(t0));
            tx.errors.push(e.to_string());
            let rb = rollback::run(api, site, &plan, &snapshot, &mut progress, &slog);
            tx.errors.extend(rb.errors);
            if rb.restored {
                api.snapshots.discard(&snapshot);
                tx.finish(TxState::RolledBack, now_iso());
                api.audit.log(
                    Level::Warn,
                    &format!("swap {} rolled back after failure while {}", tx.id, failed_at.as_str()),
                );
                summary.primary(e.error_id()).post_state(site.web_server, &site.php_version)
            } else {
                // Keep the snapshot on disk for manual recovery.
                match api.snapshots.retain(&snapshot, None) {
                    Ok(path) => tx
                        .errors
                        .push(format!("snapshot retained at {}", path.display())),
                    Err(se) => tx.errors.push(se.to_string()),
                }
                tx.finish(TxState::Failed, now_iso());
                api.audit.log(
                    Level::Error,
                    &format!("swap {} failed and could not be rolled back; site {} needs manual recovery", tx.id, site.id),
                );
                summary.primary(ErrorId::E_ROLLBACK_FAILED)
            }
        }
    };
    let result = summary.emit(&slog, &tx, ms(t0));
    api.archive(tx);
    result
}

#[allow(clippy::too_many_arguments)]
fn execute<E: FactsEmitter, A: AuditSink>(
    api: &StackSwap<E, A>,
    site: &Site,
    plan: &SwapPlan,
    snapshot: &ConfigSnapshot,
    tx: &mut SwapTransaction,
    slog: &StageLogger<'_>,
    progress: &mut Progress,
    t0: Instant,
) -> Result<()> {
    let timeouts = &api.config.timeouts;

    tx.advance(TxState::Stopping);
    let stopped = api
        .controller
        .stop(site, &plan.from, timeouts.stop_ms)
        .inspect_err(|e| slog.stop().target(&plan.from).error(e).error_id(e.error_id()).emit_failure())?;
    progress.degraded = stopped.is_degraded();
    tx.record(if progress.degraded { "warn" } else { "success" }, stopped.as_str(), ms(t0));
    let ev = slog
        .stop()
        .target(&plan.from)
        .field("outcome", json!(stopped.as_str()))
        .field("degraded", json!(progress.degraded));
    if progress.degraded {
        ev.emit_warn();
    } else {
        ev.emit_success();
    }

    tx.advance(TxState::Applying);
    apply(api, site, plan, snapshot, progress)
        .inspect_err(|e| slog.apply().target(&plan.to).error(e).error_id(e.error_id()).emit_failure())?;
    tx.record("success", format!("config for {} written", plan.to), ms(t0));
    slog.apply()
        .target(&plan.to)
        .field("rows_changed", json!(progress.rewrite.as_ref().map(|r| r.rows_changed)))
        .emit_success();

    tx.advance(TxState::Starting);
    api.controller
        .start(site, &plan.to, timeouts.start_ms)
        .inspect_err(|e| slog.start().target(&plan.to).error(e).error_id(e.error_id()).emit_failure())?;
    if let Some(web) = &plan.restart_web {
        progress.web_restarted = true;
        api.controller
            .restart(site, web, timeouts.stop_ms, timeouts.start_ms)
            .inspect_err(|e| slog.start().target(web).error(e).error_id(e.error_id()).emit_failure())?;
    }
    tx.record("success", format!("{} started", plan.to), ms(t0));
    slog.start().target(&plan.to).emit_success();

    tx.advance(TxState::Verifying);
    let mut probe_targets = vec![&plan.to];
    if let Some(web) = &plan.restart_web {
        probe_targets.push(web);
    }
    for target in probe_targets {
        let attempts = verify::probe(api.controller.as_ref(), site, target, &api.config.health)
            .inspect_err(|e| {
                slog.verify().target(target).error(e).error_id(ErrorId::E_HEALTH).emit_failure();
            })?;
        slog.verify()
            .target(target)
            .field("attempts", json!(attempts))
            .emit_success();
    }
    tx.record("success", "healthy", ms(t0));
    Ok(())
}

fn apply<E: FactsEmitter, A: AuditSink>(
    api: &StackSwap<E, A>,
    site: &Site,
    plan: &SwapPlan,
    snapshot: &ConfigSnapshot,
    progress: &mut Progress,
) -> Result<()> {
    let extras = api.translator.gather_extras(
        site,
        &plan.extras_source,
        plan.preserve_config,
        plan.migrate_extensions,
    )?;
    let artifacts = api.translator.translate_with(site, &plan.to, &extras)?;
    if let Some((from, to)) = plan.migrate_certs {
        api.certs.migrate(site, from, to)?;
    }
    api.translator.materialize(&artifacts)?;

    if let (Some(new_url), Some(db)) = (plan.new_url.as_deref(), plan.db.as_deref()) {
        let old_url = snapshot.db_url_backup.clone().unwrap_or_else(|| site.url());
        let report = api.rewriter.rewrite(db, &old_url, new_url, false)?;
        progress.rewrite = Some(report);
    }
    Ok(())
}

fn capture<E: FactsEmitter, A: AuditSink>(
    api: &StackSwap<E, A>,
    site: &Site,
    plan: &SwapPlan,
) -> Result<ConfigSnapshot> {
    let db_url = match plan.db.as_deref() {
        Some(db) => api.rewriter.current_url(db).map_err(|e| {
            SwapError::Snapshot(format!("cannot read site url: {e}"))
        })?,
        None => None,
    };
    api.snapshots.capture(site, &plan.capture_plan(api, site, db_url))
}

fn commit<E: FactsEmitter, A: AuditSink>(
    api: &StackSwap<E, A>,
    plan: &SwapPlan,
    snapshot: &ConfigSnapshot,
    tx: &mut SwapTransaction,
    slog: &StageLogger<'_>,
) {
    if plan.retain_snapshot {
        match api.snapshots.retain(snapshot, api.config.snapshot.retention_count) {
            Ok(path) => {
                tx.record("success", format!("snapshot retained at {}", path.display()), 0);
                slog.commit()
                    .target(&plan.to)
                    .field("snapshot", json!(path.display().to_string()))
                    .emit_success();
            }
            Err(e) => {
                // The swap itself succeeded; a lost backup is only worth a warning.
                tx.record("warn", e.to_string(), 0);
                slog.commit().target(&plan.to).error(&e).emit_warn();
            }
        }
    } else {
        api.snapshots.discard(snapshot);
        slog.commit().target(&plan.to).emit_success();
    }
}

fn fail_without_side_effects<E: FactsEmitter, A: AuditSink>(
    api: &StackSwap<E, A>,
    site: &Site,
    slog: &StageLogger<'_>,
    mut tx: SwapTransaction,
    err: &SwapError,
    t0: Instant,
    budget_ms: u64,
) -> ServiceSwapResult {
    tx.record("failure", err.to_string(), ms(t0));
    tx.errors.push(err.to_string());
    tx.finish(TxState::Failed, now_iso());
    api.audit.log(Level::Info, &format!("swap {} refused: {err}", tx.id));
    let result = SwapSummary::new(budget_ms)
        .primary(err.error_id())
        .post_state(site.web_server, &site.php_version)
        .emit(slog, &tx, ms(t0));
    api.archive(tx);
    result
}

fn reject<E: FactsEmitter, A: AuditSink>(
    api: &StackSwap<E, A>,
    site: &Site,
    slog: &StageLogger<'_>,
    tx: &mut SwapTransaction,
    err: &SwapError,
    t0: Instant,
    budget_ms: u64,
) -> ServiceSwapResult {
    tx.errors.push(err.to_string());
    tx.finish(TxState::Failed, now_iso());
    api.audit.log(Level::Info, &format!("swap for {} rejected: {err}", site.id));
    SwapSummary::new(budget_ms)
        .primary(err.error_id())
        .post_state(site.web_server, &site.php_version)
        .emit(slog, tx, ms(t0))
}

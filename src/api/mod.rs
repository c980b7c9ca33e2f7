// Facade for the reconfiguration engine; the transaction itself lives under src/api/swap/.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use log::Level;
use serde_json::json;
use uuid::Uuid;

use crate::adapters::{LockManager, ServiceController, SiteLocks, StopOutcome};
use crate::certs::CertificateMigrator;
use crate::config::EngineConfig;
use crate::constants::{DEFAULT_LOCK_TIMEOUT_MS, HISTORY_LIMIT};
use crate::db::{DatabaseLocator, UrlRewriter};
use crate::fs::check_site_id;
use crate::logging::audit::AuditCtx;
use crate::logging::{AuditSink, FactsEmitter, StageLogger};
use crate::snapshot::SnapshotStore;
use crate::translate::ConfigTranslator;
use crate::types::errors::Result;
use crate::types::{
    PhpVersionChangeOptions, PruneResult, ServiceStats, ServiceSwapResult, ServiceTarget, Site,
    SwapServerOptions, SwapTransaction,
};

pub mod errors;
mod swap;

pub use swap::SwapRequest;

/// Runtime reconfiguration engine for a set of local sites.
///
/// Leaf components are injected; only the engine sequences them. Requests for different
/// sites run in parallel; a second request for a busy site is rejected, never queued.
pub struct StackSwap<E: FactsEmitter, A: AuditSink> {
    facts: E,
    audit: A,
    config: EngineConfig,
    controller: Box<dyn ServiceController>,
    translator: ConfigTranslator,
    snapshots: SnapshotStore,
    certs: CertificateMigrator,
    rewriter: UrlRewriter,
    databases: Option<Box<dyn DatabaseLocator>>,
    locks: SiteLocks,
    lock: Option<Box<dyn LockManager>>, // cross-process exclusion; None in tests
    lock_timeout_ms: u64,
    history: Mutex<VecDeque<SwapTransaction>>,
}

impl<E: FactsEmitter, A: AuditSink> StackSwap<E, A> {
    pub fn new(
        facts: E,
        audit: A,
        config: EngineConfig,
        controller: Box<dyn ServiceController>,
    ) -> Self {
        Self {
            translator: ConfigTranslator::new(&config),
            snapshots: SnapshotStore::new(&config),
            certs: CertificateMigrator::new(&config),
            rewriter: UrlRewriter::new(&config.table_prefix),
            facts,
            audit,
            config,
            controller,
            databases: None,
            locks: SiteLocks::default(),
            lock: None,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            history: Mutex::new(VecDeque::new()),
        }
    }

    #[must_use]
    pub fn with_translator(mut self, translator: ConfigTranslator) -> Self {
        self.translator = translator;
        self
    }

    #[must_use]
    pub fn with_snapshot_store(mut self, snapshots: SnapshotStore) -> Self {
        self.snapshots = snapshots;
        self
    }

    #[must_use]
    pub fn with_cert_migrator(mut self, certs: CertificateMigrator) -> Self {
        self.certs = certs;
        self
    }

    #[must_use]
    pub fn with_database(mut self, databases: Box<dyn DatabaseLocator>) -> Self {
        self.databases = Some(databases);
        self
    }

    #[must_use]
    pub fn with_lock_manager(mut self, lock: Box<dyn LockManager>) -> Self {
        self.lock = Some(lock);
        self
    }

    #[must_use]
    pub fn with_lock_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.lock_timeout_ms = timeout_ms;
        self
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Swap the site's web server. Always returns a structured result.
    pub fn swap_web_server(&self, site: &Site, options: &SwapServerOptions) -> ServiceSwapResult {
        swap::run(self, site, SwapRequest::WebServer(options.clone()))
    }

    /// Swap the site's PHP runtime. Always returns a structured result.
    pub fn change_php_version(
        &self,
        site: &Site,
        options: &PhpVersionChangeOptions,
    ) -> ServiceSwapResult {
        swap::run(self, site, SwapRequest::PhpVersion(options.clone()))
    }

    /// Restart one of the site's services outside a swap.
    ///
    /// # Errors
    ///
    /// Returns `SwapError::TransactionInProgress` if a swap holds the site, or the
    /// controller's error if the restart fails.
    pub fn restart(&self, site: &Site, target: &ServiceTarget) -> Result<StopOutcome> {
        check_site_id(&site.id)?;
        let _guard = self.locks.try_acquire(&site.id)?;
        self.audit.log(Level::Info, &format!("restart {target} for {}", site.id));
        self.controller.restart(
            site,
            target,
            self.config.timeouts.stop_ms,
            self.config.timeouts.start_ms,
        )
    }

    /// Point-in-time statistics for one of the site's services.
    ///
    /// # Errors
    ///
    /// Returns the controller's error if the target is not running.
    pub fn stats(&self, site: &Site, target: &ServiceTarget) -> Result<ServiceStats> {
        self.controller.stats(site, target)
    }

    /// Sites with a transaction currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> Vec<String> {
        self.locks.held()
    }

    /// Most recent terminal transactions, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<SwapTransaction> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Prune retained snapshots for a site down to the configured retention.
    ///
    /// Emits a `snapshot.prune` fact with the counts.
    ///
    /// # Errors
    ///
    /// Returns `SwapError::Io` if the snapshot directory cannot be listed.
    pub fn prune_snapshots(&self, site: &Site) -> Result<PruneResult> {
        let ctx = AuditCtx::new(&self.facts, Uuid::new_v4().to_string(), site.id.clone());
        let retention = self.config.snapshot.retention_count;
        let dir = self.translator.layout(site).snapshot_dir();
        match crate::snapshot::prune_snapshots(&dir, retention) {
            Ok(res) => {
                StageLogger::new(&ctx)
                    .prune()
                    .merge(json!({
                        "retention_count": retention,
                        "pruned_count": res.pruned_count,
                        "retained_count": res.retained_count,
                    }))
                    .emit_success();
                Ok(res)
            }
            Err(e) => {
                StageLogger::new(&ctx)
                    .prune()
                    .error(&e)
                    .error_id(errors::ErrorId::E_SNAPSHOT)
                    .emit_failure();
                Err(e.into())
            }
        }
    }

    fn archive(&self, tx: SwapTransaction) {
        let mut h = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        if h.len() == HISTORY_LIMIT {
            h.pop_front();
        }
        h.push_back(tx);
    }
}

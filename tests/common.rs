//! Shared test helpers for the stackswap integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier, Mutex};

use log::Level;
use serde_json::Value;

use stackswap::adapters::{ServiceController, StopOutcome};
use stackswap::config::EngineConfig;
use stackswap::fs::SiteLayout;
use stackswap::logging::{AuditSink, FactsEmitter};
use stackswap::translate::{ConfigTranslator, TranslateExtras};
use stackswap::types::errors::{Result, SwapError};
use stackswap::types::{ServiceStats, ServiceTarget, Site, TargetKind, WebServer};
use stackswap::StackSwap;

/// A simple in-memory emitter to capture facts during tests.
#[derive(Clone, Default, Debug)]
pub struct TestEmitter {
    pub events: Arc<Mutex<Vec<(String, String, String, Value)>>>,
}

impl FactsEmitter for TestEmitter {
    fn emit(&self, subsystem: &str, event: &str, decision: &str, fields: Value) {
        self.events
            .lock()
            .unwrap()
            .push((subsystem.into(), event.into(), decision.into(), fields));
    }
}

impl TestEmitter {
    /// Event names in emission order.
    pub fn names(&self) -> Vec<String> {
        self.events.lock().unwrap().iter().map(|e| e.1.clone()).collect()
    }

    pub fn named(&self, event: &str) -> Vec<(String, Value)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.1 == event)
            .map(|e| (e.2.clone(), e.3.clone()))
            .collect()
    }
}

/// A no-op audit sink for tests.
#[derive(Clone, Default)]
pub struct TestAudit;

impl AuditSink for TestAudit {
    fn log(&self, _level: Level, _msg: &str) {}
}

/// Injected failures, keyed by target display name (`"apache"`, `"php-fpm 8.3"`).
#[derive(Default)]
pub struct Faults {
    /// Start fails with `"<target> failed to start: <reason>"`.
    pub start_errors: HashMap<String, String>,
    /// Stop fails with `"<target> failed to stop: <reason>"`; the process keeps running.
    pub stop_errors: HashMap<String, String>,
    pub unhealthy: HashSet<String>,
    /// Stop reports a forced kill.
    pub ignore_term: HashSet<String>,
    /// Next start blocks: waits on `.0`, then on `.1`.
    pub gate: Option<(Arc<Barrier>, Arc<Barrier>)>,
}

#[derive(Default)]
pub struct FakeState {
    pub running: HashMap<(String, TargetKind), ServiceTarget>,
    pub calls: Vec<String>,
}

/// In-memory service controller; one slot per site and service kind, like the real one.
#[derive(Clone, Default)]
pub struct FakeController {
    pub state: Arc<Mutex<FakeState>>,
    pub faults: Arc<Mutex<Faults>>,
}

impl FakeController {
    pub fn seed_running(&self, site: &Site, target: ServiceTarget) {
        self.state
            .lock()
            .unwrap()
            .running
            .insert((site.id.clone(), target.kind), target);
    }

    pub fn running(&self, site: &Site, kind: TargetKind) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .running
            .get(&(site.id.clone(), kind))
            .map(ToString::to_string)
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn fail_start(&self, target: &str, reason: &str) {
        self.faults
            .lock()
            .unwrap()
            .start_errors
            .insert(target.into(), reason.into());
    }

    pub fn fail_stop(&self, target: &str, reason: &str) {
        self.faults
            .lock()
            .unwrap()
            .stop_errors
            .insert(target.into(), reason.into());
    }

    pub fn mark_unhealthy(&self, target: &str) {
        self.faults.lock().unwrap().unhealthy.insert(target.into());
    }

    pub fn ignore_term(&self, target: &str) {
        self.faults.lock().unwrap().ignore_term.insert(target.into());
    }

    pub fn set_gate(&self, entered: Arc<Barrier>, release: Arc<Barrier>) {
        self.faults.lock().unwrap().gate = Some((entered, release));
    }
}

impl ServiceController for FakeController {
    fn stop(&self, site: &Site, target: &ServiceTarget, _timeout_ms: u64) -> Result<StopOutcome> {
        let (forced, err) = {
            let faults = self.faults.lock().unwrap();
            let name = target.to_string();
            (faults.ignore_term.contains(&name), faults.stop_errors.get(&name).cloned())
        };
        let mut st = self.state.lock().unwrap();
        st.calls.push(format!("stop {target}"));
        if let Some(reason) = err {
            return Err(SwapError::ServiceControl(format!("{target} failed to stop: {reason}")));
        }
        let key = (site.id.clone(), target.kind);
        if st.running.get(&key) == Some(target) {
            st.running.remove(&key);
            Ok(if forced { StopOutcome::Forced } else { StopOutcome::Graceful })
        } else {
            Ok(StopOutcome::NotRunning)
        }
    }

    fn start(&self, site: &Site, target: &ServiceTarget, _timeout_ms: u64) -> Result<()> {
        let gate = self.faults.lock().unwrap().gate.take();
        if let Some((entered, release)) = gate {
            entered.wait();
            release.wait();
        }
        let err = self
            .faults
            .lock()
            .unwrap()
            .start_errors
            .get(&target.to_string())
            .cloned();
        let mut st = self.state.lock().unwrap();
        st.calls.push(format!("start {target}"));
        if let Some(reason) = err {
            return Err(SwapError::ServiceControl(format!(
                "{target} failed to start: {reason}"
            )));
        }
        let key = (site.id.clone(), target.kind);
        match st.running.get(&key) {
            Some(t) if t == target => Ok(()),
            Some(other) => Err(SwapError::ServiceControl(format!(
                "{target} failed to start: {other} is still running"
            ))),
            None => {
                st.running.insert(key, target.clone());
                Ok(())
            }
        }
    }

    fn health_check(&self, site: &Site, target: &ServiceTarget) -> bool {
        let unhealthy = self.faults.lock().unwrap().unhealthy.contains(&target.to_string());
        !unhealthy && self.is_running(site, target)
    }

    fn is_running(&self, site: &Site, target: &ServiceTarget) -> bool {
        self.state
            .lock()
            .unwrap()
            .running
            .get(&(site.id.clone(), target.kind))
            == Some(target)
    }

    fn stats(&self, site: &Site, target: &ServiceTarget) -> Result<ServiceStats> {
        if !self.is_running(site, target) {
            return Err(SwapError::ServiceControl(format!("{target} is not running")));
        }
        Ok(ServiceStats {
            uptime: "0h 0m 1s".into(),
            memory: "10240 kB".into(),
            cpu: "0.0%".into(),
            requests: 0,
        })
    }
}

pub fn site(id: &str, ssl: bool) -> Site {
    Site {
        id: id.into(),
        domain: format!("{id}.test"),
        web_server: WebServer::Nginx,
        php_version: "8.1".into(),
        ssl,
        doc_root: PathBuf::from(format!("/srv/www/{id}")),
        http_port: None,
        https_port: None,
    }
}

pub fn config(root: &Path) -> EngineConfig {
    let mut cfg = EngineConfig::with_root(root);
    cfg.health.backoff_ms = 5;
    cfg.timeouts.stop_ms = 200;
    cfg.timeouts.start_ms = 200;
    cfg
}

pub fn engine(root: &Path, fake: &FakeController) -> (StackSwap<TestEmitter, TestAudit>, TestEmitter) {
    let facts = TestEmitter::default();
    let api = StackSwap::new(facts.clone(), TestAudit, config(root), Box::new(fake.clone()));
    (api, facts)
}

/// Write the site's current nginx and PHP configs and mark both services running.
pub fn provision(root: &Path, site: &Site, fake: &FakeController, extensions: &[&str]) {
    let t = ConfigTranslator::new(&config(root));
    let web = t.translate(site, &ServiceTarget::web(site.web_server)).unwrap();
    t.materialize(&web).unwrap();
    let extras = TranslateExtras {
        extensions: extensions.iter().map(|e| (*e).to_string()).collect(),
        ..TranslateExtras::default()
    };
    let php = t
        .translate_with(site, &ServiceTarget::php(&site.php_version), &extras)
        .unwrap();
    t.materialize(&php).unwrap();
    fake.seed_running(site, ServiceTarget::web(site.web_server));
    fake.seed_running(site, ServiceTarget::php(&site.php_version));
}

pub fn layout(root: &Path, site: &Site) -> SiteLayout {
    SiteLayout::new(root, &site.id)
}

pub fn read(path: &Path) -> Option<String> {
    std::fs::read_to_string(path).ok()
}

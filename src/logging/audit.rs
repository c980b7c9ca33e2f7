// Audit helpers that emit facts across the swap state machine.
//
// Side-effects:
// - Emits JSON facts via `FactsEmitter` for every stage: `swap.validate` .. `swap.result`,
//   rollback steps and their summary, and snapshot pruning.
// - Ensures a minimal envelope on every fact: `schema_version`, `ts`, `tx_id`, `site_id`,
//   `stage`, `decision`.
use serde_json::{json, Value};

use crate::api::errors::{exit_code_for, id_str, ErrorId};
use crate::logging::{now_iso, FactsEmitter};

pub(crate) const SCHEMA_VERSION: i64 = 1;
pub(crate) const SUBSYSTEM: &str = "stackswap";

pub(crate) struct AuditCtx<'a> {
    pub facts: &'a dyn FactsEmitter,
    pub tx_id: String,
    pub site_id: String,
}

impl<'a> AuditCtx<'a> {
    pub(crate) fn new(facts: &'a dyn FactsEmitter, tx_id: String, site_id: String) -> Self {
        Self {
            facts,
            tx_id,
            site_id,
        }
    }
}

/// Stage for typed audit emission.
#[derive(Clone, Copy, Debug)]
pub enum Stage {
    Validate,
    Snapshot,
    Stop,
    Apply,
    Start,
    Verify,
    Commit,
    Rollback,
    RollbackSummary,
    Result,
    Prune,
}

impl Stage {
    const fn as_event(self) -> &'static str {
        match self {
            Stage::Validate => "swap.validate",
            Stage::Snapshot => "swap.snapshot",
            Stage::Stop => "swap.stop",
            Stage::Apply => "swap.apply",
            Stage::Start => "swap.start",
            Stage::Verify => "swap.verify",
            Stage::Commit => "swap.commit",
            Stage::Rollback => "swap.rollback",
            Stage::RollbackSummary => "swap.rollback.summary",
            Stage::Result => "swap.result",
            Stage::Prune => "snapshot.prune",
        }
    }
}

/// Decision severity for audit events.
#[derive(Clone, Copy, Debug)]
pub enum Decision {
    Success,
    Failure,
    Warn,
}

impl Decision {
    const fn as_str(self) -> &'static str {
        match self {
            Decision::Success => "success",
            Decision::Failure => "failure",
            Decision::Warn => "warn",
        }
    }
}

/// Builder facade over audit emission with a centralized envelope.
pub struct StageLogger<'a> {
    ctx: &'a AuditCtx<'a>,
}

impl<'a> StageLogger<'a> {
    pub(crate) fn new(ctx: &'a AuditCtx<'a>) -> Self {
        Self { ctx }
    }

    pub fn stage(&self, stage: Stage) -> EventBuilder<'a> {
        EventBuilder::new(self.ctx, stage)
    }

    pub fn validate(&self) -> EventBuilder<'a> { self.stage(Stage::Validate) }
    pub fn snapshot(&self) -> EventBuilder<'a> { self.stage(Stage::Snapshot) }
    pub fn stop(&self) -> EventBuilder<'a> { self.stage(Stage::Stop) }
    pub fn apply(&self) -> EventBuilder<'a> { self.stage(Stage::Apply) }
    pub fn start(&self) -> EventBuilder<'a> { self.stage(Stage::Start) }
    pub fn verify(&self) -> EventBuilder<'a> { self.stage(Stage::Verify) }
    pub fn commit(&self) -> EventBuilder<'a> { self.stage(Stage::Commit) }
    pub fn rollback(&self) -> EventBuilder<'a> { self.stage(Stage::Rollback) }
    pub fn rollback_summary(&self) -> EventBuilder<'a> { self.stage(Stage::RollbackSummary) }
    pub fn result(&self) -> EventBuilder<'a> { self.stage(Stage::Result) }
    pub fn prune(&self) -> EventBuilder<'a> { self.stage(Stage::Prune) }
}

pub struct EventBuilder<'a> {
    ctx: &'a AuditCtx<'a>,
    stage: Stage,
    fields: serde_json::Map<String, Value>,
}

impl<'a> EventBuilder<'a> {
    fn new(ctx: &'a AuditCtx<'a>, stage: Stage) -> Self {
        let mut fields = serde_json::Map::new();
        fields.insert("stage".to_string(), json!(stage.as_event()));
        Self { ctx, stage, fields }
    }

    #[must_use]
    pub fn target(mut self, target: impl std::fmt::Display) -> Self {
        self.fields.insert("target".into(), json!(target.to_string()));
        self
    }

    #[must_use]
    pub fn field(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }

    #[must_use]
    pub fn merge(mut self, extra: Value) -> Self {
        if let Value::Object(obj) = extra {
            for (k, v) in obj {
                self.fields.insert(k, v);
            }
        }
        self
    }

    #[must_use]
    pub fn error(mut self, msg: impl std::fmt::Display) -> Self {
        self.fields.insert("error".into(), json!(msg.to_string()));
        self
    }

    #[must_use]
    pub fn error_id(mut self, id: ErrorId) -> Self {
        self.fields.insert("error_id".into(), json!(id_str(id)));
        self.fields.insert("exit_code".into(), json!(exit_code_for(id)));
        self
    }

    pub fn emit(self, decision: Decision) {
        let mut fields = self.fields;
        fields.entry("decision").or_insert(json!(decision.as_str()));
        fields.entry("schema_version").or_insert(json!(SCHEMA_VERSION));
        fields.entry("ts").or_insert(json!(now_iso()));
        fields.entry("tx_id").or_insert(json!(self.ctx.tx_id));
        fields.entry("site_id").or_insert(json!(self.ctx.site_id));
        self.ctx.facts.emit(
            SUBSYSTEM,
            self.stage.as_event(),
            decision.as_str(),
            Value::Object(fields),
        );
    }

    pub fn emit_success(self) { self.emit(Decision::Success) }
    pub fn emit_failure(self) { self.emit(Decision::Failure) }
    pub fn emit_warn(self) { self.emit(Decision::Warn) }
}

use log::Level;
use serde_json::Value;

/// Sink for machine-readable audit facts, one per state-machine stage.
pub trait FactsEmitter {
    fn emit(&self, subsystem: &str, event: &str, decision: &str, fields: Value);
}

/// Sink for human-oriented log lines.
pub trait AuditSink {
    fn log(&self, level: Level, msg: &str);
}

/// Default sink; discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonlSink;

impl FactsEmitter for JsonlSink {
    fn emit(&self, _subsystem: &str, _event: &str, _decision: &str, _fields: Value) {}
}

impl AuditSink for JsonlSink {
    fn log(&self, _level: Level, _msg: &str) {}
}

/// Forwards to the `log` facade: audit lines under target `stackswap`,
/// facts as one JSON line each under target `stackswap::facts`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl FactsEmitter for LogSink {
    fn emit(&self, subsystem: &str, event: &str, decision: &str, fields: Value) {
        let level = match decision {
            "failure" => Level::Warn,
            _ => Level::Info,
        };
        log::log!(target: "stackswap::facts", level, "{subsystem} {event} {fields}");
    }
}

impl AuditSink for LogSink {
    fn log(&self, level: Level, msg: &str) {
        log::log!(target: "stackswap", level, "{msg}");
    }
}

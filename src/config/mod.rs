//! Engine configuration: timeouts, health probing, ports, supported PHP set, retention.
pub mod engine;
pub mod types;

pub use engine::EngineConfig;
pub use types::{HealthPolicy, Ports, SnapshotRetention, Timeouts};

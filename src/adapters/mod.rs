pub(crate) mod fastcgi;
pub mod lock;
pub mod process;
pub mod service;

pub use lock::*;
pub use process::{LaunchSpec, LaunchSpecs, ProcessServiceController};
pub use service::{ServiceController, StopOutcome};

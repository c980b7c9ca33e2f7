#![forbid(unsafe_code)]
//! stackswap: transactional web-server and PHP runtime swaps for local WordPress sites.
//!
//! Safety model highlights:
//! - Every swap is a forward-only transaction (`Validating` .. `Verifying`) that ends in
//!   `Committed`, `RolledBack` or `Failed`; failures at or after `Stopping` roll back from a snapshot.
//! - Config files are replaced atomically (write tmp, fsync, `renameat`, fsync parent).
//! - One transaction per site at a time; a second request is rejected, never queued.
//! - Every process operation and probe is bounded by a configured timeout.
//! - This crate forbids `unsafe` and uses `rustix` for syscalls.

pub mod adapters;
pub mod api;
pub mod certs;
pub mod config;
pub mod constants;
pub mod db;
pub mod fs;
pub mod logging;
pub mod snapshot;
pub mod translate;
pub mod types;

pub use api::*;

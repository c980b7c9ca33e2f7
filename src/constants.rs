//! Shared crate-wide constants for stackswap.
//!
//! Centralizes magic values and default knobs used across modules.
//! `EngineConfig::default()` is built from these.

/// Bounded wait for a service to exit after SIGTERM before it is force-killed.
pub const DEFAULT_STOP_TIMEOUT_MS: u64 = 10_000;

/// Bounded wait for a freshly spawned service to settle.
pub const DEFAULT_START_TIMEOUT_MS: u64 = 5_000;

/// Health probe attempts before a start is declared unhealthy.
pub const DEFAULT_HEALTH_ATTEMPTS: u32 = 3;

/// Fixed delay between health probe attempts.
pub const DEFAULT_HEALTH_BACKOFF_MS: u64 = 500;

/// Per-attempt TCP connect timeout used by health probes.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 1_000;

/// Busy timeout applied to site database connections.
pub const DEFAULT_DB_TIMEOUT_MS: u64 = 5_000;

/// Poll interval while waiting for a stopped process to exit.
pub const STOP_POLL_MS: u64 = 20;

/// Poll interval for the file-backed lock manager (see `adapters/lock/file.rs`).
pub const LOCK_POLL_MS: u64 = 25;

/// Upper bound on the settle window after spawning a service.
pub const START_SETTLE_MS: u64 = 200;

pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_HTTPS_PORT: u16 = 8443;

/// PHP versions accepted by `ChangePHPVersion` unless overridden in config.
pub const SUPPORTED_PHP_VERSIONS: &[&str] = &["7.4", "8.0", "8.1", "8.2", "8.3"];

/// WordPress table prefix used when none is configured.
pub const DEFAULT_TABLE_PREFIX: &str = "wp_";

/// Label written into managed-block markers: `# BEGIN stackswap managed block`.
pub const MANAGED_LABEL: &str = "stackswap managed block";

/// Temporary filename suffix used for atomic config writes.
/// The temporary name is `.{fname}.{pid}.{ctr}{TMP_SUFFIX}` next to the target.
pub const TMP_SUFFIX: &str = ".stackswap.tmp";

/// Lock file name inside each site directory.
pub const SITE_LOCK_FILE: &str = ".stackswap.lock";

/// Retained snapshots per site unless overridden in config.
pub const DEFAULT_SNAPSHOT_RETENTION: usize = 5;

/// Terminal transactions kept in the in-memory audit archive.
pub const HISTORY_LIMIT: usize = 32;

/// Consistent-read attempts for a single file during snapshot capture.
pub const CAPTURE_READ_ATTEMPTS: u32 = 3;

/// Deepest array/object nesting the URL rewriter walks; deeper values are left as-is.
pub const MAX_SERIALIZED_DEPTH: usize = 64;

/// Marker echoed by the PHP health script.
pub const PHP_PROBE_MARKER: &str = "stackswap-php-ok";

/// Wait for the cross-process site lock; zero rejects a busy site immediately.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 0;

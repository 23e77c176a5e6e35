// ── Core error types ──
//
// User-facing errors from kafly-core. The registry and stream session
// surface these directly to the dashboard layer; client implementations
// translate their library-specific failures into the operation variants.

use thiserror::Error;

use kafly_config::ConfigError;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Registry errors ──────────────────────────────────────────────
    /// Rejected before any I/O: the definition is structurally unusable.
    #[error("invalid cluster definition: {reason}")]
    InvalidDefinition { reason: String },

    /// The client factory could not produce a live client. Recoverable —
    /// the next reconciliation pass retries.
    #[error("failed to create client for cluster '{cluster}': {reason}")]
    Factory { cluster: String, reason: String },

    /// Configuration write-back failed after a successful client swap.
    /// The registry keeps the new client active; runtime state and the
    /// file are momentarily out of sync.
    #[error("failed to persist cluster configuration: {0}")]
    Persist(#[source] ConfigError),

    #[error("cluster not found: {name}")]
    NotFound { name: String },

    // ── Watcher errors ───────────────────────────────────────────────
    /// Could not observe the configuration directory. Fatal at startup.
    #[error("failed to watch configuration directory: {0}")]
    Watch(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    // ── Client operation errors ──────────────────────────────────────
    #[error("cluster connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("cluster operation timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("cluster operation failed: {message}")]
    OperationFailed { message: String },

    // ── Stream session errors ────────────────────────────────────────
    /// The remote viewer went away; the session treats this as a normal
    /// termination signal, not a fault.
    #[error("viewer connection closed")]
    ViewerClosed,
}

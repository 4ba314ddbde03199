//! Error types for the payment tracking engine.

use crate::tracker::PaymentId;

/// Errors returned by the tracking engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A session with this payment identifier is already being tracked.
    #[error("payment {0} is already being tracked")]
    DuplicateSession(PaymentId),

    /// No live session exists for this payment identifier.
    #[error("no tracked session for payment {0}")]
    UnknownSession(PaymentId),

    /// A verification query failed or returned malformed data.
    ///
    /// Transient: the session is left unchanged and the query is retried on
    /// the normal polling cadence. Never escalated to a `Failed` state by
    /// the engine itself.
    #[error("verification query failed: {0}")]
    Verification(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error (configuration file access).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the tracking engine.
pub type Result<T> = std::result::Result<T, Error>;

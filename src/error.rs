//! Error types for the stripe layout engine

use std::time::Duration;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the stripe layout engine
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid layout geometry or target set
    #[error("Configuration error: {0}")]
    Config(String),

    // =========================================================================
    // Stripe Target I/O Errors
    // =========================================================================
    /// A single target read/write failed; potentially recoverable through
    /// the recovery engine
    #[error("I/O error on stripe target {target}: {source}")]
    TargetIo {
        target: usize,
        #[source]
        source: std::io::Error,
    },

    /// A target did not answer within the I/O timeout; the target is closed
    /// and excluded for the remainder of this file instance
    #[error("Stripe target {target} timed out after {timeout:?}")]
    TargetTimeout { target: usize, timeout: Duration },

    /// A write completed fewer bytes than requested; always fatal, never
    /// silently retried
    #[error("Short write on stripe target {target}: wrote {written} of {expected} bytes")]
    ShortWrite {
        target: usize,
        written: usize,
        expected: usize,
    },

    // =========================================================================
    // Recovery Errors
    // =========================================================================
    /// The recovery fixed point terminated with unrecoverable blocks left:
    /// more concurrent faults than row + diagonal parity can repair
    #[error("Group at offset {group_offset} is unrecoverable: {remaining} block(s) beyond double-parity tolerance")]
    UnrecoverableGroup { group_offset: u64, remaining: usize },

    /// Local I/O error not attributable to a single stripe target
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error permanently excludes a target from further I/O.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::TargetTimeout { .. })
    }
}

//! Crate-wide error kinds.
//!
//! Every fallible operation in the agent returns one of these variants rather
//! than a raw `io::Error` or `String`, so callers can match on kind instead of
//! parsing messages.

use std::path::PathBuf;

/// The single error type threaded through the agent.
#[derive(thiserror::Error, Debug)]
pub enum AgentError {
    /// The configuration document failed to parse or failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The persisted state file could not be read, parsed, or written.
    #[error("state file error ({path:?}): {source}")]
    State {
        /// Path of the state file involved.
        path: PathBuf,
        /// Underlying I/O or serialization failure.
        #[source]
        source: StateErrorSource,
    },

    /// A line reader could not read the exact byte range it expected.
    #[error("range size mismatch reading {path:?}: expected {expected} bytes, got {actual}")]
    RangeSizeMismatch {
        /// File being read.
        path: PathBuf,
        /// Bytes the caller asked for.
        expected: u64,
        /// Bytes actually read.
        actual: u64,
    },

    /// A watched file vanished or its descriptor could no longer be used.
    #[error("reader I/O error on {path:?}: {source}")]
    ReaderIo {
        /// File being read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The sink client could not be constructed from configuration.
    #[error("could not construct sink client: {0}")]
    SinkInit(String),

    /// The metrics HTTP listener could not bind its configured address.
    #[error("metrics listener could not bind {address}: {source}")]
    MetricsBind {
        /// Configured listen address.
        address: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// `SendWithRetry` exhausted its attempt budget with records still failing.
    #[error("retry budget exhausted with {remaining} record(s) still failing")]
    RetryExhausted {
        /// Number of records that never succeeded.
        remaining: usize,
    },
}

/// Sub-cause for `AgentError::State`, kept distinct from `AgentError` itself
/// so `#[source]` chains read cleanly (I/O vs. (de)serialization).
#[derive(thiserror::Error, Debug)]
pub enum StateErrorSource {
    /// Reading or writing the state file failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The state file's JSON was malformed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AgentError>;

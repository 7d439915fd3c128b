//! Library level constants, mirroring the sink's wire limits.

use std::time::Duration;

/// Per-record byte cap enforced by the streaming sink.
pub const RECORD_SIZE_MAX: u64 = 1024 * 1024;

/// Per-call record-count cap enforced by the streaming sink.
pub const RECORDS_PER_PAYLOAD_MAX: usize = 500;

/// Per-call byte cap enforced by the streaming sink.
pub const PAYLOAD_SIZE_MAX: u64 = 5 * 1024 * 1024;

/// Local packing target: the size a `Record` is grown to before a new one
/// is started, well under `RECORD_SIZE_MAX`.
pub const RECORD_UNIT_SIZE: u64 = 25 * 1024;

/// A line longer than this (including its trailing newline) is quarantined
/// rather than shipped, since it could never fit in a single record anyway
/// once it exceeds the sink's own per-record cap.
pub const DEFAULT_MAX_LINE_SIZE: u64 = RECORD_SIZE_MAX;

/// Block size the line reader reads from disk at a time.
pub const READ_BYTE_SIZE: usize = 2048;

/// Default periodic flush interval for the aggregator.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(60);

/// Default tick interval at which the watcher asks readers for new lines.
pub const DEFAULT_READ_FILE_INTERVAL: Duration = Duration::from_millis(200);

/// Default grace period a reader keeps reading a rotated/removed file.
pub const DEFAULT_LIFETIME_AFTER_MOVED_FILE: Duration = Duration::from_secs(5);

/// Default bound on `Sender::send_with_retry` attempts.
pub const DEFAULT_RETRY_COUNT_MAX: usize = 10;

/// Default exponential backoff parameters.
pub const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_RANDOMIZATION_FACTOR: f64 = 0.1;

/// Error codes the sink may return that the sender treats as retryable.
pub const RETRYABLE_ERROR_CODES: &[&str] =
    &["ProvisionedThroughputExceededException", "InternalFailure"];

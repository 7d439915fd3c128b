//! The data model shared across the pipeline: `ReadRange`, `SendInfo`,
//! `Chunk`, `Record`, and `Payload`.

pub mod chunk;
pub mod payload;
pub mod range;
pub mod record;

pub use chunk::{Chunk, SendInfo};
pub use payload::Payload;
pub use range::ReadRange;
pub use record::{ChunkSummary, Record, RetryRecordSummary};

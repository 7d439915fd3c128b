//! `kinesis-log-agent` tails a configured set of files, batches the lines
//! it reads into size-bounded payloads, and ships those payloads to a
//! streaming ingestion sink (Kinesis, or a local file for testing) with
//! bounded exponential-backoff retry.
//!
//! The pipeline is three independent stages connected by channels:
//!
//!  * [`watcher`] discovers files matching the configured patterns and
//!    tails each one, emitting [`model::Chunk`]s of newline-terminated
//!    bytes.
//!  * [`aggregator`] packs chunks into [`model::Payload`]s bounded by
//!    record count and byte size, flushing on a timer as well as when a
//!    payload fills up.
//!  * [`sender`] drains payloads and hands them to a [`sender::client::SendClient`],
//!    retrying any records the sink rejects.
//!
//! [`state`] durably tracks, per inode, which byte ranges of a file have
//! been successfully delivered, so a restart never re-ships already-sent
//! lines or silently skips ones that were read but never confirmed.
#![deny(trivial_numeric_casts, unused_import_braces)]

pub mod aggregator;
pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod metrics;
pub mod model;
pub mod quarantine;
pub mod reader;
pub mod retry;
pub mod sender;
pub mod state;
pub mod supervisor;
pub mod watcher;

//! `Sender`: drains aggregated `Payload`s, sends each through a
//! `SendClient` with bounded exponential-backoff retry, and durably
//! advances `FileState` after every attempt.
//!
//! Grounded on the original Go `sender/sender.go`.

pub mod client;

use std::sync::{Arc, RwLock};

use log::{error, info};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::{AgentError, Result};
use crate::model::{Payload, Record, RetryRecordSummary};
use crate::retry::ExpBackOff;
use crate::state::FileState;
use client::SendClient;

/// Read-only snapshot for the `/sender` metrics endpoint: every record
/// still failing after the most recent attempt, plus its count.
#[derive(Clone, Serialize, Default)]
pub struct SenderSnapshot {
    pub retry_records: Vec<RetryRecordSummary>,
    pub retry_records_count: usize,
}

pub struct Sender {
    client: Arc<dyn SendClient>,
    state: FileState,
    payload_rx: mpsc::Receiver<Payload>,
    backoff: ExpBackOff,
    retry_count_max: usize,
    snapshot: Arc<RwLock<SenderSnapshot>>,
}

impl Sender {
    pub fn new(client: Arc<dyn SendClient>, state: FileState, payload_rx: mpsc::Receiver<Payload>, retry_count_max: usize) -> Sender {
        Sender {
            client,
            state,
            payload_rx,
            backoff: ExpBackOff::default(),
            retry_count_max,
            snapshot: Arc::new(RwLock::new(SenderSnapshot::default())),
        }
    }

    /// Handle shared with the metrics HTTP surface.
    pub fn snapshot_handle(&self) -> Arc<RwLock<SenderSnapshot>> {
        Arc::clone(&self.snapshot)
    }

    /// Receive payloads forever; any terminal failure is fatal rather than
    /// silently dropped.
    pub async fn run(mut self) -> Result<()> {
        while let Some(payload) = self.payload_rx.recv().await {
            self.send_with_retry(payload.records).await?;
        }
        info!(target: "kinesis_log_agent::sender", "payload channel closed, sender exiting");
        Ok(())
    }

    /// Retry a shrinking batch of records until every one succeeds or the
    /// attempt budget is exhausted.
    async fn send_with_retry(&mut self, records: Vec<Record>) -> Result<()> {
        self.backoff.reset();
        let mut pending = records;

        for attempt in 0..self.retry_count_max {
            let results = self.send(pending).await;
            pending = results.into_iter().filter(|r| r.error_code.is_some()).collect();

            {
                let mut snapshot = self.snapshot.write().expect("sender snapshot lock poisoned");
                snapshot.retry_records = pending.iter().map(Record::summarize).collect();
                snapshot.retry_records_count = pending.len();
            }

            if pending.is_empty() {
                return Ok(());
            }

            if attempt + 1 < self.retry_count_max {
                tokio::time::sleep(self.backoff.next()).await;
            }
        }

        error!(target: "kinesis_log_agent::sender", "retry budget exhausted with {} record(s) still failing", pending.len());
        Err(AgentError::RetryExhausted { remaining: pending.len() })
    }

    /// One `PutRecords` attempt. Regardless of per-record outcome, every
    /// chunk's `SendInfo` is pushed into `FileState`, and the state is
    /// dumped once at the end of the attempt.
    async fn send(&mut self, records: Vec<Record>) -> Vec<Record> {
        let mut results = if records.is_empty() { Vec::new() } else { self.client.put_records(records).await };

        if results.is_empty() {
            // A transport error with an empty result list must not read as
            // a silent full-batch success; nothing to retry-mark here
            // because we have no records to annotate — the caller's
            // `pending` stays whatever was passed in via the zero-length
            // short-circuit above, so this path only fires when the input
            // itself was empty.
            return results;
        }

        for record in results.iter_mut() {
            let retryable_or_success = record.error_code.is_none();
            if retryable_or_success {
                record.mark_succeeded();
            }
            for chunk in &record.chunks {
                self.state.update(&chunk.send_info);
            }
        }

        if let Err(e) = self.state.dump_to_json() {
            error!(target: "kinesis_log_agent::sender", "failed to persist state: {e}");
        }

        results
    }
}

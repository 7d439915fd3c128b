//! The aggregator loop: packs incoming `Chunk`s through a `PayloadBuffer`
//! and emits complete `Payload`s on a periodic flush or a full batch.
//!
//! Grounded on the original Go `aggregator/aggregator.go` and its
//! `/aggregator` metrics export.

pub mod payload_buffer;

use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::info;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::model::{Chunk, Payload};
use payload_buffer::PayloadBuffer;

/// Read-only snapshot of the currently buffered payload, for the
/// `/aggregator` metrics endpoint.
#[derive(Clone, Serialize, Default)]
pub struct AggregatorSnapshot {
    pub count: usize,
    pub size: u64,
}

pub struct Aggregator {
    chunk_rx: mpsc::Receiver<Chunk>,
    payload_tx: mpsc::Sender<Payload>,
    flush_interval: Duration,
    buffer: PayloadBuffer,
    snapshot: Arc<RwLock<AggregatorSnapshot>>,
}

impl Aggregator {
    pub fn new(chunk_rx: mpsc::Receiver<Chunk>, payload_tx: mpsc::Sender<Payload>, flush_interval: Duration) -> Aggregator {
        Aggregator {
            chunk_rx,
            payload_tx,
            flush_interval,
            buffer: PayloadBuffer::default(),
            snapshot: Arc::new(RwLock::new(AggregatorSnapshot::default())),
        }
    }

    /// Handle shared with the metrics HTTP surface.
    pub fn snapshot_handle(&self) -> Arc<RwLock<AggregatorSnapshot>> {
        Arc::clone(&self.snapshot)
    }

    async fn output(&mut self, payload: Option<Payload>) {
        if let Some(payload) = payload {
            if payload.size > 0 {
                let _ = self.payload_tx.send(payload).await;
            }
        }
        self.update_snapshot();
    }

    fn update_snapshot(&self) {
        let mut snap = self.snapshot.write().expect("aggregator snapshot lock poisoned");
        snap.count = self.buffer.peek().count();
        snap.size = self.buffer.peek().size;
    }

    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                chunk = self.chunk_rx.recv() => match chunk {
                    Some(chunk) => {
                        let flushed = self.buffer.add_chunk(chunk);
                        self.output(flushed).await;
                    }
                    None => {
                        info!(target: "kinesis_log_agent::aggregator", "chunk channel closed, flushing and exiting");
                        let flushed = self.buffer.flush();
                        self.output(Some(flushed)).await;
                        return;
                    }
                },
                _ = ticker.tick() => {
                    info!(target: "kinesis_log_agent::aggregator", "interval flush");
                    let flushed = self.buffer.flush();
                    self.output(Some(flushed)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{ReadRange, SendInfo};
    use bytes::Bytes;

    fn chunk(begin: u64, end: u64) -> Chunk {
        Chunk::new(SendInfo::new(1, ReadRange::new(begin, end)), Bytes::from_static(b"dummy\n"))
    }

    #[tokio::test]
    async fn run_emits_on_full_payload_and_on_interval_flush() {
        let (chunk_tx, chunk_rx) = mpsc::channel(8);
        let (payload_tx, mut payload_rx) = mpsc::channel(8);

        let aggr = Aggregator {
            chunk_rx,
            payload_tx,
            flush_interval: Duration::from_millis(200),
            buffer: PayloadBuffer::new(10, 3, 50),
            snapshot: Arc::new(RwLock::new(AggregatorSnapshot::default())),
        };
        tokio::spawn(aggr.run());

        chunk_tx.send(chunk(0, 5)).await.unwrap();
        chunk_tx.send(chunk(5, 55)).await.unwrap();

        // Buffering the second chunk on top of the first would overflow the
        // 50-byte payload cap, so the first chunk's size-5 record flushes
        // immediately to make room.
        let p = payload_rx.recv().await.unwrap();
        assert_eq!(p.size, 5);

        // The size-50 record in progress flushes on the next interval tick.
        let p = payload_rx.recv().await.unwrap();
        assert_eq!(p.size, 50);
    }
}

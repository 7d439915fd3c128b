//! Packs `Chunk`s into `Record`s and `Record`s into a bounded `Payload`.
//!
//! Packs under three caps: a per-record unit size, a per-payload record
//! count, and a total payload byte size, applied as four ordered rules.

use crate::constants;
use crate::model::{Chunk, Payload, Record};

/// Packs chunks into records into payloads under three caps:
/// `record_unit_size`, `records_per_payload_max`, `payload_size_max`.
pub struct PayloadBuffer {
    payload: Payload,
    record_unit_size: u64,
    records_per_payload_max: usize,
    payload_size_max: u64,
}

impl Default for PayloadBuffer {
    fn default() -> Self {
        PayloadBuffer::new(
            constants::RECORD_UNIT_SIZE,
            constants::RECORDS_PER_PAYLOAD_MAX,
            constants::PAYLOAD_SIZE_MAX,
        )
    }
}

impl PayloadBuffer {
    pub fn new(record_unit_size: u64, records_per_payload_max: usize, payload_size_max: u64) -> PayloadBuffer {
        PayloadBuffer {
            payload: Payload::new(),
            record_unit_size,
            records_per_payload_max,
            payload_size_max,
        }
    }

    /// Current buffered payload, for metrics snapshots.
    pub fn peek(&self) -> &Payload {
        &self.payload
    }

    fn start_new_record_with(&mut self, chunk: Chunk) {
        let mut record = Record::new();
        record.add_chunk(chunk);
        self.payload.add_record(record);
    }

    /// Decide where `chunk` goes, flushing the current payload if needed.
    /// Returns the flushed payload, if any, per the four ordered rules above.
    pub fn add_chunk(&mut self, chunk: Chunk) -> Option<Payload> {
        let size = chunk.size();

        // Rule 1: the chunk alone would overflow the payload's total size.
        if self.payload.size + size > self.payload_size_max {
            let flushed = self.flush();
            self.start_new_record_with(chunk);
            return Some(flushed);
        }

        // Rule 2: the chunk itself exceeds the per-record unit cap and must
        // ship alone as a singleton record.
        if size > self.record_unit_size {
            let mut flushed = None;
            if self.payload.count() + 1 > self.records_per_payload_max {
                flushed = Some(self.flush());
            }
            self.start_new_record_with(chunk);
            return flushed;
        }

        // Rule 3: appending to the last record would overflow the unit cap,
        // so a new record is needed.
        let last_size = self.payload.last_record().map(|r| r.size).unwrap_or(0);
        if last_size + size > self.record_unit_size {
            let mut flushed = None;
            if self.payload.count() + 1 > self.records_per_payload_max {
                flushed = Some(self.flush());
            }
            self.start_new_record_with(chunk);
            return flushed;
        }

        // Rule 4: append to the last record (lazily created if the payload
        // is currently empty).
        self.payload.last_record_mut().add_chunk(chunk);
        None
    }

    /// Return the current payload, even if empty or partial, and install a
    /// fresh empty one.
    pub fn flush(&mut self) -> Payload {
        std::mem::take(&mut self.payload)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::range::ReadRange;
    use crate::model::chunk::SendInfo;
    use bytes::Bytes;

    fn chunk(begin: u64, len: u64) -> Chunk {
        let body = "d".repeat((len - 1) as usize) + "\n";
        Chunk::new(SendInfo::new(1, ReadRange::new(begin, begin + len)), Bytes::from(body))
    }

    #[test]
    fn packs_records_under_unit_cap() {
        let mut buf = PayloadBuffer::new(10, 3, 50);
        assert!(buf.add_chunk(chunk(0, 5)).is_none());
        assert!(buf.add_chunk(chunk(5, 5)).is_none());
        assert_eq!(buf.peek().last_record().unwrap().size, 10);
        assert_eq!(buf.peek().size, 10);

        // A third chunk must start a new record: 10 + 5 > 10.
        assert!(buf.add_chunk(chunk(10, 5)).is_none());
        assert_eq!(buf.peek().count(), 2);
    }

    #[test]
    fn flushes_when_record_count_would_exceed_cap() {
        let mut buf = PayloadBuffer::new(10, 3, 50);
        for i in 0..6 {
            assert!(buf.add_chunk(chunk(i * 5, 5)).is_none());
        }
        assert_eq!(buf.peek().count(), 3);
        assert_eq!(buf.peek().size, 30);

        // Seventh and eighth chunks finish the 4th record in-progress...
        assert!(buf.add_chunk(chunk(30, 5)).is_none());
        // ...the ninth chunk would start a 5th record, exceeding the cap of 3
        // so the 30-then-35 payload flushes first.
        let flushed = buf.add_chunk(chunk(35, 5));
        assert!(flushed.is_some());
        assert_eq!(flushed.unwrap().size, 35);
        assert_eq!(buf.peek().count(), 1);
    }

    #[test]
    fn flushes_on_payload_size_overflow() {
        let mut buf = PayloadBuffer::new(10, 500, 12);
        assert!(buf.add_chunk(chunk(0, 10)).is_none());
        let flushed = buf.add_chunk(chunk(10, 5));
        assert!(flushed.is_some());
        assert_eq!(flushed.unwrap().size, 10);
        assert_eq!(buf.peek().size, 5);
    }

    #[test]
    fn oversize_chunk_becomes_singleton_record() {
        let mut buf = PayloadBuffer::new(10, 500, 1000);
        assert!(buf.add_chunk(chunk(0, 20)).is_none());
        assert_eq!(buf.peek().count(), 1);
        assert_eq!(buf.peek().last_record().unwrap().chunks.len(), 1);
        assert_eq!(buf.peek().last_record().unwrap().size, 20);
    }

    #[test]
    fn empty_flush_returns_empty_payload() {
        let mut buf = PayloadBuffer::default();
        let p = buf.flush();
        assert_eq!(p.size, 0);
        assert_eq!(p.count(), 0);
    }
}

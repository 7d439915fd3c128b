//! `Record`: the unit the sink treats atomically.

use serde::Serialize;

use crate::model::chunk::Chunk;

/// One or more `Chunk`s packed up to the record-unit size cap.
///
/// `size == chunks.iter().map(Chunk::size).sum()`. A record is reported as
/// succeeded by the sink as a whole; `error_code`/`error_message` are set by
/// the sender from the sink's per-record response.
#[derive(Clone, Debug, Default)]
pub struct Record {
    pub size: u64,
    pub chunks: Vec<Chunk>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl Record {
    pub fn new() -> Record {
        Record::default()
    }

    pub fn add_chunk(&mut self, chunk: Chunk) {
        self.size += chunk.size();
        self.chunks.push(chunk);
    }

    /// Mark every member chunk's `SendInfo` as delivered.
    pub fn mark_succeeded(&mut self) {
        for chunk in &mut self.chunks {
            chunk.send_info.succeeded = true;
        }
    }

    pub fn failed(&self) -> bool {
        self.error_code.is_some()
    }

    /// Concatenated bytes of every member chunk, in order. This is the byte
    /// sequence handed to a sink as the record's payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size as usize);
        for chunk in &self.chunks {
            out.extend_from_slice(&chunk.body);
        }
        out
    }

    /// A JSON-serializable summary of this record, for the `/sender`
    /// metrics endpoint. Carries each chunk's inode and byte range rather
    /// than its body, since the endpoint reports retry status, not content.
    pub fn summarize(&self) -> RetryRecordSummary {
        RetryRecordSummary {
            size: self.size,
            chunks: self
                .chunks
                .iter()
                .map(|c| ChunkSummary { inode: c.send_info.inode, begin: c.send_info.range.begin, end: c.send_info.range.end })
                .collect(),
            error_code: self.error_code.clone(),
            error_message: self.error_message.clone(),
        }
    }
}

/// One chunk's identity within a `RetryRecordSummary`: which file (by
/// inode) and which byte range, without its body.
#[derive(Clone, Debug, Serialize)]
pub struct ChunkSummary {
    pub inode: u64,
    pub begin: u64,
    pub end: u64,
}

/// Everything the `/sender` metrics endpoint needs to report about one
/// still-failing record.
#[derive(Clone, Debug, Serialize)]
pub struct RetryRecordSummary {
    pub size: u64,
    pub chunks: Vec<ChunkSummary>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::range::ReadRange;
    use crate::model::chunk::SendInfo;
    use bytes::Bytes;

    fn chunk(begin: u64, body: &str) -> Chunk {
        let end = begin + body.len() as u64;
        Chunk::new(SendInfo::new(1, ReadRange::new(begin, end)), Bytes::from(body.to_string()))
    }

    #[test]
    fn size_tracks_appended_chunks() {
        let mut r = Record::new();
        r.add_chunk(chunk(0, "abc\n"));
        r.add_chunk(chunk(4, "de\n"));
        assert_eq!(r.size, 7);
        assert_eq!(r.to_bytes(), b"abc\nde\n");
    }

    #[test]
    fn mark_succeeded_propagates_to_chunks() {
        let mut r = Record::new();
        r.add_chunk(chunk(0, "abc\n"));
        r.mark_succeeded();
        assert!(r.chunks[0].send_info.succeeded);
    }
}

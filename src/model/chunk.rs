//! `SendInfo` and `Chunk`: the units a line reader hands to the aggregator.

use crate::model::range::ReadRange;
use bytes::Bytes;

/// Travels with every `Chunk` through the pipeline; the sender flips
/// `succeeded` before handing it to `FileState::update`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendInfo {
    pub inode: u64,
    pub range: ReadRange,
    pub succeeded: bool,
}

impl SendInfo {
    pub fn new(inode: u64, range: ReadRange) -> SendInfo {
        SendInfo {
            inode,
            range,
            succeeded: false,
        }
    }
}

/// An atomic unit of newline-terminated bytes extracted by a reader.
///
/// Invariant: `body.len() as u64 == send_info.range.len()`, `body` ends in
/// `\n`, and `body` contains only complete lines each no longer than
/// `MaxLineSize`.
#[derive(Clone, Debug)]
pub struct Chunk {
    pub send_info: SendInfo,
    pub body: Bytes,
}

impl Chunk {
    pub fn new(send_info: SendInfo, body: Bytes) -> Chunk {
        debug_assert_eq!(body.len() as u64, send_info.range.len());
        debug_assert!(body.last() == Some(&b'\n'), "chunk body must end in a newline");
        Chunk { send_info, body }
    }

    pub fn size(&self) -> u64 {
        self.send_info.range.len()
    }
}

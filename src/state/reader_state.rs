//! `ReaderState`: per-inode persisted read progress.
//!
//! Grounded on the original Go `state/state.go`'s `ReaderState`.

use serde::{Deserialize, Serialize};

use crate::model::ReadRange;

/// Per-inode persisted state: the path last seen for this inode, the
/// reader's frontier `pos`, and the disjoint, sorted set of confirmed
/// `send_ranges` within `[0, pos)`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReaderState {
    /// Absent for older on-disk entries; always populated for new ones.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub path: Option<String>,
    pub pos: u64,
    #[serde(default, rename = "send_ranges")]
    pub send_ranges: Vec<ReadRange>,
}

impl ReaderState {
    pub fn new(path: String) -> ReaderState {
        ReaderState {
            path: Some(path),
            pos: 0,
            send_ranges: Vec::new(),
        }
    }

    /// Append a confirmed range; caller must `compact()` afterward.
    pub fn add_send_range(&mut self, range: ReadRange) {
        self.send_ranges.push(range);
    }

    /// Advance the frontier: `pos = max(pos, range.end)`.
    pub fn update_pos(&mut self, range: ReadRange) {
        self.pos = self.pos.max(range.end);
    }

    /// Stable-sort by `begin`, then merge strictly-adjacent ranges
    /// (`a.end == b.begin`). Overlaps are not expected by construction and
    /// are left untouched if they somehow occur.
    pub fn compact(&mut self) {
        self.send_ranges.sort_by_key(|r| r.begin);

        let mut merged: Vec<ReadRange> = Vec::with_capacity(self.send_ranges.len());
        for range in self.send_ranges.drain(..) {
            match merged.last_mut() {
                Some(last) if last.adjacent_to(&range) => {
                    *last = ReadRange::new(last.begin, range.end);
                }
                _ => merged.push(range),
            }
        }
        self.send_ranges = merged;
    }

    /// The complement of `send_ranges` inside `[0, pos)`: the byte ranges
    /// that have been read from disk (counted in `pos`) but never confirmed
    /// delivered. Replayed by `LineReader::initial_read` at startup.
    pub fn leaked_ranges(&self) -> Vec<ReadRange> {
        let mut leaked = Vec::new();

        if self.send_ranges.is_empty() {
            if self.pos > 0 {
                leaked.push(ReadRange::new(0, self.pos));
            }
            return leaked;
        }

        let first = self.send_ranges.first().unwrap();
        if first.begin > 0 {
            leaked.push(ReadRange::new(0, first.begin));
        }

        for pair in self.send_ranges.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            if prev.end != next.begin {
                leaked.push(ReadRange::new(prev.end, next.begin));
            }
        }

        let last = self.send_ranges.last().unwrap();
        if last.end < self.pos {
            leaked.push(ReadRange::new(last.end, self.pos));
        }

        leaked
    }

    /// Fully delivered through the frontier: used by `FileState::compact` to
    /// decide whether a rotated-away inode's entry can be dropped.
    pub fn fully_delivered(&self) -> bool {
        match self.send_ranges.last() {
            Some(last) => last.end == self.pos,
            None => self.pos == 0,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn rs(pos: u64, ranges: &[(u64, u64)]) -> ReaderState {
        ReaderState {
            path: Some("f".to_string()),
            pos,
            send_ranges: ranges.iter().map(|&(b, e)| ReadRange::new(b, e)).collect(),
        }
    }

    #[test]
    fn compact_merges_adjacent_ranges() {
        let mut s = rs(100, &[(60, 100), (0, 40), (40, 60)]);
        s.compact();
        assert_eq!(s.send_ranges, vec![ReadRange::new(0, 100)]);
    }

    #[test]
    fn compact_is_idempotent() {
        let mut s = rs(100, &[(0, 40), (60, 100)]);
        s.compact();
        let once = s.send_ranges.clone();
        s.compact();
        assert_eq!(s.send_ranges, once);
    }

    #[test]
    fn leaked_ranges_cover_the_gaps() {
        let s = rs(100, &[(0, 40), (60, 100)]);
        assert_eq!(s.leaked_ranges(), vec![ReadRange::new(40, 60)]);
    }

    #[test]
    fn leaked_ranges_empty_send_ranges_is_whole_prefix() {
        let s = rs(50, &[]);
        assert_eq!(s.leaked_ranges(), vec![ReadRange::new(0, 50)]);

        let s0 = rs(0, &[]);
        assert!(s0.leaked_ranges().is_empty());
    }

    #[test]
    fn leaked_round_trip_after_full_delivery() {
        let mut s = rs(100, &[(0, 40), (60, 100)]);
        for leaked in s.leaked_ranges() {
            s.add_send_range(leaked);
        }
        s.compact();
        assert_eq!(s.send_ranges, vec![ReadRange::new(0, 100)]);
        assert!(s.leaked_ranges().is_empty());
    }

    #[test]
    fn fully_delivered_tracks_frontier() {
        let s = rs(100, &[(0, 100)]);
        assert!(s.fully_delivered());
        let s2 = rs(100, &[(0, 40)]);
        assert!(!s2.fully_delivered());
    }

    /// A generated, already-disjoint `(pos, send_ranges)` pair: alternating
    /// spans are either pushed as a send range or left as a gap, so no
    /// construction step can produce an overlap.
    #[derive(Clone, Debug)]
    struct DisjointRanges {
        pos: u64,
        send_ranges: Vec<ReadRange>,
    }

    impl quickcheck::Arbitrary for DisjointRanges {
        fn arbitrary(g: &mut quickcheck::Gen) -> DisjointRanges {
            let spans: Vec<u8> = quickcheck::Arbitrary::arbitrary(g);
            let mut send_ranges = Vec::new();
            let mut cursor = 0u64;

            for (i, span) in spans.iter().enumerate() {
                let len = (*span as u64) % 20;
                if len == 0 {
                    continue;
                }
                if i % 2 == 0 {
                    send_ranges.push(ReadRange::new(cursor, cursor + len));
                }
                cursor += len;
            }

            DisjointRanges { pos: cursor, send_ranges }
        }
    }

    impl DisjointRanges {
        fn into_state(self) -> ReaderState {
            ReaderState { path: Some("f".to_string()), pos: self.pos, send_ranges: self.send_ranges }
        }
    }

    /// `send_ranges` and `leaked_ranges()` together cover `[0, pos)` exactly
    /// once: every byte below `pos` is in exactly one of the two sets.
    #[quickcheck_macros::quickcheck]
    fn coverage_is_exact(input: DisjointRanges) -> bool {
        let mut s = input.into_state();
        s.compact();

        let mut covered: Vec<ReadRange> = s.send_ranges.iter().copied().chain(s.leaked_ranges()).collect();
        covered.sort_by_key(|r| r.begin);

        let mut expected_next = 0u64;
        for range in &covered {
            if range.begin != expected_next {
                return false;
            }
            expected_next = range.end;
        }
        expected_next == s.pos
    }

    /// Compacting an already-compact state changes nothing.
    #[quickcheck_macros::quickcheck]
    fn compact_is_idempotent_prop(input: DisjointRanges) -> bool {
        let mut s = input.into_state();
        s.compact();
        let once = s.send_ranges.clone();
        s.compact();
        s.send_ranges == once
    }

    /// Replaying every leaked range and recompacting leaves nothing leaked.
    #[quickcheck_macros::quickcheck]
    fn leaked_ranges_round_trip(input: DisjointRanges) -> bool {
        let mut s = input.into_state();
        s.compact();
        for leaked in s.leaked_ranges() {
            s.add_send_range(leaked);
        }
        s.compact();
        s.leaked_ranges().is_empty()
    }
}

//! The per-inode line reader: tails one open file descriptor, assembling
//! newline-terminated `Chunk`s and routing oversize lines to quarantine.
//!
//! Grounded on the original Go `reader/file_reader.go`.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use log::{error, warn};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::constants;
use crate::error::{AgentError, Result};
use crate::model::{Chunk, ReadRange, SendInfo};
use crate::reader::life_timer::LifeTimer;
use crate::state::ReaderState;

/// Metrics export shape for the `/file_watcher` endpoint.
#[derive(Serialize)]
pub struct LineReaderMetrics {
    pub pos: u64,
    pub path: String,
}

pub struct LineReader {
    path: PathBuf,
    inode: u64,
    pos: u64,
    file: Option<File>,
    quarantine_tx: Option<mpsc::UnboundedSender<Bytes>>,
    life_timer: LifeTimer,
    max_line_size: u64,
    last_read_errored: bool,
}

impl LineReader {
    pub fn open(
        path: impl AsRef<Path>,
        inode: u64,
        quarantine_tx: Option<mpsc::UnboundedSender<Bytes>>,
        lifetime_after_file_moved: Duration,
    ) -> Result<LineReader> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| AgentError::ReaderIo { path: path.clone(), source: e })?;

        Ok(LineReader {
            life_timer: LifeTimer::new(path.clone(), inode).with_life_time(lifetime_after_file_moved),
            path,
            inode,
            pos: 0,
            file: Some(file),
            quarantine_tx,
            max_line_size: constants::DEFAULT_MAX_LINE_SIZE,
            last_read_errored: false,
        })
    }

    pub fn opened(&self) -> bool {
        self.file.is_some()
    }

    pub fn export(&self) -> LineReaderMetrics {
        LineReaderMetrics { pos: self.pos, path: self.path.display().to_string() }
    }

    pub fn rotated(&self) -> bool {
        match std::fs::metadata(&self.path) {
            Ok(meta) => meta.ino() != self.inode,
            Err(_) => true,
        }
    }

    fn close(&mut self) {
        self.file = None;
    }

    fn file_mut(&mut self) -> Result<&mut File> {
        self.file.as_mut().ok_or_else(|| AgentError::ReaderIo {
            path: self.path.clone(),
            source: std::io::Error::new(ErrorKind::Other, "reader already closed"),
        })
    }

    fn quarantine(&self, line: &[u8]) {
        warn!(target: "kinesis_log_agent::reader", "line over {} bytes on {}, quarantining", self.max_line_size, self.path.display());
        if let Some(tx) = &self.quarantine_tx {
            if tx.send(Bytes::copy_from_slice(line)).is_err() {
                error!(target: "kinesis_log_agent::reader", "quarantine writer gone, dropping oversize line from {}", self.path.display());
            }
        }
    }

    /// Read whatever new, complete lines are available starting at `pos`.
    /// Returns `Ok(None)` at EOF with no new lines. A read error partway
    /// through still yields any already-assembled, newline-terminated
    /// chunk; callers consult `last_read_errored()` to learn whether the
    /// underlying file is in trouble.
    pub fn read_lines(&mut self) -> Result<Option<Chunk>> {
        self.last_read_errored = false;

        if std::fs::metadata(&self.path).is_err() {
            return Err(AgentError::ReaderIo {
                path: self.path.clone(),
                source: std::io::Error::new(ErrorKind::NotFound, "file vanished"),
            });
        }

        let start = self.pos;
        {
            let file = self.file_mut()?;
            file.seek(SeekFrom::Start(start)).map_err(|e| AgentError::ReaderIo { path: self.path.clone(), source: e })?;
        }

        let mut accepted: Vec<u8> = Vec::new();
        let mut pending: Vec<u8> = Vec::new();
        let mut block = [0u8; constants::READ_BYTE_SIZE];

        loop {
            let n = match self.file_mut().and_then(|f| {
                f.read(&mut block).map_err(|e| AgentError::ReaderIo { path: self.path.clone(), source: e })
            }) {
                Ok(n) => n,
                Err(_) => {
                    self.last_read_errored = true;
                    break;
                }
            };

            if n == 0 {
                break;
            }

            let mut start_of_pending = 0usize;
            for i in 0..n {
                if block[i] == b'\n' {
                    pending.extend_from_slice(&block[start_of_pending..=i]);
                    let line_size = pending.len() as u64;
                    if line_size > self.max_line_size {
                        self.quarantine(&pending);
                    } else {
                        accepted.extend_from_slice(&pending);
                    }
                    pending.clear();
                    start_of_pending = i + 1;
                }
            }
            pending.extend_from_slice(&block[start_of_pending..n]);

            if n < constants::READ_BYTE_SIZE {
                break;
            }
        }

        if accepted.is_empty() {
            return if self.last_read_errored {
                Err(AgentError::ReaderIo {
                    path: self.path.clone(),
                    source: std::io::Error::new(ErrorKind::Other, "read failed before any full line"),
                })
            } else {
                Ok(None)
            };
        }

        let len = accepted.len() as u64;
        let range = ReadRange::new(start, start + len);
        self.pos = start + len;

        Ok(Some(Chunk::new(SendInfo::new(self.inode, range), Bytes::from(accepted))))
    }

    pub fn last_read_errored(&self) -> bool {
        self.last_read_errored
    }

    /// Read exactly `range.len()` bytes at `range.begin`, for replaying a
    /// leaked range recorded before a crash.
    pub fn read_lines_in_range(&mut self, range: ReadRange) -> Result<Chunk> {
        if std::fs::metadata(&self.path).is_err() {
            return Err(AgentError::ReaderIo {
                path: self.path.clone(),
                source: std::io::Error::new(ErrorKind::NotFound, "file vanished"),
            });
        }

        let expected = range.len();
        {
            let file = self.file_mut()?;
            file.seek(SeekFrom::Start(range.begin)).map_err(|e| AgentError::ReaderIo { path: self.path.clone(), source: e })?;
        }

        let mut buf = vec![0u8; expected as usize];
        let mut filled = 0usize;
        loop {
            if filled == buf.len() {
                break;
            }
            let n = self
                .file_mut()?
                .read(&mut buf[filled..])
                .map_err(|e| AgentError::ReaderIo { path: self.path.clone(), source: e })?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled as u64 != expected {
            return Err(AgentError::RangeSizeMismatch { path: self.path.clone(), expected, actual: filled as u64 });
        }

        Ok(Chunk::new(SendInfo::new(self.inode, range), Bytes::from(buf)))
    }

    /// Replay every leaked range from a prior run, in order, before normal
    /// ticking resumes.
    pub async fn initial_read(&mut self, reader_state: &ReaderState, chunk_tx: &mpsc::Sender<Chunk>) -> Result<()> {
        for range in reader_state.leaked_ranges() {
            let chunk = self.read_lines_in_range(range)?;
            if chunk_tx.send(chunk).await.is_err() {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Drive this reader until its clock channel closes or its LifeTimer
    /// decides it has outlived a rotated/removed file.
    pub async fn run(mut self, reader_state: ReaderState, mut clock_rx: mpsc::Receiver<()>, chunk_tx: mpsc::Sender<Chunk>) {
        if let Err(e) = self.initial_read(&reader_state, &chunk_tx).await {
            error!(target: "kinesis_log_agent::reader", "initial read of {} failed: {e}", self.path.display());
            return;
        }
        self.pos = reader_state.pos;

        while clock_rx.recv().await.is_some() {
            let chunk = match self.read_lines() {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!(target: "kinesis_log_agent::reader", "read error on {}: {e}", self.path.display());
                    None
                }
            };

            if self.last_read_errored || self.rotated() {
                if self.life_timer.should_die() && chunk.is_none() {
                    self.close();
                    return;
                }
            }

            if let Some(chunk) = chunk {
                if chunk_tx.send(chunk).await.is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn inode_of(path: &Path) -> u64 {
        std::fs::metadata(path).unwrap().ino()
    }

    #[test]
    fn reads_only_complete_lines() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "hello\nworld\nincomple").unwrap();
        let inode = inode_of(file.path());

        let mut reader = LineReader::open(file.path(), inode, None, constants::DEFAULT_LIFETIME_AFTER_MOVED_FILE).unwrap();
        let chunk = reader.read_lines().unwrap().unwrap();
        assert_eq!(&chunk.body[..], b"hello\nworld\n");
        assert_eq!(reader.pos, 12);

        assert!(reader.read_lines().unwrap().is_none());
    }

    #[test]
    fn oversize_line_is_quarantined_and_skipped() {
        let mut file = NamedTempFile::new().unwrap();
        let long_line = "a".repeat(20);
        write!(file, "{long_line}\nshort\n").unwrap();
        let inode = inode_of(file.path());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut reader = LineReader::open(file.path(), inode, Some(tx), constants::DEFAULT_LIFETIME_AFTER_MOVED_FILE).unwrap();
        reader.max_line_size = 10;

        let chunk = reader.read_lines().unwrap().unwrap();
        assert_eq!(&chunk.body[..], b"short\n");

        let quarantined = rx.try_recv().unwrap();
        assert_eq!(&quarantined[..], format!("{long_line}\n").as_bytes());
    }

    #[test]
    fn read_lines_in_range_reads_exact_span() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "one\ntwo\nthree\n").unwrap();
        let inode = inode_of(file.path());

        let mut reader = LineReader::open(file.path(), inode, None, constants::DEFAULT_LIFETIME_AFTER_MOVED_FILE).unwrap();
        let chunk = reader.read_lines_in_range(ReadRange::new(4, 8)).unwrap();
        assert_eq!(&chunk.body[..], b"two\n");
    }

    #[test]
    fn read_lines_in_range_mismatch_errors() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "short\n").unwrap();
        let inode = inode_of(file.path());

        let mut reader = LineReader::open(file.path(), inode, None, constants::DEFAULT_LIFETIME_AFTER_MOVED_FILE).unwrap();
        let err = reader.read_lines_in_range(ReadRange::new(0, 100)).unwrap_err();
        assert!(matches!(err, AgentError::RangeSizeMismatch { .. }));
    }

    #[test]
    fn rotated_detects_inode_change() {
        let file = NamedTempFile::new().unwrap();
        let inode = inode_of(file.path());
        let reader = LineReader::open(file.path(), inode, None, constants::DEFAULT_LIFETIME_AFTER_MOVED_FILE).unwrap();
        assert!(!reader.rotated());

        let other = NamedTempFile::new().unwrap();
        std::fs::rename(other.path(), file.path()).unwrap();
        assert!(reader.rotated());
    }
}

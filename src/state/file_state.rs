//! `FileState`: process-wide persisted read state, one writer mutex guarding
//! the whole inode -> `ReaderState` map.
//!
//! Grounded on the original Go `state/file_state.go`: load/dump wholesale
//! JSON, a single mutex, and deletion only ever happening in `compact`.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::{info, warn};

use crate::error::{AgentError, Result, StateErrorSource};
use crate::model::SendInfo;
use crate::state::reader_state::ReaderState;

/// Process-wide persisted read state. Cheap to clone: internally an
/// `Arc<Mutex<...>>`, so every task that needs to read or update state
/// shares the same lock.
#[derive(Clone)]
pub struct FileState {
    path: PathBuf,
    inner: Arc<Mutex<HashMap<u64, ReaderState>>>,
}

impl FileState {
    /// Load state from `path`, creating an empty state file if none exists.
    pub fn load_from_json(path: impl AsRef<Path>) -> Result<FileState> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            info!("creating new state file at {}", path.display());
            let state = FileState {
                path: path.clone(),
                inner: Arc::new(Mutex::new(HashMap::new())),
            };
            state.dump_to_json()?;
            return Ok(state);
        }

        let bytes = fs::read(&path).map_err(|e| AgentError::State {
            path: path.clone(),
            source: StateErrorSource::Io(e),
        })?;
        let map: HashMap<u64, ReaderState> = serde_json::from_slice(&bytes).map_err(|e| AgentError::State {
            path: path.clone(),
            source: StateErrorSource::Json(e),
        })?;

        Ok(FileState {
            path,
            inner: Arc::new(Mutex::new(map)),
        })
    }

    /// Look up the `ReaderState` for `inode`, if it has been created.
    pub fn get_reader_state(&self, inode: u64) -> Option<ReaderState> {
        self.inner.lock().expect("FileState mutex poisoned").get(&inode).cloned()
    }

    /// Create (or return the existing) `ReaderState` for `inode`.
    pub fn create_reader_state(&self, inode: u64, path: String) -> ReaderState {
        let mut guard = self.inner.lock().expect("FileState mutex poisoned");
        guard.entry(inode).or_insert_with(|| ReaderState::new(path)).clone()
    }

    /// Apply one chunk's outcome: advance `pos` unconditionally, and record
    /// the range as delivered (then compact) if it succeeded.
    pub fn update(&self, send_info: &SendInfo) {
        let mut guard = self.inner.lock().expect("FileState mutex poisoned");
        let entry = guard.entry(send_info.inode).or_insert_with(ReaderState::default);

        if send_info.succeeded {
            entry.add_send_range(send_info.range);
            entry.compact();
        }
        entry.update_pos(send_info.range);
    }

    /// Drop inode entries that are both fully delivered through their
    /// frontier and whose path no longer resolves to that inode (i.e. the
    /// file rotated away). The only place entries are ever removed.
    pub fn compact(&self) {
        let mut guard = self.inner.lock().expect("FileState mutex poisoned");
        guard.retain(|inode, state| {
            let rotated_away = match &state.path {
                Some(p) => current_inode(p) != Some(*inode),
                None => true,
            };
            !(state.fully_delivered() && rotated_away)
        });
    }

    /// Compact, serialize the whole map as indented JSON, and replace the
    /// state file wholesale with fsync-on-close semantics.
    pub fn dump_to_json(&self) -> Result<()> {
        self.compact();

        let snapshot = {
            let guard = self.inner.lock().expect("FileState mutex poisoned");
            guard.clone()
        };

        let json = serde_json::to_vec_pretty(&snapshot).map_err(|e| AgentError::State {
            path: self.path.clone(),
            source: StateErrorSource::Json(e),
        })?;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|e| AgentError::State {
                path: self.path.clone(),
                source: StateErrorSource::Io(e),
            })?;
        file.write_all(&json).map_err(|e| AgentError::State {
            path: self.path.clone(),
            source: StateErrorSource::Io(e),
        })?;
        file.sync_all().map_err(|e| AgentError::State {
            path: self.path.clone(),
            source: StateErrorSource::Io(e),
        })?;

        Ok(())
    }

    /// Snapshot of every reader's position, for the `/file_watcher` metrics
    /// endpoint.
    pub fn snapshot(&self) -> HashMap<u64, ReaderState> {
        self.inner.lock().expect("FileState mutex poisoned").clone()
    }
}

fn current_inode(path: &str) -> Option<u64> {
    match fs::metadata(path) {
        Ok(meta) => Some(meta.ino()),
        Err(e) => {
            warn!(target: "kinesis_log_agent::state", "stat failed for {path}: {e}");
            None
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::ReadRange;
    use tempfile::tempdir;

    #[test]
    fn load_missing_file_creates_empty_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let state = FileState::load_from_json(&path).unwrap();
        assert!(path.exists());
        assert!(state.snapshot().is_empty());
    }

    #[test]
    fn update_advances_pos_even_on_failure() {
        let dir = tempdir().unwrap();
        let state = FileState::load_from_json(dir.path().join("state.json")).unwrap();
        state.create_reader_state(1, "f".to_string());

        let mut send_info = SendInfo::new(1, ReadRange::new(0, 10));
        send_info.succeeded = false;
        state.update(&send_info);

        let snap = state.get_reader_state(1).unwrap();
        assert_eq!(snap.pos, 10);
        assert!(snap.send_ranges.is_empty());
    }

    #[test]
    fn dump_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let state = FileState::load_from_json(&path).unwrap();
        state.create_reader_state(42, "f".to_string());
        let mut send_info = SendInfo::new(42, ReadRange::new(0, 5));
        send_info.succeeded = true;
        state.update(&send_info);
        state.dump_to_json().unwrap();

        let reloaded = FileState::load_from_json(&path).unwrap();
        let rs = reloaded.get_reader_state(42).unwrap();
        assert_eq!(rs.pos, 5);
        assert_eq!(rs.send_ranges, vec![ReadRange::new(0, 5)]);
    }
}

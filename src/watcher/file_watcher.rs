//! `FileWatcher`: owns filesystem-event subscriptions, spawns one
//! `LineReader` task per watched inode, and drives their clock ticks.
//!
//! Grounded on the original Go `file_watcher/file_watcher.go` and its
//! `fswatcher` helper; the fsnotify binding is replaced by `notify`, and the
//! per-inode `Reader.Opened()` poll is replaced with the tokio idiom of
//! treating a failed send on the clock channel as "the reader exited".

use std::collections::{HashMap, HashSet};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use log::{error, info, warn};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::model::Chunk;
use crate::reader::LineReader;
use crate::state::FileState;

struct ReaderHandle {
    path: PathBuf,
    clock_tx: mpsc::Sender<()>,
}

pub struct FileWatcher {
    watch_paths: Vec<String>,
    read_file_interval: Duration,
    lifetime_after_file_moved: Duration,
    quarantine_tx: mpsc::UnboundedSender<Bytes>,
    state: FileState,
    chunk_tx: mpsc::Sender<Chunk>,
    readers: HashMap<u64, ReaderHandle>,
    _fs_watcher: Option<RecommendedWatcher>,
    fs_events: mpsc::UnboundedReceiver<notify::Event>,
}

impl FileWatcher {
    pub fn new(
        watch_paths: Vec<String>,
        lifetime_after_file_moved: Duration,
        read_file_interval: Duration,
        quarantine_tx: mpsc::UnboundedSender<Bytes>,
        state: FileState,
        chunk_tx: mpsc::Sender<Chunk>,
    ) -> notify::Result<FileWatcher> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut fs_watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                let _ = events_tx.send(event);
            }
            Err(e) => error!(target: "kinesis_log_agent::watcher", "filesystem watch error: {e}"),
        })?;

        for dir in watched_directories(&watch_paths) {
            if let Err(e) = fs_watcher.watch(&dir, RecursiveMode::NonRecursive) {
                warn!(target: "kinesis_log_agent::watcher", "could not watch {}: {e}", dir.display());
            } else {
                info!(target: "kinesis_log_agent::watcher", "watching directory {}", dir.display());
            }
        }

        Ok(FileWatcher {
            watch_paths,
            read_file_interval,
            lifetime_after_file_moved,
            quarantine_tx,
            state,
            chunk_tx,
            readers: HashMap::new(),
            _fs_watcher: Some(fs_watcher),
            fs_events: events_rx,
        })
    }

    /// All paths currently matched by the configured patterns.
    fn expand_paths(&self) -> Vec<PathBuf> {
        expand_paths(&self.watch_paths)
    }

    /// Spawn a reader for every currently existing matched path.
    pub fn init_readers(&mut self) {
        for path in self.expand_paths() {
            match inode_of(&path) {
                Some(inode) => self.start_reader(path, inode),
                None => warn!(target: "kinesis_log_agent::watcher", "target file not found: {}", path.display()),
            }
        }
    }

    fn start_reader(&mut self, path: PathBuf, inode: u64) {
        if self.readers.contains_key(&inode) {
            return;
        }

        let reader_state = match self.state.get_reader_state(inode) {
            Some(rs) => rs,
            None => self.state.create_reader_state(inode, path.display().to_string()),
        };

        let line_reader = match LineReader::open(&path, inode, Some(self.quarantine_tx.clone()), self.lifetime_after_file_moved) {
            Ok(r) => r,
            Err(e) => {
                error!(target: "kinesis_log_agent::watcher", "could not start reader for {}: {e}", path.display());
                return;
            }
        };

        let (clock_tx, clock_rx) = mpsc::channel(1);
        let chunk_tx = self.chunk_tx.clone();
        tokio::spawn(line_reader.run(reader_state, clock_rx, chunk_tx));

        info!(target: "kinesis_log_agent::watcher", "started reader {} {}", inode, path.display());
        self.readers.insert(inode, ReaderHandle { path, clock_tx });
    }

    /// Main loop: periodic tick fan-out, filesystem events, and cooperative
    /// shutdown when `control_rx` closes.
    pub async fn run(mut self, mut control_rx: mpsc::Receiver<()>) {
        self.init_readers();

        let mut ticker = tokio::time::interval(self.read_file_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let mut dead = Vec::new();
                    for (inode, handle) in self.readers.iter() {
                        if handle.clock_tx.send(()).await.is_err() {
                            dead.push(*inode);
                        }
                    }
                    for inode in dead {
                        self.readers.remove(&inode);
                        info!(target: "kinesis_log_agent::watcher", "reader {inode} deregistered");
                    }
                }
                event = self.fs_events.recv() => {
                    match event {
                        Some(event) => self.handle_fs_event(event),
                        None => continue,
                    }
                }
                _ = control_rx.recv() => {
                    info!(target: "kinesis_log_agent::watcher", "shutting down");
                    return;
                }
            }
        }
    }

    fn handle_fs_event(&mut self, event: notify::Event) {
        if !matches!(event.kind, EventKind::Create(_)) {
            return;
        }

        for path in event.paths {
            if !self.should_watch(&path) {
                continue;
            }
            let inode = match inode_of(&path) {
                Some(inode) => inode,
                None => {
                    error!(target: "kinesis_log_agent::watcher", "inode not found for {}", path.display());
                    continue;
                }
            };
            if !self.readers.contains_key(&inode) {
                self.start_reader(path, inode);
            }
        }
    }

    fn should_watch(&self, path: &Path) -> bool {
        self.expand_paths().iter().any(|p| p == path)
    }

    /// Snapshot of reader positions for the `/file_watcher` metrics
    /// endpoint, sourced from durably committed state rather than each
    /// reader's in-flight `pos` (readers run as independent tasks and are
    /// not otherwise queryable without their own shared state).
    pub fn metrics_snapshot(&self) -> HashMap<u64, (String, u64)> {
        self.state
            .snapshot()
            .into_iter()
            .filter_map(|(inode, rs)| rs.path.map(|path| (inode, (path, rs.pos))))
            .collect()
    }
}

fn inode_of(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok().map(|m| m.ino())
}

fn watched_directories(watch_paths: &[String]) -> HashSet<PathBuf> {
    let mut dirs = HashSet::new();
    for path in watch_paths {
        let p = Path::new(path);
        let dir = if p.is_dir() {
            p.to_path_buf()
        } else {
            p.parent().map(|d| d.to_path_buf()).unwrap_or_else(|| PathBuf::from("."))
        };
        dirs.insert(dir);
    }
    dirs
}

fn expand_paths(watch_paths: &[String]) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for path in watch_paths {
        let globpath = if path.contains('*') {
            path.clone()
        } else {
            match std::fs::metadata(path) {
                Ok(meta) if meta.is_dir() => format!("{}/*", path.trim_end_matches('/')),
                Ok(_) => {
                    out.push(PathBuf::from(path));
                    continue;
                }
                Err(_) => continue,
            }
        };

        match glob::glob(&globpath) {
            Ok(matches) => out.extend(matches.filter_map(|m| m.ok())),
            Err(e) => error!(target: "kinesis_log_agent::watcher", "bad glob pattern {globpath}: {e}"),
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn expand_paths_includes_literal_files_and_globs() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.log");
        let b = dir.path().join("b.log");
        std::fs::write(&a, "").unwrap();
        std::fs::write(&b, "").unwrap();

        let pattern = format!("{}/*.log", dir.path().display());
        let mut found = expand_paths(&[pattern]);
        found.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(found, expected);
    }

    #[test]
    fn expand_paths_treats_directory_as_glob() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("only.log");
        std::fs::write(&a, "").unwrap();

        let found = expand_paths(&[dir.path().display().to_string()]);
        assert_eq!(found, vec![a]);
    }
}

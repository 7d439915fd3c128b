//! Filesystem watching and reader lifecycle management.

pub mod file_watcher;

pub use file_watcher::FileWatcher;

//! Persisted read state: per-inode `ReaderState` and the process-wide
//! `FileState` that maps inodes to them.

pub mod file_state;
pub mod reader_state;

pub use file_state::FileState;
pub use reader_state::ReaderState;

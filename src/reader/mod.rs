//! Per-inode file tailing: `LineReader` and its `LifeTimer`.

pub mod life_timer;
pub mod line_reader;

pub use life_timer::LifeTimer;
pub use line_reader::{LineReader, LineReaderMetrics};

//! `LifeTimer`: grace period a reader keeps reading a file that has been
//! rotated or removed out from under it.
//!
//! Grounded on the original Go `reader/lifetimer/lifetimer.go`. Note the
//! timer arms once, on its first `should_die` call, and never rearms: death
//! is judged against time since the reader started, not time since the file
//! moved.

use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::constants;

pub struct LifeTimer {
    life_time: Duration,
    started: bool,
    path: PathBuf,
    inode: u64,
    last_updated: Option<Instant>,
}

impl LifeTimer {
    pub fn new(path: PathBuf, inode: u64) -> LifeTimer {
        LifeTimer {
            life_time: constants::DEFAULT_LIFETIME_AFTER_MOVED_FILE,
            started: false,
            path,
            inode,
            last_updated: None,
        }
    }

    pub fn with_life_time(mut self, life_time: Duration) -> LifeTimer {
        self.life_time = life_time;
        self
    }

    /// Arms on first call; from then on, true once the file has moved and
    /// the grace period since arming has elapsed.
    pub fn should_die(&mut self) -> bool {
        if !self.started {
            self.last_updated = Some(Instant::now());
            self.started = true;
            return false;
        }

        self.moved() && self.last_updated.map(|t| t.elapsed() > self.life_time).unwrap_or(false)
    }

    fn moved(&self) -> bool {
        match std::fs::metadata(&self.path) {
            Ok(meta) => meta.ino() != self.inode,
            Err(_) => true,
        }
    }
}

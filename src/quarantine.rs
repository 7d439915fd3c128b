//! The oversize-quarantine writer: a single task owning the quarantine file
//! descriptor, so concurrent readers never interleave partial lines into it.
//!
//! Each shared resource gets its own owning task rather than a shared lock,
//! so concurrent readers never interleave partial writes.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;

use bytes::Bytes;
use log::{error, info};
use tokio::sync::mpsc;

/// Spawn the writer task. Returns a sender handle readers attach oversize
/// lines to; drop all senders to let the task exit.
pub fn spawn(path: Option<PathBuf>) -> mpsc::UnboundedSender<Bytes> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();

    tokio::spawn(async move {
        let mut file = match &path {
            Some(p) => match OpenOptions::new().create(true).append(true).open(p) {
                Ok(f) => Some(f),
                Err(e) => {
                    error!(target: "kinesis_log_agent::quarantine", "could not open quarantine file {}: {e}", p.display());
                    None
                }
            },
            None => None,
        };

        if path.is_some() && file.is_none() {
            return;
        }
        if path.is_none() {
            info!(target: "kinesis_log_agent::quarantine", "no quarantine path configured, oversize lines will be discarded");
        }

        while let Some(line) = rx.recv().await {
            if let Some(f) = file.as_mut() {
                if let Err(e) = f.write_all(&line) {
                    error!(target: "kinesis_log_agent::quarantine", "failed writing quarantined line: {e}");
                }
            }
        }
    });

    tx
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn appends_every_line_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("quarantine.log");
        let tx = spawn(Some(path.clone()));

        tx.send(Bytes::from_static(b"first\n")).unwrap();
        tx.send(Bytes::from_static(b"second\n")).unwrap();
        drop(tx);

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "first\nsecond\n");
    }
}

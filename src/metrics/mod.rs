//! The metrics HTTP surface: one JSON snapshot endpoint per component,
//! served by `tiny_http` on its own thread.
//!
//! A dedicated thread owning a `tiny_http::Server`, mirroring the original
//! Go `api/api.go`'s endpoint-per-exporter registry.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;

use log::{error, info};
use serde::Serialize;
use tiny_http::{Method, Response, StatusCode};

use crate::aggregator::AggregatorSnapshot;
use crate::error::{AgentError, Result};
use crate::sender::SenderSnapshot;
use crate::state::FileState;

#[derive(Serialize)]
struct FileWatcherMetrics {
    readers: HashMap<String, FileWatcherReaderMetrics>,
}

#[derive(Serialize)]
struct FileWatcherReaderMetrics {
    path: String,
    pos: u64,
}

/// Starts the metrics HTTP listener on a dedicated thread and returns its
/// `JoinHandle`. The thread runs until the listener is dropped or the
/// process exits.
pub fn spawn(
    address: String,
    aggregator: Arc<RwLock<AggregatorSnapshot>>,
    sender: Arc<RwLock<SenderSnapshot>>,
    state: FileState,
) -> Result<JoinHandle<()>> {
    let server = tiny_http::Server::http(&address).map_err(|e| AgentError::MetricsBind {
        address: address.clone(),
        source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
    })?;

    info!(target: "kinesis_log_agent::metrics", "metrics server listening on http://{address}/");

    let handle = std::thread::spawn(move || {
        for request in server.incoming_requests() {
            if request.method() != &Method::Get {
                let _ = request.respond(Response::from_string("method not allowed").with_status_code(StatusCode(405)));
                continue;
            }

            let body = match request.url() {
                "/aggregator" => serde_json::to_vec(&*aggregator.read().expect("aggregator snapshot lock poisoned")),
                "/sender" => serde_json::to_vec(&*sender.read().expect("sender snapshot lock poisoned")),
                "/file_watcher" => serde_json::to_vec(&file_watcher_metrics(&state)),
                _ => {
                    let _ = request.respond(Response::from_string("not found").with_status_code(StatusCode(404)));
                    continue;
                }
            };

            let response = match body {
                Ok(bytes) => Response::from_data(bytes).with_status_code(StatusCode(200)),
                Err(e) => {
                    error!(target: "kinesis_log_agent::metrics", "serializing metrics response: {e}");
                    Response::from_string(format!("{{\"error\":\"{e}\"}}")).with_status_code(StatusCode(500))
                }
            };

            if let Err(e) = request.respond(response) {
                error!(target: "kinesis_log_agent::metrics", "writing metrics response: {e}");
            }
        }
    });

    Ok(handle)
}

fn file_watcher_metrics(state: &FileState) -> FileWatcherMetrics {
    let readers = state
        .snapshot()
        .into_iter()
        .filter_map(|(inode, rs)| rs.path.map(|path| (inode.to_string(), FileWatcherReaderMetrics { path, pos: rs.pos })))
        .collect();
    FileWatcherMetrics { readers }
}

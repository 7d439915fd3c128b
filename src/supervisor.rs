//! Wires every component together, runs them as independent tasks, and
//! drives a cooperative shutdown on signal.
//!
//! Grounded on the original Go `cli/cli.go`'s wiring (`controlCh`, `go
//! api.Run()` / `aggregator.Run()` / `sender.Run()` / `watcher.Run()`),
//! rebuilt on tokio tasks with `signal-hook-tokio` replacing `os/signal`.

use std::sync::Arc;

use futures::stream::StreamExt;
use log::{error, info};
use signal_hook::consts::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook_tokio::Signals;
use tokio::sync::mpsc;

use crate::aggregator::Aggregator;
use crate::config::{Config, SenderType};
use crate::error::{AgentError, Result};
use crate::metrics;
use crate::quarantine;
use crate::sender::client::{KinesisSendClient, LocalFileSendClient, SendClient};
use crate::sender::Sender;
use crate::state::FileState;
use crate::watcher::FileWatcher;

/// Build every component from `config` and run until a trapped signal
/// closes the watcher's control channel. Returns once every component has
/// drained.
pub async fn run(config: Config) -> Result<()> {
    let state = FileState::load_from_json(&config.state.state_filepath)?;

    let (chunk_tx, chunk_rx) = mpsc::channel(1024);
    let (payload_tx, payload_rx) = mpsc::channel(64);
    let (control_tx, control_rx) = mpsc::channel::<()>(1);

    let quarantine_tx = quarantine::spawn(config.watcher.unputtable_record_local_backup_path.clone());

    let watcher = FileWatcher::new(
        config.watcher.watch_paths.clone(),
        config.watcher.lifetime_after_file_moved,
        config.watcher.read_file_interval,
        quarantine_tx,
        state.clone(),
        chunk_tx,
    )
    .map_err(|e| AgentError::SinkInit(format!("could not start filesystem watcher: {e}")))?;

    let aggregator = Aggregator::new(chunk_rx, payload_tx, config.aggregator.flush_interval);
    let aggregator_snapshot = aggregator.snapshot_handle();

    let client: Arc<dyn SendClient> = match config.sender.kind {
        SenderType::Kinesis => {
            let stream_name = config.sender.stream_name.clone().expect("validated at config load");
            Arc::new(KinesisSendClient::new(stream_name, config.sender.forward_proxy_url.as_deref())?)
        }
        SenderType::LocalFile => {
            let path = config.sender.output_filepath.clone().expect("validated at config load");
            Arc::new(LocalFileSendClient::open(path).await?)
        }
    };

    let sender = Sender::new(client, state.clone(), payload_rx, config.sender.retry_count_max);
    let sender_snapshot = sender.snapshot_handle();

    metrics::spawn(config.api.address.clone(), aggregator_snapshot, sender_snapshot, state.clone())?;

    let watcher_task = tokio::spawn(watcher.run(control_rx));
    let aggregator_task = tokio::spawn(aggregator.run());
    let sender_task = tokio::spawn(sender.run());

    wait_for_signal().await;
    info!(target: "kinesis_log_agent::supervisor", "shutdown signal received, closing watcher control channel");
    drop(control_tx);

    let _ = watcher_task.await;
    let _ = aggregator_task.await;

    match sender_task.await {
        Ok(result) => result,
        Err(e) => {
            error!(target: "kinesis_log_agent::supervisor", "sender task panicked: {e}");
            Ok(())
        }
    }
}

async fn wait_for_signal() {
    let mut signals = match Signals::new([SIGHUP, SIGINT, SIGTERM, SIGQUIT]) {
        Ok(signals) => signals,
        Err(e) => {
            error!(target: "kinesis_log_agent::supervisor", "could not install signal handler: {e}, running until killed");
            std::future::pending::<()>().await;
            unreachable!();
        }
    };

    if let Some(signal) = signals.next().await {
        info!(target: "kinesis_log_agent::supervisor", "received signal {signal}");
    }
}

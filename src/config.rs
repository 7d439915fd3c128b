//! Loads and validates the on-disk TOML configuration document into the
//! `Config` tree consumed by the rest of the agent.
//!
//! Grounded on the original Go `config/config.go`'s key groups, translated
//! from YAML+validator.v9 to TOML+serde; failures are collected into one
//! `AgentError::Config` rather than returned on first mismatch.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::constants;
use crate::error::{AgentError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub aggregator: AggregatorConfig,
    pub api: ApiConfig,
    pub watcher: WatcherConfig,
    pub sender: SenderConfig,
    pub state: StateConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregatorConfig {
    #[serde(with = "humantime_serde", default = "default_flush_interval")]
    pub flush_interval: Duration,
}

fn default_flush_interval() -> Duration {
    constants::DEFAULT_FLUSH_INTERVAL
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatcherConfig {
    #[serde(with = "humantime_serde", default = "default_lifetime_after_moved_file")]
    pub lifetime_after_file_moved: Duration,
    #[serde(with = "humantime_serde", default = "default_read_file_interval")]
    pub read_file_interval: Duration,
    #[serde(default)]
    pub unputtable_record_local_backup_path: Option<PathBuf>,
    pub watch_paths: Vec<String>,
}

fn default_lifetime_after_moved_file() -> Duration {
    constants::DEFAULT_LIFETIME_AFTER_MOVED_FILE
}

fn default_read_file_interval() -> Duration {
    constants::DEFAULT_READ_FILE_INTERVAL
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderType {
    Kinesis,
    LocalFile,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SenderConfig {
    #[serde(rename = "type")]
    pub kind: SenderType,
    #[serde(default)]
    pub stream_name: Option<String>,
    #[serde(default)]
    pub output_filepath: Option<PathBuf>,
    #[serde(default)]
    pub forward_proxy_url: Option<String>,
    #[serde(default = "default_retry_count_max")]
    pub retry_count_max: usize,
}

fn default_retry_count_max() -> usize {
    constants::DEFAULT_RETRY_COUNT_MAX
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    pub state_filepath: PathBuf,
}

impl Config {
    /// Parse and validate the document at `path`. Any missing required key,
    /// un-parseable duration, or sink-specific field missing for the
    /// selected `sender.type` fails closed before any task is spawned.
    pub fn load(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| AgentError::Config(format!("reading {}: {e}", path.display())))?;
        let config: Config = toml::from_str(&raw).map_err(|e| AgentError::Config(format!("parsing {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.watcher.watch_paths.is_empty() {
            return Err(AgentError::Config("watcher.watch_paths must not be empty".to_string()));
        }

        match self.sender.kind {
            SenderType::Kinesis => {
                if self.sender.stream_name.as_deref().unwrap_or("").is_empty() {
                    return Err(AgentError::Config("sender.stream_name is required when sender.type = \"kinesis\"".to_string()));
                }
            }
            SenderType::LocalFile => {
                if self.sender.output_filepath.is_none() {
                    return Err(AgentError::Config("sender.output_filepath is required when sender.type = \"local_file\"".to_string()));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::NamedTempFile;
    use std::io::Write;

    fn write_doc(doc: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{doc}").unwrap();
        file
    }

    #[test]
    fn loads_a_minimal_kinesis_document() {
        let file = write_doc(
            r#"
            [aggregator]
            flush_interval = "60s"

            [api]
            address = "127.0.0.1:9090"

            [watcher]
            lifetime_after_file_moved = "5s"
            read_file_interval = "200ms"
            watch_paths = ["/var/log/app/*.log"]

            [sender]
            type = "kinesis"
            stream_name = "my-stream"

            [state]
            state_filepath = "/var/lib/agent/state.json"
            "#,
        );

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.sender.kind, SenderType::Kinesis);
        assert_eq!(config.watcher.watch_paths, vec!["/var/log/app/*.log".to_string()]);
    }

    #[test]
    fn rejects_kinesis_sender_missing_stream_name() {
        let file = write_doc(
            r#"
            [aggregator]
            flush_interval = "60s"
            [api]
            address = "127.0.0.1:9090"
            [watcher]
            lifetime_after_file_moved = "5s"
            read_file_interval = "200ms"
            watch_paths = ["/var/log/app/*.log"]
            [sender]
            type = "kinesis"
            [state]
            state_filepath = "/tmp/state.json"
            "#,
        );

        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[test]
    fn rejects_empty_watch_paths() {
        let file = write_doc(
            r#"
            [aggregator]
            flush_interval = "60s"
            [api]
            address = "127.0.0.1:9090"
            [watcher]
            lifetime_after_file_moved = "5s"
            read_file_interval = "200ms"
            watch_paths = []
            [sender]
            type = "local_file"
            output_filepath = "/tmp/out"
            [state]
            state_filepath = "/tmp/state.json"
            "#,
        );

        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }
}

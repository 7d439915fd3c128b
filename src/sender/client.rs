//! `SendClient`: the sink contract, plus its two concrete collaborators.
//!
//! Grounded on the original Go `sender/sender.go`'s `SendClient` interface
//! and `sender/kinesis/kinesis_streams.go`'s batch shape, rebuilt on
//! `rusoto_kinesis`'s async `PutRecords`.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use log::warn;
use rand::RngCore;
use rusoto_core::{HttpClient, Region};
use rusoto_kinesis::{Kinesis, KinesisClient, PutRecordsInput, PutRecordsRequestEntry};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::constants;
use crate::error::{AgentError, Result};
use crate::model::Record;

/// The sink contract every sender collaborator implements. The returned
/// list has the same length and order as `records`; each entry's
/// `error_code` is `None` iff it succeeded.
#[async_trait]
pub trait SendClient: Send + Sync {
    async fn put_records(&self, records: Vec<Record>) -> Vec<Record>;
}

fn partition_key() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Talks to a Kinesis-shaped streaming sink, batching records through a
/// single `PutRecords` call per `put_records` invocation.
pub struct KinesisSendClient {
    client: KinesisClient,
    stream_name: String,
}

impl KinesisSendClient {
    pub fn new(stream_name: String, forward_proxy_url: Option<&str>) -> Result<KinesisSendClient> {
        let region = Region::default();
        let client = match forward_proxy_url {
            Some(proxy_url) => {
                let proxy = hyper_proxy::Proxy::new(hyper_proxy::Intercept::All, proxy_url.parse().map_err(|e| {
                    AgentError::SinkInit(format!("invalid forward_proxy_url {proxy_url}: {e}"))
                })?);
                let connector = hyper_tls::HttpsConnector::new();
                let proxy_connector = hyper_proxy::ProxyConnector::from_proxy(connector, proxy)
                    .map_err(|e| AgentError::SinkInit(format!("building proxy connector: {e}")))?;
                let dispatcher = HttpClient::from_connector(proxy_connector);
                KinesisClient::new_with(dispatcher, rusoto_core::credential::DefaultCredentialsProvider::new()
                    .map_err(|e| AgentError::SinkInit(format!("loading AWS credentials: {e}")))?, region)
            }
            None => KinesisClient::new(region),
        };

        Ok(KinesisSendClient { client, stream_name })
    }
}

#[async_trait]
impl SendClient for KinesisSendClient {
    async fn put_records(&self, records: Vec<Record>) -> Vec<Record> {
        let entries: Vec<PutRecordsRequestEntry> = records
            .iter()
            .map(|r| PutRecordsRequestEntry {
                data: r.to_bytes().into(),
                partition_key: partition_key(),
                explicit_hash_key: None,
            })
            .collect();

        let input = PutRecordsInput {
            records: entries,
            stream_name: self.stream_name.clone(),
            ..Default::default()
        };

        match self.client.put_records(input).await {
            Ok(output) => records
                .into_iter()
                .zip(output.records)
                .map(|(mut record, result)| {
                    record.error_code = result.error_code;
                    record.error_message = result.error_message;
                    record
                })
                .collect(),
            Err(e) => {
                warn!(target: "kinesis_log_agent::sender", "PutRecords transport error: {e}");
                records
                    .into_iter()
                    .map(|mut record| {
                        record.error_code = Some("TransportError".to_string());
                        record.error_message = Some(e.to_string());
                        record
                    })
                    .collect()
            }
        }
    }
}

/// Appends each record's bytes, newline-terminated, to a local file.
/// Always "succeeds" once the write lands; used for integration testing and
/// for operators without a live streaming endpoint.
pub struct LocalFileSendClient {
    file: Arc<Mutex<tokio::fs::File>>,
}

impl LocalFileSendClient {
    pub async fn open(path: PathBuf) -> Result<LocalFileSendClient> {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e: io::Error| AgentError::SinkInit(format!("opening {}: {e}", path.display())))?;
        Ok(LocalFileSendClient { file: Arc::new(Mutex::new(file)) })
    }
}

#[async_trait]
impl SendClient for LocalFileSendClient {
    async fn put_records(&self, records: Vec<Record>) -> Vec<Record> {
        let mut file = self.file.lock().await;
        let mut out = Vec::with_capacity(records.len());

        for mut record in records {
            let mut bytes = record.to_bytes();
            if bytes.last() != Some(&b'\n') {
                bytes.push(b'\n');
            }
            match file.write_all(&bytes).await {
                Ok(()) => {
                    record.error_code = None;
                    record.error_message = None;
                }
                Err(e) => {
                    record.error_code = Some("LocalFileWriteError".to_string());
                    record.error_message = Some(e.to_string());
                }
            }
            out.push(record);
        }

        out
    }
}

/// Whether `error_code` belongs to the configured retryable set.
pub fn is_retryable(error_code: &str) -> bool {
    constants::RETRYABLE_ERROR_CODES.contains(&error_code)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{Chunk, ReadRange, SendInfo};
    use bytes::Bytes;
    use tempfile::tempdir;

    fn record(body: &str) -> Record {
        let mut r = Record::new();
        r.add_chunk(Chunk::new(SendInfo::new(1, ReadRange::new(0, body.len() as u64)), Bytes::from(body.to_string())));
        r
    }

    #[tokio::test]
    async fn local_file_client_appends_every_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.log");
        let client = LocalFileSendClient::open(path.clone()).await.unwrap();

        let results = client.put_records(vec![record("one\n"), record("two\n")]).await;
        assert!(results.iter().all(|r| r.error_code.is_none()));

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents, "one\ntwo\n");
    }

    #[test]
    fn retryable_error_codes_match_the_configured_set() {
        assert!(is_retryable("ProvisionedThroughputExceededException"));
        assert!(is_retryable("InternalFailure"));
        assert!(!is_retryable("AccessDeniedException"));
    }
}

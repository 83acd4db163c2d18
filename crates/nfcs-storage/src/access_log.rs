//! Append-only access log behind the admin views (`logs/{id}.json`)

use async_trait::async_trait;
use opendal::Operator;
use tracing::warn;

use nfcs_core::{AccessLogEntry, NfcsError, NfcsResult};

use crate::records::{list_json_paths, unix_now};

pub const LOGS_PREFIX: &str = "logs/";

#[async_trait]
pub trait AccessLogStore: Send + Sync {
    /// Append an entry; returns it with id and timestamp set.
    async fn append(&self, entry: AccessLogEntry) -> NfcsResult<AccessLogEntry>;

    /// All entries, newest first.
    async fn list(&self) -> NfcsResult<Vec<AccessLogEntry>>;
}

#[derive(Clone, Debug)]
pub struct OpendalAccessLogStore {
    op: Operator,
}

impl OpendalAccessLogStore {
    pub fn new(op: Operator) -> Self {
        Self { op }
    }
}

#[async_trait]
impl AccessLogStore for OpendalAccessLogStore {
    async fn append(&self, mut entry: AccessLogEntry) -> NfcsResult<AccessLogEntry> {
        entry.id = uuid::Uuid::new_v4().to_string();
        entry.timestamp = unix_now();

        let path = format!("{LOGS_PREFIX}{}.json", entry.id);
        let body = serde_json::to_vec(&entry)
            .map_err(|e| NfcsError::Record(format!("access log serialization: {e}")))?;
        self.op
            .write(&path, body)
            .await
            .map_err(|e| NfcsError::Storage(format!("writing access log {path}: {e}")))?;
        Ok(entry)
    }

    async fn list(&self) -> NfcsResult<Vec<AccessLogEntry>> {
        let mut entries = Vec::new();
        for path in list_json_paths(&self.op, LOGS_PREFIX).await? {
            let buf = self
                .op
                .read(&path)
                .await
                .map_err(|e| NfcsError::Storage(format!("reading access log {path}: {e}")))?;
            match serde_json::from_slice::<AccessLogEntry>(&buf.to_vec()) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(path = %path, "skipping malformed access log entry: {e}"),
            }
        }
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(entries)
    }
}

//! Record store: append-only `EncryptedFileRecord` documents
//!
//! Layout: `records/{id}.json`. The store assigns the id (UUID v4) and the
//! creation timestamp at insert time. Every document read back is parsed and
//! validated; `list` skips malformed documents with a warning so one bad
//! record cannot hide every other file from a viewer.

use async_trait::async_trait;
use opendal::Operator;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

use nfcs_core::{EncryptedFileRecord, NfcsError, NfcsResult};

pub const RECORDS_PREFIX: &str = "records/";

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Validate and durably write a record; returns it with id and timestamp set.
    async fn insert(&self, record: EncryptedFileRecord) -> NfcsResult<EncryptedFileRecord>;

    async fn get(&self, id: &str) -> NfcsResult<EncryptedFileRecord>;

    /// All valid records, newest first.
    async fn list(&self) -> NfcsResult<Vec<EncryptedFileRecord>>;
}

/// Current Unix time in seconds
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Paths of every `.json` document directly under `prefix`.
pub(crate) async fn list_json_paths(op: &Operator, prefix: &str) -> NfcsResult<Vec<String>> {
    let entries = match op.list(prefix).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == opendal::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(NfcsError::Storage(format!("listing {prefix}: {e}"))),
    };
    Ok(entries
        .into_iter()
        .map(|e| e.path().to_string())
        .filter(|p| p.ends_with(".json"))
        .collect())
}

/// OpenDAL-backed record store
#[derive(Clone, Debug)]
pub struct OpendalRecordStore {
    op: Operator,
}

impl OpendalRecordStore {
    pub fn new(op: Operator) -> Self {
        Self { op }
    }

    fn path_for(id: &str) -> String {
        format!("{RECORDS_PREFIX}{id}.json")
    }

    async fn read_record(&self, path: &str) -> NfcsResult<EncryptedFileRecord> {
        let buf = self.op.read(path).await.map_err(|e| {
            if e.kind() == opendal::ErrorKind::NotFound {
                NfcsError::Storage(format!("record not found: {path}"))
            } else {
                NfcsError::Storage(format!("reading record {path}: {e}"))
            }
        })?;
        let mut record = EncryptedFileRecord::from_bytes(&buf.to_vec())?;
        if record.id.is_empty() {
            record.id = id_from_path(path).to_string();
        }
        Ok(record)
    }
}

fn id_from_path(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.strip_suffix(".json").unwrap_or(name)
}

#[async_trait]
impl RecordStore for OpendalRecordStore {
    async fn insert(&self, mut record: EncryptedFileRecord) -> NfcsResult<EncryptedFileRecord> {
        record.id = uuid::Uuid::new_v4().to_string();
        record.created_at = unix_now();
        record.validate()?;

        let path = Self::path_for(&record.id);
        self.op
            .write(&path, record.to_bytes()?)
            .await
            .map_err(|e| NfcsError::Storage(format!("writing record {path}: {e}")))?;

        info!(
            id = %record.id,
            file = %record.file_name,
            partitions = record.partitions.len(),
            "record written"
        );
        Ok(record)
    }

    async fn get(&self, id: &str) -> NfcsResult<EncryptedFileRecord> {
        if id.is_empty() || id.contains('/') {
            return Err(NfcsError::validation(format!("invalid record id: {id:?}")));
        }
        self.read_record(&Self::path_for(id)).await
    }

    async fn list(&self) -> NfcsResult<Vec<EncryptedFileRecord>> {
        let mut records = Vec::new();
        for path in list_json_paths(&self.op, RECORDS_PREFIX).await? {
            match self.read_record(&path).await {
                Ok(record) => records.push(record),
                Err(NfcsError::Record(reason)) => {
                    warn!(path = %path, reason = %reason, "skipping malformed record");
                }
                Err(e) => return Err(e),
            }
        }
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }
}

//! Reconstruction: fetch every partition, decrypt, reassemble in `partIndex`
//! order, and turn the text back into the original bytes.

use futures::future::try_join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use nfcs_chunks::{encoding_for_record, materialize, reassemble, verify_content_hash};
use nfcs_core::{
    AccessAction, AccessLogEntry, EncryptedFileRecord, KeyProtection, NfcsError, NfcsResult,
    PartitionRecord,
};
use nfcs_crypto::{decrypt_partition, unwrap_key_for_tag, PartitionKey};
use nfcs_storage::{AccessLogStore, BlobStore};

use crate::session::TagMatchSession;
use crate::Stores;

fn partition_key(partition: &PartitionRecord, presented: Option<&str>) -> NfcsResult<PartitionKey> {
    match &partition.key_protection {
        KeyProtection::Plain => {
            PartitionKey::from_hex(&partition.encryption_key).map_err(NfcsError::crypto)
        }
        KeyProtection::TagWrapped { salt } => {
            let tag = presented.ok_or_else(|| {
                NfcsError::Crypto(format!(
                    "partition {} needs its tag to recover the key",
                    partition.part_index
                ))
            })?;
            unwrap_key_for_tag(tag, salt, &partition.encryption_key).map_err(NfcsError::crypto)
        }
    }
}

async fn open_partition(
    blobs: &dyn BlobStore,
    partition: &PartitionRecord,
    presented: Option<&str>,
) -> NfcsResult<String> {
    let key = partition_key(partition, presented)?;
    let blob = blobs.fetch(&partition.url).await?;
    let ciphertext = String::from_utf8(blob).map_err(|_| {
        NfcsError::Crypto(format!(
            "partition {} ciphertext is not text",
            partition.part_index
        ))
    })?;
    decrypt_partition(&key, &ciphertext)
        .map_err(|e| NfcsError::crypto(e.context(format!("partition {}", partition.part_index))))
}

/// Rebuild the original bytes of `record`.
///
/// `presented` is indexed by `partIndex` and only consulted for tag-wrapped
/// keys. Any fetch or decrypt failure fails the whole reconstruction.
pub async fn reconstruct(
    blobs: &dyn BlobStore,
    record: &EncryptedFileRecord,
    presented: &[Option<String>],
) -> NfcsResult<Vec<u8>> {
    record.validate()?;
    let partitions = record.sorted_partitions();

    let texts = try_join_all(partitions.iter().map(|p| {
        let tag = presented
            .get(p.part_index as usize)
            .and_then(|t| t.as_deref());
        open_partition(blobs, p, tag)
    }))
    .await?;

    let content = reassemble(&texts);
    let bytes = materialize(content, encoding_for_record(record));

    if let Some(expected) = &record.content_hash {
        verify_content_hash(&bytes, expected).map_err(NfcsError::crypto)?;
    }
    Ok(bytes)
}

/// Result of one reconstruction attempt
#[derive(Debug)]
pub struct ReconstructionOutcome {
    pub id: String,
    pub file_name: String,
    pub result: NfcsResult<Vec<u8>>,
}

/// Reconstructs files as a session makes them ready, and records each attempt
/// in the access log.
#[derive(Clone)]
pub struct Reassembler {
    blobs: Arc<dyn BlobStore>,
    logs: Arc<dyn AccessLogStore>,
}

impl Reassembler {
    pub fn new(stores: &Stores) -> Self {
        Self {
            blobs: stores.blobs.clone(),
            logs: stores.logs.clone(),
        }
    }

    /// Present a tag and reconstruct every file it completes.
    pub async fn submit_tag(
        &self,
        session: &mut TagMatchSession,
        value: &str,
    ) -> Vec<ReconstructionOutcome> {
        let ready = session.submit_tag(value);
        let mut outcomes = Vec::with_capacity(ready.len());
        for id in ready {
            if let Some(outcome) = self.attempt(session, &id).await {
                outcomes.push(outcome);
            }
        }
        outcomes
    }

    /// Retry a failed reconstruction without re-presenting tags.
    pub async fn retry(
        &self,
        session: &mut TagMatchSession,
        id: &str,
    ) -> NfcsResult<ReconstructionOutcome> {
        session.retry(id)?;
        self.attempt(session, id)
            .await
            .ok_or_else(|| NfcsError::validation(format!("no such file in session: {id}")))
    }

    async fn attempt(
        &self,
        session: &mut TagMatchSession,
        id: &str,
    ) -> Option<ReconstructionOutcome> {
        let file = session.file(id)?;
        let record = file.record().clone();
        let presented = file.presented_tags().to_vec();

        let result = reconstruct(self.blobs.as_ref(), &record, &presented).await;
        let action = match &result {
            Ok(bytes) => {
                info!(id, file = %record.file_name, bytes = bytes.len(), "file reconstructed");
                session.mark_reconstructed(id);
                AccessAction::Reconstructed
            }
            Err(e) => {
                warn!(id, file = %record.file_name, error = %e, "reconstruction failed");
                session.mark_failed(id);
                AccessAction::ReconstructionFailed
            }
        };

        let entry = AccessLogEntry {
            id: String::new(),
            action,
            user: session.principal().to_string(),
            file_id: record.id.clone(),
            file_name: record.file_name.clone(),
            timestamp: 0,
        };
        if let Err(e) = self.logs.append(entry).await {
            warn!(id, "failed to write access log entry: {e}");
        }

        Some(ReconstructionOutcome {
            id: record.id,
            file_name: record.file_name,
            result,
        })
    }
}

/// Write reconstructed bytes into `dir` under the record's file name.
///
/// Written to a temporary sibling first, then renamed into place.
pub async fn save_reconstructed(dir: &Path, file_name: &str, bytes: &[u8]) -> NfcsResult<PathBuf> {
    let name = Path::new(file_name)
        .file_name()
        .ok_or_else(|| NfcsError::validation(format!("unusable file name: {file_name:?}")))?;
    let target = dir.join(name);
    let tmp = dir.join(format!(".{}.nfcs_tmp", name.to_string_lossy()));

    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, &target).await?;

    info!(path = %target.display(), bytes = bytes.len(), "saved reconstructed file");
    Ok(target)
}

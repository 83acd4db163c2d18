//! Per-viewer tag matching
//!
//! A session holds the records visible to one principal and, for each, which
//! partitions have had their tag presented. Verification only ever moves
//! forward; a file becomes `Ready` exactly once, on the submission that
//! verifies its last partition.

use std::collections::BTreeMap;
use tracing::{debug, info};

use nfcs_core::{EncryptedFileRecord, KeyProtection, NfcsError, NfcsResult, PartitionRecord};
use nfcs_crypto::tag_fingerprint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    /// Some partitions are still unverified
    Pending,
    /// Every partition verified, reconstruction not yet attempted
    Ready,
    Reconstructed,
    /// Reconstruction failed; can be retried
    Failed,
}

/// Verification state of one file in a session
#[derive(Debug, Clone)]
pub struct FileProgress {
    record: EncryptedFileRecord,
    /// Indexed by `partIndex`
    verified: Vec<bool>,
    /// Tag that verified each partition, kept for tag-wrapped key recovery
    presented: Vec<Option<String>>,
    status: FileStatus,
}

impl FileProgress {
    fn new(record: EncryptedFileRecord) -> Self {
        let n = record.partitions.len();
        Self {
            record,
            verified: vec![false; n],
            presented: vec![None; n],
            status: FileStatus::Pending,
        }
    }

    pub fn record(&self) -> &EncryptedFileRecord {
        &self.record
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn status(&self) -> FileStatus {
        self.status
    }

    pub fn verified_count(&self) -> usize {
        self.verified.iter().filter(|v| **v).count()
    }

    pub fn total(&self) -> usize {
        self.verified.len()
    }

    pub fn all_verified(&self) -> bool {
        self.verified.iter().all(|v| *v)
    }

    pub fn is_verified(&self, part_index: u32) -> bool {
        self.verified
            .get(part_index as usize)
            .copied()
            .unwrap_or(false)
    }

    pub fn presented_tags(&self) -> &[Option<String>] {
        &self.presented
    }

    /// Whether the partition assigned to `principal` has been verified.
    pub fn user_partition_verified(&self, principal: &str) -> bool {
        self.record
            .partition_for(principal)
            .is_some_and(|p| self.is_verified(p.part_index))
    }

    /// Mark every partition `tag` unlocks. Returns true if this call made the
    /// file ready.
    fn present(&mut self, tag: &str) -> bool {
        let mut newly = 0;
        for p in &self.record.partitions {
            if !tag_matches(p, tag) {
                continue;
            }
            let i = p.part_index as usize;
            if let Some(slot) = self.verified.get_mut(i) {
                if !*slot {
                    *slot = true;
                    self.presented[i] = Some(tag.to_string());
                    newly += 1;
                }
            }
        }

        if newly > 0 {
            debug!(
                id = %self.record.id,
                verified = self.verified_count(),
                total = self.total(),
                "partition verified"
            );
        }

        if newly > 0 && self.status == FileStatus::Pending && self.all_verified() {
            self.status = FileStatus::Ready;
            return true;
        }
        false
    }
}

/// Tag-wrapped partitions are matched on a fingerprint salted per partition.
fn tag_matches(partition: &PartitionRecord, tag: &str) -> bool {
    match &partition.key_protection {
        KeyProtection::Plain => partition.nfc_id == tag,
        KeyProtection::TagWrapped { salt } => match tag_fingerprint(tag, salt) {
            Ok(fingerprint) => partition.nfc_id == fingerprint,
            Err(e) => {
                debug!(part = partition.part_index, "cannot fingerprint tag: {e:#}");
                false
            }
        },
    }
}

/// Tag-matching state for one signed-in principal
#[derive(Debug, Clone)]
pub struct TagMatchSession {
    principal: String,
    files: BTreeMap<String, FileProgress>,
}

impl TagMatchSession {
    /// Keep only the records that assign a partition to `principal`.
    pub fn new(principal: impl Into<String>, records: Vec<EncryptedFileRecord>) -> Self {
        let principal = principal.into();
        let files: BTreeMap<_, _> = records
            .into_iter()
            .filter(|r| r.is_visible_to(&principal))
            .map(|r| (r.id.clone(), FileProgress::new(r)))
            .collect();
        info!(principal = %principal, files = files.len(), "tag session started");
        Self { principal, files }
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn file(&self, id: &str) -> Option<&FileProgress> {
        self.files.get(id)
    }

    pub fn files(&self) -> impl Iterator<Item = &FileProgress> {
        self.files.values()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Present one tag. Returns the ids of files that became ready on this
    /// submission. Blank input and unknown tags change nothing.
    pub fn submit_tag(&mut self, value: &str) -> Vec<String> {
        let tag = value.trim();
        if tag.is_empty() {
            return Vec::new();
        }
        let ready: Vec<String> = self
            .files
            .values_mut()
            .filter_map(|f| f.present(tag).then(|| f.record.id.clone()))
            .collect();

        if !ready.is_empty() {
            info!(principal = %self.principal, files = ?ready, "all partitions verified");
        }
        ready
    }

    pub fn mark_reconstructed(&mut self, id: &str) {
        if let Some(f) = self.files.get_mut(id) {
            f.status = FileStatus::Reconstructed;
        }
    }

    pub fn mark_failed(&mut self, id: &str) {
        if let Some(f) = self.files.get_mut(id) {
            f.status = FileStatus::Failed;
        }
    }

    /// Put a failed file back to `Ready` without re-presenting any tag.
    pub fn retry(&mut self, id: &str) -> NfcsResult<()> {
        let file = self
            .files
            .get_mut(id)
            .ok_or_else(|| NfcsError::validation(format!("no such file in session: {id}")))?;
        if file.status != FileStatus::Failed {
            return Err(NfcsError::validation(format!(
                "file {id} has not failed; nothing to retry"
            )));
        }
        file.status = FileStatus::Ready;
        Ok(())
    }
}

//! Encrypt orchestrator: file -> N encrypted partitions -> blobs -> record
//!
//! Stages: `Idle -> Splitting -> Encrypting -> Securing -> Complete`, and back
//! to `Idle` on any failure.
//!
//!   1. validate the request (exactly N users for N partitions, 2 <= N <= 5)
//!   2. normalize the bytes to text and split into N partitions
//!   3. encrypt each partition under its own random key
//!   4. upload all N ciphertext blobs concurrently; any failure aborts
//!   5. only then write the one `EncryptedFileRecord`
//!
//! Blobs land at `encrypted/{creator}/{batch}/{stem}_part{i}.txt`; the batch id
//! keeps a re-encrypted file from overwriting blobs an older record points at.

use futures::future::try_join_all;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

use nfcs_chunks::{check_partition_count, content_hash, guess_mime, normalize, split_into_partitions};
use nfcs_core::config::KeyMode;
use nfcs_core::{
    AccessAction, AccessLogEntry, EncryptedFileRecord, KeyProtection, NfcsError, NfcsResult,
    PartitionRecord,
};
use nfcs_crypto::{
    encrypt_partition, generate_partition_key, generate_salt, tag_fingerprint, wrap_key_for_tag,
};

use crate::Stores;

/// Progress callback type (stage, percent)
pub type ProgressFn = Box<dyn Fn(EncryptStage, u8) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptStage {
    Idle,
    /// Reading and normalizing the file
    Splitting,
    /// Encrypting partitions
    Encrypting,
    /// Uploading blobs and writing the record
    Securing,
    Complete,
}

impl std::fmt::Display for EncryptStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EncryptStage::Idle => "idle",
            EncryptStage::Splitting => "splitting",
            EncryptStage::Encrypting => "encrypting",
            EncryptStage::Securing => "securing",
            EncryptStage::Complete => "complete",
        };
        f.write_str(s)
    }
}

/// A principal authorized to hold one partition, and the tag that unlocks it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedUser {
    pub email: String,
    pub tag: String,
}

impl AuthorizedUser {
    pub fn new(email: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            tag: tag.into(),
        }
    }
}

impl std::str::FromStr for AuthorizedUser {
    type Err = NfcsError;

    /// `email=TAG`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (email, tag) = s
            .split_once('=')
            .ok_or_else(|| NfcsError::validation(format!("expected EMAIL=TAG, got {s:?}")))?;
        Ok(Self::new(email.trim(), tag.trim()))
    }
}

/// The file being protected. Only ever held in memory.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    /// Read a local file, guessing its MIME type from the extension unless given.
    pub async fn read(path: &Path, mime: Option<&str>) -> NfcsResult<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| NfcsError::validation(format!("not a file path: {}", path.display())))?;
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            NfcsError::Storage(format!("reading {}: {e}", path.display()))
        })?;
        let mime = mime.unwrap_or_else(|| guess_mime(&name)).to_string();
        Ok(Self { name, mime, bytes })
    }
}

#[derive(Debug, Clone)]
pub struct EncryptRequest {
    pub file: SourceFile,
    /// Principal creating the share
    pub creator: String,
    /// One user per partition, in partition order
    pub users: Vec<AuthorizedUser>,
    pub partition_count: usize,
    pub key_mode: KeyMode,
}

impl EncryptRequest {
    /// Everything checked before the flow leaves `Idle`.
    pub fn validate(&self) -> NfcsResult<()> {
        if self.file.name.trim().is_empty() {
            return Err(NfcsError::validation("no file selected"));
        }
        if self.creator.trim().is_empty() {
            return Err(NfcsError::validation("creator principal is required"));
        }
        check_partition_count(self.partition_count)?;
        if self.users.len() != self.partition_count {
            return Err(NfcsError::validation(format!(
                "expected exactly {} authorized users, got {}",
                self.partition_count,
                self.users.len()
            )));
        }

        let mut tags = HashSet::new();
        for user in &self.users {
            if user.email.trim().is_empty() || user.tag.trim().is_empty() {
                return Err(NfcsError::validation(
                    "every authorized user needs both an email and a tag identifier",
                ));
            }
            if !tags.insert(user.tag.trim()) {
                return Err(NfcsError::validation(format!(
                    "tag identifier {:?} is assigned to more than one partition",
                    user.tag
                )));
            }
        }
        Ok(())
    }
}

/// One encrypted partition, ready to upload
#[derive(Debug, Clone)]
pub struct SealedPartition {
    pub part_index: u32,
    pub ciphertext: String,
    pub user_email: String,
    /// Value for the record's `nfcId` (tag, or its fingerprint)
    pub nfc_id: String,
    /// Value for the record's `encryptionKey` (hex key, or wrapped key)
    pub stored_key: String,
    pub key_protection: KeyProtection,
}

/// Encrypt each partition under a fresh key and prepare its record fields.
pub fn seal_partitions(
    partitions: &[String],
    users: &[AuthorizedUser],
    key_mode: KeyMode,
) -> NfcsResult<Vec<SealedPartition>> {
    if partitions.len() != users.len() {
        return Err(NfcsError::validation(format!(
            "{} partitions for {} users",
            partitions.len(),
            users.len()
        )));
    }

    partitions
        .iter()
        .zip(users)
        .enumerate()
        .map(|(i, (text, user))| {
            let key = generate_partition_key();
            let ciphertext = encrypt_partition(&key, text).map_err(NfcsError::crypto)?;
            let tag = user.tag.trim();

            let (nfc_id, stored_key, key_protection) = match key_mode {
                KeyMode::Plain => (tag.to_string(), key.to_hex(), KeyProtection::Plain),
                KeyMode::TagWrapped => {
                    let salt = generate_salt();
                    let wrapped = wrap_key_for_tag(tag, &salt, &key).map_err(NfcsError::crypto)?;
                    let fingerprint = tag_fingerprint(tag, &salt).map_err(NfcsError::crypto)?;
                    (fingerprint, wrapped, KeyProtection::TagWrapped { salt })
                }
            };

            Ok(SealedPartition {
                part_index: i as u32,
                ciphertext,
                user_email: user.email.trim().to_string(),
                nfc_id,
                stored_key,
                key_protection,
            })
        })
        .collect()
}

fn path_component(s: &str) -> String {
    s.replace(['/', '\\'], "_")
}

/// File name without its last extension (`report.v2.txt` -> `report.v2`).
fn file_stem(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

/// Directory holding every blob of one encryption batch.
pub fn batch_prefix(creator: &str, batch: &str) -> String {
    format!("encrypted/{}/{batch}/", path_component(creator))
}

/// Storage path of partition `index` of one encryption batch.
pub fn blob_path(creator: &str, batch: &str, file_name: &str, index: u32) -> String {
    format!(
        "{}{}_part{index}.txt",
        batch_prefix(creator, batch),
        path_component(file_stem(file_name)),
    )
}

/// Drives one encryption at a time through its stages
pub struct EncryptOrchestrator {
    stores: Stores,
    stage: EncryptStage,
    progress: Option<ProgressFn>,
}

impl EncryptOrchestrator {
    pub fn new(stores: Stores) -> Self {
        Self {
            stores,
            stage: EncryptStage::Idle,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn stage(&self) -> EncryptStage {
        self.stage
    }

    fn advance(&mut self, stage: EncryptStage, percent: u8) {
        self.stage = stage;
        debug!(%stage, percent, "encrypt progress");
        if let Some(cb) = &self.progress {
            cb(stage, percent);
        }
    }

    /// Run the whole flow. On any error the stage returns to `Idle` and no
    /// record has been written.
    pub async fn encrypt_and_share(
        &mut self,
        request: EncryptRequest,
    ) -> NfcsResult<EncryptedFileRecord> {
        match self.run(&request).await {
            Ok(record) => {
                self.advance(EncryptStage::Complete, 100);
                Ok(record)
            }
            Err(e) => {
                warn!(file = %request.file.name, error = %e, "encryption failed");
                self.stage = EncryptStage::Idle;
                Err(e)
            }
        }
    }

    async fn run(&mut self, request: &EncryptRequest) -> NfcsResult<EncryptedFileRecord> {
        request.validate()?;
        let n = request.partition_count;

        self.advance(EncryptStage::Splitting, 20);
        let (content, encoding) = normalize(&request.file.bytes, &request.file.mime)?;
        let partitions = split_into_partitions(&content, n)?;

        self.advance(EncryptStage::Encrypting, 40);
        let sealed = seal_partitions(&partitions, &request.users, request.key_mode)?;

        self.advance(EncryptStage::Securing, 60);
        let batch = uuid::Uuid::new_v4().to_string();
        let blobs = &self.stores.blobs;
        let urls = try_join_all(sealed.iter().map(|p| {
            let path = blob_path(&request.creator, &batch, &request.file.name, p.part_index);
            let data = p.ciphertext.clone().into_bytes();
            async move { blobs.upload(&path, data).await }
        }))
        .await;
        let urls = match urls {
            Ok(urls) => urls,
            Err(e) => {
                // partitions that did land are unreachable without a record
                let prefix = batch_prefix(&request.creator, &batch);
                if let Err(cleanup) = blobs.remove_prefix(&prefix).await {
                    warn!(prefix, "failed to remove orphaned blobs: {cleanup}");
                }
                return Err(e);
            }
        };
        self.advance(EncryptStage::Securing, 80);

        let record = EncryptedFileRecord {
            id: String::new(),
            file_name: request.file.name.clone(),
            created_at: 0,
            created_by: request.creator.clone(),
            content_encoding: Some(encoding),
            content_hash: Some(content_hash(&request.file.bytes)),
            partitions: sealed
                .into_iter()
                .zip(urls)
                .map(|(p, url)| PartitionRecord {
                    url,
                    user_email: p.user_email,
                    nfc_id: p.nfc_id,
                    encryption_key: p.stored_key,
                    part_index: p.part_index,
                    key_protection: p.key_protection,
                })
                .collect(),
        };
        let record = self.stores.records.insert(record).await?;

        info!(
            id = %record.id,
            file = %record.file_name,
            partitions = n,
            encoding = ?encoding,
            key_mode = ?request.key_mode,
            "file encrypted and shared"
        );

        let entry = AccessLogEntry {
            id: String::new(),
            action: AccessAction::Encrypted,
            user: request.creator.clone(),
            file_id: record.id.clone(),
            file_name: record.file_name.clone(),
            timestamp: 0,
        };
        if let Err(e) = self.stores.logs.append(entry).await {
            warn!(id = %record.id, "failed to write access log entry: {e}");
        }

        for user in &request.users {
            info!(user = %user.email, file = %record.file_name, "partition assigned");
        }

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users(n: usize) -> Vec<AuthorizedUser> {
        (0..n)
            .map(|i| AuthorizedUser::new(format!("u{i}@x"), format!("TAG{i}")))
            .collect()
    }

    fn request(n: usize, users: Vec<AuthorizedUser>) -> EncryptRequest {
        EncryptRequest {
            file: SourceFile {
                name: "report.txt".into(),
                mime: "text/plain".into(),
                bytes: b"some report content".to_vec(),
            },
            creator: "owner@x".into(),
            users,
            partition_count: n,
            key_mode: KeyMode::Plain,
        }
    }

    #[test]
    fn parse_authorized_user() {
        let u: AuthorizedUser = "a@x = 04:A2:19".parse().unwrap();
        assert_eq!(u, AuthorizedUser::new("a@x", "04:A2:19"));
        assert!("no-separator".parse::<AuthorizedUser>().is_err());
    }

    #[test]
    fn validate_requires_exact_user_count() {
        assert!(request(2, users(2)).validate().is_ok());
        assert!(matches!(
            request(3, users(2)).validate(),
            Err(NfcsError::Validation(_))
        ));
        assert!(request(2, users(3)).validate().is_err());
        assert!(request(6, users(6)).validate().is_err());
    }

    #[test]
    fn validate_rejects_blank_and_duplicate_tags() {
        let mut u = users(2);
        u[1].tag = " ".into();
        assert!(request(2, u).validate().is_err());

        let mut u = users(2);
        u[1].tag = u[0].tag.clone();
        let err = request(2, u).validate().unwrap_err();
        assert!(err.to_string().contains("more than one partition"));
    }

    #[test]
    fn seal_plain_partitions() {
        let parts = vec!["abc".to_string(), "de".to_string()];
        let sealed = seal_partitions(&parts, &users(2), KeyMode::Plain).unwrap();

        assert_eq!(sealed.len(), 2);
        assert_eq!(sealed[1].part_index, 1);
        assert_eq!(sealed[0].nfc_id, "TAG0");
        assert_eq!(sealed[0].stored_key.len(), 64);
        assert_ne!(sealed[0].stored_key, sealed[1].stored_key, "independent keys");

        let key = nfcs_crypto::PartitionKey::from_hex(&sealed[1].stored_key).unwrap();
        assert_eq!(
            nfcs_crypto::decrypt_partition(&key, &sealed[1].ciphertext).unwrap(),
            "de"
        );
    }

    #[test]
    fn seal_tag_wrapped_partitions() {
        let parts = vec!["abc".to_string(), "de".to_string()];
        let sealed = seal_partitions(&parts, &users(2), KeyMode::TagWrapped).unwrap();

        let KeyProtection::TagWrapped { salt } = &sealed[0].key_protection else {
            panic!("expected tag-wrapped key");
        };
        assert_eq!(sealed[0].nfc_id, tag_fingerprint("TAG0", salt).unwrap());
        let KeyProtection::TagWrapped { salt: other } = &sealed[1].key_protection else {
            panic!("expected tag-wrapped key");
        };
        assert_ne!(salt, other, "each partition gets its own salt");
        let key = nfcs_crypto::unwrap_key_for_tag("TAG0", salt, &sealed[0].stored_key).unwrap();
        assert_eq!(
            nfcs_crypto::decrypt_partition(&key, &sealed[0].ciphertext).unwrap(),
            "abc"
        );
    }

    #[test]
    fn blob_paths() {
        assert_eq!(
            blob_path("a@x", "b1", "report.v2.txt", 0),
            "encrypted/a@x/b1/report.v2_part0.txt"
        );
        assert_eq!(blob_path("a@x", "b1", "README", 3), "encrypted/a@x/b1/README_part3.txt");
        assert_eq!(blob_path("a/b", "b1", ".env", 1), "encrypted/a_b/b1/.env_part1.txt");
        assert!(blob_path("a/b", "b1", ".env", 1).starts_with(&batch_prefix("a/b", "b1")));
    }
}

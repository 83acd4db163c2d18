//! Persisted record schema
//!
//! An `EncryptedFileRecord` is the one piece of shareable metadata per
//! protected file. It is written once, after every partition blob has been
//! stored, and never updated. Readers parse it through `from_bytes`, which
//! rejects anything that does not satisfy the partition invariants instead of
//! trusting the document shape.
//!
//! JSON layout (camelCase, compatible with the original document store):
//! ```text
//! { "id", "fileName", "createdAt", "createdBy",
//!   "contentEncoding"?, "contentHash"?,
//!   "partitions": [ { "url", "userEmail", "nfcId", "encryptionKey",
//!                     "partIndex", "keyProtection"? } ] }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{NfcsError, NfcsResult};

/// Fewest partitions a file may be split into
pub const MIN_PARTITIONS: usize = 2;

/// Most partitions a file may be split into
pub const MAX_PARTITIONS: usize = 5;

/// How the file content was turned into text before splitting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentEncoding {
    /// Textual content, split as-is
    Text,
    /// Binary content, base64-encoded before splitting
    Base64,
}

/// How a partition's `encryptionKey` field is protected
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum KeyProtection {
    /// Hex key stored as-is; `nfcId` holds the tag identifier
    #[default]
    Plain,
    /// Base64 key wrapped under a tag-derived key; `nfcId` holds the tag fingerprint
    #[serde(rename_all = "camelCase")]
    TagWrapped {
        /// Base64 HKDF salt
        salt: String,
    },
}

/// One encrypted shard of a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionRecord {
    /// Location of the ciphertext blob
    pub url: String,
    /// Principal this partition is assigned to
    pub user_email: String,
    /// Tag identifier (or fingerprint, see `KeyProtection`) that unlocks it
    pub nfc_id: String,
    pub encryption_key: String,
    /// Position in reassembly order
    pub part_index: u32,
    #[serde(default)]
    pub key_protection: KeyProtection,
}

/// Shareable metadata for one protected file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedFileRecord {
    /// Store-assigned identifier
    #[serde(default)]
    pub id: String,
    pub file_name: String,
    /// Unix timestamp (seconds), assigned by the store
    #[serde(default)]
    pub created_at: u64,
    pub created_by: String,
    /// Absent on records written before the encoding was persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<ContentEncoding>,
    /// BLAKE3 of the original bytes (hex)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    pub partitions: Vec<PartitionRecord>,
}

impl EncryptedFileRecord {
    /// Check every structural invariant of a record.
    ///
    /// - 2..=5 partitions
    /// - `partIndex` values form exactly {0, .., N-1}
    /// - no empty url / principal / tag / key fields
    pub fn validate(&self) -> NfcsResult<()> {
        if self.file_name.trim().is_empty() {
            return Err(NfcsError::Record("fileName is empty".into()));
        }
        if self.created_by.trim().is_empty() {
            return Err(NfcsError::Record("createdBy is empty".into()));
        }

        let n = self.partitions.len();
        if !(MIN_PARTITIONS..=MAX_PARTITIONS).contains(&n) {
            return Err(NfcsError::Record(format!(
                "expected {MIN_PARTITIONS}..={MAX_PARTITIONS} partitions, found {n}"
            )));
        }

        let mut seen = vec![false; n];
        for p in &self.partitions {
            let idx = p.part_index as usize;
            if idx >= n {
                return Err(NfcsError::Record(format!(
                    "partIndex {idx} out of range for {n} partitions"
                )));
            }
            if std::mem::replace(&mut seen[idx], true) {
                return Err(NfcsError::Record(format!("duplicate partIndex {idx}")));
            }
            for (field, value) in [
                ("url", &p.url),
                ("userEmail", &p.user_email),
                ("nfcId", &p.nfc_id),
                ("encryptionKey", &p.encryption_key),
            ] {
                if value.trim().is_empty() {
                    return Err(NfcsError::Record(format!(
                        "partition {idx}: {field} is empty"
                    )));
                }
            }
            if let KeyProtection::TagWrapped { salt } = &p.key_protection {
                if salt.is_empty() {
                    return Err(NfcsError::Record(format!(
                        "partition {idx}: tag-wrapped key without salt"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Partitions in reassembly order, regardless of storage order.
    pub fn sorted_partitions(&self) -> Vec<&PartitionRecord> {
        let mut parts: Vec<&PartitionRecord> = self.partitions.iter().collect();
        parts.sort_by_key(|p| p.part_index);
        parts
    }

    /// True if `principal` owns at least one partition.
    pub fn is_visible_to(&self, principal: &str) -> bool {
        self.partition_for(principal).is_some()
    }

    /// The first partition assigned to `principal`, if any.
    pub fn partition_for(&self, principal: &str) -> Option<&PartitionRecord> {
        self.partitions.iter().find(|p| p.user_email == principal)
    }

    /// Parse and validate a stored record.
    pub fn from_bytes(data: &[u8]) -> NfcsResult<Self> {
        let record: EncryptedFileRecord = serde_json::from_slice(data)
            .map_err(|e| NfcsError::Record(format!("record deserialization: {e}")))?;
        record.validate()?;
        Ok(record)
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> NfcsResult<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| NfcsError::Record(format!("record serialization: {e}")))
    }
}

/// What happened to a file, for the admin access log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccessAction {
    Encrypted,
    Reconstructed,
    ReconstructionFailed,
}

impl std::fmt::Display for AccessAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AccessAction::Encrypted => "encrypted",
            AccessAction::Reconstructed => "reconstructed",
            AccessAction::ReconstructionFailed => "reconstruction failed",
        };
        f.write_str(s)
    }
}

/// One append-only access log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessLogEntry {
    #[serde(default)]
    pub id: String,
    pub action: AccessAction,
    pub user: String,
    pub file_id: String,
    pub file_name: String,
    /// Unix timestamp (seconds)
    #[serde(default)]
    pub timestamp: u64,
}

//! Per-partition key generation and hex serialization

use rand::RngCore;
use tracing::debug;
use zeroize::Zeroize;

use crate::KEY_SIZE;

/// A per-partition 256-bit encryption key. Zeroized on drop.
#[derive(Clone)]
pub struct PartitionKey {
    bytes: [u8; KEY_SIZE],
}

impl PartitionKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Lowercase hex, the form stored in a plain-mode record.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    pub fn from_hex(s: &str) -> anyhow::Result<Self> {
        let mut decoded = hex::decode(s.trim()).map_err(|e| {
            debug!("partition key rejected: not hex");
            anyhow::anyhow!("partition key is not valid hex: {e}")
        })?;
        if decoded.len() != KEY_SIZE {
            let len = decoded.len();
            debug!(len, "partition key rejected: wrong size");
            decoded.zeroize();
            anyhow::bail!("partition key has wrong size: {len} bytes (expected {KEY_SIZE})");
        }
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self::from_bytes(bytes))
    }
}

impl Drop for PartitionKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for PartitionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a random 256-bit partition key from the OS CSPRNG.
pub fn generate_partition_key() -> PartitionKey {
    let mut bytes = [0u8; KEY_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    PartitionKey::from_bytes(bytes)
}

//! BLAKE3 content hashing
//!
//! The hash of the original file bytes is stored in the record so a
//! reassembled file can be checked end to end before it is handed out.

use anyhow::Result;

/// A BLAKE3 hash digest (32 bytes), displayed as 64 hex chars
pub type Hash = blake3::Hash;

/// Hash a byte slice in memory.
pub fn hash_bytes(data: &[u8]) -> Hash {
    blake3::hash(data)
}

/// Format a hash as lowercase hex string (64 chars)
pub fn hash_to_hex(hash: &Hash) -> String {
    hash.to_hex().to_string()
}

/// Parse a 64-char hex string into a Hash
pub fn hash_from_hex(hex: &str) -> Result<Hash> {
    blake3::Hash::from_hex(hex).map_err(|e| anyhow::anyhow!("invalid BLAKE3 hex '{hex}': {e}"))
}

/// Hex BLAKE3 of `data`, as stored in `contentHash`.
pub fn content_hash(data: &[u8]) -> String {
    hash_to_hex(&hash_bytes(data))
}

/// Check `data` against a stored `contentHash`.
pub fn verify_content_hash(data: &[u8], expected_hex: &str) -> Result<()> {
    let expected = hash_from_hex(expected_hex)?;
    let actual = hash_bytes(data);
    // blake3::Hash equality is constant-time
    if actual != expected {
        anyhow::bail!(
            "content hash mismatch: expected {expected_hex}, got {}",
            hash_to_hex(&actual)
        );
    }
    Ok(())
}

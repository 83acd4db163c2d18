//! Per-partition AES-256-GCM encryption/decryption
//!
//! Encrypted partition format (base64 text, standard alphabet):
//! ```text
//! base64( [12 bytes: random nonce][N bytes: ciphertext][16 bytes: GCM tag] )
//! ```
//!
//! Every failure on the decrypt side (bad base64, truncation, authentication
//! failure, non-UTF-8 or empty plaintext) reports the same generic error: a
//! wrong key and a corrupted blob cannot be told apart.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;

use crate::keys::PartitionKey;
use crate::{GCM_NONCE_SIZE, TAG_SIZE};

/// Encrypt one partition's text.
///
/// Returns the base64 ciphertext string that is uploaded as the partition blob.
pub fn encrypt_partition(key: &PartitionKey, plaintext: &str) -> anyhow::Result<String> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| anyhow::anyhow!("invalid partition key: {e}"))?;

    let mut nonce_bytes = [0u8; GCM_NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| anyhow::anyhow!("partition encryption failed: {e}"))?;

    let mut sealed = Vec::with_capacity(GCM_NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(sealed))
}

/// Decrypt one partition's base64 ciphertext back to its text.
pub fn decrypt_partition(key: &PartitionKey, encrypted: &str) -> anyhow::Result<String> {
    let sealed = STANDARD
        .decode(encrypted.trim())
        .map_err(|e| anyhow::anyhow!("partition ciphertext is not base64: {e}"))?;

    if sealed.len() < GCM_NONCE_SIZE + TAG_SIZE {
        anyhow::bail!(
            "encrypted partition too short: {} bytes (minimum {})",
            sealed.len(),
            GCM_NONCE_SIZE + TAG_SIZE
        );
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(GCM_NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| anyhow::anyhow!("invalid partition key: {e}"))?;

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| anyhow::anyhow!("partition decryption failed: invalid key or corrupted data"))?;

    let text = String::from_utf8(plaintext)
        .map_err(|_| anyhow::anyhow!("partition decryption failed: plaintext is not UTF-8"))?;
    if text.is_empty() {
        anyhow::bail!("partition decryption failed: empty plaintext");
    }
    Ok(text)
}

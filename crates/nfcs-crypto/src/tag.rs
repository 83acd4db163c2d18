//! Tag-bound key protection: fingerprints and tag-wrapped partition keys
//!
//! In tag-wrapped mode the record never holds a usable key or the raw tag
//! identifier. It holds:
//! - `fingerprint(tag, salt)` = hex(HKDF-SHA256(ikm = tag, salt,
//!   info = "nfcs-tag-fingerprint")), used to match scanned tags. Keyed by the
//!   partition's random salt, so one precomputed table cannot cover every record.
//! - `wrap(HKDF-SHA256(ikm = tag, salt, info = "nfcs-partition-key"), key)`
//!   with XChaCha20-Poly1305, output `base64([24-byte nonce][ct + 16-byte tag])`

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use tracing::debug;
use zeroize::Zeroize;

use crate::keys::PartitionKey;
use crate::{KEY_SIZE, SALT_SIZE, TAG_SIZE, XNONCE_SIZE};

const FINGERPRINT_INFO: &[u8] = b"nfcs-tag-fingerprint";
const WRAP_INFO: &[u8] = b"nfcs-partition-key";

/// Salted, non-reversible identifier for a tag value.
pub fn tag_fingerprint(tag: &str, salt_b64: &str) -> anyhow::Result<String> {
    let mut okm = hkdf_expand(tag, salt_b64, FINGERPRINT_INFO)?;
    let fingerprint = hex::encode(okm);
    okm.zeroize();
    Ok(fingerprint)
}

/// Random HKDF salt, base64.
pub fn generate_salt() -> String {
    let mut salt = [0u8; SALT_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    STANDARD.encode(salt)
}

/// HKDF-SHA256 from the tag value, expanded under `info`.
fn hkdf_expand(tag: &str, salt_b64: &str, info: &[u8]) -> anyhow::Result<[u8; KEY_SIZE]> {
    let salt = STANDARD
        .decode(salt_b64)
        .map_err(|e| anyhow::anyhow!("salt is not base64: {e}"))?;
    let hkdf = Hkdf::<Sha256>::new(Some(&salt), tag.as_bytes());
    let mut okm = [0u8; KEY_SIZE];
    hkdf.expand(info, &mut okm)
        .map_err(|e| anyhow::anyhow!("HKDF expand failed: {e}"))?;
    Ok(okm)
}

fn derive_wrapping_key(tag: &str, salt_b64: &str) -> anyhow::Result<[u8; KEY_SIZE]> {
    hkdf_expand(tag, salt_b64, WRAP_INFO)
}

/// Wrap (encrypt) a partition key under a key derived from `tag`.
pub fn wrap_key_for_tag(tag: &str, salt_b64: &str, key: &PartitionKey) -> anyhow::Result<String> {
    let mut kek = derive_wrapping_key(tag, salt_b64)?;
    let cipher = XChaCha20Poly1305::new((&kek).into());
    kek.zeroize();

    let mut nonce_bytes = [0u8; XNONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, key.as_bytes().as_ref())
        .map_err(|e| anyhow::anyhow!("key wrapping failed: {e}"))?;

    let mut result = Vec::with_capacity(XNONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(result))
}

/// Unwrap (decrypt) a partition key with the scanned `tag`.
///
/// Input: output of `wrap_key_for_tag`
pub fn unwrap_key_for_tag(tag: &str, salt_b64: &str, wrapped_b64: &str) -> anyhow::Result<PartitionKey> {
    let wrapped = STANDARD
        .decode(wrapped_b64.trim())
        .map_err(|e| anyhow::anyhow!("wrapped key is not base64: {e}"))?;
    if wrapped.len() < XNONCE_SIZE + KEY_SIZE + TAG_SIZE {
        debug!(len = wrapped.len(), "tag-wrapped key rejected: too short");
        anyhow::bail!(
            "wrapped key too short: {} bytes (expected at least {})",
            wrapped.len(),
            XNONCE_SIZE + KEY_SIZE + TAG_SIZE
        );
    }

    let (nonce_bytes, ciphertext) = wrapped.split_at(XNONCE_SIZE);
    let nonce = XNonce::from_slice(nonce_bytes);
    let mut kek = derive_wrapping_key(tag, salt_b64)?;
    let cipher = XChaCha20Poly1305::new((&kek).into());
    kek.zeroize();

    let mut plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| {
            debug!("tag-wrapped key rejected: authentication failed");
            anyhow::anyhow!("key unwrapping failed: wrong tag or corrupted data")
        })?;

    if plaintext.len() != KEY_SIZE {
        plaintext.zeroize();
        anyhow::bail!(
            "unwrapped key has wrong size: {} bytes (expected {KEY_SIZE})",
            plaintext.len()
        );
    }

    let mut key_bytes = [0u8; KEY_SIZE];
    key_bytes.copy_from_slice(&plaintext);
    plaintext.zeroize();

    Ok(PartitionKey::from_bytes(key_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_partition_key;

    #[test]
    fn test_fingerprint_is_stable_and_distinct() {
        let salt = generate_salt();
        let fp = tag_fingerprint("04:A2:19", &salt).unwrap();
        assert_eq!(fp, tag_fingerprint("04:A2:19", &salt).unwrap());
        assert_ne!(fp, tag_fingerprint("04:A2:1A", &salt).unwrap());
        assert_eq!(fp.len(), 64);
        assert!(!tag_fingerprint("TAG1", &salt).unwrap().contains("TAG1"));
    }

    #[test]
    fn test_fingerprint_depends_on_salt() {
        let a = tag_fingerprint("04:A2:19", &generate_salt()).unwrap();
        let b = tag_fingerprint("04:A2:19", &generate_salt()).unwrap();
        assert_ne!(a, b, "same tag under different salts must not link");
    }

    #[test]
    fn test_fingerprint_is_not_the_wrapping_key() {
        let salt = generate_salt();
        let fp = tag_fingerprint("TAG1", &salt).unwrap();
        let kek = derive_wrapping_key("TAG1", &salt).unwrap();
        assert_ne!(fp, hex::encode(kek));
    }

    #[test]
    fn test_fingerprint_rejects_bad_salt() {
        assert!(tag_fingerprint("TAG1", "not base64!").is_err());
    }

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let key = generate_partition_key();
        let salt = generate_salt();

        let wrapped = wrap_key_for_tag("TAG1", &salt, &key).unwrap();
        let unwrapped = unwrap_key_for_tag("TAG1", &salt, &wrapped).unwrap();

        assert_eq!(key.as_bytes(), unwrapped.as_bytes());
    }

    #[test]
    fn test_unwrap_wrong_tag() {
        let key = generate_partition_key();
        let salt = generate_salt();
        let wrapped = wrap_key_for_tag("TAG1", &salt, &key).unwrap();

        assert!(unwrap_key_for_tag("TAG2", &salt, &wrapped).is_err());
    }

    #[test]
    fn test_unwrap_wrong_salt() {
        let key = generate_partition_key();
        let wrapped = wrap_key_for_tag("TAG1", &generate_salt(), &key).unwrap();

        assert!(unwrap_key_for_tag("TAG1", &generate_salt(), &wrapped).is_err());
    }

    #[test]
    fn test_wrapped_key_size() {
        let key = generate_partition_key();
        let wrapped = wrap_key_for_tag("TAG1", &generate_salt(), &key).unwrap();
        let raw = STANDARD.decode(wrapped).unwrap();

        // nonce (24) + key (32) + tag (16) = 72
        assert_eq!(raw.len(), XNONCE_SIZE + KEY_SIZE + TAG_SIZE);
    }
}

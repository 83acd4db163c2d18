//! nfcs-crypto: partition encryption for nfcshare
//!
//! Every partition gets its own random 256-bit key. The partition text is
//! sealed with AES-256-GCM and stored as base64 so it can travel as a plain
//! text blob.
//!
//! ```text
//! partition text ──AES-256-GCM(key_i, random 96-bit nonce)──> base64(nonce || ct || tag)
//! ```
//!
//! Key storage modes:
//! ```text
//! plain:       record.encryptionKey = hex(key_i)              record.nfcId = tag
//! tag-wrapped: record.encryptionKey = base64(XChaCha20-Poly1305(
//!                  HKDF-SHA256(ikm=tag, salt), key_i))        record.nfcId = fingerprint(tag, salt)
//! ```

pub mod keys;
pub mod partition;
pub mod tag;

pub use keys::{generate_partition_key, PartitionKey};
pub use partition::{decrypt_partition, encrypt_partition};
pub use tag::{generate_salt, tag_fingerprint, unwrap_key_for_tag, wrap_key_for_tag};

/// Size of a partition key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const GCM_NONCE_SIZE: usize = 12;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const XNONCE_SIZE: usize = 24;

/// Size of an AEAD authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of the HKDF salt used for tag-wrapped keys
pub const SALT_SIZE: usize = 16;

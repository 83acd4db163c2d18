//! nfcs-core: shared types for nfcshare
//!
//! - `config`: `nfcs.toml` schema
//! - `error`: the error taxonomy surfaced by the encrypt/decrypt flows
//! - `record`: persisted `EncryptedFileRecord` / `AccessLogEntry` schema and
//!   the validation applied at the store boundary

pub mod config;
pub mod error;
pub mod record;

pub use error::{NfcsError, NfcsResult};
pub use record::{
    AccessAction, AccessLogEntry, ContentEncoding, EncryptedFileRecord, KeyProtection,
    PartitionRecord, MAX_PARTITIONS, MIN_PARTITIONS,
};

//! nfcs-storage: OpenDAL-backed stores for nfcshare
//!
//! - `blob`: ciphertext blobs, addressed by URL
//! - `records`: `EncryptedFileRecord` documents, validated on read and write
//! - `access_log`: append-only access log for the admin views

pub mod access_log;
pub mod blob;
pub mod health;
pub mod operator;
pub mod records;

pub use access_log::{AccessLogStore, OpendalAccessLogStore};
pub use blob::{BlobStore, OpendalBlobStore};
pub use health::check_health;
pub use operator::{build_from_core_config, build_memory_operator};
pub use records::{OpendalRecordStore, RecordStore};

//! nfcs-chunks: turning a file into partitions and back
//!
//! # Overview
//! - `content`: text/base64 normalization and the extension -> MIME table
//! - `split`: fixed-count splitting into contiguous partitions
//! - `digest`: BLAKE3 content hash stored with each record

pub mod content;
pub mod digest;
pub mod split;

// Convenience re-exports for the most common operations
pub use content::{
    classify_mime, encoding_for_record, guess_mime, materialize, mime_for_file_name, normalize,
};
pub use digest::{content_hash, hash_bytes, hash_to_hex, verify_content_hash, Hash};
pub use split::{check_partition_count, plan_partitions, reassemble, split_into_partitions};

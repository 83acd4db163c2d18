//! nfcs-share: the partition-encryption and tag-gated reassembly flows
//!
//! - `encrypt`: file -> N encrypted partitions -> blobs -> one record
//! - `session`: per-viewer tag matching (which partitions have been scanned)
//! - `reassemble`: all partitions verified -> fetch, decrypt, reassemble
//! - `admin`: read-only summaries behind the admin views

pub mod admin;
pub mod encrypt;
pub mod reassemble;
pub mod session;

use std::sync::Arc;

use opendal::Operator;

use nfcs_storage::{
    AccessLogStore, BlobStore, OpendalAccessLogStore, OpendalBlobStore, OpendalRecordStore,
    RecordStore,
};

pub use admin::{principal_summary, PrincipalSummary};
pub use encrypt::{AuthorizedUser, EncryptOrchestrator, EncryptRequest, EncryptStage, SourceFile};
pub use reassemble::{reconstruct, save_reconstructed, Reassembler, ReconstructionOutcome};
pub use session::{FileProgress, FileStatus, TagMatchSession};

/// The three external stores a flow talks to
#[derive(Clone)]
pub struct Stores {
    pub blobs: Arc<dyn BlobStore>,
    pub records: Arc<dyn RecordStore>,
    pub logs: Arc<dyn AccessLogStore>,
}

impl Stores {
    /// All three stores on one OpenDAL operator, blob URLs issued under `base_url`.
    pub fn from_operator(op: Operator, base_url: impl Into<String>) -> Self {
        Self {
            blobs: Arc::new(OpendalBlobStore::new(op.clone(), base_url)),
            records: Arc::new(OpendalRecordStore::new(op.clone())),
            logs: Arc::new(OpendalAccessLogStore::new(op)),
        }
    }
}

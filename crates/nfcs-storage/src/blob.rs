//! Blob store: upload-by-path returning a URL, fetch-by-URL
//!
//! URLs are `{base_url}/{path}`. The OpenDAL implementation only resolves
//! URLs under its own base; anything else is refused rather than fetched
//! from an arbitrary location.

use async_trait::async_trait;
use opendal::Operator;
use tracing::debug;

use nfcs_core::{NfcsError, NfcsResult};

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` at `path` and return a URL it can be fetched from.
    async fn upload(&self, path: &str, data: Vec<u8>) -> NfcsResult<String>;

    /// Fetch the raw bytes behind a URL returned by `upload`.
    async fn fetch(&self, url: &str) -> NfcsResult<Vec<u8>>;

    /// Remove every blob whose path starts with `prefix`.
    async fn remove_prefix(&self, prefix: &str) -> NfcsResult<()>;
}

/// OpenDAL-backed blob store
#[derive(Clone, Debug)]
pub struct OpendalBlobStore {
    op: Operator,
    base_url: String,
}

impl OpendalBlobStore {
    pub fn new(op: Operator, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { op, base_url }
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Map a URL back to a storage path.
    pub fn path_for(&self, url: &str) -> NfcsResult<String> {
        url.strip_prefix(&self.base_url)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|path| !path.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                NfcsError::Storage(format!(
                    "blob URL {url} is not served by this store ({})",
                    self.base_url
                ))
            })
    }
}

#[async_trait]
impl BlobStore for OpendalBlobStore {
    async fn upload(&self, path: &str, data: Vec<u8>) -> NfcsResult<String> {
        let bytes = data.len();
        self.op
            .write(path, data)
            .await
            .map_err(|e| NfcsError::Storage(format!("uploading blob {path}: {e}")))?;
        debug!(path, bytes, "blob uploaded");
        Ok(self.url_for(path))
    }

    async fn fetch(&self, url: &str) -> NfcsResult<Vec<u8>> {
        let path = self.path_for(url)?;
        let buf = self
            .op
            .read(&path)
            .await
            .map_err(|e| NfcsError::Storage(format!("fetching blob {path}: {e}")))?;
        Ok(buf.to_vec())
    }

    async fn remove_prefix(&self, prefix: &str) -> NfcsResult<()> {
        if prefix.trim_matches('/').is_empty() {
            return Err(NfcsError::validation("refusing to remove the whole blob store"));
        }
        self.op
            .remove_all(prefix)
            .await
            .map_err(|e| NfcsError::Storage(format!("removing blobs under {prefix}: {e}")))?;
        debug!(prefix, "blobs removed");
        Ok(())
    }
}

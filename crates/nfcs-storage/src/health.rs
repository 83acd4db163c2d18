//! Storage health check

use anyhow::Result;
use opendal::Operator;

use crate::records::RECORDS_PREFIX;

/// Verify the storage endpoint is reachable by listing the record prefix
pub async fn check_health(op: &Operator) -> Result<()> {
    match op.list(RECORDS_PREFIX).await {
        Ok(_) => Ok(()),
        // A fresh bucket has no records yet
        Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(anyhow::anyhow!("storage health check failed: {e}")),
    }
}

/// Returns true if storage is reachable, false otherwise (non-panicking)
pub async fn is_healthy(op: &Operator) -> bool {
    check_health(op).await.is_ok()
}

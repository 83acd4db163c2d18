//! OpenDAL Operator factory for nfcshare storage backends

use anyhow::{Context, Result};
use opendal::Operator;
use std::path::Path;

use nfcs_core::config::{StorageBackend, StorageConfig};

/// Minimal settings needed to build an S3 operator
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Build an OpenDAL Operator for any S3-compatible endpoint
///
/// Uses path-style addressing (default in opendal 0.55), which is required by
/// SeaweedFS and MinIO.
pub fn build_s3_operator(cfg: &S3Settings) -> Result<Operator> {
    // opendal 0.55: S3 builder uses consuming pattern (methods take `self`, return `Self`)
    let builder = opendal::services::S3::default()
        .endpoint(&cfg.endpoint)
        .region(&cfg.region)
        .bucket(&cfg.bucket)
        .access_key_id(&cfg.access_key_id)
        .secret_access_key(&cfg.secret_access_key);

    let op = Operator::new(builder)
        .context("creating OpenDAL S3 operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}

/// Operator over a local directory.
pub fn build_fs_operator(root: &Path) -> Result<Operator> {
    let builder = opendal::services::Fs::default().root(&root.to_string_lossy());
    let op = Operator::new(builder)
        .with_context(|| format!("creating OpenDAL fs operator at {}", root.display()))?
        .layer(opendal::layers::LoggingLayer::default())
        .finish();
    Ok(op)
}

/// In-process operator; contents vanish with the process.
pub fn build_memory_operator() -> Result<Operator> {
    let op = Operator::new(opendal::services::Memory::default())
        .context("creating OpenDAL memory operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .finish();
    Ok(op)
}

/// Build an operator from the `[storage]` config section.
///
/// S3 needs credentials. If `enforce_tls` is true and the endpoint uses HTTP,
/// this returns an error; otherwise a warning is logged for non-HTTPS
/// endpoints.
pub fn build_from_core_config(
    storage: &StorageConfig,
    credentials: Option<(&str, &str)>,
) -> Result<Operator> {
    match storage.backend {
        StorageBackend::S3 => {
            let (access_key_id, secret_access_key) =
                credentials.context("S3 backend requires access key credentials")?;

            if storage.endpoint.starts_with("http://") {
                if storage.enforce_tls {
                    anyhow::bail!(
                        "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                         Use an HTTPS endpoint or set storage.enforce_tls = false for local development.",
                        storage.endpoint
                    );
                }
                tracing::warn!(
                    endpoint = %storage.endpoint,
                    "S3 endpoint uses plaintext HTTP; credentials and ciphertext travel unencrypted"
                );
            }

            build_s3_operator(&S3Settings {
                endpoint: storage.endpoint.clone(),
                region: storage.region.clone(),
                bucket: storage.bucket.clone(),
                access_key_id: access_key_id.to_string(),
                secret_access_key: secret_access_key.to_string(),
            })
        }
        StorageBackend::Fs => {
            let root = storage
                .root
                .as_deref()
                .context("storage.root is required for the fs backend")?;
            build_fs_operator(root)
        }
        StorageBackend::Memory => build_memory_operator(),
    }
}

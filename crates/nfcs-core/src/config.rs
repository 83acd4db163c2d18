use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{NfcsError, NfcsResult};
use crate::record::{MAX_PARTITIONS, MIN_PARTITIONS};

/// Top-level configuration (loaded from nfcs.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NfcsConfig {
    pub log: LogConfig,
    pub storage: StorageConfig,
    pub sharing: SharingConfig,
    pub identity: IdentityConfig,
}

impl NfcsConfig {
    /// Parse a TOML document, then check cross-field constraints.
    pub fn from_toml(s: &str) -> NfcsResult<Self> {
        let config: NfcsConfig =
            toml::from_str(s).map_err(|e| NfcsError::Config(format!("parsing nfcs.toml: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a config file.
    pub fn load(path: &Path) -> NfcsResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NfcsError::Config(format!("reading {}: {e}", path.display())))?;
        let config = Self::from_toml(&content).map_err(|e| match e {
            NfcsError::Config(msg) => NfcsError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })?;
        tracing::debug!(
            path = %path.display(),
            backend = ?config.storage.backend,
            key_mode = ?config.sharing.key_mode,
            "config loaded"
        );
        Ok(config)
    }

    pub fn validate(&self) -> NfcsResult<()> {
        let n = self.sharing.default_partitions;
        if !(MIN_PARTITIONS..=MAX_PARTITIONS).contains(&n) {
            return Err(NfcsError::Config(format!(
                "sharing.default_partitions must be between {MIN_PARTITIONS} and {MAX_PARTITIONS}, got {n}"
            )));
        }
        if self.storage.backend == StorageBackend::Fs && self.storage.root.is_none() {
            return Err(NfcsError::Config(
                "storage.root is required for the fs backend".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// S3-compatible endpoint (SeaweedFS, MinIO, AWS)
    S3,
    /// Local directory
    Fs,
    /// In-process memory, lost on exit
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// S3 endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Bucket name
    pub bucket: String,
    /// Root directory for the fs backend
    pub root: Option<PathBuf>,
    /// Base that blob URLs are issued under; defaults to `{endpoint}/{bucket}`
    pub public_url: Option<String>,
    /// Enforce HTTPS for S3 connections (error on HTTP endpoints)
    pub enforce_tls: bool,
}

impl StorageConfig {
    /// Base URL blob locations are issued under.
    pub fn blob_base_url(&self) -> String {
        if let Some(url) = &self.public_url {
            return url.trim_end_matches('/').to_string();
        }
        match self.backend {
            StorageBackend::S3 => format!(
                "{}/{}",
                self.endpoint.trim_end_matches('/'),
                self.bucket
            ),
            StorageBackend::Fs => format!(
                "file://{}",
                self.root
                    .as_deref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default()
                    .trim_end_matches('/')
            ),
            StorageBackend::Memory => "memory://nfcs".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::S3,
            endpoint: "http://localhost:8333".into(),
            region: "us-east-1".into(),
            bucket: "nfcshare".into(),
            root: None,
            public_url: None,
            enforce_tls: false,
        }
    }
}

/// How partition keys are stored next to their ciphertext
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyMode {
    /// Key stored in plaintext in the record; the tag gate is client-side only
    Plain,
    /// Key wrapped by a key derived from the tag; the record stores a tag fingerprint
    TagWrapped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SharingConfig {
    /// Partition count used when the caller does not pass one (2..=5)
    pub default_partitions: usize,
    pub key_mode: KeyMode,
}

impl Default for SharingConfig {
    fn default() -> Self {
        Self {
            default_partitions: 2,
            key_mode: KeyMode::Plain,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Principal (e-mail) acting as creator and viewer
    pub principal: Option<String>,
}

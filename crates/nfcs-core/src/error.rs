use thiserror::Error;

pub type NfcsResult<T> = Result<T, NfcsError>;

#[derive(Debug, Error)]
pub enum NfcsError {
    /// Rejected before any work started (wrong user count, short content, ...)
    #[error("validation error: {0}")]
    Validation(String),

    /// Read, upload, download, or record-write failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Decryption produced no usable plaintext. Wrong key and corrupt
    /// ciphertext are indistinguishable here.
    #[error("decryption failed: {0}")]
    Crypto(String),

    /// A persisted record failed schema validation
    #[error("malformed record: {0}")]
    Record(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl NfcsError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Wrap a lower-level storage failure, keeping the full context chain.
    pub fn storage(err: anyhow::Error) -> Self {
        Self::Storage(format!("{err:#}"))
    }

    pub fn crypto(err: anyhow::Error) -> Self {
        Self::Crypto(format!("{err:#}"))
    }
}

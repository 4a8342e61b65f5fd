use thiserror::Error;

pub type CofferResult<T> = Result<T, CofferError>;

#[derive(Debug, Error)]
pub enum CofferError {
    #[error("bad key: {0}")]
    BadKey(String),

    #[error("ciphertext MAC mismatch")]
    BadMac,

    #[error("plaintext length {have} exceeds chunk size {limit}")]
    InputTooLarge { have: usize, limit: usize },

    #[error("chunk size {0} is not a positive multiple of the AES block size")]
    BadChunkSize(usize),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("metadata index error: {0}")]
    Index(String),

    #[error("usage error: {0}")]
    Usage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CofferError {
    /// Build an `Index` error from any displayable cause (database,
    /// encoder, and decoder failures all surface through this kind).
    pub fn index(cause: impl std::fmt::Display) -> Self {
        CofferError::Index(cause.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CofferError::NotFound(_))
    }

    pub fn is_usage(&self) -> bool {
        matches!(self, CofferError::Usage(_))
    }
}

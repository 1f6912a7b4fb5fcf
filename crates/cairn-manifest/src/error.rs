use cairn_types::TypeError;

/// Errors from manifest operations.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// The stored record does not parse as a manifest.
    #[error("corrupt manifest: {reason}")]
    Corrupt { reason: String },

    /// The record was written by an incompatible on-disk format. Fatal: the
    /// store must refuse to operate.
    #[error("storage version mismatch: expected {expected}, found {actual}")]
    StorageVersion { expected: String, actual: String },

    /// A root or table name field failed to parse.
    #[error(transparent)]
    Addr(#[from] TypeError),

    /// I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for manifest operations.
pub type ManifestResult<T> = Result<T, ManifestError>;

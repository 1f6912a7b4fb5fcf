use cairn_manifest::ManifestError;
use cairn_tables::TableError;

/// Errors from chunk store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The manifest backend failed or refused the record.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// The table backend failed.
    #[error(transparent)]
    Table(#[from] TableError),

    /// The caller's sink was dropped mid-enumeration.
    #[error("chunk sink closed before enumeration finished")]
    SinkClosed,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

use cairn_types::TableName;

/// Errors from memtable, table, and table-set operations.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    /// The manifest referenced a table the backend does not hold.
    #[error("unknown table: {0}")]
    UnknownTable(TableName),

    /// The enumeration sink was dropped before extraction finished.
    #[error("chunk sink closed before extraction finished")]
    SinkClosed,

    /// I/O error from the underlying table backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for table operations.
pub type TableResult<T> = Result<T, TableError>;

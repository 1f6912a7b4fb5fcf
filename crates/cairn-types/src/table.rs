use serde::{Deserialize, Serialize};

use crate::addr::Addr;

/// Content-derived identity of a frozen table.
///
/// Same width and derivation as a chunk address, but computed over a table's
/// serialized entry stream rather than a single payload.
pub type TableName = Addr;

/// Durable identity of a table as recorded in the manifest: its
/// content-derived name and the number of chunks it holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: TableName,
    pub chunk_count: u32,
}

impl TableSpec {
    pub fn new(name: TableName, chunk_count: u32) -> Self {
        Self { name, chunk_count }
    }
}

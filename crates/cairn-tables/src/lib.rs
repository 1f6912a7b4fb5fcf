//! Memtable and layered table set for the Cairn chunk store.
//!
//! Writes buffer in a bounded [`MemTable`]. When it fills it is frozen into a
//! named immutable table through a [`TablePersister`] and prepended to the
//! [`TableSet`], the ordered newest-first stack of readable tables. Reads
//! probe layers newest to oldest; batched reads are carried in
//! [`GetRecord`]s so results can be handed back in the caller's order after
//! internal prefix sorting.
//!
//! # Architecture
//!
//! - [`MemTable`]: bounded in-memory write buffer, deduplicating by address
//! - [`ChunkReader`] / [`ChunkSource`]: the read contracts layers satisfy
//! - [`TablePersister`]: backend seam that freezes and reopens tables
//! - [`TableSet`]: immutable value; `prepend`/`union` produce new sets
//! - [`MemoryTableBackend`]: shared in-memory backend for tests and embedding

pub mod error;
pub mod memory;
pub mod memtable;
pub mod records;
pub mod table_set;
pub mod traits;

pub use error::{TableError, TableResult};
pub use memory::{MemoryTable, MemoryTableBackend};
pub use memtable::{MemTable, DEFAULT_MEM_TABLE_SIZE};
pub use records::{
    sort_by_order, sort_by_prefix, to_get_records, EnumerationOrder, ExtractRecord, GetRecord,
};
pub use table_set::TableSet;
pub use traits::{ChunkReader, ChunkSource, TablePersister};

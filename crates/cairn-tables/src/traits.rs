use std::sync::mpsc::SyncSender;
use std::sync::Arc;

use cairn_types::{Addr, TableName, TableSpec};

use crate::error::TableResult;
use crate::memtable::MemTable;
use crate::records::{EnumerationOrder, ExtractRecord, GetRecord};

/// Read contract shared by every layer: the memtable, individual tables, and
/// the table set itself.
///
/// All implementations must satisfy these invariants:
/// - A layer's contents never change once the layer is observable by readers.
/// - `get_many` fills only records whose `found` slot is still empty and
///   returns whether any records remain unfilled afterward.
/// - `extract` emits every chunk exactly once, in the requested order, and
///   blocks on the sink rather than buffering the layer in memory.
pub trait ChunkReader: Send + Sync {
    /// Check whether the layer holds `addr`.
    fn has(&self, addr: &Addr) -> TableResult<bool>;

    /// Read a chunk's payload by address. Returns `Ok(None)` on a miss.
    fn get(&self, addr: &Addr) -> TableResult<Option<Vec<u8>>>;

    /// Fill the `found` slot of every matching record. Returns `true` if any
    /// records remain unfilled.
    fn get_many(&self, reqs: &mut [GetRecord]) -> TableResult<bool>;

    /// Number of distinct chunks in this layer.
    fn count(&self) -> TableResult<u32>;

    /// Emit every chunk in this layer to `sink` in the given order.
    fn extract(
        &self,
        order: EnumerationOrder,
        sink: &SyncSender<ExtractRecord>,
    ) -> TableResult<()>;
}

/// A frozen, named table: a [`ChunkReader`] with a durable identity and a
/// physical layout the read planner can reason about.
pub trait ChunkSource: ChunkReader {
    /// The content-derived name of this table.
    fn name(&self) -> TableName;

    /// Estimate backend reads for the records this table holds.
    ///
    /// `reqs` must be sorted by prefix. Records found in this table are
    /// marked in `satisfied` (parallel to `reqs`); records already marked are
    /// skipped so earlier layers win. A coalesced read grows while its span
    /// stays within `max_read_size` and its amplification (span over wanted
    /// bytes) stays within `amp_thresh`; gaps are rounded up to `block_size`.
    /// Returns the read count and whether any read was split by
    /// `max_read_size`.
    fn calc_reads(
        &self,
        reqs: &[GetRecord],
        satisfied: &mut [bool],
        block_size: u64,
        max_read_size: u64,
        amp_thresh: u64,
    ) -> TableResult<(usize, bool)>;

    /// Release the resources backing this table. Readers sharing the source
    /// remain valid; the backend reference-counts the underlying storage.
    fn close(&self) -> TableResult<()>;
}

impl std::fmt::Debug for dyn ChunkSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkSource").field("name", &self.name()).finish()
    }
}

/// Backend seam for freezing memtables and reopening tables by name.
///
/// Implementations must be thread-safe; the sources they return are shared
/// across every reader holding a table-set snapshot.
pub trait TablePersister: Send + Sync {
    /// Freeze a memtable into a named immutable table.
    fn persist(&self, mem_table: &MemTable) -> TableResult<Arc<dyn ChunkSource>>;

    /// Materialize a reader for a table known only by its spec, e.g. one
    /// discovered in another writer's manifest record.
    fn open(&self, spec: &TableSpec) -> TableResult<Arc<dyn ChunkSource>>;
}

use std::collections::HashSet;
use std::sync::mpsc::SyncSender;

use cairn_tables::EnumerationOrder;
use cairn_types::{Addr, Chunk};

use crate::error::StoreResult;
use crate::store::BlockStore;

/// Optional reachability hints attached to scheduled puts. Reserved for
/// future optimization; every current implementation discards them.
pub type Hints = HashSet<Addr>;

/// The chunk store surface.
///
/// Semantics the engine guarantees:
/// - `get` of an unknown address returns the empty chunk sentinel, never an
///   error; callers distinguish by inspecting the chunk.
/// - `put_many` reports backpressure in-band: the returned list holds the
///   addresses of every unprocessed chunk, the failing one included, and an
///   empty list means everything was accepted.
/// - `update_root` returning `false` means another writer won the race; the
///   engine has already reconciled local state with the winner and the
///   caller may retry against the new root.
pub trait ChunkStore: Send + Sync {
    /// Buffer a chunk. Not durable until a successful `update_root` or
    /// `flush`.
    fn put(&self, chunk: Chunk) -> StoreResult<()>;

    /// Buffer chunks until the first that cannot be accepted even after a
    /// memtable rollover; returns the addresses of the unprocessed suffix.
    fn put_many(&self, chunks: &[Chunk]) -> StoreResult<Vec<Addr>>;

    /// `put` with reachability metadata. The height and hints are accepted
    /// for interface compatibility and ignored.
    fn schedule_put(&self, chunk: Chunk, ref_height: u64, hints: &Hints) -> StoreResult<()>;

    /// Accepted and discarded.
    fn add_hints(&self, hints: &Hints);

    /// Read one chunk, or the empty chunk on a miss.
    fn get(&self, hash: Addr) -> StoreResult<Chunk>;

    /// Batched read. `result[i]` answers `hashes[i]` for every `i`.
    fn get_many(&self, hashes: &[Addr]) -> StoreResult<Vec<Chunk>>;

    /// Check whether the store holds `hash`.
    fn has(&self, hash: Addr) -> StoreResult<bool>;

    /// The current root. [`Addr::EMPTY`] for a store never committed to.
    fn root(&self) -> Addr;

    /// Compare-and-swap the root; see the trait docs for the `false` case.
    /// Calling with `expected` different from the engine's current root is a
    /// caller bug and panics.
    fn update_root(&self, new_root: Addr, expected: Addr) -> StoreResult<bool>;

    /// Publish buffered writes without moving the root.
    fn flush(&self) -> StoreResult<()>;

    /// The engine version adopted from the manifest, or the compiled-in one
    /// after a successful root update.
    fn version(&self) -> String;

    /// Total chunks across memtable and tables. Layers are counted
    /// independently; an address present in both the memtable and an older
    /// table counts twice.
    fn count(&self) -> StoreResult<u32>;

    /// Stream every chunk to `sink`. The sink must be drained concurrently;
    /// production blocks on it and holds the shared lock until done.
    fn extract_chunks(&self, order: EnumerationOrder, sink: &SyncSender<Chunk>)
        -> StoreResult<()>;

    /// Estimate backend reads for a batch, for read planning. All requested
    /// addresses must already live in tables, not the memtable.
    fn calc_reads(
        &self,
        hashes: &[Addr],
        block_size: u64,
        max_read_size: u64,
        amp_thresh: u64,
    ) -> StoreResult<(usize, bool)>;

    /// Release table resources. The store is unusable afterwards.
    fn close(&self) -> StoreResult<()>;
}

/// Mints one store per namespace over shared backends.
pub trait StoreFactory: Send + Sync {
    fn create_store(&self, namespace: &str) -> StoreResult<BlockStore>;
}

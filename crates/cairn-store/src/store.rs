use std::path::PathBuf;
use std::sync::mpsc::{sync_channel, SyncSender};
use std::sync::{Arc, RwLock};

use cairn_manifest::{FileManifest, Manifest};
use cairn_tables::{
    sort_by_order, sort_by_prefix, to_get_records, ChunkReader, EnumerationOrder, MemTable,
    TablePersister, TableResult, TableSet, DEFAULT_MEM_TABLE_SIZE,
};
use cairn_types::{Addr, Chunk, ENGINE_VERSION};

use crate::error::{StoreError, StoreResult};
use crate::traits::{ChunkStore, Hints};

/// Engine state guarded by the single reader-writer lock.
struct Inner {
    mt: Option<MemTable>,
    tables: TableSet,
    root: Addr,
    engine_version: String,
    put_count: u64,
}

/// The chunk store engine.
///
/// Writes land in the memtable; when it fills it is frozen and prepended to
/// the table set and a fresh memtable is installed. A root update flushes any
/// non-empty memtable, serializes the table list, and attempts a CAS against
/// the manifest; on loss the engine reconciles by unioning in the winner's
/// tables and reports failure to the caller, who may retry.
///
/// The memtable slot moves `Absent → Live` on first write, `Live → Absent`
/// when a flush graduates it into the table set, and back to `Live` on the
/// next write. Readers snapshot the table set under the shared lock and probe
/// it after release; snapshots are immutable values, so a concurrent rollover
/// is observed either entirely or not at all.
pub struct BlockStore {
    manifest: Arc<dyn Manifest>,
    mt_size: u64,
    inner: RwLock<Inner>,
}

impl BlockStore {
    /// Open a store over the given manifest and table backend.
    ///
    /// Reads the manifest once: if a record exists, its engine version, root,
    /// and table list are adopted. A `mem_table_size` of zero falls back to
    /// [`DEFAULT_MEM_TABLE_SIZE`].
    pub fn new(
        manifest: Arc<dyn Manifest>,
        persister: Arc<dyn TablePersister>,
        mem_table_size: u64,
    ) -> StoreResult<Self> {
        let mt_size = if mem_table_size == 0 {
            DEFAULT_MEM_TABLE_SIZE
        } else {
            mem_table_size
        };

        let mut tables = TableSet::new(persister);
        let mut root = Addr::EMPTY;
        let mut engine_version = ENGINE_VERSION.to_string();
        if let Some(contents) = manifest.parse_if_exists()? {
            engine_version = contents.engine_version;
            root = contents.root;
            tables = tables.union(&contents.specs)?;
        }

        Ok(Self {
            manifest,
            mt_size,
            inner: RwLock::new(Inner {
                mt: None,
                tables,
                root,
                engine_version,
                put_count: 0,
            }),
        })
    }

    /// Open a store coordinated through a file manifest in `dir`.
    pub fn local(
        dir: impl Into<PathBuf>,
        persister: Arc<dyn TablePersister>,
        mem_table_size: u64,
    ) -> StoreResult<Self> {
        Self::new(Arc::new(FileManifest::new(dir)), persister, mem_table_size)
    }

    /// Insert under the exclusive lock, rolling the memtable over once if it
    /// is full. `Ok(false)` means the chunk does not fit even in a fresh
    /// memtable.
    fn add_chunk(&self, addr: Addr, data: &[u8]) -> StoreResult<bool> {
        let mut inner = self.inner.write().expect("lock poisoned");
        if inner.mt.is_none() {
            inner.mt = Some(MemTable::new(self.mt_size));
        }
        let added = inner
            .mt
            .as_mut()
            .expect("just installed")
            .add_chunk(addr, data);
        if !added {
            let full = inner.mt.take().expect("just probed");
            tracing::debug!(pending = full.pending_size(), "memtable full, rolling over");
            inner.tables = inner.tables.prepend(&full)?;

            let mut fresh = MemTable::new(self.mt_size);
            let retried = fresh.add_chunk(addr, data);
            inner.mt = Some(fresh);
            if !retried {
                return Ok(false);
            }
        }
        inner.put_count += 1;
        Ok(true)
    }
}

impl ChunkStore for BlockStore {
    fn put(&self, chunk: Chunk) -> StoreResult<()> {
        let added = self.add_chunk(chunk.addr(), chunk.data())?;
        assert!(
            added,
            "chunk {} larger than the memtable capacity",
            chunk.addr()
        );
        Ok(())
    }

    fn put_many(&self, chunks: &[Chunk]) -> StoreResult<Vec<Addr>> {
        for (i, chunk) in chunks.iter().enumerate() {
            if !self.add_chunk(chunk.addr(), chunk.data())? {
                return Ok(chunks[i..].iter().map(|c| c.addr()).collect());
            }
        }
        Ok(Vec::new())
    }

    fn schedule_put(&self, chunk: Chunk, _ref_height: u64, _hints: &Hints) -> StoreResult<()> {
        self.put(chunk)
    }

    fn add_hints(&self, _hints: &Hints) {}

    fn get(&self, hash: Addr) -> StoreResult<Chunk> {
        let (mt_hit, tables) = {
            let inner = self.inner.read().expect("lock poisoned");
            let mt_hit = match &inner.mt {
                Some(mt) => mt.get(&hash)?,
                None => None,
            };
            (mt_hit, inner.tables.clone())
        };
        if let Some(data) = mt_hit {
            return Ok(Chunk::from_parts(hash, data));
        }
        match tables.get(&hash)? {
            Some(data) => Ok(Chunk::from_parts(hash, data)),
            None => Ok(Chunk::empty()),
        }
    }

    fn get_many(&self, hashes: &[Addr]) -> StoreResult<Vec<Chunk>> {
        let mut reqs = to_get_records(hashes);

        let (tables, remaining) = {
            let inner = self.inner.read().expect("lock poisoned");
            let remaining = match &inner.mt {
                Some(mt) => mt.get_many(&mut reqs)?,
                None => true,
            };
            (inner.tables.clone(), remaining)
        };

        sort_by_prefix(&mut reqs);
        if remaining {
            tables.get_many(&mut reqs)?;
        }
        sort_by_order(&mut reqs);

        Ok(reqs
            .into_iter()
            .map(|req| match req.found {
                Some(data) => Chunk::from_parts(req.addr, data),
                None => Chunk::empty(),
            })
            .collect())
    }

    fn has(&self, hash: Addr) -> StoreResult<bool> {
        let (mt_has, tables) = {
            let inner = self.inner.read().expect("lock poisoned");
            let mt_has = match &inner.mt {
                Some(mt) => mt.has(&hash)?,
                None => false,
            };
            (mt_has, inner.tables.clone())
        };
        Ok(mt_has || tables.has(&hash)?)
    }

    fn root(&self) -> Addr {
        self.inner.read().expect("lock poisoned").root
    }

    fn update_root(&self, new_root: Addr, expected: Addr) -> StoreResult<bool> {
        let mut inner = self.inner.write().expect("lock poisoned");
        assert_eq!(
            inner.root, expected,
            "update_root called with a stale expected root"
        );

        if let Some(mt) = inner.mt.take() {
            // Empty memtables are discarded without a table entry.
            if !mt.is_empty() {
                inner.tables = inner.tables.prepend(&mt)?;
            }
        }

        let specs = inner.tables.to_specs()?;
        let (actual_root, actual_specs) = self.manifest.update(&specs, inner.root, new_root)?;

        if actual_root != new_root {
            tracing::debug!(winner = %actual_root, "lost root CAS, adopting winner");
            inner.root = actual_root;
            inner.tables = inner.tables.union(&actual_specs)?;
            return Ok(false);
        }

        inner.root = new_root;
        inner.engine_version = ENGINE_VERSION.to_string();
        Ok(true)
    }

    fn flush(&self) -> StoreResult<()> {
        let (root, puts) = {
            let inner = self.inner.read().expect("lock poisoned");
            (inner.root, inner.put_count)
        };
        let success = self.update_root(root, root)?;
        assert!(success, "flush CAS cannot lose while the root is unchanged");
        tracing::debug!(puts, "flushed buffered writes");
        Ok(())
    }

    fn version(&self) -> String {
        self.inner
            .read()
            .expect("lock poisoned")
            .engine_version
            .clone()
    }

    fn count(&self) -> StoreResult<u32> {
        let (mt_count, tables) = {
            let inner = self.inner.read().expect("lock poisoned");
            let mt_count = match &inner.mt {
                Some(mt) => mt.count()?,
                None => 0,
            };
            (mt_count, inner.tables.clone())
        };
        Ok(mt_count + tables.count()?)
    }

    fn extract_chunks(
        &self,
        order: EnumerationOrder,
        sink: &SyncSender<Chunk>,
    ) -> StoreResult<()> {
        std::thread::scope(|scope| {
            let (tx, rx) = sync_channel(1);
            let producer = scope.spawn(move || -> TableResult<()> {
                let inner = self.inner.read().expect("lock poisoned");
                // Table chunks were inserted before memtable chunks, so they
                // go first under InsertOrder and last under ReverseOrder.
                if order == EnumerationOrder::InsertOrder {
                    inner.tables.extract(order, &tx)?;
                }
                if let Some(mt) = &inner.mt {
                    mt.extract(order, &tx)?;
                }
                if order == EnumerationOrder::ReverseOrder {
                    inner.tables.extract(order, &tx)?;
                }
                Ok(())
            });

            let mut forward_failed = false;
            for rec in rx {
                if sink.send(Chunk::from_parts(rec.addr, rec.data)).is_err() {
                    // Dropping the receiver unblocks the producer.
                    forward_failed = true;
                    break;
                }
            }

            let produced = producer.join().expect("extract producer panicked");
            if forward_failed {
                return Err(StoreError::SinkClosed);
            }
            produced.map_err(StoreError::from)
        })
    }

    fn calc_reads(
        &self,
        hashes: &[Addr],
        block_size: u64,
        max_read_size: u64,
        amp_thresh: u64,
    ) -> StoreResult<(usize, bool)> {
        let mut reqs = to_get_records(hashes);
        let tables = self.inner.read().expect("lock poisoned").tables.clone();

        sort_by_prefix(&mut reqs);
        let (reads, split, remaining) =
            tables.calc_reads(&reqs, block_size, max_read_size, amp_thresh)?;
        assert!(
            !remaining,
            "calc_reads asked about addresses outside the table set"
        );
        Ok((reads, split))
    }

    fn close(&self) -> StoreResult<()> {
        let inner = self.inner.write().expect("lock poisoned");
        inner.tables.close()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_manifest::MemoryManifest;
    use cairn_tables::MemoryTableBackend;

    fn store_with(mem_table_size: u64) -> BlockStore {
        BlockStore::new(
            Arc::new(MemoryManifest::new()),
            Arc::new(MemoryTableBackend::new()),
            mem_table_size,
        )
        .unwrap()
    }

    fn chunk(data: &[u8]) -> Chunk {
        Chunk::new(data.to_vec())
    }

    #[test]
    fn fresh_store_has_empty_root() {
        let store = store_with(0);
        assert_eq!(store.root(), Addr::EMPTY);
        assert_eq!(store.count().unwrap(), 0);
        assert_eq!(store.version(), ENGINE_VERSION);
    }

    #[test]
    fn put_then_get() {
        let store = store_with(0);
        let c1 = chunk(b"first chunk");
        let c2 = chunk(b"second chunk");
        store.put(c1.clone()).unwrap();
        store.put(c2.clone()).unwrap();

        assert_eq!(store.get(c1.addr()).unwrap(), c1);
        assert_eq!(store.get(c2.addr()).unwrap(), c2);
        let miss = store.get(Addr::of(b"never written")).unwrap();
        assert!(miss.is_empty());
    }

    #[test]
    fn has_spans_memtable_and_tables() {
        let store = store_with(0);
        let buffered = chunk(b"buffered");
        let graduated = chunk(b"graduated");
        store.put(graduated.clone()).unwrap();
        store.flush().unwrap();
        store.put(buffered.clone()).unwrap();

        assert!(store.has(buffered.addr()).unwrap());
        assert!(store.has(graduated.addr()).unwrap());
        assert!(!store.has(Addr::of(b"absent")).unwrap());
    }

    #[test]
    fn put_is_idempotent_within_a_memtable_generation() {
        let store = store_with(0);
        let c = chunk(b"repeat");
        store.put(c.clone()).unwrap();
        store.put(c).unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn rollover_preserves_every_chunk() {
        // ~300 bytes of budget: two ~100-byte chunks per generation.
        let store = store_with(340);
        let chunks: Vec<Chunk> = (0u8..7).map(|i| chunk(&vec![i; 100])).collect();
        for c in &chunks {
            store.put(c.clone()).unwrap();
        }
        assert_eq!(store.count().unwrap(), 7);
        for c in &chunks {
            assert_eq!(store.get(c.addr()).unwrap(), *c);
        }
    }

    #[test]
    #[should_panic(expected = "larger than the memtable capacity")]
    fn put_of_oversized_chunk_panics() {
        let store = store_with(64);
        store.put(chunk(&[0u8; 256])).unwrap();
    }

    #[test]
    fn put_many_accepts_everything_across_rollovers() {
        let store = store_with(340);
        let chunks: Vec<Chunk> = (0u8..9).map(|i| chunk(&vec![i; 100])).collect();
        let pressure = store.put_many(&chunks).unwrap();
        assert!(pressure.is_empty());
        assert_eq!(store.count().unwrap(), 9);
    }

    #[test]
    fn put_many_reports_unprocessed_suffix() {
        let store = store_with(200);
        let fits = chunk(&[1u8; 64]);
        let too_big = chunk(&[2u8; 512]);
        let after = chunk(&[3u8; 64]);
        let pressure = store
            .put_many(&[fits.clone(), too_big.clone(), after.clone()])
            .unwrap();
        assert_eq!(pressure, vec![too_big.addr(), after.addr()]);
        // The accepted prefix is readable.
        assert!(store.has(fits.addr()).unwrap());
        assert!(!store.has(after.addr()).unwrap());
    }

    #[test]
    fn get_many_answers_positionally() {
        let store = store_with(0);
        let c1 = chunk(b"one");
        let c2 = chunk(b"two");
        store.put(c1.clone()).unwrap();
        store.put(c2.clone()).unwrap();

        let missing = Addr::of(b"three");
        let hashes = vec![c2.addr(), missing, c1.addr()];
        let found = store.get_many(&hashes).unwrap();
        assert_eq!(found.len(), 3);
        assert_eq!(found[0], c2);
        assert!(found[1].is_empty());
        assert_eq!(found[2], c1);
    }

    #[test]
    fn get_many_spans_memtable_and_tables() {
        let store = store_with(0);
        let graduated = chunk(b"older");
        store.put(graduated.clone()).unwrap();
        store.flush().unwrap();
        let buffered = chunk(b"newer");
        store.put(buffered.clone()).unwrap();

        let found = store
            .get_many(&[graduated.addr(), buffered.addr()])
            .unwrap();
        assert_eq!(found[0], graduated);
        assert_eq!(found[1], buffered);
    }

    #[test]
    fn update_root_publishes_and_moves_root() {
        let store = store_with(0);
        store.put(chunk(b"data")).unwrap();
        let new_root = Addr::of(b"commit 1");
        assert!(store.update_root(new_root, Addr::EMPTY).unwrap());
        assert_eq!(store.root(), new_root);
        // The memtable graduated.
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    #[should_panic(expected = "stale expected root")]
    fn update_root_with_stale_expected_panics() {
        let store = store_with(0);
        let _ = store.update_root(Addr::of(b"x"), Addr::of(b"not the root"));
    }

    #[test]
    fn flush_keeps_root_and_preserves_chunks() {
        let store = store_with(0);
        let chunks: Vec<Chunk> = (0u8..10).map(|i| chunk(&[i; 16])).collect();
        for c in &chunks {
            store.put(c.clone()).unwrap();
        }
        store.flush().unwrap();
        assert_eq!(store.root(), Addr::EMPTY);
        assert_eq!(store.count().unwrap(), 10);
        for c in &chunks {
            assert_eq!(store.get(c.addr()).unwrap(), *c);
        }
    }

    #[test]
    fn flush_with_empty_memtable_records_no_table() {
        let store = store_with(0);
        store.flush().unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn calc_reads_covers_flushed_chunks() {
        let store = store_with(0);
        let chunks: Vec<Chunk> = (0u8..4).map(|i| chunk(&vec![i; 50])).collect();
        for c in &chunks {
            store.put(c.clone()).unwrap();
        }
        store.flush().unwrap();

        let hashes: Vec<Addr> = chunks.iter().map(|c| c.addr()).collect();
        let (reads, split) = store.calc_reads(&hashes, 4096, 1 << 20, 16).unwrap();
        assert_eq!(reads, 1);
        assert!(!split);
    }

    #[test]
    fn extract_reverse_emits_memtable_before_tables() {
        let store = store_with(0);
        let graduated = chunk(b"in a table");
        store.put(graduated.clone()).unwrap();
        store.flush().unwrap();
        let buffered = chunk(b"in the memtable");
        store.put(buffered.clone()).unwrap();

        let (tx, rx) = sync_channel(1);
        std::thread::scope(|scope| {
            let collector = scope.spawn(move || rx.iter().collect::<Vec<Chunk>>());
            store
                .extract_chunks(EnumerationOrder::ReverseOrder, &tx)
                .unwrap();
            drop(tx);
            let got = collector.join().unwrap();
            assert_eq!(got.len(), 2);
            assert_eq!(got[0], buffered);
            assert_eq!(got[1], graduated);
        });
    }

    #[test]
    fn extract_insert_emits_tables_before_memtable() {
        let store = store_with(0);
        let graduated = chunk(b"in a table");
        store.put(graduated.clone()).unwrap();
        store.flush().unwrap();
        let buffered = chunk(b"in the memtable");
        store.put(buffered.clone()).unwrap();

        let (tx, rx) = sync_channel(1);
        std::thread::scope(|scope| {
            let collector = scope.spawn(move || rx.iter().collect::<Vec<Chunk>>());
            store
                .extract_chunks(EnumerationOrder::InsertOrder, &tx)
                .unwrap();
            drop(tx);
            let got = collector.join().unwrap();
            assert_eq!(got[0], graduated);
            assert_eq!(got[1], buffered);
        });
    }

    #[test]
    fn extract_round_trips_every_put() {
        let store = store_with(300);
        let chunks: Vec<Chunk> = (0u8..8).map(|i| chunk(&vec![i; 64])).collect();
        for c in &chunks {
            store.put(c.clone()).unwrap();
        }

        let (tx, rx) = sync_channel(1);
        std::thread::scope(|scope| {
            let collector = scope.spawn(move || rx.iter().collect::<Vec<Chunk>>());
            store
                .extract_chunks(EnumerationOrder::InsertOrder, &tx)
                .unwrap();
            drop(tx);
            let got = collector.join().unwrap();
            assert_eq!(got.len(), 8);
            let mut want: Vec<Addr> = chunks.iter().map(|c| c.addr()).collect();
            let mut have: Vec<Addr> = got.iter().map(|c| c.addr()).collect();
            want.sort_unstable();
            have.sort_unstable();
            assert_eq!(want, have);
        });
    }

    #[test]
    fn schedule_put_stores_and_ignores_hints() {
        let store = store_with(0);
        let c = chunk(b"scheduled");
        let hints: Hints = [Addr::of(b"hint")].into_iter().collect();
        store.schedule_put(c.clone(), 3, &hints).unwrap();
        assert!(store.has(c.addr()).unwrap());
        store.add_hints(&hints);
    }

    #[test]
    fn read_your_writes_across_threads() {
        let store = Arc::new(store_with(0));
        let c = chunk(b"visible everywhere");
        store.put(c.clone()).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let want = c.clone();
                std::thread::spawn(move || {
                    let got = store.get(want.addr()).unwrap();
                    assert_eq!(got, want);
                })
            })
            .collect();
        for h in handles {
            h.join().expect("reader should not panic");
        }
    }

    #[test]
    fn close_releases_tables() {
        let store = store_with(0);
        store.put(chunk(b"z")).unwrap();
        store.flush().unwrap();
        store.close().unwrap();
    }
}

//! In-memory table backend for tests and embedding.
//!
//! [`MemoryTableBackend`] keeps every frozen table in a `HashMap` behind a
//! `RwLock`, keyed by content-derived name. Clones share the map, so several
//! engines created from one backend can materialize each other's tables by
//! name — the same visibility a durable backend provides through shared
//! storage. Data is lost when the last clone is dropped.

use std::collections::HashMap;
use std::sync::mpsc::SyncSender;
use std::sync::{Arc, RwLock};

use rayon::prelude::*;

use cairn_types::{Addr, TableName, TableSpec};

use crate::error::{TableError, TableResult};
use crate::memtable::MemTable;
use crate::records::{EnumerationOrder, ExtractRecord, GetRecord};
use crate::traits::{ChunkReader, ChunkSource, TablePersister};

/// Domain tag mixed into table name derivation, keeping table names disjoint
/// from chunk addresses even for single-chunk tables.
const TABLE_NAME_DOMAIN: &str = "cairn-table-v1";

/// Bytes a single entry occupies in the modeled physical layout: address,
/// length word, payload.
const ENTRY_HEADER: u64 = 36;

struct TableEntry {
    addr: Addr,
    data: Vec<u8>,
    offset: u64,
}

impl TableEntry {
    fn span(&self) -> u64 {
        ENTRY_HEADER + self.data.len() as u64
    }
}

/// An immutable, named table held entirely in memory.
///
/// Entries keep their memtable insertion order, and each carries the offset
/// it would occupy in a sequential record stream; `calc_reads` simulates
/// coalescing over that layout.
pub struct MemoryTable {
    name: TableName,
    entries: Vec<TableEntry>,
    index: HashMap<Addr, usize>,
}

impl MemoryTable {
    fn from_entries(pairs: Vec<(Addr, Vec<u8>)>) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(TABLE_NAME_DOMAIN.as_bytes());
        hasher.update(b":");

        let mut entries = Vec::with_capacity(pairs.len());
        let mut index = HashMap::with_capacity(pairs.len());
        let mut offset = 0u64;
        for (addr, data) in pairs {
            hasher.update(addr.as_bytes());
            hasher.update(&(data.len() as u32).to_be_bytes());
            hasher.update(&data);

            index.insert(addr, entries.len());
            let entry = TableEntry { addr, data, offset };
            offset += entry.span();
            entries.push(entry);
        }

        Self {
            name: TableName::from_hash(*hasher.finalize().as_bytes()),
            entries,
            index,
        }
    }
}

impl ChunkReader for MemoryTable {
    fn has(&self, addr: &Addr) -> TableResult<bool> {
        Ok(self.index.contains_key(addr))
    }

    fn get(&self, addr: &Addr) -> TableResult<Option<Vec<u8>>> {
        Ok(self.index.get(addr).map(|&i| self.entries[i].data.clone()))
    }

    fn get_many(&self, reqs: &mut [GetRecord]) -> TableResult<bool> {
        reqs.par_iter_mut().for_each(|req| {
            if req.is_filled() {
                return;
            }
            if let Some(&i) = self.index.get(&req.addr) {
                req.found = Some(self.entries[i].data.clone());
            }
        });
        Ok(reqs.iter().any(|r| !r.is_filled()))
    }

    fn count(&self) -> TableResult<u32> {
        Ok(self.entries.len() as u32)
    }

    fn extract(
        &self,
        order: EnumerationOrder,
        sink: &SyncSender<ExtractRecord>,
    ) -> TableResult<()> {
        let send = |e: &TableEntry| -> TableResult<()> {
            sink.send(ExtractRecord {
                addr: e.addr,
                data: e.data.clone(),
            })
            .map_err(|_| TableError::SinkClosed)
        };
        match order {
            EnumerationOrder::InsertOrder => {
                for e in &self.entries {
                    send(e)?;
                }
            }
            EnumerationOrder::ReverseOrder => {
                for e in self.entries.iter().rev() {
                    send(e)?;
                }
            }
        }
        Ok(())
    }
}

impl ChunkSource for MemoryTable {
    fn name(&self) -> TableName {
        self.name
    }

    fn calc_reads(
        &self,
        reqs: &[GetRecord],
        satisfied: &mut [bool],
        block_size: u64,
        max_read_size: u64,
        amp_thresh: u64,
    ) -> TableResult<(usize, bool)> {
        let block_size = block_size.max(1);
        let max_read_size = max_read_size.max(1);

        // (offset, span, wanted) for every record this table holds that no
        // newer layer has claimed.
        let mut hits: Vec<(u64, u64, u64)> = Vec::new();
        for (i, req) in reqs.iter().enumerate() {
            if satisfied[i] {
                continue;
            }
            if let Some(&idx) = self.index.get(&req.addr) {
                satisfied[i] = true;
                let e = &self.entries[idx];
                hits.push((e.offset, e.span(), e.data.len() as u64));
            }
        }
        if hits.is_empty() {
            return Ok((0, false));
        }
        hits.sort_unstable_by_key(|h| h.0);

        struct Read {
            start: u64,
            end: u64,
            wanted: u64,
        }

        let mut reads = 0usize;
        let mut split = false;
        let mut cur: Option<Read> = None;

        for &(off, span, wanted) in &hits {
            if let Some(r) = &mut cur {
                let gap = off - r.end;
                let padded = if gap == 0 {
                    0
                } else {
                    gap.div_ceil(block_size) * block_size
                };
                let grown = (r.end - r.start) + padded + span;
                let grown_wanted = r.wanted + wanted;
                if grown <= max_read_size && grown <= amp_thresh.saturating_mul(grown_wanted) {
                    r.end = off + span;
                    r.wanted = grown_wanted;
                    continue;
                }
                if grown > max_read_size {
                    split = true;
                }
            }

            reads += 1;
            if span > max_read_size {
                // A single entry larger than one read: it costs a read per
                // max_read_size slice and cannot be extended.
                reads += span.div_ceil(max_read_size) as usize - 1;
                split = true;
                cur = None;
            } else {
                cur = Some(Read {
                    start: off,
                    end: off + span,
                    wanted,
                });
            }
        }

        Ok((reads, split))
    }

    fn close(&self) -> TableResult<()> {
        Ok(())
    }
}

/// Shared in-memory implementation of [`TablePersister`].
#[derive(Clone, Default)]
pub struct MemoryTableBackend {
    tables: Arc<RwLock<HashMap<TableName, Arc<MemoryTable>>>>,
}

impl MemoryTableBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frozen tables held.
    pub fn table_count(&self) -> usize {
        self.tables.read().expect("lock poisoned").len()
    }
}

impl TablePersister for MemoryTableBackend {
    fn persist(&self, mem_table: &MemTable) -> TableResult<Arc<dyn ChunkSource>> {
        let pairs: Vec<(Addr, Vec<u8>)> = mem_table
            .entries()
            .map(|(a, d)| (*a, d.clone()))
            .collect();
        let table = Arc::new(MemoryTable::from_entries(pairs));
        tracing::debug!(
            name = %table.name(),
            chunks = table.entries.len(),
            "froze memtable into table"
        );
        let mut tables = self.tables.write().expect("lock poisoned");
        // Identical content produces an identical name; keep the first copy.
        let stored = tables.entry(table.name()).or_insert(table).clone();
        Ok(stored)
    }

    fn open(&self, spec: &TableSpec) -> TableResult<Arc<dyn ChunkSource>> {
        let tables = self.tables.read().expect("lock poisoned");
        match tables.get(&spec.name) {
            Some(table) => Ok(table.clone() as Arc<dyn ChunkSource>),
            None => Err(TableError::UnknownTable(spec.name)),
        }
    }
}

use std::collections::HashSet;
use std::sync::mpsc::SyncSender;
use std::sync::Arc;

use cairn_types::{Addr, TableSpec};

use crate::error::TableResult;
use crate::memtable::MemTable;
use crate::records::{EnumerationOrder, ExtractRecord, GetRecord};
use crate::traits::{ChunkReader, ChunkSource, TablePersister};

/// Ordered, newest-first stack of immutable tables.
///
/// A `TableSet` is a value: `prepend` and `union` return new sets and never
/// mutate shared state, so a reader that snapshots the set under the engine
/// lock can keep using it after the lock is released. Cloning shares the
/// underlying sources.
///
/// Invariants: table names are unique within a set; sources are ordered
/// newest first; a source, once in a set, is never mutated.
#[derive(Clone)]
pub struct TableSet {
    sources: Vec<Arc<dyn ChunkSource>>,
    persister: Arc<dyn TablePersister>,
}

impl std::fmt::Debug for TableSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableSet")
            .field("sources", &self.sources)
            .finish_non_exhaustive()
    }
}

impl TableSet {
    /// Create an empty set backed by the given persister.
    pub fn new(persister: Arc<dyn TablePersister>) -> Self {
        Self {
            sources: Vec::new(),
            persister,
        }
    }

    /// Number of tables in the set.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Returns `true` if the set holds no tables.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Freeze a memtable through the persister and return a new set with the
    /// resulting table at the head.
    ///
    /// Identical content freezes to an identical name; if the set already
    /// holds that name the existing set is returned unchanged.
    pub fn prepend(&self, mem_table: &MemTable) -> TableResult<TableSet> {
        let source = self.persister.persist(mem_table)?;
        if self.sources.iter().any(|s| s.name() == source.name()) {
            return Ok(self.clone());
        }
        let mut sources = Vec::with_capacity(self.sources.len() + 1);
        sources.push(source);
        sources.extend(self.sources.iter().cloned());
        Ok(TableSet {
            sources,
            persister: self.persister.clone(),
        })
    }

    /// Merge named tables discovered in a manifest snapshot.
    ///
    /// Existing sources are retained in order; previously unknown names are
    /// materialized through the persister and appended in spec order. The
    /// union is idempotent.
    pub fn union(&self, specs: &[TableSpec]) -> TableResult<TableSet> {
        let known: HashSet<_> = self.sources.iter().map(|s| s.name()).collect();
        let mut sources = self.sources.clone();
        for spec in specs {
            if !known.contains(&spec.name) {
                sources.push(self.persister.open(spec)?);
            }
        }
        Ok(TableSet {
            sources,
            persister: self.persister.clone(),
        })
    }

    /// The durable identity of the set, newest first. This is the list the
    /// manifest CAS publishes.
    pub fn to_specs(&self) -> TableResult<Vec<TableSpec>> {
        self.sources
            .iter()
            .map(|s| Ok(TableSpec::new(s.name(), s.count()?)))
            .collect()
    }

    /// Estimate backend reads for a prefix-sorted batch.
    ///
    /// Visits tables newest to oldest; each table claims the records it
    /// holds, so a chunk living in several tables is only planned once.
    /// `remaining` reports records no table holds.
    pub fn calc_reads(
        &self,
        reqs: &[GetRecord],
        block_size: u64,
        max_read_size: u64,
        amp_thresh: u64,
    ) -> TableResult<(usize, bool, bool)> {
        let mut satisfied = vec![false; reqs.len()];
        let mut reads = 0;
        let mut split = false;
        for source in &self.sources {
            let (r, s) =
                source.calc_reads(reqs, &mut satisfied, block_size, max_read_size, amp_thresh)?;
            reads += r;
            split = split || s;
        }
        let remaining = satisfied.iter().any(|&s| !s);
        Ok((reads, split, remaining))
    }

    /// Release every source's resources.
    pub fn close(&self) -> TableResult<()> {
        for source in &self.sources {
            source.close()?;
        }
        Ok(())
    }
}

impl ChunkReader for TableSet {
    fn has(&self, addr: &Addr) -> TableResult<bool> {
        for source in &self.sources {
            if source.has(addr)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn get(&self, addr: &Addr) -> TableResult<Option<Vec<u8>>> {
        for source in &self.sources {
            if let Some(data) = source.get(addr)? {
                return Ok(Some(data));
            }
        }
        Ok(None)
    }

    fn get_many(&self, reqs: &mut [GetRecord]) -> TableResult<bool> {
        let mut remaining = reqs.iter().any(|r| !r.is_filled());
        for source in &self.sources {
            if !remaining {
                break;
            }
            remaining = source.get_many(reqs)?;
        }
        Ok(remaining)
    }

    fn count(&self) -> TableResult<u32> {
        let mut total = 0u32;
        for source in &self.sources {
            total += source.count()?;
        }
        Ok(total)
    }

    fn extract(
        &self,
        order: EnumerationOrder,
        sink: &SyncSender<ExtractRecord>,
    ) -> TableResult<()> {
        match order {
            // Tables toward the tail were frozen earlier.
            EnumerationOrder::InsertOrder => {
                for source in self.sources.iter().rev() {
                    source.extract(order, sink)?;
                }
            }
            EnumerationOrder::ReverseOrder => {
                for source in &self.sources {
                    source.extract(order, sink)?;
                }
            }
        }
        Ok(())
    }
}

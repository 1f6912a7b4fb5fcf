use std::collections::HashMap;
use std::sync::mpsc::SyncSender;

use cairn_types::Addr;

use crate::error::{TableError, TableResult};
use crate::records::{EnumerationOrder, ExtractRecord, GetRecord};
use crate::traits::ChunkReader;

/// Default byte budget for a memtable: 512 MiB.
pub const DEFAULT_MEM_TABLE_SIZE: u64 = 512 * (1 << 20);

/// Fixed charge per entry on top of the payload, bounding the memory the
/// index consumes alongside the payloads themselves.
const ENTRY_OVERHEAD: u64 = 64;

/// Bounded in-memory write buffer.
///
/// Chunks land here first and stay until the buffer fills, at which point the
/// whole memtable is frozen into an immutable table and a fresh one takes its
/// place. Duplicate adds of the same address are idempotent and charge no
/// additional space. Rejection is purely capacity-based.
pub struct MemTable {
    chunks: HashMap<Addr, Vec<u8>>,
    order: Vec<Addr>,
    pending_size: u64,
    size_budget: u64,
}

impl MemTable {
    /// Create a memtable with the given byte budget. A budget of zero falls
    /// back to [`DEFAULT_MEM_TABLE_SIZE`].
    pub fn new(size_budget: u64) -> Self {
        let size_budget = if size_budget == 0 {
            DEFAULT_MEM_TABLE_SIZE
        } else {
            size_budget
        };
        Self {
            chunks: HashMap::new(),
            order: Vec::new(),
            pending_size: 0,
            size_budget,
        }
    }

    /// Insert a chunk if space remains.
    ///
    /// Returns `true` on success, including the idempotent re-add of an
    /// address already present. Returns `false` when the payload plus entry
    /// overhead would exceed the budget; the caller must roll the memtable
    /// over and retry on a fresh one.
    pub fn add_chunk(&mut self, addr: Addr, data: &[u8]) -> bool {
        if self.chunks.contains_key(&addr) {
            return true;
        }
        let charge = data.len() as u64 + ENTRY_OVERHEAD;
        if self.pending_size + charge > self.size_budget {
            return false;
        }
        self.chunks.insert(addr, data.to_vec());
        self.order.push(addr);
        self.pending_size += charge;
        true
    }

    /// Bytes charged so far, payload plus per-entry overhead.
    pub fn pending_size(&self) -> u64 {
        self.pending_size
    }

    /// Entries in insertion order. Used by persisters when freezing.
    pub fn entries(&self) -> impl Iterator<Item = (&Addr, &Vec<u8>)> {
        self.order.iter().map(move |a| (a, &self.chunks[a]))
    }

    /// Returns `true` if no chunks have been added.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl ChunkReader for MemTable {
    fn has(&self, addr: &Addr) -> TableResult<bool> {
        Ok(self.chunks.contains_key(addr))
    }

    fn get(&self, addr: &Addr) -> TableResult<Option<Vec<u8>>> {
        Ok(self.chunks.get(addr).cloned())
    }

    fn get_many(&self, reqs: &mut [GetRecord]) -> TableResult<bool> {
        let mut remaining = false;
        for req in reqs.iter_mut() {
            if req.is_filled() {
                continue;
            }
            match self.chunks.get(&req.addr) {
                Some(data) => req.found = Some(data.clone()),
                None => remaining = true,
            }
        }
        Ok(remaining)
    }

    fn count(&self) -> TableResult<u32> {
        Ok(self.order.len() as u32)
    }

    fn extract(
        &self,
        order: EnumerationOrder,
        sink: &SyncSender<ExtractRecord>,
    ) -> TableResult<()> {
        let send = |addr: &Addr| -> TableResult<()> {
            sink.send(ExtractRecord {
                addr: *addr,
                data: self.chunks[addr].clone(),
            })
            .map_err(|_| TableError::SinkClosed)
        };
        match order {
            EnumerationOrder::InsertOrder => {
                for addr in &self.order {
                    send(addr)?;
                }
            }
            EnumerationOrder::ReverseOrder => {
                for addr in self.order.iter().rev() {
                    send(addr)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::to_get_records;
    use std::sync::mpsc::sync_channel;

    fn chunk(data: &[u8]) -> (Addr, Vec<u8>) {
        (Addr::of(data), data.to_vec())
    }

    #[test]
    fn add_and_get() {
        let mut mt = MemTable::new(1024);
        let (addr, data) = chunk(b"hello");
        assert!(mt.add_chunk(addr, &data));
        assert_eq!(mt.get(&addr).unwrap(), Some(data));
        assert!(mt.has(&addr).unwrap());
        assert_eq!(mt.count().unwrap(), 1);
    }

    #[test]
    fn duplicate_add_is_idempotent() {
        let mut mt = MemTable::new(1024);
        let (addr, data) = chunk(b"dup");
        assert!(mt.add_chunk(addr, &data));
        let size = mt.pending_size();
        assert!(mt.add_chunk(addr, &data));
        assert_eq!(mt.pending_size(), size);
        assert_eq!(mt.count().unwrap(), 1);
    }

    #[test]
    fn rejects_when_budget_exceeded() {
        let mut mt = MemTable::new(200);
        let (a1, d1) = chunk(&[1u8; 100]);
        assert!(mt.add_chunk(a1, &d1));
        let (a2, d2) = chunk(&[2u8; 100]);
        assert!(!mt.add_chunk(a2, &d2));
        // The rejected chunk left no trace.
        assert!(!mt.has(&a2).unwrap());
        assert_eq!(mt.count().unwrap(), 1);
    }

    #[test]
    fn oversized_chunk_rejected_even_when_empty() {
        let mut mt = MemTable::new(100);
        let (addr, data) = chunk(&[0u8; 200]);
        assert!(!mt.add_chunk(addr, &data));
        assert!(mt.is_empty());
    }

    #[test]
    fn zero_budget_uses_default() {
        let mt = MemTable::new(0);
        assert_eq!(mt.size_budget, DEFAULT_MEM_TABLE_SIZE);
    }

    #[test]
    fn get_many_fills_only_matches() {
        let mut mt = MemTable::new(1024);
        let (a1, d1) = chunk(b"one");
        let (a2, d2) = chunk(b"two");
        mt.add_chunk(a1, &d1);
        mt.add_chunk(a2, &d2);

        let missing = Addr::of(b"missing");
        let mut reqs = to_get_records(&[a1, missing, a2]);
        let remaining = mt.get_many(&mut reqs).unwrap();
        assert!(remaining);
        assert_eq!(reqs[0].found.as_deref(), Some(d1.as_slice()));
        assert!(reqs[1].found.is_none());
        assert_eq!(reqs[2].found.as_deref(), Some(d2.as_slice()));
    }

    #[test]
    fn get_many_with_all_present_reports_nothing_remaining() {
        let mut mt = MemTable::new(1024);
        let (a1, d1) = chunk(b"one");
        mt.add_chunk(a1, &d1);
        let mut reqs = to_get_records(&[a1]);
        assert!(!mt.get_many(&mut reqs).unwrap());
    }

    #[test]
    fn get_many_does_not_overwrite_filled_records() {
        let mut mt = MemTable::new(1024);
        let (a1, d1) = chunk(b"mine");
        mt.add_chunk(a1, &d1);
        let mut reqs = to_get_records(&[a1]);
        reqs[0].found = Some(b"already".to_vec());
        mt.get_many(&mut reqs).unwrap();
        assert_eq!(reqs[0].found.as_deref(), Some(b"already".as_slice()));
    }

    #[test]
    fn extract_insert_order() {
        let mut mt = MemTable::new(1024);
        let (a1, d1) = chunk(b"first");
        let (a2, d2) = chunk(b"second");
        mt.add_chunk(a1, &d1);
        mt.add_chunk(a2, &d2);

        let (tx, rx) = sync_channel(4);
        mt.extract(EnumerationOrder::InsertOrder, &tx).unwrap();
        drop(tx);
        let recs: Vec<ExtractRecord> = rx.iter().collect();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].addr, a1);
        assert_eq!(recs[1].addr, a2);
    }

    #[test]
    fn extract_reverse_order() {
        let mut mt = MemTable::new(1024);
        let (a1, d1) = chunk(b"first");
        let (a2, d2) = chunk(b"second");
        mt.add_chunk(a1, &d1);
        mt.add_chunk(a2, &d2);

        let (tx, rx) = sync_channel(4);
        mt.extract(EnumerationOrder::ReverseOrder, &tx).unwrap();
        drop(tx);
        let recs: Vec<ExtractRecord> = rx.iter().collect();
        assert_eq!(recs[0].addr, a2);
        assert_eq!(recs[1].addr, a1);
    }
}

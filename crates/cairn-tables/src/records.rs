use cairn_types::Addr;

/// Traversal order for whole-store enumeration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnumerationOrder {
    /// Oldest chunks first: tables before memtable, each layer front to back.
    InsertOrder,
    /// Newest chunks first: memtable before tables, each layer back to front.
    ReverseOrder,
}

/// Per-hash carrier for a batched read.
///
/// `order` is the caller's original index; batch lookups sort records by
/// address prefix to let the backend coalesce adjacent keys, then sort back
/// by `order` before answering. Exactly one layer fills `found`; layers must
/// skip records that already carry a result.
#[derive(Clone, Debug)]
pub struct GetRecord {
    pub addr: Addr,
    pub prefix: u64,
    pub order: usize,
    pub found: Option<Vec<u8>>,
}

impl GetRecord {
    pub fn is_filled(&self) -> bool {
        self.found.is_some()
    }
}

/// One chunk emitted by enumeration.
#[derive(Clone, Debug)]
pub struct ExtractRecord {
    pub addr: Addr,
    pub data: Vec<u8>,
}

/// Build one [`GetRecord`] per requested address, preserving caller order.
pub fn to_get_records(hashes: &[Addr]) -> Vec<GetRecord> {
    hashes
        .iter()
        .enumerate()
        .map(|(i, h)| GetRecord {
            addr: *h,
            prefix: h.prefix(),
            order: i,
            found: None,
        })
        .collect()
}

/// Sort records into the order the table-set batch reader expects.
pub fn sort_by_prefix(reqs: &mut [GetRecord]) {
    reqs.sort_unstable_by_key(|r| (r.prefix, r.addr));
}

/// Restore the caller's original order.
pub fn sort_by_order(reqs: &mut [GetRecord]) {
    reqs.sort_unstable_by_key(|r| r.order);
}

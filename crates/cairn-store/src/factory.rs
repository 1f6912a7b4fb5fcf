//! Store factories: one store per namespace over shared backends.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use cairn_manifest::MemoryManifest;
use cairn_tables::MemoryTableBackend;

use crate::error::StoreResult;
use crate::store::BlockStore;
use crate::traits::StoreFactory;

/// Mints memory-backed stores. Namespaces get independent manifest cells but
/// share one table backend, so stores created twice for the same namespace
/// coordinate through the same CAS cell — the shape a remote deployment has
/// with one manifest table and one blob bucket.
pub struct MemoryStoreFactory {
    backend: MemoryTableBackend,
    manifests: Mutex<HashMap<String, MemoryManifest>>,
    mem_table_size: u64,
}

impl MemoryStoreFactory {
    /// A `mem_table_size` of zero uses the engine default.
    pub fn new(mem_table_size: u64) -> Self {
        Self {
            backend: MemoryTableBackend::new(),
            manifests: Mutex::new(HashMap::new()),
            mem_table_size,
        }
    }
}

impl StoreFactory for MemoryStoreFactory {
    fn create_store(&self, namespace: &str) -> StoreResult<BlockStore> {
        let manifest = self
            .manifests
            .lock()
            .expect("lock poisoned")
            .entry(namespace.to_string())
            .or_default()
            .clone();
        BlockStore::new(
            Arc::new(manifest),
            Arc::new(self.backend.clone()),
            self.mem_table_size,
        )
    }
}

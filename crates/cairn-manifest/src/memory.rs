//! In-memory manifest cell for testing and ephemeral use.

use std::sync::{Arc, Mutex};

use cairn_types::{Addr, TableSpec, ENGINE_VERSION};

use crate::error::ManifestResult;
use crate::traits::{Manifest, ManifestContents};

/// A mutexed CAS cell implementing [`Manifest`].
///
/// Clones share the cell, so engines built from clones of one
/// `MemoryManifest` coordinate exactly as engines sharing a durable manifest
/// would.
#[derive(Clone, Default)]
pub struct MemoryManifest {
    cell: Arc<Mutex<Option<ManifestContents>>>,
}

impl MemoryManifest {
    /// Create a new empty cell.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Manifest for MemoryManifest {
    fn parse_if_exists(&self) -> ManifestResult<Option<ManifestContents>> {
        Ok(self.cell.lock().expect("lock poisoned").clone())
    }

    fn update(
        &self,
        specs: &[TableSpec],
        expected_root: Addr,
        new_root: Addr,
    ) -> ManifestResult<(Addr, Vec<TableSpec>)> {
        let mut cell = self.cell.lock().expect("lock poisoned");
        let stored_root = cell.as_ref().map(|c| c.root).unwrap_or(Addr::EMPTY);
        if stored_root != expected_root {
            let (root, specs) = match cell.as_ref() {
                Some(stored) => (stored.root, stored.specs.clone()),
                None => (Addr::EMPTY, Vec::new()),
            };
            return Ok((root, specs));
        }
        *cell = Some(ManifestContents {
            engine_version: ENGINE_VERSION.to_string(),
            root: new_root,
            specs: specs.to_vec(),
        });
        Ok((new_root, specs.to_vec()))
    }
}

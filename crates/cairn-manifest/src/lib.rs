//! Manifest cell for the Cairn chunk store.
//!
//! The manifest is the single external record binding a store together: the
//! storage version, the engine version, the current root hash, and the list
//! of table specs holding the store's chunks. Its compare-and-swap on the
//! root is the only synchronization between processes.
//!
//! Two implementations are provided:
//!
//! - [`FileManifest`]: one text record per store directory, updated under an
//!   advisory file lock with an atomic rename
//! - [`MemoryManifest`]: a mutexed cell for tests and embedding; clones share
//!   the cell so independent engines can race on it

pub mod error;
pub mod file;
pub mod memory;
pub mod traits;

pub use error::{ManifestError, ManifestResult};
pub use file::FileManifest;
pub use memory::MemoryManifest;
pub use traits::{Manifest, ManifestContents};

//! The Cairn chunk store engine.
//!
//! [`BlockStore`] is the user-facing store: writes buffer in a memtable,
//! full memtables freeze into immutable tables, and root updates publish the
//! table list through the manifest's compare-and-swap. Everything a caller
//! touches goes through the [`ChunkStore`] trait.
//!
//! # Durability
//!
//! A returned `put` is not durable. Only a successful `update_root` (or
//! `flush`) makes the referenced chunks reachable after a crash, assuming the
//! table backend persists before the manifest CAS. Within one process,
//! read-your-writes holds: after `put(c)` returns, any `get(c.addr())` in the
//! same process observes `c`.

pub mod error;
pub mod factory;
pub mod store;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use factory::MemoryStoreFactory;
pub use store::BlockStore;
pub use traits::{ChunkStore, Hints, StoreFactory};

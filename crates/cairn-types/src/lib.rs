//! Foundation types for the Cairn chunk store.
//!
//! This crate provides the core addressing and data types used throughout the
//! Cairn system. Every other Cairn crate depends on `cairn-types`.
//!
//! # Key Types
//!
//! - [`Addr`] — Content-addressed chunk identifier (BLAKE3 hash)
//! - [`Chunk`] — An immutable payload paired with its address
//! - [`TableSpec`] — Durable identity of a frozen table: name plus chunk count

pub mod addr;
pub mod chunk;
pub mod error;
pub mod table;

pub use addr::Addr;
pub use chunk::Chunk;
pub use error::TypeError;
pub use table::{TableName, TableSpec};

/// Version of the on-disk storage format. A manifest carrying a different
/// storage version belongs to an incompatible store and must not be touched.
pub const STORAGE_VERSION: &str = "0";

/// Version of the value model this build of the engine encodes. Read from the
/// manifest on open; rewritten with this value on every successful root
/// update.
pub const ENGINE_VERSION: &str = "1";

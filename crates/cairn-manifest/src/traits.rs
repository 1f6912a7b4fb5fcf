use cairn_types::{Addr, TableSpec};

use crate::error::ManifestResult;

/// A snapshot of the manifest record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestContents {
    /// The engine version that last published this record.
    pub engine_version: String,
    /// The root hash of the caller's data graph.
    pub root: Addr,
    /// The tables holding the store's chunks, newest first.
    pub specs: Vec<TableSpec>,
}

/// The external cell coordinating every writer in a namespace.
///
/// Implementations must make `update` atomic: the root comparison and the
/// replacement of the record happen as one step, so racing writers observe a
/// total order of published roots. Multiple writers read each other's
/// records, which makes the stored field order part of the contract.
pub trait Manifest: Send + Sync {
    /// Read the current record, if one has ever been published.
    fn parse_if_exists(&self) -> ManifestResult<Option<ManifestContents>>;

    /// Compare-and-swap on the root.
    ///
    /// If the stored root equals `expected_root`, replace the record with
    /// the current engine version, `new_root`, and `specs`, and return
    /// `(new_root, specs)`. Otherwise return the stored root and specs
    /// unchanged. A caller seeing an actual root different from `new_root`
    /// has lost the race and must reconcile.
    fn update(
        &self,
        specs: &[TableSpec],
        expected_root: Addr,
        new_root: Addr,
    ) -> ManifestResult<(Addr, Vec<TableSpec>)>;
}

//! File-backed manifest: one text record per store directory.
//!
//! The record is a single line of fields joined by `:`, in the order
//! `storage-version:engine-version:root-hex[:table-name-hex:chunk-count]*`.
//! The field order is bit-exact across writers because every writer in a
//! namespace parses every other writer's record.
//!
//! Updates take an advisory exclusive lock on a sibling `manifest.lock`
//! file, re-read the record, compare roots, and publish via write-to-temp
//! plus atomic rename. Snapshot reads go straight to the record file; the
//! rename guarantees they never observe a half-written record.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

use fs4::FileExt;
use tempfile::NamedTempFile;

use cairn_types::{Addr, TableSpec, ENGINE_VERSION, STORAGE_VERSION};

use crate::error::{ManifestError, ManifestResult};
use crate::traits::{Manifest, ManifestContents};

const MANIFEST_FILE: &str = "manifest";
const LOCK_FILE: &str = "manifest.lock";
const FIELD_SEP: &str = ":";

/// A [`Manifest`] stored as a text record in a directory.
pub struct FileManifest {
    dir: PathBuf,
}

impl FileManifest {
    /// Bind to a store directory. The directory and record are created on
    /// first update, not here.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    fn read_record(&self) -> ManifestResult<Option<ManifestContents>> {
        let raw = match std::fs::read_to_string(self.manifest_path()) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        parse_record(raw.trim_end()).map(Some)
    }

    fn acquire_lock(&self) -> ManifestResult<File> {
        std::fs::create_dir_all(&self.dir)?;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(self.dir.join(LOCK_FILE))?;
        file.lock_exclusive()?;
        Ok(file)
    }
}

impl Manifest for FileManifest {
    fn parse_if_exists(&self) -> ManifestResult<Option<ManifestContents>> {
        self.read_record()
    }

    fn update(
        &self,
        specs: &[TableSpec],
        expected_root: Addr,
        new_root: Addr,
    ) -> ManifestResult<(Addr, Vec<TableSpec>)> {
        // Held until return; released when the handle drops.
        let _lock = self.acquire_lock()?;

        let stored = self.read_record()?;
        let stored_root = stored.as_ref().map(|c| c.root).unwrap_or(Addr::EMPTY);
        if stored_root != expected_root {
            let (root, specs) = match stored {
                Some(c) => (c.root, c.specs),
                None => (Addr::EMPTY, Vec::new()),
            };
            return Ok((root, specs));
        }

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(format_record(new_root, specs).as_bytes())?;
        tmp.persist(self.manifest_path())
            .map_err(|e| ManifestError::Io(e.error))?;
        tracing::debug!(root = %new_root, tables = specs.len(), "published manifest");

        Ok((new_root, specs.to_vec()))
    }
}

fn format_record(root: Addr, specs: &[TableSpec]) -> String {
    let mut fields = vec![
        STORAGE_VERSION.to_string(),
        ENGINE_VERSION.to_string(),
        root.to_hex(),
    ];
    for spec in specs {
        fields.push(spec.name.to_hex());
        fields.push(spec.chunk_count.to_string());
    }
    fields.join(FIELD_SEP)
}

fn parse_record(raw: &str) -> ManifestResult<ManifestContents> {
    let fields: Vec<&str> = raw.split(FIELD_SEP).collect();
    if fields.len() < 3 || (fields.len() - 3) % 2 != 0 {
        return Err(ManifestError::Corrupt {
            reason: format!("expected 3 + 2n fields, got {}", fields.len()),
        });
    }
    if fields[0] != STORAGE_VERSION {
        return Err(ManifestError::StorageVersion {
            expected: STORAGE_VERSION.to_string(),
            actual: fields[0].to_string(),
        });
    }

    let engine_version = fields[1].to_string();
    let root = Addr::from_hex(fields[2])?;

    let mut specs = Vec::with_capacity((fields.len() - 3) / 2);
    for pair in fields[3..].chunks(2) {
        let name = Addr::from_hex(pair[0])?;
        let chunk_count = pair[1].parse::<u32>().map_err(|e| ManifestError::Corrupt {
            reason: format!("bad chunk count {:?}: {e}", pair[1]),
        })?;
        specs.push(TableSpec::new(name, chunk_count));
    }

    Ok(ManifestContents {
        engine_version,
        root,
        specs,
    })
}

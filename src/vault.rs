//! High-level vault operations
//!
//! A [`Vault`] is one open container: the catalog loaded into memory plus
//! a handle to the backing file. Exactly one operation mutates the catalog
//! per invocation; the catalog is flushed back to the container head by
//! [`Vault::close`] only when that operation succeeded (dirty flag).
//!
//! Mutating operations plan their changes on a staged clone of the catalog
//! and commit it only after every container byte is written, so a failed
//! operation leaves both the in-memory and the on-disk catalog exactly as
//! they were.

use crate::allocator;
use crate::catalog::{
    unix_now, BlockEntry, Catalog, FileEntry, FRAGMENTS_PER_FILE, MAX_FILES, MAX_NAME_LEN,
};
use crate::error::{Result, VaultError};
use crate::io::VaultFile;
use crate::marker::{self, MARKER_END, MARKER_OVERHEAD, MARKER_START, MARKER_WIPE};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::Path;

/// An open vault
pub struct Vault {
    file: VaultFile,
    catalog: Catalog,
    dirty: bool,
}

/// One row of `list` output.
#[derive(Debug, Clone, Serialize)]
pub struct ListEntry {
    pub name: String,
    pub size: u64,
    pub mode: u32,
    pub inserted_at: u64,
}

/// Read-only vault statistics.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct VaultStatus {
    pub file_count: usize,
    /// Sum of all live block lengths, markers included.
    pub total_size: u64,
    /// `1 - total_size / occupied_span`; 0 for an empty vault.
    pub fragmentation: f64,
}

impl Vault {
    /// Create a new vault container of `vault_size` bytes at `path`.
    ///
    /// Fails if the size cannot even hold the serialized catalog. The
    /// file is extended sparsely; gaps have unspecified content.
    pub fn init<P: AsRef<Path>>(path: P, vault_size: u64) -> Result<()> {
        let min = Catalog::data_start();
        if vault_size < min {
            return Err(VaultError::VaultTooSmall {
                size: vault_size,
                min,
            });
        }
        let catalog = Catalog::new(vault_size);
        let mut file = VaultFile::create(path, &catalog)?;
        file.sync()?;
        Ok(())
    }

    /// Open an existing vault, loading its catalog into memory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = VaultFile::open(path)?;
        let catalog = file.read_catalog()?;
        Ok(Vault {
            file,
            catalog,
            dirty: false,
        })
    }

    /// Close the vault, persisting the catalog if a mutating operation
    /// succeeded since open.
    pub fn close(mut self) -> Result<()> {
        if self.dirty {
            self.file.write_catalog(&self.catalog)?;
            self.file.sync()?;
        }
        Ok(())
    }

    /// The in-memory catalog.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Add the file at `source` to the vault, splitting it into up to
    /// [`FRAGMENTS_PER_FILE`] fragments. Returns the stored base name.
    pub fn add(&mut self, source: &Path) -> Result<String> {
        if self.catalog.files.len() == MAX_FILES {
            return Err(VaultError::TableFull);
        }
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or(VaultError::InvalidPath)?
            .to_string();
        if name.len() > MAX_NAME_LEN {
            return Err(VaultError::NameTooLong {
                len: name.len(),
                max: MAX_NAME_LEN,
            });
        }
        if self.catalog.find_file(&name).is_some() {
            return Err(VaultError::AlreadyExists(name));
        }

        let meta = std::fs::metadata(source)?;
        let size = meta.len();
        let mode = meta.permissions().mode();

        // Plan placement on a staged catalog; nothing touches the live one
        // until the data is on disk.
        let mut staged = self.catalog.clone();
        let file_idx = staged.insert_file(FileEntry {
            name: name.clone(),
            size,
            mode,
            inserted_at: unix_now(),
            fragments: [None; FRAGMENTS_PER_FILE],
        });

        let mut remaining = size;
        for fragment in 0..FRAGMENTS_PER_FILE {
            if remaining == 0 {
                break;
            }
            let gap = match allocator::find_gap(&staged, remaining + MARKER_OVERHEAD) {
                Some(gap) => gap,
                None => break,
            };
            let length = gap.length.min(remaining + MARKER_OVERHEAD);
            staged.insert_block(
                gap.insert_at,
                BlockEntry {
                    owner: file_idx as u16,
                    fragment: fragment as u16,
                    length,
                    offset: gap.offset,
                },
            );
            remaining -= marker::payload_len(length);
        }
        if remaining > 0 {
            return Err(VaultError::CapacityExceeded(name));
        }

        // Stream the data, fragment by fragment in order.
        let mut src = File::open(source)?;
        let frag_blocks: Vec<u16> = staged.files[file_idx]
            .fragments
            .iter()
            .flatten()
            .copied()
            .collect();
        for (written, &block_idx) in frag_blocks.iter().enumerate() {
            let block = staged.blocks[usize::from(block_idx)];
            if let Err(err) = self.write_block(&mut src, &block) {
                // Roll back by wiping markers, newest first, so no
                // stale-but-marker-valid region survives. The payload
                // bytes themselves are left behind.
                for &undo_idx in frag_blocks[..=written].iter().rev() {
                    let undo = staged.blocks[usize::from(undo_idx)];
                    if let Err(wipe_err) = self.wipe_markers(&undo) {
                        tracing::warn!(
                            offset = undo.offset,
                            error = %wipe_err,
                            "marker wipe failed during add rollback"
                        );
                        return Err(VaultError::PossibleCorruption(format!(
                            "rollback of {} could not wipe block at {}: {}",
                            name, undo.offset, wipe_err
                        )));
                    }
                }
                return Err(err);
            }
        }

        staged.touch();
        self.catalog = staged;
        self.dirty = true;
        tracing::debug!(name = %name, size, fragments = frag_blocks.len(), "file added");
        Ok(name)
    }

    /// Remove a stored file by name.
    ///
    /// Lazy delete: block entries are dropped (freeing the ranges for the
    /// allocator) and the markers wiped, but the payload bytes stay until
    /// overwritten. Catalog changes commit even when a wipe fails; the
    /// failure is then surfaced as [`VaultError::PossibleCorruption`].
    pub fn remove(&mut self, name: &str) -> Result<()> {
        let idx = self
            .catalog
            .find_file(name)
            .ok_or_else(|| VaultError::NotFound(name.to_string()))?;

        let mut staged = self.catalog.clone();
        let mut wipe_failure: Option<VaultError> = None;
        for fragment in 0..FRAGMENTS_PER_FILE {
            if let Some(block_idx) = staged.files[idx].fragments[fragment] {
                let block = staged.remove_block(usize::from(block_idx));
                if let Err(err) = self.wipe_markers(&block) {
                    tracing::warn!(
                        offset = block.offset,
                        error = %err,
                        "marker wipe failed during remove"
                    );
                    wipe_failure.get_or_insert(err);
                }
            }
        }
        staged.remove_file(idx);
        staged.touch();
        self.catalog = staged;
        self.dirty = true;

        match wipe_failure {
            Some(err) => Err(VaultError::PossibleCorruption(format!(
                "{} removed but a marker wipe failed: {}",
                name, err
            ))),
            None => Ok(()),
        }
    }

    /// Fetch a stored file into the current directory under its own name.
    pub fn fetch(&mut self, name: &str) -> Result<()> {
        self.fetch_into(name, Path::new(name))
    }

    /// Fetch a stored file to `dest`, reproducing its bytes and permission
    /// bits. On a failed copy the partial destination is deleted
    /// (best effort) and the vault itself is left untouched.
    pub fn fetch_into(&mut self, name: &str, dest: &Path) -> Result<()> {
        let idx = self
            .catalog
            .find_file(name)
            .ok_or_else(|| VaultError::NotFound(name.to_string()))?;
        let entry = self.catalog.files[idx].clone();

        let mut dst = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(entry.mode & 0o777)
            .open(dest)?;

        for block_idx in entry.fragments.iter().flatten() {
            let block = self.catalog.blocks[usize::from(*block_idx)];
            if let Err(err) =
                self.file
                    .read_into(block.payload_offset(), &mut dst, block.payload_len())
            {
                drop(dst);
                if let Err(rm_err) = std::fs::remove_file(dest) {
                    tracing::warn!(
                        dest = %dest.display(),
                        error = %rm_err,
                        "could not delete partial fetch destination"
                    );
                }
                return Err(err);
            }
        }
        drop(dst);

        // The open(2) mode is masked by the umask; restore the exact bits.
        std::fs::set_permissions(dest, std::fs::Permissions::from_mode(entry.mode & 0o7777))?;
        Ok(())
    }

    /// Compact the data region by sliding every block toward the catalog,
    /// eliminating all gaps.
    ///
    /// A failure mid-move is not recoverable in place: the operation
    /// aborts with [`VaultError::PossibleCorruption`] and the catalog is
    /// not committed, though moved data bytes may already disagree with it.
    pub fn defragment(&mut self) -> Result<()> {
        let mut staged = self.catalog.clone();
        let mut cursor = Catalog::data_start();
        for i in 0..staged.blocks.len() {
            let block = staged.blocks[i];
            if block.offset > cursor {
                self.slide_block(&block, cursor).map_err(|err| {
                    VaultError::PossibleCorruption(format!(
                        "defragmentation failed moving block at {}: {}",
                        block.offset, err
                    ))
                })?;
                staged.blocks[i].offset = cursor;
            }
            cursor += block.length;
        }
        staged.touch();
        self.catalog = staged;
        self.dirty = true;
        tracing::debug!(end = cursor, "defragmentation complete");
        Ok(())
    }

    /// Enumerate live files in name order.
    pub fn list(&self) -> Vec<ListEntry> {
        self.catalog
            .files
            .iter()
            .map(|f| ListEntry {
                name: f.name.clone(),
                size: f.size,
                mode: f.mode,
                inserted_at: f.inserted_at,
            })
            .collect()
    }

    /// Compute file count, total block size and fragmentation ratio.
    pub fn status(&self) -> VaultStatus {
        let total_size: u64 = self.catalog.blocks.iter().map(|b| b.length).sum();
        let fragmentation = match (self.catalog.blocks.first(), self.catalog.blocks.last()) {
            (Some(first), Some(last)) => {
                let span = last.end() - first.offset;
                1.0 - total_size as f64 / span as f64
            }
            _ => 0.0,
        };
        VaultStatus {
            file_count: self.catalog.files.len(),
            total_size,
            fragmentation,
        }
    }

    /// Write one block: start marker, payload streamed from `src`, end
    /// marker.
    fn write_block(&mut self, src: &mut File, block: &BlockEntry) -> Result<()> {
        if !marker::holds_payload(block.length) {
            return Err(VaultError::CorruptCatalog(format!(
                "block at {} too small for markers",
                block.offset
            )));
        }
        self.file.write_at(block.offset, &MARKER_START)?;
        self.file
            .write_from(block.payload_offset(), src, block.payload_len())?;
        self.file.write_at(block.end_marker_offset(), &MARKER_END)?;
        Ok(())
    }

    /// Overwrite both markers of a block with the wipe pattern.
    fn wipe_markers(&mut self, block: &BlockEntry) -> Result<()> {
        self.file.write_at(block.offset, &MARKER_WIPE)?;
        self.file.write_at(block.end_marker_offset(), &MARKER_WIPE)?;
        Ok(())
    }

    /// Move one block to `dst` (always toward the catalog). Markers are
    /// wiped first so no scanner can see valid markers at both the old
    /// and new location, then re-stamped once the bytes have moved.
    fn slide_block(&mut self, block: &BlockEntry, dst: u64) -> Result<()> {
        self.wipe_markers(block)?;
        self.file.copy_within(block.offset, dst, block.length)?;
        let moved = BlockEntry {
            offset: dst,
            ..*block
        };
        self.file.write_at(moved.offset, &MARKER_START)?;
        self.file.write_at(moved.end_marker_offset(), &MARKER_END)?;
        Ok(())
    }
}

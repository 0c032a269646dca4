//! Vault catalog: superblock, File-Table and Block-Table
//!
//! The catalog is the single embedded metadata structure of a vault. It
//! lives at offset 0 of the container file as a fixed-width little-endian
//! record of exactly [`CATALOG_SIZE`] bytes, so the data region always
//! starts at the same offset. It is loaded fully into memory on open,
//! mutated by exactly one operation, and flushed back on close only when
//! that operation succeeded.

use crate::error::{Result, VaultError};
use crate::marker;
use serde::Serialize;

pub const MAGIC: [u8; 8] = *b"VLT\x00\x01\x00\x00\x00";
pub const VERSION_MAJOR: u16 = 1;
pub const VERSION_MINOR: u16 = 0;

/// Maximum number of files a vault can hold.
pub const MAX_FILES: usize = 100;

/// Maximum fragments a single file may be split into.
pub const FRAGMENTS_PER_FILE: usize = 3;

/// Block-Table capacity.
pub const MAX_BLOCKS: usize = MAX_FILES * FRAGMENTS_PER_FILE;

/// Maximum stored file name length in bytes.
pub const MAX_NAME_LEN: usize = 255;

const HEADER_SIZE: usize = 8 + 2 + 2 + 8 + 8 + 8 + 2 + 2;
const FILE_SLOT_SIZE: usize = 2 + MAX_NAME_LEN + 8 + 4 + 8 + 2 * FRAGMENTS_PER_FILE;
const BLOCK_SLOT_SIZE: usize = 2 + 2 + 8 + 8;

/// Serialized catalog footprint. The data region starts here.
pub const CATALOG_SIZE: usize =
    HEADER_SIZE + MAX_FILES * FILE_SLOT_SIZE + MAX_BLOCKS * BLOCK_SLOT_SIZE;

/// On-disk sentinel for an unused fragment slot.
const FRAG_UNUSED: u16 = u16::MAX;

/// Current Unix time in whole seconds.
pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// One stored file: name, declared size, host permission bits, insertion
/// time and up to [`FRAGMENTS_PER_FILE`] references into the Block-Table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
    /// Permission bits copied from the origin filesystem; opaque to the vault.
    pub mode: u32,
    /// Insertion timestamp (Unix epoch seconds).
    pub inserted_at: u64,
    /// Fragment slots, in fragment order; `None` slots are unused.
    pub fragments: [Option<u16>; FRAGMENTS_PER_FILE],
}

/// One allocated byte range holding a single fragment of one file.
///
/// `length` includes both boundary markers; the payload region is
/// `[offset + MARKER_LEN, offset + length - MARKER_LEN)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockEntry {
    /// Index of the owning entry in the File-Table.
    pub owner: u16,
    /// Which of the owner's fragments this block backs (0-based).
    pub fragment: u16,
    /// Total byte length, markers included.
    pub length: u64,
    /// Byte offset within the container.
    pub offset: u64,
}

impl BlockEntry {
    /// Offset of the first payload byte.
    pub fn payload_offset(&self) -> u64 {
        self.offset + marker::MARKER_LEN as u64
    }

    /// Payload bytes stored in this block.
    pub fn payload_len(&self) -> u64 {
        marker::payload_len(self.length)
    }

    /// Offset one past the last byte of this block.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }

    /// Offset of the end marker.
    pub fn end_marker_offset(&self) -> u64 {
        self.end() - marker::MARKER_LEN as u64
    }
}

/// In-memory catalog.
///
/// `files` is kept sorted by name (unique names), `blocks` sorted by offset
/// with no two blocks overlapping. Both invariants are maintained by the
/// insert/remove helpers below and relied upon by the allocator and the
/// defragmenter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    pub vault_size: u64,
    pub created_at: u64,
    pub modified_at: u64,
    pub files: Vec<FileEntry>,
    pub blocks: Vec<BlockEntry>,
}

impl Catalog {
    pub fn new(vault_size: u64) -> Self {
        let now = unix_now();
        Catalog {
            vault_size,
            created_at: now,
            modified_at: now,
            files: Vec::new(),
            blocks: Vec::new(),
        }
    }

    /// First byte of the data region.
    pub const fn data_start() -> u64 {
        CATALOG_SIZE as u64
    }

    /// Update the modification timestamp.
    pub fn touch(&mut self) {
        self.modified_at = unix_now();
    }

    /// Look up a live file by name.
    ///
    /// Linear scan; fine at this scale even though the table is sorted.
    pub fn find_file(&self, name: &str) -> Option<usize> {
        self.files.iter().position(|f| f.name == name)
    }

    /// Insert a file entry at its name-sorted position and fix the
    /// owner back-references of blocks belonging to shifted entries.
    ///
    /// Returns the index the entry landed at.
    pub fn insert_file(&mut self, entry: FileEntry) -> usize {
        let idx = self
            .files
            .partition_point(|f| f.name.as_str() < entry.name.as_str());
        self.files.insert(idx, entry);
        for block in &mut self.blocks {
            if usize::from(block.owner) >= idx {
                block.owner += 1;
            }
        }
        idx
    }

    /// Remove the file entry at `idx`, shifting later entries left and
    /// fixing the owner back-references of their blocks.
    ///
    /// The entry's own blocks must already have been removed.
    pub fn remove_file(&mut self, idx: usize) -> FileEntry {
        let entry = self.files.remove(idx);
        for block in &mut self.blocks {
            if usize::from(block.owner) > idx {
                block.owner -= 1;
            }
        }
        entry
    }

    /// Insert a block entry at `idx` (its offset-sorted position) and fix
    /// every fragment reference that pointed at or past `idx`, then wire
    /// up the owner's fragment slot.
    pub fn insert_block(&mut self, idx: usize, entry: BlockEntry) {
        self.blocks.insert(idx, entry);
        for file in &mut self.files {
            for slot in &mut file.fragments {
                if let Some(b) = slot {
                    if usize::from(*b) >= idx {
                        *b += 1;
                    }
                }
            }
        }
        self.files[usize::from(entry.owner)].fragments[usize::from(entry.fragment)] =
            Some(idx as u16);
    }

    /// Remove the block entry at `idx`, clearing the owner's fragment slot
    /// and fixing every fragment reference that pointed past `idx`.
    pub fn remove_block(&mut self, idx: usize) -> BlockEntry {
        let entry = self.blocks.remove(idx);
        self.files[usize::from(entry.owner)].fragments[usize::from(entry.fragment)] = None;
        for file in &mut self.files {
            for slot in &mut file.fragments {
                if let Some(b) = slot {
                    if usize::from(*b) > idx {
                        *b -= 1;
                    }
                }
            }
        }
        entry
    }

    /// Check every structural invariant the rest of the crate relies on.
    pub fn validate(&self) -> Result<()> {
        if self.files.len() > MAX_FILES {
            return Err(VaultError::CorruptCatalog(format!(
                "file count {} exceeds capacity {}",
                self.files.len(),
                MAX_FILES
            )));
        }
        if self.blocks.len() > MAX_BLOCKS {
            return Err(VaultError::CorruptCatalog(format!(
                "block count {} exceeds capacity {}",
                self.blocks.len(),
                MAX_BLOCKS
            )));
        }

        // Names must be storable and must not escape the fetch directory
        for (i, file) in self.files.iter().enumerate() {
            if file.name.is_empty() || file.name.len() > MAX_NAME_LEN {
                return Err(VaultError::CorruptCatalog(format!(
                    "file {} has invalid name length {}",
                    i,
                    file.name.len()
                )));
            }
            if file.name.contains('/') {
                return Err(VaultError::CorruptCatalog(format!(
                    "file name {:?} contains a path separator",
                    file.name
                )));
            }
        }

        // File-Table sorted by name, names unique
        for pair in self.files.windows(2) {
            if pair[0].name >= pair[1].name {
                return Err(VaultError::CorruptCatalog(format!(
                    "file table not sorted: {:?} before {:?}",
                    pair[0].name, pair[1].name
                )));
            }
        }

        // Block-Table sorted by offset, in bounds, no overlap
        let mut prev_end = Self::data_start();
        for (i, block) in self.blocks.iter().enumerate() {
            if !marker::holds_payload(block.length) {
                return Err(VaultError::CorruptCatalog(format!(
                    "block {} too short for markers ({} bytes)",
                    i, block.length
                )));
            }
            if block.offset < prev_end {
                return Err(VaultError::CorruptCatalog(format!(
                    "block {} at {} overlaps previous region ending at {}",
                    i, block.offset, prev_end
                )));
            }
            if block.end() > self.vault_size {
                return Err(VaultError::CorruptCatalog(format!(
                    "block {} ends at {} past vault size {}",
                    i,
                    block.end(),
                    self.vault_size
                )));
            }
            prev_end = block.end();
        }

        // Bidirectional consistency between tables
        for (i, block) in self.blocks.iter().enumerate() {
            let owner = self.files.get(usize::from(block.owner)).ok_or_else(|| {
                VaultError::CorruptCatalog(format!("block {} owned by missing file", i))
            })?;
            let slot = owner
                .fragments
                .get(usize::from(block.fragment))
                .copied()
                .flatten();
            if slot != Some(i as u16) {
                return Err(VaultError::CorruptCatalog(format!(
                    "block {} not referenced back by {}[{}]",
                    i, owner.name, block.fragment
                )));
            }
        }
        for (f, file) in self.files.iter().enumerate() {
            let mut stored = 0u64;
            for (s, slot) in file.fragments.iter().enumerate() {
                if let Some(b) = slot {
                    let block = self.blocks.get(usize::from(*b)).ok_or_else(|| {
                        VaultError::CorruptCatalog(format!(
                            "{}[{}] references missing block {}",
                            file.name, s, b
                        ))
                    })?;
                    if usize::from(block.owner) != f || usize::from(block.fragment) != s {
                        return Err(VaultError::CorruptCatalog(format!(
                            "{}[{}] and block {} disagree on ownership",
                            file.name, s, b
                        )));
                    }
                    stored += block.payload_len();
                }
            }
            if stored != file.size {
                return Err(VaultError::CorruptCatalog(format!(
                    "{} declares {} bytes but fragments hold {}",
                    file.name, file.size, stored
                )));
            }
        }

        Ok(())
    }

    /// Serialize to the fixed-width on-disk record.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(CATALOG_SIZE);

        buf.extend_from_slice(&MAGIC);
        buf.extend_from_slice(&VERSION_MAJOR.to_le_bytes());
        buf.extend_from_slice(&VERSION_MINOR.to_le_bytes());
        buf.extend_from_slice(&self.vault_size.to_le_bytes());
        buf.extend_from_slice(&self.created_at.to_le_bytes());
        buf.extend_from_slice(&self.modified_at.to_le_bytes());
        buf.extend_from_slice(&(self.files.len() as u16).to_le_bytes());
        buf.extend_from_slice(&(self.blocks.len() as u16).to_le_bytes());

        for file in &self.files {
            let name = file.name.as_bytes();
            buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
            buf.extend_from_slice(name);
            buf.resize(buf.len() + MAX_NAME_LEN - name.len(), 0);
            buf.extend_from_slice(&file.size.to_le_bytes());
            buf.extend_from_slice(&file.mode.to_le_bytes());
            buf.extend_from_slice(&file.inserted_at.to_le_bytes());
            for slot in &file.fragments {
                buf.extend_from_slice(&slot.unwrap_or(FRAG_UNUSED).to_le_bytes());
            }
        }

        // The Block-Table starts at a fixed offset; unused File-Table
        // slots in between are zero padding
        buf.resize(HEADER_SIZE + MAX_FILES * FILE_SLOT_SIZE, 0);
        for block in &self.blocks {
            buf.extend_from_slice(&block.owner.to_le_bytes());
            buf.extend_from_slice(&block.fragment.to_le_bytes());
            buf.extend_from_slice(&block.length.to_le_bytes());
            buf.extend_from_slice(&block.offset.to_le_bytes());
        }

        // Unused Block-Table slots are zero padding up to the fixed footprint
        buf.resize(CATALOG_SIZE, 0);
        buf
    }

    /// Deserialize from the fixed-width on-disk record, validating the
    /// result before returning it.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < CATALOG_SIZE {
            return Err(VaultError::TruncatedCatalog);
        }

        let mut pos = 0usize;

        if read_bytes(bytes, &mut pos, 8) != MAGIC {
            return Err(VaultError::InvalidMagic);
        }
        let major = read_u16(bytes, &mut pos);
        let minor = read_u16(bytes, &mut pos);
        if major != VERSION_MAJOR || minor != VERSION_MINOR {
            return Err(VaultError::UnsupportedVersion { major, minor });
        }

        let vault_size = read_u64(bytes, &mut pos);
        let created_at = read_u64(bytes, &mut pos);
        let modified_at = read_u64(bytes, &mut pos);
        let file_count = usize::from(read_u16(bytes, &mut pos));
        let block_count = usize::from(read_u16(bytes, &mut pos));

        if file_count > MAX_FILES || block_count > MAX_BLOCKS {
            return Err(VaultError::CorruptCatalog(format!(
                "impossible table counts: {} files, {} blocks",
                file_count, block_count
            )));
        }

        let mut files = Vec::with_capacity(file_count);
        for _ in 0..file_count {
            let name_len = usize::from(read_u16(bytes, &mut pos));
            if name_len > MAX_NAME_LEN {
                return Err(VaultError::CorruptCatalog(format!(
                    "file name length {} exceeds {}",
                    name_len, MAX_NAME_LEN
                )));
            }
            let raw = read_bytes(bytes, &mut pos, MAX_NAME_LEN);
            let name = String::from_utf8(raw[..name_len].to_vec()).map_err(|_| {
                VaultError::CorruptCatalog("file name is not valid UTF-8".to_string())
            })?;
            let size = read_u64(bytes, &mut pos);
            let mode = read_u32(bytes, &mut pos);
            let inserted_at = read_u64(bytes, &mut pos);
            let mut fragments = [None; FRAGMENTS_PER_FILE];
            for slot in &mut fragments {
                let raw = read_u16(bytes, &mut pos);
                *slot = if raw == FRAG_UNUSED { None } else { Some(raw) };
            }
            files.push(FileEntry {
                name,
                size,
                mode,
                inserted_at,
                fragments,
            });
        }

        // Skip the unused File-Table slots to the fixed Block-Table offset
        pos = HEADER_SIZE + MAX_FILES * FILE_SLOT_SIZE;
        let mut blocks = Vec::with_capacity(block_count);
        for _ in 0..block_count {
            let owner = read_u16(bytes, &mut pos);
            let fragment = read_u16(bytes, &mut pos);
            let length = read_u64(bytes, &mut pos);
            let offset = read_u64(bytes, &mut pos);
            blocks.push(BlockEntry {
                owner,
                fragment,
                length,
                offset,
            });
        }

        let catalog = Catalog {
            vault_size,
            created_at,
            modified_at,
            files,
            blocks,
        };
        catalog.validate()?;
        Ok(catalog)
    }
}

fn read_bytes<'a>(buf: &'a [u8], pos: &mut usize, n: usize) -> &'a [u8] {
    let out = &buf[*pos..*pos + n];
    *pos += n;
    out
}

fn read_u16(buf: &[u8], pos: &mut usize) -> u16 {
    let v = u16::from_le_bytes([buf[*pos], buf[*pos + 1]]);
    *pos += 2;
    v
}

fn read_u32(buf: &[u8], pos: &mut usize) -> u32 {
    let v = u32::from_le_bytes([buf[*pos], buf[*pos + 1], buf[*pos + 2], buf[*pos + 3]]);
    *pos += 4;
    v
}

fn read_u64(buf: &[u8], pos: &mut usize) -> u64 {
    let v = u64::from_le_bytes([
        buf[*pos],
        buf[*pos + 1],
        buf[*pos + 2],
        buf[*pos + 3],
        buf[*pos + 4],
        buf[*pos + 5],
        buf[*pos + 6],
        buf[*pos + 7],
    ]);
    *pos += 8;
    v
}

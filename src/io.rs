//! Container-file I/O for vaults

use crate::catalog::{Catalog, CATALOG_SIZE};
use crate::error::{Result, VaultError};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Chunk size for streamed copies.
pub const COPY_BUF_SIZE: usize = 4096;

/// Disk-backed vault container
pub struct VaultFile {
    file: File,
    path: PathBuf,
}

impl VaultFile {
    /// Create a new container: write the serialized catalog at offset 0
    /// and extend the file to `vault_size` bytes (sparse).
    pub fn create<P: AsRef<Path>>(path: P, catalog: &Catalog) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        file.write_all(&catalog.to_bytes())?;
        file.set_len(catalog.vault_size)?;
        file.flush()?;

        Ok(VaultFile {
            file,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Open an existing container for read/write.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        Ok(VaultFile {
            file,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Read the catalog from offset 0.
    ///
    /// A short read means the file is not a vault.
    pub fn read_catalog(&mut self) -> Result<Catalog> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut buffer = vec![0u8; CATALOG_SIZE];
        self.file.read_exact(&mut buffer).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                VaultError::TruncatedCatalog
            } else {
                VaultError::Io(e)
            }
        })?;
        Catalog::from_bytes(&buffer)
    }

    /// Rewrite the full catalog at offset 0.
    pub fn write_catalog(&mut self, catalog: &Catalog) -> Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&catalog.to_bytes())?;
        self.file.flush()?;
        Ok(())
    }

    /// Read exactly `buf.len()` bytes at `offset`.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    /// Write all of `buf` at `offset`.
    pub fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    /// Copy exactly `len` bytes from `src` into the container at `offset`.
    ///
    /// Fails if either side comes up short; nothing is undone here, the
    /// caller owns rollback.
    pub fn write_from(&mut self, offset: u64, src: &mut File, len: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        copy_exact(src, &mut self.file, len)?;
        Ok(())
    }

    /// Copy exactly `len` bytes from the container at `offset` into `dst`.
    pub fn read_into(&mut self, offset: u64, dst: &mut File, len: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        copy_exact(&mut self.file, dst, len)?;
        Ok(())
    }

    /// Copy `len` bytes from `src_offset` to `dst_offset` within the
    /// container. Safe for overlapping regions as long as the destination
    /// sits below the source, which is the only direction defragmentation
    /// ever moves a block.
    pub fn copy_within(&mut self, src_offset: u64, dst_offset: u64, len: u64) -> Result<()> {
        debug_assert!(dst_offset <= src_offset);
        let mut buffer = [0u8; COPY_BUF_SIZE];
        let mut done = 0u64;
        while done < len {
            let chunk = ((len - done) as usize).min(COPY_BUF_SIZE);
            self.read_at(src_offset + done, &mut buffer[..chunk])?;
            self.write_at(dst_offset + done, &buffer[..chunk])?;
            done += chunk as u64;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sync all writes to disk.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

/// Copy exactly `len` bytes between two streams through a bounded buffer,
/// failing on any short read or write.
fn copy_exact<R: Read, W: Write>(src: &mut R, dst: &mut W, len: u64) -> Result<()> {
    let mut buffer = [0u8; COPY_BUF_SIZE];
    let mut done = 0u64;
    while done < len {
        let chunk = ((len - done) as usize).min(COPY_BUF_SIZE);
        src.read_exact(&mut buffer[..chunk])?;
        dst.write_all(&buffer[..chunk])?;
        done += chunk as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_create_and_read_catalog() {
        let temp = NamedTempFile::new().unwrap();
        let catalog = Catalog::new(Catalog::data_start() + 4096);

        let mut vault_file = VaultFile::create(temp.path(), &catalog).unwrap();
        let read_back = vault_file.read_catalog().unwrap();

        assert_eq!(read_back, catalog);
    }

    #[test]
    fn test_create_extends_to_vault_size() {
        let temp = NamedTempFile::new().unwrap();
        let size = Catalog::data_start() + 8192;
        let catalog = Catalog::new(size);

        VaultFile::create(temp.path(), &catalog).unwrap();
        assert_eq!(std::fs::metadata(temp.path()).unwrap().len(), size);
    }

    #[test]
    fn test_short_file_is_not_a_vault() {
        let temp = NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), b"definitely not a vault").unwrap();

        let mut vault_file = VaultFile::open(temp.path()).unwrap();
        assert!(matches!(
            vault_file.read_catalog(),
            Err(VaultError::TruncatedCatalog)
        ));
    }

    #[test]
    fn test_catalog_rewrite_round_trip() {
        let temp = NamedTempFile::new().unwrap();
        let mut catalog = Catalog::new(Catalog::data_start() + 4096);
        let mut vault_file = VaultFile::create(temp.path(), &catalog).unwrap();

        catalog.touch();
        vault_file.write_catalog(&catalog).unwrap();
        assert_eq!(vault_file.read_catalog().unwrap(), catalog);
    }

    #[test]
    fn test_copy_within_moves_data_left() {
        let temp = NamedTempFile::new().unwrap();
        let catalog = Catalog::new(Catalog::data_start() + 64 * 1024);
        let mut vault_file = VaultFile::create(temp.path(), &catalog).unwrap();

        let start = Catalog::data_start();
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        vault_file.write_at(start + 5000, &payload).unwrap();

        // Overlapping move toward the catalog
        vault_file
            .copy_within(start + 5000, start, payload.len() as u64)
            .unwrap();

        let mut read_back = vec![0u8; payload.len()];
        vault_file.read_at(start, &mut read_back).unwrap();
        assert_eq!(read_back, payload);
    }
}

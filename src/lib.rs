//! # Vault - Single-File Archive Container
//!
//! `vault-rs` stores a set of regular files inside one container file.
//! The container head holds a fixed-size serialized catalog (File-Table
//! and Block-Table); the rest is the data region, where each stored file
//! occupies up to three fragments, every fragment framed by an 8-byte
//! start and end marker:
//!
//! ```text
//! +---------+------------------------------------------------------+
//! | catalog | <<<<<<<< payload >>>>>>>>   gap   <<<<<<<< ... >>>>>>|
//! +---------+------------------------------------------------------+
//! ```
//!
//! Deletion is lazy: removing a file drops its catalog entries and wipes
//! the markers, leaving the payload bytes in place as reusable gap space.
//! Defragmentation slides blocks toward the catalog to coalesce the free
//! space into one tail gap.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vault::{Vault, Result};
//! use std::path::Path;
//!
//! # fn main() -> Result<()> {
//! Vault::init("backup.vlt", 1024 * 1024)?;
//!
//! let mut vault = Vault::open("backup.vlt")?;
//! vault.add(Path::new("report.txt"))?;
//! vault.fetch_into("report.txt", Path::new("report.copy"))?;
//! vault.close()?;
//! # Ok(())
//! # }
//! ```

pub mod allocator;
pub mod catalog;
pub mod error;
pub mod io;
pub mod marker;
pub mod units;
pub mod vault;

pub use catalog::{
    BlockEntry, Catalog, FileEntry, CATALOG_SIZE, FRAGMENTS_PER_FILE, MAX_FILES, MAX_NAME_LEN,
};
pub use error::{Result, VaultError};
pub use io::VaultFile;
pub use units::{format_size, parse_size};
pub use vault::{ListEntry, Vault, VaultStatus};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

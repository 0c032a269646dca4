use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Invalid magic number in catalog")]
    InvalidMagic,

    #[error("Unsupported format version: {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },

    #[error("Container too small to hold a catalog")]
    TruncatedCatalog,

    #[error("Corrupt catalog: {0}")]
    CorruptCatalog(String),

    #[error("Vault size {size} below minimum {min}")]
    VaultTooSmall { size: u64, min: u64 },

    #[error("Maximum number of files exceeded")]
    TableFull,

    #[error("File not in vault: {0}")]
    NotFound(String),

    #[error("File with same name already in vault: {0}")]
    AlreadyExists(String),

    #[error("Could not fit file in vault: {0}")]
    CapacityExceeded(String),

    #[error("Path does not contain a valid file name")]
    InvalidPath,

    #[error("File name too long: {len} bytes (max {max})")]
    NameTooLong { len: usize, max: usize },

    #[error("Invalid size string: {0} (expected integer followed by B, K, M or G)")]
    BadSize(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Possible corruption: {0}")]
    PossibleCorruption(String),
}

pub type Result<T> = std::result::Result<T, VaultError>;

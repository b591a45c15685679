use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("blocksize below the minimum supported block size")]
    InvalidBlockSize,
    #[error("backing file does not hold enough blocks")]
    NoSpaceOnFormat,
    #[error("superblock magic does not match")]
    BadMagic,
    #[error("this process already has a filesystem open")]
    AlreadyOpen,
    #[error("free list exhausted")]
    NoSpace,
    #[error("path component not found")]
    NotFound,
    #[error("directory is not empty")]
    NotEmpty,
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

pub type FsResult<T> = Result<T, FsError>;

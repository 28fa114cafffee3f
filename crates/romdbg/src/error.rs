use std::path::PathBuf;

use thiserror::Error;

/// Session record errors.
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed session record: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no save directory configured")]
    NoSaveDir,
    #[error("image path has no file name: {}", .0.display())]
    InvalidImagePath(PathBuf),
    #[error("cannot checksum {}", .0.display())]
    ChecksumUnavailable(PathBuf),
    #[error("no active image")]
    NoActiveImage,
    #[error(transparent)]
    Store(#[from] romdbg_state::StoreError),
}

pub type Result<T> = std::result::Result<T, PersistError>;

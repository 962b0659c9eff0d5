use reconciler::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegionDbError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("region not found: {0}")]
    RegionNotFound(String),

    #[error("region already exists: {0}")]
    RegionExists(String),

    #[error("region {0} has a non-finite vertex")]
    InvalidOutline(String),

    #[error("failed to encode outline: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to create database directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("database lock poisoned")]
    Poisoned,
}

impl From<RegionDbError> for StoreError {
    fn from(e: RegionDbError) -> Self {
        match e {
            RegionDbError::RegionNotFound(id) => StoreError::RegionNotFound(id),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

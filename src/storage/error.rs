//! Errors raised by the storage registry and its adapters.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("namespace '{0}' is not registered with the storage registry")]
    UnknownNamespace(String),

    #[error("adapter for namespace '{namespace}' failed to read '{path}': {source}")]
    Read {
        namespace: String,
        path: String,
        source: std::io::Error,
    },

    #[error("adapter for namespace '{namespace}' failed to list children of '{path}': {source}")]
    ListChildren {
        namespace: String,
        path: String,
        source: std::io::Error,
    },

    #[error("adapter for namespace '{namespace}' could not stat '{path}': {source}")]
    ModifiedTime {
        namespace: String,
        path: String,
        source: std::io::Error,
    },
}

pub type StorageResult<T> = Result<T, StorageError>;

//! A filesystem-backed `Adapter`, the crate's one concrete storage
//! implementation — good enough to drive the demo CLI and integration tests.
//! Real deployments plug in their own adapter; persistence/storage I/O is an
//! external collaborator.

use super::error::{StorageError, StorageResult};
use super::registry::Adapter;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

pub struct FilesystemAdapter {
    root: PathBuf,
}

impl FilesystemAdapter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Adapter for FilesystemAdapter {
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        tokio::fs::read(self.resolve(path))
            .await
            .map_err(|source| StorageError::Read {
                namespace: "fs".to_string(),
                path: path.to_string(),
                source,
            })
    }

    async fn compute_last_modified_time(&self, path: &str) -> StorageResult<Option<DateTime<Utc>>> {
        let metadata = match tokio::fs::metadata(self.resolve(path)).await {
            Ok(metadata) => metadata,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StorageError::ModifiedTime {
                    namespace: "fs".to_string(),
                    path: path.to_string(),
                    source,
                });
            }
        };
        let modified = metadata
            .modified()
            .map_err(|source| StorageError::ModifiedTime {
                namespace: "fs".to_string(),
                path: path.to_string(),
                source,
            })?;
        Ok(Some(DateTime::<Utc>::from(modified)))
    }

    async fn list_children(&self, path: &str) -> StorageResult<Vec<String>> {
        let mut entries =
            tokio::fs::read_dir(self.resolve(path))
                .await
                .map_err(|source| StorageError::ListChildren {
                    namespace: "fs".to_string(),
                    path: path.to_string(),
                    source,
                })?;

        let mut names = Vec::new();
        loop {
            let entry = entries
                .next_entry()
                .await
                .map_err(|source| StorageError::ListChildren {
                    namespace: "fs".to_string(),
                    path: path.to_string(),
                    source,
                })?;
            match entry {
                Some(entry) => names.push(entry.file_name().to_string_lossy().into_owned()),
                None => break,
            }
        }
        names.sort();
        Ok(names)
    }
}

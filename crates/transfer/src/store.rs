//! Storage capability consumed by the transfer core.

use std::collections::HashMap;

use filesvc_protocol::ProtocolVersion;
use tokio::sync::RwLock;

use crate::TransferFuture;
use crate::constraints::Constraints;

/// Identity of a stored upload, echoed back to the uploader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIdentity {
    pub id: String,
    pub size: u32,
}

/// Read-only descriptor of a stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub id: String,
    pub filename: String,
    pub size: u32,
}

/// Listing of stored files.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileInfoList {
    pub total: u32,
    pub files: Vec<FileInfo>,
}

/// Errors surfaced by a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Backing store for file bytes and descriptors.
///
/// Downloads return the whole object; the core chunks an already
/// materialized buffer rather than reading through the store.
pub trait FileStore: Send + Sync + 'static {
    /// Stores `data` under `filename` and returns the new id.
    fn upload<'a>(
        &'a self,
        filename: &'a str,
        data: Vec<u8>,
    ) -> TransferFuture<'a, Result<String, StoreError>>;

    /// Returns the full contents of `id`.
    fn download<'a>(&'a self, id: &'a str) -> TransferFuture<'a, Result<Vec<u8>, StoreError>>;

    fn delete<'a>(&'a self, id: &'a str) -> TransferFuture<'a, Result<(), StoreError>>;

    fn file_info<'a>(&'a self, id: &'a str) -> TransferFuture<'a, Result<FileInfo, StoreError>>;

    fn list_files(&self) -> TransferFuture<'_, Result<FileInfoList, StoreError>>;
}

/// Limits a server advertises during negotiation, plus the wire convention
/// it expects uploads in.
pub trait Settings: Send + Sync + 'static {
    fn batch_size(&self) -> u32;

    fn max_file_size(&self) -> u32;

    /// Version clients must open uploads with.
    fn protocol_version(&self) -> ProtocolVersion {
        ProtocolVersion::default()
    }

    /// Both limits as [`Constraints`].
    fn constraints(&self) -> Constraints {
        Constraints {
            max_chunk_size: self.batch_size(),
            max_file_size: self.max_file_size(),
        }
    }
}

impl Settings for Constraints {
    fn batch_size(&self) -> u32 {
        self.max_chunk_size
    }

    fn max_file_size(&self) -> u32 {
        self.max_file_size
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

struct StoredFile {
    filename: String,
    data: Vec<u8>,
}

/// In-memory [`FileStore`] keyed by random UUIDs.
#[derive(Default)]
pub struct MemoryStore {
    files: RwLock<HashMap<String, StoredFile>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored files.
    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.read().await.is_empty()
    }
}

fn describe(id: &str, file: &StoredFile) -> FileInfo {
    FileInfo {
        id: id.to_string(),
        filename: file.filename.clone(),
        // Uploads are capped at u32 by the reassembler.
        size: u32::try_from(file.data.len()).unwrap_or(u32::MAX),
    }
}

impl FileStore for MemoryStore {
    fn upload<'a>(
        &'a self,
        filename: &'a str,
        data: Vec<u8>,
    ) -> TransferFuture<'a, Result<String, StoreError>> {
        Box::pin(async move {
            let id = uuid::Uuid::new_v4().to_string();
            let file = StoredFile {
                filename: filename.to_string(),
                data,
            };
            self.files.write().await.insert(id.clone(), file);
            Ok(id)
        })
    }

    fn download<'a>(&'a self, id: &'a str) -> TransferFuture<'a, Result<Vec<u8>, StoreError>> {
        Box::pin(async move {
            self.files
                .read()
                .await
                .get(id)
                .map(|f| f.data.clone())
                .ok_or_else(|| StoreError::NotFound(id.to_string()))
        })
    }

    fn delete<'a>(&'a self, id: &'a str) -> TransferFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            self.files
                .write()
                .await
                .remove(id)
                .map(|_| ())
                .ok_or_else(|| StoreError::NotFound(id.to_string()))
        })
    }

    fn file_info<'a>(&'a self, id: &'a str) -> TransferFuture<'a, Result<FileInfo, StoreError>> {
        Box::pin(async move {
            self.files
                .read()
                .await
                .get(id)
                .map(|f| describe(id, f))
                .ok_or_else(|| StoreError::NotFound(id.to_string()))
        })
    }

    fn list_files(&self) -> TransferFuture<'_, Result<FileInfoList, StoreError>> {
        Box::pin(async move {
            let files = self.files.read().await;
            let mut list: Vec<FileInfo> = files.iter().map(|(id, f)| describe(id, f)).collect();
            list.sort_by(|a, b| a.filename.cmp(&b.filename).then_with(|| a.id.cmp(&b.id)));
            Ok(FileInfoList {
                total: u32::try_from(list.len()).unwrap_or(u32::MAX),
                files: list,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_then_describe() {
        let store = MemoryStore::new();
        let id = store.upload("report.pdf", vec![1, 2, 3]).await.unwrap();

        let info = store.file_info(&id).await.unwrap();
        assert_eq!(info.filename, "report.pdf");
        assert_eq!(info.size, 3);
        assert_eq!(store.download(&id).await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn ids_are_unique() {
        let store = MemoryStore::new();
        let a = store.upload("same.txt", vec![]).await.unwrap();
        let b = store.upload("same.txt", vec![]).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.download("nope").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.delete("nope").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.file_info("nope").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_is_sorted_by_name() {
        let store = MemoryStore::new();
        store.upload("b.txt", vec![0; 2]).await.unwrap();
        store.upload("a.txt", vec![0; 1]).await.unwrap();

        let list = store.list_files().await.unwrap();
        assert_eq!(list.total, 2);
        let names: Vec<_> = list.files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, ["a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn delete_removes() {
        let store = MemoryStore::new();
        let id = store.upload("x", vec![9]).await.unwrap();
        store.delete(&id).await.unwrap();
        assert!(store.is_empty().await);
    }

    #[test]
    fn constraints_are_settings() {
        let c = Constraints::new(512, 2048).unwrap();
        assert_eq!(c.batch_size(), 512);
        assert_eq!(Settings::constraints(&c), c);
    }
}

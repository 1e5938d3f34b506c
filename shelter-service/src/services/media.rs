use async_trait::async_trait;
use service_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;

use crate::services::MediaCache;

/// Chunked persistence of media bytes.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn insert_chunks(&self, blob_id: Uuid, chunks: Vec<Vec<u8>>) -> Result<(), AppError>;

    /// Chunks of `blob_id` in index order; empty when the blob does not exist.
    async fn read_chunks(&self, blob_id: Uuid) -> Result<Vec<Vec<u8>>, AppError>;

    async fn delete_chunks(&self, blob_id: Uuid) -> Result<u64, AppError>;
}

/// Blob storage with the media byte cache in front of reads.
#[derive(Clone)]
pub struct MediaRepository {
    store: Arc<dyn BlobStore>,
    cache: Arc<MediaCache>,
    chunk_size: usize,
}

impl MediaRepository {
    pub fn new(store: Arc<dyn BlobStore>, cache: Arc<MediaCache>, chunk_size: usize) -> Self {
        Self {
            store,
            cache,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn cache(&self) -> &Arc<MediaCache> {
        &self.cache
    }

    pub async fn save_blob(&self, data: &[u8]) -> Result<Uuid, AppError> {
        let blob_id = Uuid::new_v4();
        let chunks: Vec<Vec<u8>> = data.chunks(self.chunk_size).map(<[u8]>::to_vec).collect();
        let chunk_count = chunks.len();

        self.store.insert_chunks(blob_id, chunks).await?;

        tracing::info!(blob_id = %blob_id, size = data.len(), chunk_count, "Blob saved");
        Ok(blob_id)
    }

    pub async fn read_blob(&self, blob_id: Uuid) -> Result<Option<Arc<[u8]>>, AppError> {
        if let Some(bytes) = self.cache.get(&blob_id) {
            return Ok(Some(bytes));
        }

        let chunks = self.store.read_chunks(blob_id).await?;
        if chunks.is_empty() {
            return Ok(None);
        }

        let bytes: Arc<[u8]> = chunks.concat().into();
        self.cache.add(blob_id, Arc::clone(&bytes));
        Ok(Some(bytes))
    }

    /// Delete the blob's chunks and evict it from the cache.
    pub async fn delete_blob(&self, blob_id: Uuid) -> Result<bool, AppError> {
        let deleted = self.store.delete_chunks(blob_id).await?;
        self.cache.delete(&blob_id);

        if deleted == 0 {
            return Ok(false);
        }
        tracing::info!(blob_id = %blob_id, chunks = deleted, "Blob deleted");
        Ok(true)
    }
}

//! Vector store abstraction
//!
//! `VectorStore` covers the handful of collection operations the pipeline
//! needs: inspect, create, upsert, paginated scroll and similarity search.
//! `QdrantVectorStore` talks to a Qdrant server; `MemoryVectorStore` keeps
//! everything in process for tests and dry runs.

mod memory;
mod qdrant;

pub use memory::MemoryVectorStore;
pub use qdrant::QdrantVectorStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{CollectionInfo, PointKey, ScoredPoint, StoredPoint, VectorPoint};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Qdrant error: {0}")]
    Qdrant(#[from] qdrant_client::QdrantError),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Collection already exists: {0}")]
    CollectionExists(String),

    #[error("Vector has {actual} dimensions, collection expects {expected}")]
    InvalidVector { expected: u64, actual: usize },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

/// One page of a scroll.
#[derive(Debug, Clone, Default)]
pub struct ScrollPage {
    pub points: Vec<StoredPoint>,
    /// Cursor for the next page; `None` once the collection is exhausted.
    pub next_offset: Option<PointKey>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Returns `None` when the collection does not exist.
    async fn collection_info(&self, collection: &str) -> Result<Option<CollectionInfo>, StoreError>;

    /// Creates a collection of `dimension`-sized vectors under cosine distance.
    async fn create_collection(&self, collection: &str, dimension: u64) -> Result<(), StoreError>;

    /// Inserts or replaces `points`, waiting until they are persisted.
    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<(), StoreError>;

    /// Reads up to `limit` points starting at `offset`, payload only.
    async fn scroll(
        &self,
        collection: &str,
        limit: u32,
        offset: Option<PointKey>,
    ) -> Result<ScrollPage, StoreError>;

    /// Cosine similarity search, best first, dropping hits below
    /// `score_threshold` when given.
    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPoint>, StoreError>;

    /// Follows scroll cursors until the collection is exhausted.
    async fn scroll_all(&self, collection: &str, page_size: u32) -> Result<Vec<StoredPoint>, StoreError> {
        let mut points = Vec::new();
        let mut offset = None;
        loop {
            let page = self.scroll(collection, page_size, offset).await?;
            tracing::debug!(collection, fetched = page.points.len(), "Scrolled page");
            points.extend(page.points);
            match page.next_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        Ok(points)
    }
}

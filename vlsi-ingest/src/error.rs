use std::path::PathBuf;
use thiserror::Error;
use vlsi_core::{EmbeddingError, StoreError};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Source file not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error(
        "Collection '{collection}' has vector size {existing:?}, embeddings have size {expected}"
    )]
    DimensionMismatch {
        collection: String,
        existing: Option<u64>,
        expected: u64,
    },

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Vector store error: {0}")]
    Store(#[from] StoreError),
}

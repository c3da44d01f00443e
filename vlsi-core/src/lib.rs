pub mod chat;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod graph;
pub mod models;
pub mod vector_store;

pub use chat::{ChatError, ChatModel, ChatSession, OpenAiChatClient, OpenAiChatConfig};
pub use config::VlsiConfig;
pub use embeddings::{EmbeddingBackend, EmbeddingError, OpenAiEmbeddingClient, OpenAiEmbeddingConfig};
pub use error::VlsiError;
pub use graph::{GraphError, GraphStore, Neo4jHttpGraph};
pub use models::{
    ChatMessage, ChatRole, CollectionInfo, PointKey, ScoredPoint, StoredPoint, VectorPoint,
};
pub use vector_store::{MemoryVectorStore, QdrantVectorStore, ScrollPage, StoreError, VectorStore};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VlsiError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Embedding error: {0}")]
    Embedding(#[from] crate::embeddings::EmbeddingError),

    #[error("Chat error: {0}")]
    Chat(#[from] crate::chat::ChatError),

    #[error("Vector store error: {0}")]
    Store(#[from] crate::vector_store::StoreError),

    #[error("Graph error: {0}")]
    Graph(#[from] crate::graph::GraphError),
}

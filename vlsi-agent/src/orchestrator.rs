//! Query orchestration
//!
//! `RagContext` owns every collaborator the query path needs. It is built
//! once at process start and passed around explicitly; tests build it from
//! doubles through [`RagContext::new`].

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use vlsi_core::{
    ChatError, ChatMessage, ChatModel, ChatSession, EmbeddingBackend, EmbeddingError,
    GraphError, GraphStore, Neo4jHttpGraph, OpenAiChatClient, OpenAiChatConfig,
    OpenAiEmbeddingClient, OpenAiEmbeddingConfig, QdrantVectorStore, ScoredPoint, StoreError,
    VectorStore, VlsiConfig, VlsiError,
};

use crate::executor::{ExecutorError, ScriptRunner};
use crate::extract::extract_python_code;
use crate::knowledge::KnowledgeGraphAgent;
use crate::prompts::{execution_followup, query_turn, VLSI_SYSTEM_PROMPT};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Vector store error: {0}")]
    Store(#[from] StoreError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),

    #[error("Execution error: {0}")]
    Executor(#[from] ExecutorError),
}

#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub collection: String,
    pub text_key: String,
    pub use_openroad: bool,
    pub system_prompt: String,
}

impl QueryOptions {
    pub fn from_config(config: &VlsiConfig) -> Self {
        Self {
            collection: config.vector_store.collection.clone(),
            text_key: config.vector_store.text_payload_key.clone(),
            use_openroad: config.executor.use_openroad,
            system_prompt: config
                .chat
                .system_prompt
                .clone()
                .unwrap_or_else(|| VLSI_SYSTEM_PROMPT.to_string()),
        }
    }
}

pub struct RagContext {
    embedder: Arc<dyn EmbeddingBackend>,
    store: Arc<dyn VectorStore>,
    graph: Arc<dyn GraphStore>,
    kg_agent: KnowledgeGraphAgent,
    session: ChatSession,
    runner: ScriptRunner,
    options: QueryOptions,
    /// Extra environment for generated scripts.
    exec_context: HashMap<String, String>,
}

impl RagContext {
    pub fn new(
        embedder: Arc<dyn EmbeddingBackend>,
        store: Arc<dyn VectorStore>,
        graph: Arc<dyn GraphStore>,
        chat: Arc<dyn ChatModel>,
        runner: ScriptRunner,
        options: QueryOptions,
    ) -> Self {
        Self {
            embedder,
            store,
            graph,
            kg_agent: KnowledgeGraphAgent::new(chat.clone()),
            session: ChatSession::new(chat, options.system_prompt.clone()),
            runner,
            options,
            exec_context: HashMap::new(),
        }
    }

    /// Builds the production clients. Fails early on a missing API key or
    /// graph password.
    pub fn from_config(config: &VlsiConfig) -> Result<Self, VlsiError> {
        let embedder = OpenAiEmbeddingClient::new(OpenAiEmbeddingConfig::from_config(config, None))?;
        let chat = OpenAiChatClient::new(OpenAiChatConfig::from_config(config))?;
        let store = QdrantVectorStore::from_config(config)?;
        let graph = Neo4jHttpGraph::from_config(config)?;

        tracing::info!(
            embedding_model = embedder.model(),
            chat_model = chat.name(),
            collection = %config.vector_store.collection,
            "RAG context ready"
        );

        Ok(Self::new(
            Arc::new(embedder),
            Arc::new(store),
            Arc::new(graph),
            Arc::new(chat),
            ScriptRunner::from_config(&config.executor),
            QueryOptions::from_config(config),
        ))
    }

    pub fn with_exec_context(mut self, context: HashMap<String, String>) -> Self {
        self.exec_context = context;
        self
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    /// Top-k similarity search rendered as a JSON list of hits.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: u64,
        similarity_threshold: f32,
    ) -> Result<String, PipelineError> {
        let vector = self.embedder.embed_query(query).await?;
        let hits = self
            .store
            .search(&self.options.collection, vector, top_k, Some(similarity_threshold))
            .await?;
        tracing::info!(hits = hits.len(), top_k, similarity_threshold, "Vector retrieval");
        Ok(render_hits(
            &hits,
            &self.options.collection,
            &self.options.text_key,
            similarity_threshold,
        ))
    }

    /// One-hop edge descriptions for every entity found in `query`.
    pub async fn graph_context(&self, query: &str) -> Result<Vec<String>, PipelineError> {
        let element = self.kg_agent.extract(query).await?;
        let mut lines = Vec::new();
        for id in element.node_ids() {
            let descs = self.graph.neighbors(id).await?;
            tracing::debug!(node = id, edges = descs.len(), "Graph lookup");
            lines.extend(descs);
        }
        Ok(lines)
    }

    /// Retrieval, graph lookup and one chat turn; returns the first reply.
    pub async fn answer_query(
        &mut self,
        query: &str,
        top_k: u64,
        similarity_threshold: f32,
    ) -> Result<String, PipelineError> {
        let retrieved = self.retrieve(query, top_k, similarity_threshold).await?;
        let kg_lines = self.graph_context(query).await?;
        let context = format!("{}\n{}", retrieved, kg_lines.join("\n"));

        let replies = self
            .session
            .step(ChatMessage::user(query_turn(query, &context)))
            .await?;
        let first = replies.into_iter().next().ok_or(ChatError::EmptyResponse)?;
        Ok(first.content)
    }

    /// Answers `query`; when the answer holds a non-empty python block, runs
    /// it and returns the model's reaction to the output instead.
    pub async fn run_query_and_execute(
        &mut self,
        query: &str,
        top_k: u64,
        similarity_threshold: f32,
    ) -> Result<String, PipelineError> {
        let first = self.answer_query(query, top_k, similarity_threshold).await?;

        // An empty block counts as no code.
        let Some(code) = extract_python_code(&first).filter(|c| !c.is_empty()) else {
            return Ok(first);
        };
        tracing::info!("=== Extracted Python code ===\n{}\n=== End code ===", code);

        let context = (!self.exec_context.is_empty()).then_some(&self.exec_context);
        let out = self
            .runner
            .execute(&code, context, self.options.use_openroad)
            .await?;
        tracing::info!("=== Execution output ===\n{}\n=== End output ===", out);

        let replies = self
            .session
            .step(ChatMessage::user(execution_followup(&out)))
            .await?;
        Ok(replies
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

/// Renders search hits as a JSON list. When nothing clears the threshold a
/// single explanatory entry is rendered instead.
pub fn render_hits(
    hits: &[ScoredPoint],
    collection: &str,
    text_key: &str,
    similarity_threshold: f32,
) -> String {
    if hits.is_empty() {
        return json!([{
            "text": format!(
                "No suitable information retrieved from {} with similarity_threshold = {}.",
                collection, similarity_threshold
            )
        }])
        .to_string();
    }
    let entries: Vec<Value> = hits
        .iter()
        .map(|hit| {
            let text = match hit.payload.get(text_key) {
                Some(Value::String(s)) => s.clone(),
                _ => Value::Object(hit.payload.clone()).to_string(),
            };
            json!({
                "similarity score": format!("{}", hit.score),
                "content path": collection,
                "text": text,
            })
        })
        .collect();
    Value::Array(entries).to_string()
}

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

/// Environment variable holding the OpenAI API key unless overridden.
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct VlsiConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub timeout_seconds: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimensions: usize,
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    /// Extra attempts per batch before it is treated as failed.
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-large".to_string(),
            dimensions: 3072,
            batch_size: 20,
            batch_delay_ms: 500,
            max_retries: 0,
            retry_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub url: String,
    pub collection: String,
    pub api_key_env: Option<String>,
    pub timeout_seconds: u64,
    pub upsert_batch_size: usize,
    pub scroll_page_size: u32,
    pub text_payload_key: String,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".to_string(),
            collection: "documents_collection".to_string(),
            api_key_env: None,
            timeout_seconds: 30,
            upsert_batch_size: 100,
            scroll_page_size: 1000,
            text_payload_key: "text".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GraphConfig {
    pub url: String,
    pub database: String,
    pub username: String,
    pub password_env: String,
    pub timeout_seconds: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:7474".to_string(),
            database: "neo4j".to_string(),
            username: "neo4j".to_string(),
            password_env: "NEO4J_PASSWORD".to_string(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChatConfig {
    pub model: String,
    pub temperature: f32,
    pub system_prompt: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            system_prompt: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: u64,
    pub similarity_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 7,
            similarity_threshold: 0.2,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExecutorConfig {
    pub use_openroad: bool,
    pub openroad_bin: String,
    pub python_bin: String,
    pub sentinel: String,
    /// Unset means the child is waited on indefinitely.
    pub timeout_seconds: Option<u64>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            use_openroad: true,
            openroad_bin: "openroad".to_string(),
            python_bin: "python3".to_string(),
            sentinel: "import openroad".to_string(),
            timeout_seconds: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestConfig {
    pub source_path: String,
    pub documents_dir: Option<String>,
    pub document_extension: String,
    pub sample_count: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            source_path: "query_dataset.jsonl".to_string(),
            documents_dir: None,
            document_extension: "md".to_string(),
            sample_count: 5,
        }
    }
}

impl IngestConfig {
    pub fn source_path(&self) -> PathBuf {
        expand_path(&self.source_path)
    }

    pub fn documents_dir(&self) -> Option<PathBuf> {
        self.documents_dir.as_deref().map(expand_path)
    }
}

impl OpenAiConfig {
    /// Reads the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

impl VectorStoreConfig {
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|k| !k.trim().is_empty())
    }
}

impl GraphConfig {
    pub fn password(&self) -> Option<String> {
        std::env::var(&self.password_env).ok()
    }
}

/// Expands `~` and `$VAR` references; falls back to the raw string.
pub fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(raw),
    }
}

impl VlsiConfig {
    /// Loads `path` (TOML, optional) and then `VLSI__SECTION__KEY` overrides.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("VLSI").separator("__"))
            .build()?;
        let config: Self = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding.dimensions == 0 {
            return Err(ConfigError::Message(
                "embedding.dimensions must be > 0".to_string(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::Message(
                "embedding.batch_size must be > 0".to_string(),
            ));
        }
        if self.vector_store.upsert_batch_size == 0 {
            return Err(ConfigError::Message(
                "vector_store.upsert_batch_size must be > 0".to_string(),
            ));
        }
        if self.vector_store.scroll_page_size == 0 {
            return Err(ConfigError::Message(
                "vector_store.scroll_page_size must be > 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retrieval.similarity_threshold) {
            return Err(ConfigError::Message(
                "retrieval.similarity_threshold must be in [0.0, 1.0]".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_toml(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp config");
        file.write_all(contents.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = VlsiConfig::load("/nonexistent/vlsi-rag").expect("defaults");
        assert_eq!(config.embedding.dimensions, 3072);
        assert_eq!(config.embedding.batch_size, 20);
        assert_eq!(config.vector_store.upsert_batch_size, 100);
        assert_eq!(config.vector_store.text_payload_key, "text");
        assert_eq!(config.retrieval.top_k, 7);
        assert!(config.executor.use_openroad);
        assert!(config.executor.timeout_seconds.is_none());
    }

    #[test]
    fn test_partial_file_overrides_only_named_keys() {
        let file = write_toml(
            r#"
            [embedding]
            model = "text-embedding-3-small"
            dimensions = 1536

            [vector_store]
            collection = "or_rag_docs"
            "#,
        );
        let config = VlsiConfig::load(file.path().to_str().unwrap()).expect("load");
        assert_eq!(config.embedding.model, "text-embedding-3-small");
        assert_eq!(config.embedding.dimensions, 1536);
        assert_eq!(config.embedding.batch_size, 20);
        assert_eq!(config.vector_store.collection, "or_rag_docs");
        assert_eq!(config.vector_store.url, "http://localhost:6334");
    }

    #[test]
    fn test_rejects_zero_batch_size() {
        let file = write_toml("[embedding]\nbatch_size = 0\n");
        let err = VlsiConfig::load(file.path().to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_rejects_threshold_out_of_range() {
        let file = write_toml("[retrieval]\nsimilarity_threshold = 1.5\n");
        assert!(VlsiConfig::load(file.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn test_expand_path_keeps_plain_paths() {
        assert_eq!(expand_path("data/x.jsonl"), PathBuf::from("data/x.jsonl"));
    }
}

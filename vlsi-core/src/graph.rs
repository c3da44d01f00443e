//! Knowledge-graph store
//!
//! Neo4j is reached through its HTTP transactional endpoint
//! (`POST {url}/db/{database}/tx/commit`). Queries are parameterized Cypher;
//! node identifiers are never spliced into the query text.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

use crate::config::VlsiConfig;

/// One-hop traversal around a node, outgoing edges first and then incoming.
/// Each row carries a single `desc` column such as `Node a --USES--> b`.
pub const NEIGHBORS_CYPHER: &str = "MATCH (n {id: $id})-[r]->(m) \
RETURN 'Node ' + n.id + ' --' + type(r) + '--> ' + m.id AS desc \
UNION \
MATCH (n {id: $id})<-[r]-(m) \
RETURN 'Node ' + m.id + ' --' + type(r) + '--> ' + n.id AS desc";

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Graph API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Cypher error {code}: {message}")]
    Cypher { code: String, message: String },

    #[error("Missing graph password (env var {0})")]
    MissingPassword(String),
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Runs one Cypher statement and returns its rows keyed by column name.
    async fn query(&self, cypher: &str, params: Value) -> Result<Vec<Map<String, Value>>, GraphError>;

    /// Human-readable descriptions of every edge touching `node_id`, in the
    /// order the store returns them.
    async fn neighbors(&self, node_id: &str) -> Result<Vec<String>, GraphError> {
        let rows = self
            .query(NEIGHBORS_CYPHER, serde_json::json!({ "id": node_id }))
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|mut row| match row.remove("desc") {
                Some(Value::String(s)) => Some(s),
                _ => None,
            })
            .collect())
    }
}

// ============================================================================
// Neo4jHttpGraph
// ============================================================================

#[derive(Serialize)]
struct TxRequest<'a> {
    statements: [Statement<'a>; 1],
}

#[derive(Serialize)]
struct Statement<'a> {
    statement: &'a str,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Debug, Deserialize)]
struct TxResult {
    columns: Vec<String>,
    data: Vec<TxRow>,
}

#[derive(Debug, Deserialize)]
struct TxRow {
    row: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct TxError {
    code: String,
    message: String,
}

#[derive(Debug, Clone)]
pub struct Neo4jHttpGraph {
    client: Client,
    commit_url: String,
    username: String,
    password: String,
}

impl Neo4jHttpGraph {
    pub fn new(
        url: &str,
        database: &str,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GraphError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            commit_url: format!("{}/db/{}/tx/commit", url.trim_end_matches('/'), database),
            username: username.into(),
            password: password.into(),
        })
    }

    /// Builds the client from `[graph]`; the password comes from the
    /// configured environment variable.
    pub fn from_config(config: &VlsiConfig) -> Result<Self, GraphError> {
        let graph = &config.graph;
        let password = graph
            .password()
            .ok_or_else(|| GraphError::MissingPassword(graph.password_env.clone()))?;
        Self::new(
            &graph.url,
            &graph.database,
            graph.username.clone(),
            password,
            Duration::from_secs(graph.timeout_seconds),
        )
    }
}

#[async_trait]
impl GraphStore for Neo4jHttpGraph {
    async fn query(&self, cypher: &str, params: Value) -> Result<Vec<Map<String, Value>>, GraphError> {
        let body = TxRequest {
            statements: [Statement {
                statement: cypher,
                parameters: params,
            }],
        };

        let response = self
            .client
            .post(&self.commit_url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GraphError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let parsed: TxResponse = response.json().await?;
        if let Some(err) = parsed.errors.into_iter().next() {
            tracing::error!(code = %err.code, message = %err.message, "Cypher statement failed");
            return Err(GraphError::Cypher {
                code: err.code,
                message: err.message,
            });
        }

        let mut rows = Vec::new();
        for result in parsed.results {
            for data in result.data {
                let row: Map<String, Value> = result
                    .columns
                    .iter()
                    .cloned()
                    .zip(data.row)
                    .collect();
                rows.push(row);
            }
        }
        tracing::debug!(rows = rows.len(), "Cypher statement returned");
        Ok(rows)
    }
}

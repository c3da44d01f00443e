use serde::{Deserialize, Serialize};
use std::fmt;

/// Point identifier. Points written by this crate are numeric; collections
/// populated by other tools may carry UUIDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointKey {
    Num(u64),
    Uuid(String),
}

impl fmt::Display for PointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointKey::Num(n) => write!(f, "{}", n),
            PointKey::Uuid(u) => f.write_str(u),
        }
    }
}

impl From<u64> for PointKey {
    fn from(n: u64) -> Self {
        PointKey::Num(n)
    }
}

/// A point ready to be upserted.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorPoint {
    pub id: u64,
    pub vector: Vec<f32>,
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl VectorPoint {
    /// Builds a point whose payload holds `text` under `text_key`.
    pub fn with_text(id: u64, vector: Vec<f32>, text_key: &str, text: String) -> Self {
        let mut payload = serde_json::Map::new();
        payload.insert(text_key.to_string(), serde_json::Value::String(text));
        Self {
            id,
            vector,
            payload,
        }
    }
}

/// A point read back by a scroll, without its vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredPoint {
    pub id: PointKey,
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl StoredPoint {
    pub fn text(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }
}

/// A similarity search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredPoint {
    pub id: PointKey,
    pub score: f32,
    pub payload: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub status: String,
    pub points_count: u64,
    pub indexed_vectors_count: u64,
    pub segments_count: u64,
    pub vector_dimension: Option<u64>,
}

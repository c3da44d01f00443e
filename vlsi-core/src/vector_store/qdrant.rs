use async_trait::async_trait;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfigKind;
use qdrant_client::qdrant::{
    CollectionStatus, CreateCollectionBuilder, Distance, ListValue, PointId, PointStruct,
    ScrollPointsBuilder, SearchPointsBuilder, Struct, UpsertPointsBuilder, Value as QdrantValue,
    VectorParamsBuilder, Vectors,
};
use qdrant_client::Qdrant;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;

use super::{ScrollPage, StoreError, VectorStore};
use crate::config::VlsiConfig;
use crate::models::{CollectionInfo, PointKey, ScoredPoint, StoredPoint, VectorPoint};

/// Qdrant-backed store over the gRPC client.
pub struct QdrantVectorStore {
    client: Qdrant,
}

impl QdrantVectorStore {
    pub fn connect(url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, StoreError> {
        let client = Qdrant::from_url(url).api_key(api_key).timeout(timeout).build()?;
        tracing::debug!(url, "Qdrant client ready");
        Ok(Self { client })
    }

    pub fn from_config(config: &VlsiConfig) -> Result<Self, StoreError> {
        let vs = &config.vector_store;
        Self::connect(
            &vs.url,
            vs.api_key(),
            Duration::from_secs(vs.timeout_seconds),
        )
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn collection_info(&self, collection: &str) -> Result<Option<CollectionInfo>, StoreError> {
        if !self.client.collection_exists(collection).await? {
            return Ok(None);
        }
        let response = self.client.collection_info(collection).await?;
        let Some(info) = response.result else {
            return Ok(None);
        };

        let vector_dimension = info
            .config
            .as_ref()
            .and_then(|c| c.params.as_ref())
            .and_then(|p| p.vectors_config.as_ref())
            .and_then(|vc| match &vc.config {
                Some(VectorsConfigKind::Params(params)) => Some(params.size),
                // Named vectors: take the first one.
                Some(VectorsConfigKind::ParamsMap(map)) => map.map.values().next().map(|p| p.size),
                None => None,
            });

        Ok(Some(CollectionInfo {
            name: collection.to_string(),
            status: status_name(info.status()).to_string(),
            points_count: info.points_count.unwrap_or(0),
            indexed_vectors_count: info.indexed_vectors_count.unwrap_or(0),
            segments_count: info.segments_count,
            vector_dimension,
        }))
    }

    async fn create_collection(&self, collection: &str, dimension: u64) -> Result<(), StoreError> {
        self.client
            .create_collection(
                CreateCollectionBuilder::new(collection)
                    .vectors_config(VectorParamsBuilder::new(dimension, Distance::Cosine)),
            )
            .await?;
        tracing::info!(collection, dimension, "Created collection");
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<(), StoreError> {
        let count = points.len();
        let points: Vec<PointStruct> = points.into_iter().map(to_point_struct).collect();
        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await?;
        tracing::debug!(collection, count, "Upserted points");
        Ok(())
    }

    async fn scroll(
        &self,
        collection: &str,
        limit: u32,
        offset: Option<PointKey>,
    ) -> Result<ScrollPage, StoreError> {
        let mut builder = ScrollPointsBuilder::new(collection)
            .limit(limit)
            .with_payload(true)
            .with_vectors(false);
        if let Some(key) = offset {
            builder = builder.offset(to_point_id(key));
        }

        let response = self.client.scroll(builder).await?;
        let points = response
            .result
            .into_iter()
            .filter_map(|p| {
                let id = from_point_id(p.id)?;
                Some(StoredPoint {
                    id,
                    payload: payload_to_json(p.payload),
                })
            })
            .collect();

        Ok(ScrollPage {
            points,
            next_offset: response.next_page_offset.and_then(|id| from_point_id(Some(id))),
        })
    }

    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        let mut builder = SearchPointsBuilder::new(collection, vector, limit).with_payload(true);
        if let Some(threshold) = score_threshold {
            builder = builder.score_threshold(threshold);
        }

        let response = self.client.search_points(builder).await?;
        Ok(response
            .result
            .into_iter()
            .filter_map(|p| {
                let id = from_point_id(p.id)?;
                Some(ScoredPoint {
                    id,
                    score: p.score,
                    payload: payload_to_json(p.payload),
                })
            })
            .collect())
    }
}

fn status_name(status: CollectionStatus) -> &'static str {
    match status {
        CollectionStatus::Green => "green",
        CollectionStatus::Yellow => "yellow",
        CollectionStatus::Red => "red",
        CollectionStatus::Grey => "grey",
        _ => "unknown",
    }
}

fn to_point_struct(point: VectorPoint) -> PointStruct {
    PointStruct {
        id: Some(to_point_id(PointKey::Num(point.id))),
        vectors: Some(Vectors::from(point.vector)),
        payload: point
            .payload
            .into_iter()
            .map(|(k, v)| (k, json_to_qdrant(v)))
            .collect(),
    }
}

fn to_point_id(key: PointKey) -> PointId {
    let options = match key {
        PointKey::Num(n) => PointIdOptions::Num(n),
        PointKey::Uuid(u) => PointIdOptions::Uuid(u),
    };
    PointId {
        point_id_options: Some(options),
    }
}

fn from_point_id(id: Option<PointId>) -> Option<PointKey> {
    match id?.point_id_options? {
        PointIdOptions::Num(n) => Some(PointKey::Num(n)),
        PointIdOptions::Uuid(u) => Some(PointKey::Uuid(u)),
    }
}

fn payload_to_json(payload: HashMap<String, QdrantValue>) -> Map<String, Value> {
    payload
        .into_iter()
        .map(|(k, v)| (k, qdrant_to_json(v)))
        .collect()
}

fn json_to_qdrant(value: Value) -> QdrantValue {
    let kind = match value {
        Value::Null => Kind::NullValue(0),
        Value::Bool(b) => Kind::BoolValue(b),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Kind::IntegerValue(i),
            (None, Some(f)) => Kind::DoubleValue(f),
            (None, None) => Kind::StringValue(n.to_string()),
        },
        Value::String(s) => Kind::StringValue(s),
        Value::Array(items) => Kind::ListValue(ListValue {
            values: items.into_iter().map(json_to_qdrant).collect(),
        }),
        Value::Object(map) => Kind::StructValue(Struct {
            fields: map.into_iter().map(|(k, v)| (k, json_to_qdrant(v))).collect(),
        }),
    };
    QdrantValue { kind: Some(kind) }
}

fn qdrant_to_json(value: QdrantValue) -> Value {
    match value.kind {
        None | Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::Number(i.into()),
        Some(Kind::DoubleValue(f)) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => {
            Value::Array(list.values.into_iter().map(qdrant_to_json).collect())
        }
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .into_iter()
                .map(|(k, v)| (k, qdrant_to_json(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_survives_conversion() {
        let original = json!({
            "text": "{\"query\": \"set die area\"}",
            "id": 12,
            "score": 0.5,
            "tags": ["floorplan", true, null],
            "nested": { "tool": "openroad" }
        });
        let back = qdrant_to_json(json_to_qdrant(original.clone()));
        assert_eq!(back, original);
    }

    #[test]
    fn test_point_ids_convert_both_kinds() {
        assert_eq!(from_point_id(Some(to_point_id(PointKey::Num(7)))), Some(PointKey::Num(7)));
        let uuid = "5c56c793-69f3-4fbf-87e6-c4bf54c28c26".to_string();
        assert_eq!(
            from_point_id(Some(to_point_id(PointKey::Uuid(uuid.clone())))),
            Some(PointKey::Uuid(uuid))
        );
        assert_eq!(from_point_id(None), None);
        assert_eq!(from_point_id(Some(PointId { point_id_options: None })), None);
    }

    #[test]
    fn test_point_struct_carries_text_payload() {
        let point = VectorPoint::with_text(3, vec![0.1, 0.2], "text", "hello".to_string());
        let ps = to_point_struct(point);
        assert_eq!(
            ps.id.and_then(|id| id.point_id_options),
            Some(PointIdOptions::Num(3))
        );
        match ps.payload.get("text").and_then(|v| v.kind.clone()) {
            Some(Kind::StringValue(s)) => assert_eq!(s, "hello"),
            other => panic!("unexpected payload kind: {:?}", other),
        }
    }

    #[test]
    fn test_non_finite_double_becomes_null() {
        let v = QdrantValue {
            kind: Some(Kind::DoubleValue(f64::NAN)),
        };
        assert_eq!(qdrant_to_json(v), Value::Null);
    }

    #[test]
    fn test_status_names() {
        assert_eq!(status_name(CollectionStatus::Green), "green");
        assert_eq!(status_name(CollectionStatus::UnknownCollectionStatus), "unknown");
    }
}

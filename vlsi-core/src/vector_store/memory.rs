//! In-process [`VectorStore`] for tests and dry runs.
//!
//! Points live in a `BTreeMap` per collection so scrolls are ordered by id.
//! Search is brute-force cosine similarity.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::{ScrollPage, StoreError, VectorStore};
use crate::models::{CollectionInfo, PointKey, ScoredPoint, StoredPoint, VectorPoint};

struct Collection {
    dimension: u64,
    points: BTreeMap<u64, VectorPoint>,
}

#[derive(Default)]
pub struct MemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn collection_info(&self, collection: &str) -> Result<Option<CollectionInfo>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).map(|c| CollectionInfo {
            name: collection.to_string(),
            status: "green".to_string(),
            points_count: c.points.len() as u64,
            indexed_vectors_count: c.points.len() as u64,
            segments_count: 1,
            vector_dimension: Some(c.dimension),
        }))
    }

    async fn create_collection(&self, collection: &str, dimension: u64) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(collection) {
            return Err(StoreError::CollectionExists(collection.to_string()));
        }
        collections.insert(
            collection.to_string(),
            Collection {
                dimension,
                points: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

        // Validate the whole batch before touching anything.
        if let Some(bad) = points
            .iter()
            .find(|p| p.vector.len() as u64 != target.dimension)
        {
            return Err(StoreError::InvalidVector {
                expected: target.dimension,
                actual: bad.vector.len(),
            });
        }
        for point in points {
            target.points.insert(point.id, point);
        }
        Ok(())
    }

    async fn scroll(
        &self,
        collection: &str,
        limit: u32,
        offset: Option<PointKey>,
    ) -> Result<ScrollPage, StoreError> {
        let collections = self.collections.read().await;
        let source = collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

        let start = match offset {
            None => 0,
            Some(PointKey::Num(n)) => n,
            Some(PointKey::Uuid(u)) => {
                return Err(StoreError::InvalidPayload(format!(
                    "memory store has numeric ids only, got offset {}",
                    u
                )))
            }
        };

        let mut iter = source.points.range(start..);
        let points: Vec<StoredPoint> = iter
            .by_ref()
            .take(limit as usize)
            .map(|(id, p)| StoredPoint {
                id: PointKey::Num(*id),
                payload: p.payload.clone(),
            })
            .collect();
        let next_offset = iter.next().map(|(id, _)| PointKey::Num(*id));

        Ok(ScrollPage {
            points,
            next_offset,
        })
    }

    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        let collections = self.collections.read().await;
        let source = collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

        let mut hits: Vec<ScoredPoint> = source
            .points
            .values()
            .map(|p| ScoredPoint {
                id: PointKey::Num(p.id),
                score: cosine_sim(&vector, &p.vector),
                payload: p.payload.clone(),
            })
            .filter(|hit| score_threshold.map_or(true, |t| hit.score >= t))
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(limit as usize);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: u64, vector: Vec<f32>) -> VectorPoint {
        VectorPoint::with_text(id, vector, "text", format!("entry {}", id))
    }

    #[tokio::test]
    async fn test_missing_collection_has_no_info() {
        let store = MemoryVectorStore::new();
        assert!(store.collection_info("docs").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_then_upsert_counts_points() {
        let store = MemoryVectorStore::new();
        store.create_collection("docs", 2).await.unwrap();
        store
            .upsert("docs", vec![point(1, vec![1.0, 0.0]), point(2, vec![0.0, 1.0])])
            .await
            .unwrap();

        let info = store.collection_info("docs").await.unwrap().unwrap();
        assert_eq!(info.points_count, 2);
        assert_eq!(info.vector_dimension, Some(2));
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let store = MemoryVectorStore::new();
        store.create_collection("docs", 2).await.unwrap();
        assert!(matches!(
            store.create_collection("docs", 2).await,
            Err(StoreError::CollectionExists(_))
        ));
    }

    #[tokio::test]
    async fn test_upsert_rejects_wrong_dimension() {
        let store = MemoryVectorStore::new();
        store.create_collection("docs", 3).await.unwrap();
        let err = store
            .upsert("docs", vec![point(1, vec![1.0, 0.0, 0.0]), point(2, vec![1.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidVector { expected: 3, actual: 1 }));
        // Nothing from the rejected batch was written.
        let info = store.collection_info("docs").await.unwrap().unwrap();
        assert_eq!(info.points_count, 0);
    }

    #[tokio::test]
    async fn test_scroll_all_crosses_pages() {
        let store = MemoryVectorStore::new();
        store.create_collection("docs", 1).await.unwrap();
        let points: Vec<VectorPoint> = (1..=7).map(|i| point(i, vec![1.0])).collect();
        store.upsert("docs", points).await.unwrap();

        let first = store.scroll("docs", 3, None).await.unwrap();
        assert_eq!(first.points.len(), 3);
        assert_eq!(first.next_offset, Some(PointKey::Num(4)));

        let all = store.scroll_all("docs", 3).await.unwrap();
        assert_eq!(all.len(), 7);
        assert_eq!(all[6].text("text"), Some("entry 7"));
    }

    #[tokio::test]
    async fn test_search_orders_and_thresholds() {
        let store = MemoryVectorStore::new();
        store.create_collection("docs", 2).await.unwrap();
        store
            .upsert(
                "docs",
                vec![
                    point(1, vec![1.0, 0.0]),
                    point(2, vec![0.7, 0.7]),
                    point(3, vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let hits = store.search("docs", vec![1.0, 0.1], 3, Some(0.2)).await.unwrap();
        let ids: Vec<PointKey> = hits.iter().map(|h| h.id.clone()).collect();
        assert_eq!(ids, vec![PointKey::Num(1), PointKey::Num(2)]);
        assert!(hits[0].score > hits[1].score);

        let top1 = store.search("docs", vec![0.0, 1.0], 1, None).await.unwrap();
        assert_eq!(top1[0].id, PointKey::Num(3));
    }
}

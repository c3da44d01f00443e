//! Ingestion batcher
//!
//! Embeds serialized records in fixed-size batches and upserts them into a
//! collection. A failed embedding batch becomes zero vectors for each of its
//! items; those items are counted and left out of the store. A failed upsert
//! batch is logged and the run continues with the next one.

use std::time::Duration;
use vlsi_core::{EmbeddingBackend, VectorPoint, VectorStore, VlsiConfig};

use crate::error::IngestError;

/// What `ensure_collection` found or did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionSetup {
    Existing { points_count: u64 },
    Created,
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub collection: String,
    pub embed_batch_size: usize,
    pub batch_delay: Duration,
    pub upsert_batch_size: usize,
    pub text_key: String,
}

impl IngestOptions {
    pub fn from_config(config: &VlsiConfig) -> Self {
        Self {
            collection: config.vector_store.collection.clone(),
            embed_batch_size: config.embedding.batch_size,
            batch_delay: Duration::from_millis(config.embedding.batch_delay_ms),
            upsert_batch_size: config.vector_store.upsert_batch_size,
            text_key: config.vector_store.text_payload_key.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Records handed to the run.
    pub parsed: usize,
    /// Embedding batches that failed and were zero-filled.
    pub failed_batches: usize,
    /// Records left out because their embedding failed.
    pub skipped_zero: usize,
    /// Records confirmed written.
    pub upserted: usize,
    /// Records in upsert batches the store rejected.
    pub failed_upserts: usize,
    /// Collection point count read back after the run.
    pub final_point_count: Option<u64>,
}

impl IngestReport {
    /// Records parsed but not stored, whatever the reason.
    pub fn missing(&self) -> usize {
        self.parsed - self.upserted
    }
}

/// Verifies an existing collection's vector size, or creates the collection.
/// A size mismatch aborts without touching the store.
pub async fn ensure_collection(
    store: &dyn VectorStore,
    collection: &str,
    dimension: u64,
) -> Result<CollectionSetup, IngestError> {
    match store.collection_info(collection).await? {
        Some(info) => {
            if info.vector_dimension != Some(dimension) {
                tracing::error!(
                    collection,
                    existing = ?info.vector_dimension,
                    expected = dimension,
                    "Existing collection has a different vector size"
                );
                return Err(IngestError::DimensionMismatch {
                    collection: collection.to_string(),
                    existing: info.vector_dimension,
                    expected: dimension,
                });
            }
            tracing::info!(collection, points = info.points_count, "Found existing collection");
            Ok(CollectionSetup::Existing {
                points_count: info.points_count,
            })
        }
        None => {
            store.create_collection(collection, dimension).await?;
            Ok(CollectionSetup::Created)
        }
    }
}

pub fn is_zero_vector(v: &[f32]) -> bool {
    v.iter().all(|x| *x == 0.0)
}

/// Embeds `texts` batch by batch, one provider call per batch, sleeping
/// `delay` between batches. Returns one vector per text plus the number of
/// failed batches. A reply with the wrong vector count or size counts as a
/// failed batch.
pub async fn embed_in_batches(
    embedder: &dyn EmbeddingBackend,
    texts: &[String],
    batch_size: usize,
    delay: Duration,
) -> (Vec<Vec<f32>>, usize) {
    let dims = embedder.dimensions();
    let mut vectors = Vec::with_capacity(texts.len());
    let mut failed = 0;
    let batch_count = texts.len().div_ceil(batch_size.max(1));

    for (i, batch) in texts.chunks(batch_size.max(1)).enumerate() {
        tracing::info!(batch = i + 1, of = batch_count, items = batch.len(), "Embedding batch");
        match embedder.embed_batch(batch).await {
            Ok(batch_vectors)
                if batch_vectors.len() == batch.len()
                    && batch_vectors.iter().all(|v| v.len() == dims) =>
            {
                vectors.extend(batch_vectors)
            }
            Ok(batch_vectors) => {
                tracing::warn!(
                    batch = i + 1,
                    start = i * batch_size,
                    expected = batch.len(),
                    returned = batch_vectors.len(),
                    dims,
                    "Embedding batch has the wrong shape, substituting zero vectors"
                );
                failed += 1;
                vectors.extend(std::iter::repeat(vec![0.0; dims]).take(batch.len()));
            }
            Err(e) => {
                tracing::warn!(
                    batch = i + 1,
                    start = i * batch_size,
                    error = %e,
                    "Embedding batch failed, substituting zero vectors"
                );
                failed += 1;
                vectors.extend(std::iter::repeat(vec![0.0; dims]).take(batch.len()));
            }
        }
        if i + 1 < batch_count && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    (vectors, failed)
}

/// Drives one ingestion run against a store and an embedder.
pub struct Ingestor<'a> {
    embedder: &'a dyn EmbeddingBackend,
    store: &'a dyn VectorStore,
    options: IngestOptions,
}

impl<'a> Ingestor<'a> {
    pub fn new(
        embedder: &'a dyn EmbeddingBackend,
        store: &'a dyn VectorStore,
        options: IngestOptions,
    ) -> Self {
        Self {
            embedder,
            store,
            options,
        }
    }

    /// Ingests serialized records. Ids are 1-based positions in `texts`.
    pub async fn run(&self, texts: Vec<String>) -> Result<IngestReport, IngestError> {
        let mut report = IngestReport {
            parsed: texts.len(),
            ..Default::default()
        };
        if texts.is_empty() {
            tracing::warn!("No records to ingest");
            return Ok(report);
        }

        let collection = self.options.collection.as_str();
        ensure_collection(self.store, collection, self.embedder.dimensions() as u64).await?;

        tracing::info!(
            items = texts.len(),
            backend = self.embedder.name(),
            "Embedding records"
        );
        let (vectors, failed_batches) = embed_in_batches(
            self.embedder,
            &texts,
            self.options.embed_batch_size,
            self.options.batch_delay,
        )
        .await;
        report.failed_batches = failed_batches;

        let mut pending: Vec<VectorPoint> = Vec::with_capacity(self.options.upsert_batch_size);
        for (i, (text, vector)) in texts.into_iter().zip(vectors).enumerate() {
            if is_zero_vector(&vector) {
                tracing::warn!(item = i, "Skipping item due to embedding failure");
                report.skipped_zero += 1;
                continue;
            }
            pending.push(VectorPoint::with_text(
                (i + 1) as u64,
                vector,
                &self.options.text_key,
                text,
            ));
            if pending.len() >= self.options.upsert_batch_size {
                self.flush(&mut pending, &mut report).await;
            }
        }
        if !pending.is_empty() {
            self.flush(&mut pending, &mut report).await;
        }

        report.final_point_count = match self.store.collection_info(collection).await {
            Ok(info) => info.map(|i| i.points_count),
            Err(e) => {
                tracing::warn!(error = %e, "Could not read collection info after ingestion");
                None
            }
        };

        tracing::info!(
            upserted = report.upserted,
            parsed = report.parsed,
            skipped = report.skipped_zero,
            failed_upserts = report.failed_upserts,
            "Ingestion complete"
        );
        if report.missing() > 0 {
            tracing::warn!(
                missing = report.missing(),
                "Not every parsed record was stored"
            );
        }
        Ok(report)
    }

    async fn flush(&self, pending: &mut Vec<VectorPoint>, report: &mut IngestReport) {
        let batch = std::mem::take(pending);
        let count = batch.len();
        match self.store.upsert(&self.options.collection, batch).await {
            Ok(()) => {
                report.upserted += count;
                tracing::info!(
                    processed = report.upserted,
                    total = report.parsed,
                    "Upserted batch"
                );
            }
            Err(e) => {
                report.failed_upserts += count;
                tracing::error!(count, error = %e, "Upsert batch failed");
            }
        }
    }
}

use async_trait::async_trait;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use vlsi_core::{EmbeddingBackend, EmbeddingError, MemoryVectorStore, VectorStore};
use vlsi_ingest::{load_records, IngestOptions, Ingestor, Verifier, VerifyOptions};

struct CountingBackend {
    dims: usize,
    batches: AtomicUsize,
}

#[async_trait]
impl EmbeddingBackend for CountingBackend {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0; self.dims];
                v[t.len() % self.dims] = 1.0;
                v
            })
            .collect())
    }
    fn dimensions(&self) -> usize {
        self.dims
    }
    fn name(&self) -> &str {
        "counting"
    }
}

fn source_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp source");
    writeln!(file, r#"{{"query":"How do I set the die area?","code":"floorplan.init()"}}"#).unwrap();
    writeln!(file, r#"{{"query":"Run global placement","code":"gpl.run()"}}"#).unwrap();
    writeln!(file, r#"{{"query":"broken", "#).unwrap();
    writeln!(file, r#"{{"query":"Report worst slack","code":"sta.report_wns()"}}"#).unwrap();
    file
}

#[tokio::test]
async fn test_three_valid_one_malformed_end_to_end() {
    let file = source_file();
    let loaded = load_records(file.path()).expect("load");
    assert_eq!(loaded.records.len(), 3);
    assert_eq!(loaded.malformed, 1);

    let backend = CountingBackend {
        dims: 8,
        batches: AtomicUsize::new(0),
    };
    let store = MemoryVectorStore::new();
    let options = IngestOptions {
        collection: "documents_collection".to_string(),
        embed_batch_size: 20,
        batch_delay: Duration::from_millis(500),
        upsert_batch_size: 100,
        text_key: "text".to_string(),
    };

    let report = Ingestor::new(&backend, &store, options)
        .run(loaded.texts())
        .await
        .expect("ingest");

    assert_eq!(backend.batches.load(Ordering::SeqCst), 1);
    assert_eq!(report.parsed, 3);
    assert_eq!(report.upserted, 3);
    assert_eq!(report.skipped_zero, 0);
    assert_eq!(report.final_point_count, Some(3));

    let info = store
        .collection_info("documents_collection")
        .await
        .unwrap()
        .expect("collection created");
    assert_eq!(info.points_count, 3);
    assert_eq!(info.vector_dimension, Some(8));
}

#[tokio::test]
async fn test_ingested_collection_verifies_against_its_source() {
    let file = source_file();
    let loaded = load_records(file.path()).expect("load");

    let backend = CountingBackend {
        dims: 8,
        batches: AtomicUsize::new(0),
    };
    let store = MemoryVectorStore::new();
    let options = IngestOptions {
        collection: "docs".to_string(),
        embed_batch_size: 2,
        batch_delay: Duration::ZERO,
        upsert_batch_size: 2,
        text_key: "text".to_string(),
    };
    Ingestor::new(&backend, &store, options)
        .run(loaded.texts())
        .await
        .expect("ingest");
    assert_eq!(backend.batches.load(Ordering::SeqCst), 2);

    let verify = VerifyOptions {
        collection: "docs".to_string(),
        text_key: "text".to_string(),
        page_size: 1,
        document_extension: "md".to_string(),
        sample_count: 5,
    };
    let report = Verifier::new(&store, verify)
        .run(file.path(), None)
        .await
        .expect("verify");

    // The malformed line was never stored, so it is the only difference.
    assert_eq!(report.source_entries, 4);
    assert_eq!(report.points_count, 3);
    assert_eq!(report.reconciliation.missing_in_store.len(), 1);
    assert!(report
        .reconciliation
        .missing_in_store
        .iter()
        .all(|l| l.starts_with(r#"{"query":"broken""#)));
    assert!(report.reconciliation.extra_in_store.is_empty());
}

#[tokio::test]
async fn test_spaced_separator_source_verifies_clean_after_ingest() {
    // Written the way Python's json.dumps lays records out by default.
    let mut file = tempfile::NamedTempFile::new().expect("temp source");
    writeln!(file, r#"{{"query": "set die area", "code": "x"}}"#).unwrap();
    writeln!(file, r#"  {{"query": "run gpl", "code": "gpl.run()"}}  "#).unwrap();
    let loaded = load_records(file.path()).expect("load");

    let backend = CountingBackend {
        dims: 4,
        batches: AtomicUsize::new(0),
    };
    let store = MemoryVectorStore::new();
    let options = IngestOptions {
        collection: "docs".to_string(),
        embed_batch_size: 20,
        batch_delay: Duration::ZERO,
        upsert_batch_size: 100,
        text_key: "text".to_string(),
    };
    let ingest = Ingestor::new(&backend, &store, options)
        .run(loaded.texts())
        .await
        .expect("ingest");
    assert_eq!(ingest.upserted, 2);

    let verify = VerifyOptions {
        collection: "docs".to_string(),
        text_key: "text".to_string(),
        page_size: 10,
        document_extension: "md".to_string(),
        sample_count: 5,
    };
    let report = Verifier::new(&store, verify)
        .run(file.path(), None)
        .await
        .expect("verify");

    assert_eq!(report.source_entries, 2);
    assert_eq!(report.stored_texts, 2);
    assert!(report.reconciliation.is_clean(), "{:?}", report.reconciliation);
}

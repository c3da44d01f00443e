//! JSONL ingestion into the vector store and read-side reconciliation.

pub mod batcher;
pub mod error;
pub mod jsonl;
pub mod verify;

pub use batcher::{ensure_collection, CollectionSetup, IngestOptions, IngestReport, Ingestor};
pub use error::IngestError;
pub use jsonl::{load_records, LoadedRecords};
pub use verify::{reconcile, Reconciliation, Verifier, VerifyOptions, VerifyReport};

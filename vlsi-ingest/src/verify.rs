//! Consistency checker
//!
//! Read-only reconciliation between a JSONL source, a directory of source
//! documents and the text payloads of a collection. Entries are compared as
//! sets, so duplicate lines or duplicate payloads collapse to one.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;
use vlsi_core::{VectorStore, VlsiConfig};

use crate::error::IngestError;
use crate::jsonl::preview;

const PREVIEW_CHARS: usize = 100;

/// Set differences between source entries and stored texts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// In the source, absent from the store.
    pub missing_in_store: BTreeSet<String>,
    /// In the store, absent from the source.
    pub extra_in_store: BTreeSet<String>,
}

impl Reconciliation {
    pub fn is_clean(&self) -> bool {
        self.missing_in_store.is_empty() && self.extra_in_store.is_empty()
    }
}

pub fn reconcile(source: &BTreeSet<String>, stored: &BTreeSet<String>) -> Reconciliation {
    Reconciliation {
        missing_in_store: source.difference(stored).cloned().collect(),
        extra_in_store: stored.difference(source).cloned().collect(),
    }
}

/// Distinct trimmed, non-blank lines of the source file.
pub fn read_source_lines(path: &Path) -> Result<BTreeSet<String>, IngestError> {
    if !path.exists() {
        return Err(IngestError::SourceNotFound(path.to_path_buf()));
    }
    let content = fs::read_to_string(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let lines: BTreeSet<String> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();
    tracing::info!(path = %path.display(), unique = lines.len(), "Read source lines");
    Ok(lines)
}

/// Counts regular files directly inside `dir` whose extension matches
/// `extension`, ignoring case. Subdirectories are not entered.
pub fn count_documents(dir: &Path, extension: &str) -> Result<usize, IngestError> {
    if !dir.exists() {
        return Err(IngestError::SourceNotFound(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(IngestError::NotADirectory(dir.to_path_buf()));
    }
    let io_err = |source| IngestError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut count = 0;
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(extension));
        if matches && path.is_file() {
            count += 1;
        }
    }
    Ok(count)
}

/// Text payloads of a whole collection.
#[derive(Debug, Clone, Default)]
pub struct StoredTexts {
    pub texts: BTreeSet<String>,
    pub points_count: u64,
    /// Points without a string under the text key.
    pub without_text: usize,
}

#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub document_count: Option<usize>,
    pub source_entries: usize,
    pub stored_texts: usize,
    pub points_count: u64,
    pub reconciliation: Reconciliation,
    pub sample_count: usize,
}

fn write_examples(
    f: &mut fmt::Formatter<'_>,
    entries: &BTreeSet<String>,
    label: &str,
    limit: usize,
) -> fmt::Result {
    for (i, text) in entries.iter().take(limit).enumerate() {
        writeln!(f, "  Example {} ({}): {}", i + 1, label, preview(text, PREVIEW_CHARS))?;
    }
    Ok(())
}

impl fmt::Display for VerifyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let both_present = self.source_entries > 0
            && self.points_count > 0
            && self.source_entries == self.stored_texts;

        if self.points_count == 0 && self.source_entries > 0 {
            writeln!(
                f,
                "WARNING: the collection is empty but the source file has data; ingestion failed or was not run."
            )?;
        }

        writeln!(f, "--- Comparison Results ---")?;
        if let Some(count) = self.document_count {
            writeln!(f, "Number of source document files: {}", count)?;
        }
        writeln!(f, "Number of unique entries in source file: {}", self.source_entries)?;
        writeln!(f, "Number of unique text payloads in collection: {}", self.stored_texts)?;
        writeln!(f, "Total points reported by collection info: {}", self.points_count)?;

        if self.points_count > 0 && self.source_entries as u64 != self.points_count {
            writeln!(
                f,
                "Note: the number of source entries and collection points differ."
            )?;
        }

        let missing = &self.reconciliation.missing_in_store;
        if !missing.is_empty() {
            writeln!(
                f,
                "\nFound {} entries from the source file that are MISSING in the collection:",
                missing.len()
            )?;
            write_examples(f, missing, "source", self.sample_count)?;
        } else if both_present {
            writeln!(f, "\nAll unique source entries are present in the collection.")?;
        }

        let extra = &self.reconciliation.extra_in_store;
        if !extra.is_empty() {
            writeln!(
                f,
                "\nFound {} text payloads in the collection that are NOT in the source file:",
                extra.len()
            )?;
            write_examples(f, extra, "collection", self.sample_count)?;
        } else if both_present {
            writeln!(f, "No unexpected extra text payloads in the collection.")?;
        }

        if self.source_entries == 0 && self.points_count == 0 {
            writeln!(f, "\nBoth the source file and the collection are empty.")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct VerifyOptions {
    pub collection: String,
    pub text_key: String,
    pub page_size: u32,
    pub document_extension: String,
    pub sample_count: usize,
}

impl VerifyOptions {
    pub fn from_config(config: &VlsiConfig) -> Self {
        Self {
            collection: config.vector_store.collection.clone(),
            text_key: config.vector_store.text_payload_key.clone(),
            page_size: config.vector_store.scroll_page_size,
            document_extension: config.ingest.document_extension.clone(),
            sample_count: config.ingest.sample_count,
        }
    }
}

pub struct Verifier<'a> {
    store: &'a dyn VectorStore,
    options: VerifyOptions,
}

impl<'a> Verifier<'a> {
    pub fn new(store: &'a dyn VectorStore, options: VerifyOptions) -> Self {
        Self { store, options }
    }

    /// Scrolls the whole collection and collects its text payloads.
    pub async fn stored_texts(&self) -> Result<StoredTexts, IngestError> {
        let collection = self.options.collection.as_str();
        let info = self
            .store
            .collection_info(collection)
            .await?
            .ok_or_else(|| IngestError::CollectionNotFound(collection.to_string()))?;

        let mut stored = StoredTexts {
            points_count: info.points_count,
            ..Default::default()
        };
        if info.points_count == 0 {
            return Ok(stored);
        }

        for point in self.store.scroll_all(collection, self.options.page_size).await? {
            match point.text(&self.options.text_key) {
                Some(text) => {
                    stored.texts.insert(text.to_string());
                }
                None => {
                    tracing::warn!(
                        id = %point.id,
                        key = %self.options.text_key,
                        "Point has no text payload"
                    );
                    stored.without_text += 1;
                }
            }
        }
        Ok(stored)
    }

    pub async fn run(
        &self,
        source_path: &Path,
        documents_dir: Option<&Path>,
    ) -> Result<VerifyReport, IngestError> {
        let document_count = documents_dir.and_then(|dir| {
            match count_documents(dir, &self.options.document_extension) {
                Ok(count) => Some(count),
                Err(e) => {
                    tracing::warn!(error = %e, "Could not count source documents");
                    None
                }
            }
        });

        let source = read_source_lines(source_path)?;
        let stored = self.stored_texts().await?;
        let reconciliation = reconcile(&source, &stored.texts);

        tracing::info!(
            source = source.len(),
            stored = stored.texts.len(),
            missing = reconciliation.missing_in_store.len(),
            extra = reconciliation.extra_in_store.len(),
            "Reconciliation complete"
        );

        Ok(VerifyReport {
            document_count,
            source_entries: source.len(),
            stored_texts: stored.texts.len(),
            points_count: stored.points_count,
            reconciliation,
            sample_count: self.options.sample_count,
        })
    }
}

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::embedding_service::Embedder;
use crate::error::{with_timeout, RagError, Result};
use crate::models::*;
use crate::vector_store::VectorStore;

/// Turns uploaded PDFs into per-page vector store entries.
pub struct DocumentProcessor {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    call_timeout: Duration,
}

impl DocumentProcessor {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            store,
            call_timeout,
        }
    }

    /// Extract, embed and store every page of the PDF at `file_path` under
    /// `doc_name`. Returns the number of pages stored.
    ///
    /// Extraction finishes before the first store write, so an unreadable file
    /// leaves the store untouched. A failure while storing leaves the pages
    /// already written in place.
    pub async fn ingest(&self, file_path: &Path, doc_name: &str) -> Result<usize> {
        log::info!("Processing PDF: {}", doc_name);

        let pages = self.extract_pages(file_path).await?;
        if pages.is_empty() {
            return Err(RagError::InvalidDocument(format!(
                "{} contains no pages",
                doc_name
            )));
        }

        let records = self.embed_pages(doc_name, pages).await?;
        self.store(records).await
    }

    /// Reads the PDF at `file_path` into pages numbered 1..=N in physical order.
    pub async fn extract_pages(&self, file_path: &Path) -> Result<Vec<Page>> {
        let file_path = file_path.to_path_buf();
        let texts = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_by_pages(&file_path)
        })
        .await
        .map_err(|e| RagError::InvalidDocument(format!("PDF parser aborted: {}", e)))?
        .map_err(|e| RagError::InvalidDocument(e.to_string()))?;

        Ok(number_pages(texts))
    }

    /// Same as [`extract_pages`](Self::extract_pages) for a document already in memory.
    pub async fn extract_pages_from_bytes(&self, bytes: Vec<u8>) -> Result<Vec<Page>> {
        let texts = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem_by_pages(&bytes)
        })
        .await
        .map_err(|e| RagError::InvalidDocument(format!("PDF parser aborted: {}", e)))?
        .map_err(|e| RagError::InvalidDocument(e.to_string()))?;

        Ok(number_pages(texts))
    }

    /// Attaches an embedding to every page, empty pages included.
    pub async fn embed_pages(&self, doc_name: &str, pages: Vec<Page>) -> Result<Vec<PageRecord>> {
        let texts: Vec<String> = pages.iter().map(|p| p.text.clone()).collect();
        let embeddings = with_timeout(
            "embedding",
            self.call_timeout,
            self.embedder.embed_batch(&texts),
        )
        .await?;

        if embeddings.len() != pages.len() {
            return Err(RagError::Embedding(format!(
                "expected {} embeddings, got {}",
                pages.len(),
                embeddings.len()
            )));
        }

        log::info!("Generated embeddings for document: {}", doc_name);
        Ok(pages
            .into_iter()
            .zip(embeddings)
            .map(|(page, embedding)| PageRecord {
                doc_name: doc_name.to_string(),
                page_number: page.page_number,
                text: page.text,
                embedding,
            })
            .collect())
    }

    /// Upserts each record as `{doc_name}_page_{n}`, one page at a time.
    pub async fn store(&self, records: Vec<PageRecord>) -> Result<usize> {
        let total = records.len();
        for (stored, record) in records.into_iter().enumerate() {
            let id = record.entry_id();
            if let Err(e) = with_timeout(
                "vector store upsert",
                self.call_timeout,
                self.store.upsert(record.into_entry()),
            )
            .await
            {
                log::error!(
                    "Storing {} failed after {} of {} pages: {}",
                    id,
                    stored,
                    total,
                    e
                );
                return Err(e);
            }
        }

        log::info!("Stored {} pages", total);
        Ok(total)
    }
}

fn number_pages(texts: Vec<String>) -> Vec<Page> {
    texts
        .into_iter()
        .zip(1u32..)
        .map(|(text, page_number)| Page { page_number, text })
        .collect()
}

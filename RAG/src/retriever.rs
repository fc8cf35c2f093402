use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::embedding_service::Embedder;
use crate::error::{with_timeout, Result};
use crate::models::*;
use crate::vector_store::VectorStore;

pub const DEFAULT_TOP_K: usize = 3;

/// Similarity lookup and document bookkeeping over the vector store.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    call_timeout: Duration,
}

impl Retriever {
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

    /// Embeds `query` and returns the `top_k` closest pages in rank order,
    /// searching only `doc_filters` when it is non-empty.
    pub async fn retrieve(
        &self,
        query: &str,
        doc_filters: &[String],
        top_k: usize,
    ) -> Result<RetrievalResult> {
        let query_embedding =
            with_timeout("embedding", self.call_timeout, self.embedder.embed(query)).await?;

        let hits = with_timeout(
            "vector store query",
            self.call_timeout,
            self.store.query(&query_embedding, top_k, doc_filters),
        )
        .await?;

        log::info!("Found {} relevant pages", hits.len());
        Ok(hits.into_iter().collect())
    }

    /// Distinct document names in the store, sorted.
    pub async fn list_document_names(&self) -> Result<Vec<String>> {
        let entries = self.all_entries().await?;
        let names: BTreeSet<String> = entries
            .into_iter()
            .map(|entry| entry.metadata.doc_name)
            .collect();
        Ok(names.into_iter().collect())
    }

    /// Deletes every page of the named documents and returns the removed ids.
    /// Names with no stored pages are ignored.
    pub async fn delete_documents(&self, names: &[String]) -> Result<Vec<String>> {
        let wanted: HashSet<&str> = names.iter().map(String::as_str).collect();
        let ids: Vec<String> = self
            .all_entries()
            .await?
            .into_iter()
            .filter(|entry| wanted.contains(entry.metadata.doc_name.as_str()))
            .map(|entry| entry.id)
            .collect();

        if ids.is_empty() {
            return Ok(ids);
        }

        let removed = with_timeout(
            "vector store delete",
            self.call_timeout,
            self.store.delete(&ids),
        )
        .await?;
        log::info!("Deleted {} pages from {} document(s)", removed, names.len());
        Ok(ids)
    }

    async fn all_entries(&self) -> Result<Vec<EntrySummary>> {
        with_timeout("vector store scan", self.call_timeout, self.store.get_all()).await
    }
}

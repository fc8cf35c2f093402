use std::sync::Arc;
use std::time::Duration;

use crate::config::{EmbedderKind, Settings};
use crate::document_processor::DocumentProcessor;
use crate::embedding_service::{Embedder, HashingEmbedder};
use crate::error::Result;
use crate::gemini_service::GeminiService;
use crate::llm::LanguageModel;
use crate::query_service::{PipelineOptions, QueryService};
use crate::retriever::Retriever;
use crate::vector_store::{SqliteVectorStore, VectorStore};

/// Process-wide services, created once at startup and shared by every request.
pub struct RagSystem {
    documents: DocumentProcessor,
    queries: QueryService,
    store: Arc<dyn VectorStore>,
}

impl RagSystem {
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        log::info!("Initializing RAG System...");

        let gemini = Arc::new(GeminiService::new(&settings.gemini)?);
        let embedder: Arc<dyn Embedder> = match settings.embedder {
            EmbedderKind::Gemini => gemini.clone() as Arc<dyn Embedder>,
            EmbedderKind::Hashing => Arc::new(HashingEmbedder::new(settings.hashing_dimensions)),
        };
        let store: Arc<dyn VectorStore> =
            Arc::new(SqliteVectorStore::open(&settings.db_path, &settings.collection).await?);

        log::info!(
            "Using model {} with {:?} embeddings, pipeline {:?}",
            settings.gemini.model,
            settings.embedder,
            settings.pipeline
        );

        Ok(Self::from_parts(
            gemini,
            embedder,
            store,
            settings.pipeline,
            settings.call_timeout,
        ))
    }

    pub fn from_parts(
        llm: Arc<dyn LanguageModel>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        options: PipelineOptions,
        call_timeout: Duration,
    ) -> Self {
        Self {
            documents: DocumentProcessor::new(embedder.clone(), store.clone(), call_timeout),
            queries: QueryService::new(llm, embedder, store.clone(), options, call_timeout),
            store,
        }
    }

    pub fn documents(&self) -> &DocumentProcessor {
        &self.documents
    }

    pub fn queries(&self) -> &QueryService {
        &self.queries
    }

    pub fn retriever(&self) -> &Retriever {
        self.queries.retriever()
    }

    pub async fn shutdown(&self) {
        log::info!("Closing vector store");
        self.store.close().await;
    }
}

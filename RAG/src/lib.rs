pub mod answer_service;
pub mod config;
pub mod document_processor;
pub mod embedding_service;
pub mod error;
pub mod gemini_service;
pub mod llm;
pub mod models;
pub mod query_rewriter;
pub mod query_service;
pub mod rag_system;
pub mod retriever;
pub mod vector_store;

#[cfg(test)]
mod test_support;

pub use answer_service::AnswerSynthesizer;
pub use config::{EmbedderKind, Settings};
pub use document_processor::DocumentProcessor;
pub use embedding_service::{Embedder, HashingEmbedder};
pub use error::{RagError, Result};
pub use gemini_service::GeminiService;
pub use llm::{FragmentReceiver, LanguageModel, TextStream};
pub use models::*;
pub use query_rewriter::{QueryRewriter, RewriteOutcome};
pub use query_service::{Answer, PipelineOptions, QueryService};
pub use rag_system::RagSystem;
pub use retriever::Retriever;
pub use vector_store::{SqliteVectorStore, VectorStore};

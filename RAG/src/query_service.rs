use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;

use crate::answer_service::AnswerSynthesizer;
use crate::embedding_service::Embedder;
use crate::error::{RagError, Result};
use crate::llm::{LanguageModel, TextStream};
use crate::models::*;
use crate::query_rewriter::QueryRewriter;
use crate::retriever::{Retriever, DEFAULT_TOP_K};
use crate::vector_store::VectorStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    pub streaming: bool,
    pub use_history_rewrite: bool,
    pub top_k: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            streaming: true,
            use_history_rewrite: true,
            top_k: DEFAULT_TOP_K,
        }
    }
}

pub enum Answer {
    Complete(String),
    Stream(TextStream),
}

impl Answer {
    /// Drains a streamed answer; a complete answer is returned as is.
    pub async fn into_text(self) -> Result<String> {
        match self {
            Answer::Complete(text) => Ok(text),
            Answer::Stream(stream) => {
                let fragments: Vec<String> = stream.try_collect().await?;
                Ok(fragments.concat())
            }
        }
    }
}

impl fmt::Debug for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Answer::Complete(text) => f.debug_tuple("Complete").field(text).finish(),
            Answer::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Rewrite, retrieve, answer: the single query path behind `/query`.
pub struct QueryService {
    rewriter: QueryRewriter,
    retriever: Arc<Retriever>,
    synthesizer: AnswerSynthesizer,
    options: PipelineOptions,
}

impl QueryService {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        options: PipelineOptions,
        call_timeout: Duration,
    ) -> Self {
        Self {
            rewriter: QueryRewriter::new(llm.clone(), call_timeout),
            retriever: Arc::new(Retriever::new(embedder, store, call_timeout)),
            synthesizer: AnswerSynthesizer::new(llm, call_timeout),
            options,
        }
    }

    pub fn options(&self) -> PipelineOptions {
        self.options
    }

    pub fn retriever(&self) -> &Arc<Retriever> {
        &self.retriever
    }

    pub async fn run(&self, request: &QueryRequest) -> Result<Answer> {
        let question = request.query.trim();
        if question.is_empty() {
            return Err(RagError::InvalidRequest("query must not be empty".to_string()));
        }

        // Retrieval has to wait for the rewrite: it searches with the rewritten question.
        let outcome = if self.options.use_history_rewrite {
            Some(self.rewriter.rewrite(&request.message_history, question).await)
        } else {
            None
        };
        let question = outcome
            .as_ref()
            .map_or(question, |o| o.effective_question(question));

        let retrieved = self
            .retriever
            .retrieve(question, &request.docs, self.options.top_k)
            .await?;

        if self.options.streaming {
            let stream = self.synthesizer.answer_stream(question, &retrieved).await?;
            Ok(Answer::Stream(stream))
        } else {
            let text = self.synthesizer.answer(question, &retrieved).await?;
            Ok(Answer::Complete(text))
        }
    }
}

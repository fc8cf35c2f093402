use std::sync::Arc;
use std::time::Duration;

use crate::error::{with_timeout, Result};
use crate::llm::{fragment_stream, LanguageModel, TextStream};
use crate::models::RetrievalResult;

/// Builds the grounding prompt and hands it to the LLM.
pub struct AnswerSynthesizer {
    llm: Arc<dyn LanguageModel>,
    call_timeout: Duration,
}

impl AnswerSynthesizer {
    pub fn new(llm: Arc<dyn LanguageModel>, call_timeout: Duration) -> Self {
        Self { llm, call_timeout }
    }

    pub async fn answer(&self, query: &str, retrieved: &RetrievalResult) -> Result<String> {
        let prompt = build_prompt(query, retrieved);
        with_timeout("llm generate", self.call_timeout, self.llm.generate(&prompt)).await
    }

    /// Streams the answer. The timeout bounds both the wait for the upstream
    /// response and every gap between fragments.
    pub async fn answer_stream(
        &self,
        query: &str,
        retrieved: &RetrievalResult,
    ) -> Result<TextStream> {
        let prompt = build_prompt(query, retrieved);
        let rx = with_timeout(
            "llm stream start",
            self.call_timeout,
            self.llm.generate_stream(&prompt),
        )
        .await?;
        Ok(fragment_stream(rx, self.call_timeout))
    }
}

pub fn build_prompt(query: &str, retrieved: &RetrievalResult) -> String {
    let context = retrieved.texts().collect::<Vec<_>>().join("\n\n");
    format!(
        r#"
You are a helpful assistant. Answer the following question strictly based on the provided doc content.

doc Content:
{context}

Question:
{query}

Answer:
- Only use information from the doc.
- Avoid adding any outside knowledge.
- Keep answers clear and concise.
- Use bullet points if multiple points exist.
- Format the response in markdown.
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RagError;
    use crate::models::RetrievedPage;
    use crate::test_support::ScriptedModel;
    use futures::TryStreamExt;

    fn retrieved(texts: &[&str]) -> RetrievalResult {
        RetrievalResult::new(
            texts
                .iter()
                .enumerate()
                .map(|(i, text)| RetrievedPage {
                    id: format!("doc.pdf_page_{}", i + 1),
                    text: text.to_string(),
                })
                .collect(),
        )
    }

    #[test]
    fn prompt_joins_pages_in_rank_order_with_blank_lines() {
        let prompt = build_prompt("Why?", &retrieved(&["best match", "second", "third"]));
        assert!(prompt.contains("best match\n\nsecond\n\nthird"));
        assert!(prompt.contains("Question:\nWhy?"));
        assert!(prompt.contains("markdown"));
    }

    #[tokio::test]
    async fn streamed_fragments_concatenate_to_blocking_answer() {
        let model = Arc::new(ScriptedModel::constant(
            "- Paris has about 2.1 million residents.\n- The metro area is larger.",
        ));
        let synthesizer = AnswerSynthesizer::new(model, Duration::from_secs(5));
        let pages = retrieved(&["Paris population figures"]);

        let blocking = synthesizer.answer("population?", &pages).await.unwrap();
        let fragments: Vec<String> = synthesizer
            .answer_stream("population?", &pages)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert!(fragments.len() > 1);
        assert_eq!(fragments.concat(), blocking);
    }

    #[tokio::test]
    async fn llm_failure_is_surfaced() {
        let model = Arc::new(ScriptedModel::new(|_| Err(RagError::Llm("down".into()))));
        let synthesizer = AnswerSynthesizer::new(model, Duration::from_secs(5));

        let err = synthesizer.answer("q", &retrieved(&[])).await.unwrap_err();
        assert!(matches!(err, RagError::Llm(_)));
        assert!(synthesizer.answer_stream("q", &retrieved(&[])).await.is_err());
    }
}

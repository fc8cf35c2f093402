//! Turns a follow-up question into a standalone one using the chat history.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::error::with_timeout;
use crate::llm::LanguageModel;

const DELIMITER: &str = "$$";
const CODE_FENCE: &str = "```";
const NO_REWRITE: &str = "none";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteOutcome {
    /// The question stands on its own.
    Unchanged,
    Rewritten(String),
}

impl RewriteOutcome {
    /// The question retrieval should use.
    pub fn effective_question<'a>(&'a self, original: &'a str) -> &'a str {
        match self {
            RewriteOutcome::Unchanged => original,
            RewriteOutcome::Rewritten(question) => question,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RewriteParseError {
    #[error("rewrite reply was empty")]
    Empty,
    #[error("rewrite reply has no $$-delimited answer")]
    Malformed,
}

pub struct QueryRewriter {
    llm: Arc<dyn LanguageModel>,
    call_timeout: Duration,
}

impl QueryRewriter {
    pub fn new(llm: Arc<dyn LanguageModel>, call_timeout: Duration) -> Self {
        Self { llm, call_timeout }
    }

    /// Never fails: an LLM or parse failure falls back to the original question.
    pub async fn rewrite(&self, history: &str, question: &str) -> RewriteOutcome {
        if history.trim().is_empty() {
            return RewriteOutcome::Unchanged;
        }

        let prompt = build_rewrite_prompt(history, question);
        let reply = match with_timeout("query rewrite", self.call_timeout, self.llm.generate(&prompt))
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                log::warn!("Query rewrite failed, using original question: {}", e);
                return RewriteOutcome::Unchanged;
            }
        };

        match parse_rewrite(&reply) {
            Ok(outcome) => {
                if let RewriteOutcome::Rewritten(ref rewritten) = outcome {
                    log::info!("Rewrote question to: {}", rewritten);
                }
                outcome
            }
            Err(e) => {
                log::warn!("Unparseable rewrite reply ({}): {:?}", e, reply);
                RewriteOutcome::Unchanged
            }
        }
    }
}

pub fn build_rewrite_prompt(history: &str, question: &str) -> String {
    format!(
        r#"You rewrite follow-up questions so they can be understood without the conversation.

Conversation history:
{history}

Latest question:
{question}

If the latest question refers to something from the conversation history (for example "it", "that", "they", or an omitted subject), rewrite it as one standalone question that names what it refers to.
If the latest question already stands on its own, the result is none.

Reply with only the result wrapped in $$, for example $$none$$ or $$What is the population of Paris?$$"#
    )
}

/// Extracts the rewrite from an LLM reply.
///
/// Takes the first `$$`-delimited span, else the text after a `json` marker;
/// code fences are dropped and whitespace trimmed. A reply with neither is
/// `Malformed`.
pub fn parse_rewrite(reply: &str) -> Result<RewriteOutcome, RewriteParseError> {
    let candidate = delimited_span(reply)
        .or_else(|| after_json_marker(reply))
        .ok_or(RewriteParseError::Malformed)?;

    let cleaned = candidate.replace(CODE_FENCE, "");
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        Err(RewriteParseError::Empty)
    } else if cleaned.eq_ignore_ascii_case(NO_REWRITE) {
        Ok(RewriteOutcome::Unchanged)
    } else {
        Ok(RewriteOutcome::Rewritten(cleaned.to_string()))
    }
}

enum Scan {
    SearchingOpen,
    Inside { start: usize },
}

fn delimited_span(text: &str) -> Option<&str> {
    let mut state = Scan::SearchingOpen;
    let mut pos = 0;

    while let Some(offset) = text[pos..].find(DELIMITER) {
        let at = pos + offset;
        match state {
            Scan::SearchingOpen => {
                pos = at + DELIMITER.len();
                state = Scan::Inside { start: pos };
            }
            Scan::Inside { start } => return Some(&text[start..at]),
        }
    }
    None
}

fn after_json_marker(text: &str) -> Option<&str> {
    let at = text.to_ascii_lowercase().find("json")?;
    Some(&text[at + "json".len()..])
}

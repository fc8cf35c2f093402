use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;

pub type Result<T, E = RagError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("invalid document: {0}")]
    InvalidDocument(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("embedding failed: {0}")]
    Embedding(String),
    #[error("vector store error: {0}")]
    VectorStore(String),
    #[error("LLM error: {0}")]
    Llm(String),
    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: &'static str, after: Duration },
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RagError {
    pub fn embedding<E: Display>(err: E) -> Self {
        RagError::Embedding(err.to_string())
    }

    pub fn vector_store<E: Display>(err: E) -> Self {
        RagError::VectorStore(err.to_string())
    }

    pub fn llm<E: Display>(err: E) -> Self {
        RagError::Llm(err.to_string())
    }

    /// True for failures caused by the caller's input rather than by a collaborator.
    pub fn is_client_error(&self) -> bool {
        matches!(self, RagError::InvalidDocument(_) | RagError::InvalidRequest(_))
    }
}

impl From<sqlx::Error> for RagError {
    fn from(err: sqlx::Error) -> Self {
        RagError::vector_store(err)
    }
}

/// Runs `fut` with an upper bound on its duration, naming `stage` in the error.
pub async fn with_timeout<T, F>(stage: &'static str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            log::warn!("{} exceeded {:?}", stage, limit);
            Err(RagError::Timeout { stage, after: limit })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn slow_call_becomes_timeout_error() {
        let result: Result<()> = with_timeout("embedding", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        match result {
            Err(RagError::Timeout { stage, .. }) => assert_eq!(stage, "embedding"),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fast_call_passes_through() {
        let value = with_timeout("llm", Duration::from_secs(1), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn client_errors_are_classified() {
        assert!(RagError::InvalidDocument("bad".into()).is_client_error());
        assert!(!RagError::Llm("down".into()).is_client_error());
    }
}

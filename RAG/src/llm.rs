use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;

use crate::error::{RagError, Result};

/// Incremental answer text. Concatenating every `Ok` item yields the full answer;
/// an `Err` item is always the last one.
pub type TextStream = BoxStream<'static, Result<String>>;

pub type FragmentReceiver = mpsc::Receiver<Result<String>>;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Starts generation and returns a channel of text fragments. Dropping the
    /// receiver stops the producer and releases the upstream connection.
    async fn generate_stream(&self, prompt: &str) -> Result<FragmentReceiver>;
}

/// Adapts a fragment channel into a stream that fails with `Timeout` when no
/// fragment arrives within `idle`.
pub fn fragment_stream(rx: FragmentReceiver, idle: Duration) -> TextStream {
    stream::unfold(Some(rx), move |state| async move {
        let mut rx = state?;
        match tokio::time::timeout(idle, rx.recv()).await {
            Ok(Some(Ok(text))) => Some((Ok(text), Some(rx))),
            Ok(Some(Err(e))) => Some((Err(e), None)),
            Ok(None) => None,
            Err(_) => Some((
                Err(RagError::Timeout {
                    stage: "llm stream",
                    after: idle,
                }),
                None,
            )),
        }
    })
    .boxed()
}

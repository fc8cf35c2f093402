use std::fmt::Display;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use log::{debug, warn};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::config::GeminiSettings;
use crate::error::{RagError, Result};
use crate::llm::{FragmentReceiver, LanguageModel};
use crate::models::*;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const STREAM_CHANNEL_CAPACITY: usize = 32;

/// Client for the Gemini generative and embedding REST endpoints.
pub struct GeminiService {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    pub(crate) embedding_model: String,
    max_output_tokens: u32,
}

impl GeminiService {
    pub fn new(settings: &GeminiSettings) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(RagError::llm)?;

        Ok(Self {
            client,
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            embedding_model: settings.embedding_model.clone(),
            max_output_tokens: settings.max_output_tokens,
        })
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/v1beta/models/{}:{}", self.base_url, model, method)
    }

    fn generation_request(&self, prompt: &str) -> GeminiRequest {
        GeminiRequest::from_prompt(
            prompt,
            Some(GeminiGenerationConfig {
                temperature: 0.3,
                max_output_tokens: self.max_output_tokens,
            }),
        )
    }

    async fn send<B: Serialize>(&self, url: &str, body: &B) -> reqwest::Result<Response> {
        self.client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
    }

    /// POSTs `body` and decodes a JSON reply; `wrap` classifies failures.
    pub(crate) async fn post_json<B, T>(
        &self,
        url: &str,
        body: &B,
        wrap: fn(String) -> RagError,
    ) -> Result<T>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let response = self
            .send(url, body)
            .await
            .map_err(|e| wrap(e.to_string()))?;
        let response = check_status(response, wrap).await?;
        response.json().await.map_err(|e| wrap(e.to_string()))
    }

    pub(crate) fn embedding_url(&self, method: &str) -> String {
        self.model_url(&self.embedding_model, method)
    }
}

async fn check_status(response: Response, wrap: fn(String) -> RagError) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error_text = response.text().await.unwrap_or_default();
    Err(wrap(format!("Gemini API error ({}): {}", status, error_text)))
}

#[async_trait]
impl LanguageModel for GeminiService {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = self.model_url(&self.model, "generateContent");
        let request = self.generation_request(prompt);

        let gemini_response: GeminiResponse =
            self.post_json(&url, &request, RagError::Llm).await?;
        if let Some(error) = gemini_response.error.as_ref() {
            return Err(RagError::Llm(error.message.clone()));
        }

        gemini_response
            .text()
            .ok_or_else(|| RagError::Llm("No response generated".to_string()))
    }

    async fn generate_stream(&self, prompt: &str) -> Result<FragmentReceiver> {
        let url = format!(
            "{}?alt=sse",
            self.model_url(&self.model, "streamGenerateContent")
        );
        let request = self.generation_request(prompt);

        let response = self.send(&url, &request).await.map_err(RagError::llm)?;
        let response = check_status(response, RagError::Llm).await?;

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        tokio::spawn(forward_events(Box::pin(response.bytes_stream()), tx));

        Ok(rx)
    }
}

/// Pumps SSE text fragments from `body` into `tx` until the body ends, an
/// error is forwarded, or the receiver is dropped. Returning drops `body`,
/// which releases the upstream connection.
async fn forward_events<S, B, E>(mut body: S, tx: mpsc::Sender<Result<String>>)
where
    S: Stream<Item = std::result::Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut events = SseBuffer::default();
    loop {
        let item = tokio::select! {
            _ = tx.closed() => {
                debug!("Stream consumer went away, dropping upstream response");
                return;
            }
            item = body.next() => item,
        };

        let bytes = match item {
            Some(Ok(bytes)) => bytes,
            Some(Err(e)) => {
                let _ = tx.send(Err(RagError::llm(e))).await;
                return;
            }
            None => break,
        };

        for data in events.push(bytes.as_ref()) {
            match decode_event(&data) {
                Ok(Some(text)) => {
                    if tx.send(Ok(text)).await.is_err() {
                        debug!("Stream consumer went away, dropping upstream response");
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
        }
    }

    if let Some(data) = events.finish() {
        match decode_event(&data) {
            Ok(Some(text)) => {
                let _ = tx.send(Ok(text)).await;
            }
            Ok(None) => {}
            Err(e) => {
                let _ = tx.send(Err(e)).await;
            }
        }
    }
}

/// Decodes one SSE `data:` payload into the text it carries, if any.
fn decode_event(data: &str) -> Result<Option<String>> {
    let response: GeminiResponse = serde_json::from_str(data)
        .map_err(|e| RagError::Llm(format!("malformed stream event: {}", e)))?;

    if let Some(error) = response.error {
        return Err(RagError::Llm(error.message));
    }
    match response.text() {
        Some(text) if !text.is_empty() => Ok(Some(text)),
        _ => {
            if let Some(reason) = response
                .candidates
                .first()
                .and_then(|c| c.finish_reason.as_deref())
                .filter(|r| *r != "STOP")
            {
                warn!("Gemini stream finished with reason {}", reason);
            }
            Ok(None)
        }
    }
}

/// Splits a byte stream into SSE `data:` payloads, holding partial lines across
/// network chunks.
#[derive(Default)]
struct SseBuffer {
    pending: Vec<u8>,
}

impl SseBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut payloads = Vec::new();

        while let Some(newline) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            if let Some(data) = data_payload(&line) {
                payloads.push(data);
            }
        }
        payloads
    }

    fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        data_payload(&rest)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches(['\r', '\n']);
    let data = line.strip_prefix("data:")?.trim_start();
    if data.is_empty() || data == "[DONE]" {
        None
    } else {
        Some(data.to_string())
    }
}

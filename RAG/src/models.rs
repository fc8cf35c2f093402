use serde::{Deserialize, Serialize};

/// Plain text of one PDF page, numbered from 1 in physical order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub page_number: u32,
    pub text: String,
}

/// A page with its embedding, ready to be written to the vector store.
#[derive(Debug, Clone)]
pub struct PageRecord {
    pub doc_name: String,
    pub page_number: u32,
    pub text: String,
    pub embedding: Vec<f32>,
}

impl PageRecord {
    pub fn entry_id(&self) -> String {
        page_entry_id(&self.doc_name, self.page_number)
    }

    pub fn into_entry(self) -> StoredEntry {
        StoredEntry {
            id: self.entry_id(),
            text: self.text,
            embedding: self.embedding,
            metadata: EntryMetadata {
                doc_name: self.doc_name,
                page_number: self.page_number,
            },
        }
    }
}

/// Store key for a page: `{doc_name}_page_{page_number}`.
pub fn page_entry_id(doc_name: &str, page_number: u32) -> String {
    format!("{}_page_{}", doc_name, page_number)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub doc_name: String,
    pub page_number: u32,
}

#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: EntryMetadata,
}

/// Id and metadata of a stored entry, without text or vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySummary {
    pub id: String,
    pub metadata: EntryMetadata,
}

#[derive(Debug, Clone)]
pub struct ScoredEntry {
    pub id: String,
    pub text: String,
    pub metadata: EntryMetadata,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedPage {
    pub id: String,
    pub text: String,
}

/// Retrieved pages in rank order, best match first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrievalResult {
    pages: Vec<RetrievedPage>,
}

impl RetrievalResult {
    pub fn new(pages: Vec<RetrievedPage>) -> Self {
        Self { pages }
    }

    pub fn pages(&self) -> &[RetrievedPage] {
        &self.pages
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.pages.iter().map(|p| p.id.as_str())
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.pages.iter().map(|p| p.text.as_str())
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

impl FromIterator<ScoredEntry> for RetrievalResult {
    fn from_iter<I: IntoIterator<Item = ScoredEntry>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|entry| RetrievedPage {
                    id: entry.id,
                    text: entry.text,
                })
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub query: String,
    pub docs: Vec<String>,
    pub message_history: String,
}

// Gemini REST wire types.

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest {
    pub contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GeminiGenerationConfig>,
}

impl GeminiRequest {
    pub fn from_prompt(prompt: &str, generation_config: Option<GeminiGenerationConfig>) -> Self {
        Self {
            contents: vec![GeminiContent::from_text(prompt)],
            generation_config,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeminiContent {
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

impl GeminiContent {
    pub fn from_text(text: &str) -> Self {
        Self {
            parts: vec![GeminiPart {
                text: Some(text.to_string()),
            }],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiGenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    pub error: Option<GeminiApiError>,
}

impl GeminiResponse {
    /// Text of the first candidate, parts concatenated in order.
    pub fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        Some(text)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiCandidate {
    #[serde(default)]
    pub content: Option<GeminiContent>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GeminiApiError {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct EmbedContentRequest {
    pub model: String,
    pub content: GeminiContent,
}

#[derive(Debug, Serialize)]
pub struct BatchEmbedContentsRequest {
    pub requests: Vec<EmbedContentRequest>,
}

#[derive(Debug, Deserialize)]
pub struct ContentEmbedding {
    #[serde(default)]
    pub values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
pub struct EmbedContentResponse {
    pub embedding: ContentEmbedding,
}

#[derive(Debug, Deserialize)]
pub struct BatchEmbedContentsResponse {
    #[serde(default)]
    pub embeddings: Vec<ContentEmbedding>,
}

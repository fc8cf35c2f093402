//! Process settings, read once at startup from the environment (and `.env`).

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{RagError, Result};
use crate::query_service::PipelineOptions;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_API_KEY_FILE: &str = "api.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedderKind {
    /// Gemini `embedContent` API.
    Gemini,
    /// Local feature-hashing embedder, no network.
    Hashing,
}

impl FromStr for EmbedderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(EmbedderKind::Gemini),
            "hashing" => Ok(EmbedderKind::Hashing),
            other => Err(format!("unknown embedder '{}', expected gemini or hashing", other)),
        }
    }
}

#[derive(Clone)]
pub struct GeminiSettings {
    pub api_key: String,
    pub model: String,
    pub embedding_model: String,
    pub base_url: String,
    pub max_output_tokens: u32,
}

impl fmt::Debug for GeminiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiSettings")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("embedding_model", &self.embedding_model)
            .field("base_url", &self.base_url)
            .field("max_output_tokens", &self.max_output_tokens)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub gemini: GeminiSettings,
    pub embedder: EmbedderKind,
    pub hashing_dimensions: usize,
    pub bind_addr: SocketAddr,
    pub db_path: PathBuf,
    pub collection: String,
    pub upload_dir: PathBuf,
    pub pipeline: PipelineOptions,
    pub call_timeout: Duration,
    pub max_upload_bytes: usize,
}

#[derive(Deserialize)]
struct ApiKeyFile {
    api_key: String,
}

impl Settings {
    /// Loads `.env` if present, then reads settings from the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = match lookup("GEMINI_API_KEY").filter(|k| !k.trim().is_empty()) {
            Some(key) => key,
            None => {
                let path = lookup("RAG_API_KEY_FILE")
                    .unwrap_or_else(|| DEFAULT_API_KEY_FILE.to_string());
                read_api_key_file(Path::new(&path))?
            }
        };

        let gemini = GeminiSettings {
            api_key,
            model: lookup("GEMINI_MODEL").unwrap_or_else(|| "gemini-2.0-flash".to_string()),
            embedding_model: lookup("GEMINI_EMBEDDING_MODEL")
                .unwrap_or_else(|| "text-embedding-004".to_string()),
            base_url: lookup("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            max_output_tokens: parse_var(&lookup, "GEMINI_MAX_OUTPUT_TOKENS", 2048)?,
        };

        let defaults = PipelineOptions::default();
        let pipeline = PipelineOptions {
            streaming: parse_bool(&lookup, "RAG_STREAMING", defaults.streaming)?,
            use_history_rewrite: parse_bool(
                &lookup,
                "RAG_HISTORY_REWRITE",
                defaults.use_history_rewrite,
            )?,
            top_k: parse_var(&lookup, "RAG_TOP_K", defaults.top_k)?,
        };
        if pipeline.top_k == 0 {
            return Err(RagError::Config("RAG_TOP_K must be at least 1".to_string()));
        }

        let call_timeout_secs: u64 = parse_var(&lookup, "RAG_CALL_TIMEOUT_SECS", 60)?;
        let max_upload_mb: usize = parse_var(&lookup, "RAG_MAX_UPLOAD_MB", 50)?;
        let max_upload_bytes = max_upload_mb.checked_mul(1024 * 1024).ok_or_else(|| {
            RagError::Config(format!("RAG_MAX_UPLOAD_MB={} is too large", max_upload_mb))
        })?;

        Ok(Self {
            gemini,
            embedder: parse_var(&lookup, "RAG_EMBEDDER", EmbedderKind::Gemini)?,
            hashing_dimensions: parse_var(&lookup, "RAG_HASHING_DIMENSIONS", 384)?,
            bind_addr: parse_var(
                &lookup,
                "RAG_BIND_ADDR",
                SocketAddr::from(([0, 0, 0, 0], 8000)),
            )?,
            db_path: lookup("RAG_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./vector_store/rag.db")),
            collection: lookup("RAG_COLLECTION").unwrap_or_else(|| "my_doc_2".to_string()),
            upload_dir: lookup("RAG_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./uploads")),
            pipeline,
            call_timeout: Duration::from_secs(call_timeout_secs.max(1)),
            max_upload_bytes,
        })
    }
}

fn read_api_key_file(path: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        RagError::Config(format!(
            "GEMINI_API_KEY is not set and {} could not be read: {}",
            path.display(),
            e
        ))
    })?;
    let parsed: ApiKeyFile = serde_json::from_str(&raw)
        .map_err(|e| RagError::Config(format!("{} is not valid: {}", path.display(), e)))?;
    if parsed.api_key.trim().is_empty() {
        return Err(RagError::Config(format!("{} has an empty api_key", path.display())));
    }
    log::info!("Loaded API key from {}", path.display());
    Ok(parsed.api_key)
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| RagError::Config(format!("{}={:?}: {}", key, raw, e))),
        _ => Ok(default),
    }
}

fn parse_bool<F>(lookup: &F, key: &str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if v.is_empty() => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(RagError::Config(format!("{}={:?} is not a boolean", key, v))),
        },
    }
}

//! Test doubles shared by the unit tests of this crate.

use std::sync::Mutex;

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use tokio::sync::mpsc;

use crate::error::{RagError, Result};
use crate::llm::{FragmentReceiver, LanguageModel};
use crate::models::*;
use crate::vector_store::VectorStore;

/// Builds a PDF with one page per entry of `pages`, each showing that text.
pub fn sample_pdf(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode page content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).expect("serialize sample PDF");
    buffer
}

type Reply = Box<dyn Fn(&str) -> Result<String> + Send + Sync>;

/// Language model double: answers every prompt through `reply` and records
/// the prompts it saw. Streaming splits the same reply into small fragments.
pub struct ScriptedModel {
    reply: Reply,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new<F>(reply: F) -> Self
    where
        F: Fn(&str) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            reply: Box::new(reply),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn constant(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(text.clone()))
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn answer(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        (self.reply)(prompt)
    }
}

pub fn split_fragments(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size).map(|c| c.iter().collect()).collect()
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.answer(prompt)
    }

    async fn generate_stream(&self, prompt: &str) -> Result<FragmentReceiver> {
        let text = self.answer(prompt)?;
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            for fragment in split_fragments(&text, 5) {
                if tx.send(Ok(fragment)).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }
}

/// In-memory store whose upserts start failing after `ok_upserts` successes.
pub struct FlakyStore {
    entries: Mutex<Vec<StoredEntry>>,
    ok_upserts: usize,
}

impl FlakyStore {
    pub fn failing_after(ok_upserts: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            ok_upserts,
        }
    }

    pub fn stored_ids(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.id.clone())
            .collect()
    }
}

#[async_trait]
impl VectorStore for FlakyStore {
    async fn upsert(&self, entry: StoredEntry) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= self.ok_upserts {
            return Err(RagError::VectorStore("disk full".to_string()));
        }
        entries.retain(|e| e.id != entry.id);
        entries.push(entry);
        Ok(())
    }

    async fn query(
        &self,
        _embedding: &[f32],
        k: usize,
        doc_filter: &[String],
    ) -> Result<Vec<ScoredEntry>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| doc_filter.is_empty() || doc_filter.contains(&e.metadata.doc_name))
            .take(k)
            .map(|e| ScoredEntry {
                id: e.id.clone(),
                text: e.text.clone(),
                metadata: e.metadata.clone(),
                score: 1.0,
            })
            .collect())
    }

    async fn get_all(&self) -> Result<Vec<EntrySummary>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .map(|e| EntrySummary {
                id: e.id.clone(),
                metadata: e.metadata.clone(),
            })
            .collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|e| !ids.contains(&e.id));
        Ok(before - entries.len())
    }
}

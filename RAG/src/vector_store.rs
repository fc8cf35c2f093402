//! Persistent vector store.
//!
//! SQLite holds text, metadata and the raw embedding bytes; nearest-neighbour
//! search is a brute-force cosine scan over the (optionally filtered) collection.

use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::embedding_service::cosine_similarity;
use crate::error::{RagError, Result};
use crate::models::*;

/// Keeps `IN (...)` lists well below SQLite's bound-parameter limit.
const DELETE_BATCH: usize = 500;

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Inserts the entry, replacing any entry with the same id.
    async fn upsert(&self, entry: StoredEntry) -> Result<()>;

    /// The `k` entries most similar to `embedding`, best first. A non-empty
    /// `doc_filter` restricts the search to those document names.
    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        doc_filter: &[String],
    ) -> Result<Vec<ScoredEntry>>;

    /// Ids and metadata of every entry, in insertion order.
    async fn get_all(&self) -> Result<Vec<EntrySummary>>;

    /// Removes the given ids and returns how many entries were deleted.
    async fn delete(&self, ids: &[String]) -> Result<usize>;

    async fn close(&self) {}
}

pub struct SqliteVectorStore {
    pool: SqlitePool,
    collection: String,
}

impl SqliteVectorStore {
    pub async fn open(db_path: &Path, collection: &str) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            collection: collection.to_string(),
        };
        store.init_schema().await?;
        log::info!(
            "Opened vector store {} (collection '{}')",
            db_path.display(),
            store.collection
        );
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS vector_entries (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                doc_name TEXT NOT NULL,
                page_number INTEGER NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (collection, id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_vector_entries_doc
             ON vector_entries(collection, doc_name)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn row_metadata(row: &sqlx::sqlite::SqliteRow) -> Result<EntryMetadata> {
        let page_number: i64 = row.try_get("page_number")?;
        Ok(EntryMetadata {
            doc_name: row.try_get("doc_name")?,
            page_number: u32::try_from(page_number).map_err(|_| {
                RagError::VectorStore(format!("stored page number {} is out of range", page_number))
            })?,
        })
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert(&self, entry: StoredEntry) -> Result<()> {
        let blob = Self::serialize_embedding(&entry.embedding);

        sqlx::query(
            "INSERT INTO vector_entries (collection, id, doc_name, page_number, text, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(collection, id) DO UPDATE SET
                doc_name = excluded.doc_name,
                page_number = excluded.page_number,
                text = excluded.text,
                embedding = excluded.embedding,
                updated_at = STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')",
        )
        .bind(&self.collection)
        .bind(&entry.id)
        .bind(&entry.metadata.doc_name)
        .bind(i64::from(entry.metadata.page_number))
        .bind(&entry.text)
        .bind(&blob)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        doc_filter: &[String],
    ) -> Result<Vec<ScoredEntry>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, doc_name, page_number, text, embedding FROM vector_entries WHERE collection = ",
        );
        builder.push_bind(self.collection.clone());
        if !doc_filter.is_empty() {
            builder.push(" AND doc_name IN (");
            let mut names = builder.separated(", ");
            for name in doc_filter {
                names.push_bind(name.clone());
            }
            names.push_unseparated(")");
        }

        let rows = builder.build().fetch_all(&self.pool).await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let bytes: Vec<u8> = row.try_get("embedding")?;
            let score = cosine_similarity(embedding, &Self::deserialize_embedding(&bytes));
            scored.push(ScoredEntry {
                id: row.try_get("id")?,
                text: row.try_get("text")?,
                metadata: Self::row_metadata(row)?,
                score,
            });
        }

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(k);

        Ok(scored)
    }

    async fn get_all(&self) -> Result<Vec<EntrySummary>> {
        let rows = sqlx::query(
            "SELECT id, doc_name, page_number FROM vector_entries
             WHERE collection = ?1
             ORDER BY rowid",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<EntrySummary> {
                Ok(EntrySummary {
                    id: row.try_get("id")?,
                    metadata: Self::row_metadata(row)?,
                })
            })
            .collect()
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut deleted = 0u64;

        for batch in ids.chunks(DELETE_BATCH) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("DELETE FROM vector_entries WHERE collection = ");
            builder.push_bind(self.collection.clone());
            builder.push(" AND id IN (");
            let mut separated = builder.separated(", ");
            for id in batch {
                separated.push_bind(id.clone());
            }
            separated.push_unseparated(")");

            deleted += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(deleted as usize)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_store(dir: &TempDir, collection: &str) -> SqliteVectorStore {
        SqliteVectorStore::open(&dir.path().join("rag.db"), collection)
            .await
            .unwrap()
    }

    fn entry(doc: &str, page: u32, text: &str, embedding: Vec<f32>) -> StoredEntry {
        StoredEntry {
            id: page_entry_id(doc, page),
            text: text.to_string(),
            embedding,
            metadata: EntryMetadata {
                doc_name: doc.to_string(),
                page_number: page,
            },
        }
    }

    #[tokio::test]
    async fn query_ranks_by_similarity() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, "test").await;
        store.upsert(entry("a.pdf", 1, "east", vec![1.0, 0.0])).await.unwrap();
        store.upsert(entry("a.pdf", 2, "north-east", vec![0.7, 0.7])).await.unwrap();
        store.upsert(entry("b.pdf", 1, "north", vec![0.0, 1.0])).await.unwrap();

        let results = store.query(&[1.0, 0.1], 2, &[]).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a.pdf_page_1", "a.pdf_page_2"]);
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn query_respects_document_filter() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, "test").await;
        store.upsert(entry("a.pdf", 1, "east", vec![1.0, 0.0])).await.unwrap();
        store.upsert(entry("b.pdf", 1, "north", vec![0.0, 1.0])).await.unwrap();

        let results = store
            .query(&[1.0, 0.0], 3, &["b.pdf".to_string()])
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].metadata.doc_name, "b.pdf");
    }

    #[tokio::test]
    async fn upsert_overwrites_same_id_and_keeps_position() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, "test").await;
        store.upsert(entry("a.pdf", 1, "old", vec![1.0])).await.unwrap();
        store.upsert(entry("b.pdf", 1, "other", vec![1.0])).await.unwrap();
        store.upsert(entry("a.pdf", 1, "new", vec![1.0])).await.unwrap();

        let all = store.get_all().await.unwrap();
        let ids: Vec<&str> = all.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a.pdf_page_1", "b.pdf_page_1"]);

        let hits = store.query(&[1.0], 1, &["a.pdf".to_string()]).await.unwrap();
        assert_eq!(hits[0].text, "new");
    }

    #[tokio::test]
    async fn delete_reports_removed_count() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, "test").await;
        store.upsert(entry("a.pdf", 1, "x", vec![1.0])).await.unwrap();
        store.upsert(entry("a.pdf", 2, "y", vec![1.0])).await.unwrap();

        let removed = store
            .delete(&["a.pdf_page_1".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.get_all().await.unwrap().len(), 1);
        assert_eq!(store.delete(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn collections_are_isolated_and_data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open_store(&dir, "first").await;
            store.upsert(entry("a.pdf", 1, "x", vec![1.0])).await.unwrap();
            store.close().await;
        }

        let other = open_store(&dir, "second").await;
        assert!(other.get_all().await.unwrap().is_empty());

        let reopened = open_store(&dir, "first").await;
        assert_eq!(reopened.get_all().await.unwrap().len(), 1);
    }

    #[test]
    fn embedding_bytes_round_trip() {
        let original = vec![0.25f32, -1.5, 3.0];
        let bytes = SqliteVectorStore::serialize_embedding(&original);
        assert_eq!(SqliteVectorStore::deserialize_embedding(&bytes), original);
    }
}


use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

use super::cache::LruCache;
use super::{ChunkMetadata, ChunkRecord};
use crate::{RagError, Result};

const CREATE_CHUNKS_TABLE: &str = "CREATE TABLE chunks (
    faiss_id INTEGER PRIMARY KEY,
    content TEXT NOT NULL,
    metadata TEXT NOT NULL
)";

/// Build-time document store: an in-memory, append-only sequence of chunk records.
#[derive(Debug, Clone, Default)]
pub struct DocumentStore {
    chunks: Vec<ChunkRecord>,
}

impl DocumentStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Append `chunk`, stamping and returning its position.
    #[inline]
    pub fn append(&mut self, mut chunk: ChunkRecord) -> usize {
        let position = self.chunks.len();
        chunk.faiss_id = Some(position);
        self.chunks.push(chunk);
        position
    }

    #[inline]
    pub fn get(&self, position: usize) -> Option<&ChunkRecord> {
        self.chunks.get(position)
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &ChunkRecord> {
        self.chunks.iter()
    }

    /// Write every record to a fresh SQLite file at `path` in one transaction.
    #[inline]
    pub async fn save(&self, path: &Path) -> Result<()> {
        if path.exists() {
            fs::remove_file(path)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| database_error("Failed to create document store", &e))?;

        let result = self.write_all(&pool).await;
        pool.close().await;
        result?;

        info!(
            "Saved {} chunk records to {}",
            self.chunks.len(),
            path.display()
        );
        Ok(())
    }

    async fn write_all(&self, pool: &Pool<Sqlite>) -> Result<()> {
        sqlx::query(CREATE_CHUNKS_TABLE)
            .execute(pool)
            .await
            .map_err(|e| database_error("Failed to create chunks table", &e))?;

        let mut tx = pool
            .begin()
            .await
            .map_err(|e| database_error("Failed to begin transaction", &e))?;

        for (position, chunk) in self.chunks.iter().enumerate() {
            let metadata = serde_json::to_string(&chunk.metadata)
                .map_err(|e| RagError::Database(format!("Failed to encode metadata: {}", e)))?;

            sqlx::query("INSERT INTO chunks (faiss_id, content, metadata) VALUES (?, ?, ?)")
                .bind(position as i64)
                .bind(chunk.content.as_str())
                .bind(metadata)
                .execute(&mut *tx)
                .await
                .map_err(|e| database_error("Failed to insert chunk", &e))?;
        }

        tx.commit()
            .await
            .map_err(|e| database_error("Failed to commit document store", &e))?;

        Ok(())
    }
}

/// Query-time document store: random access into the persisted SQLite file,
/// fronted by an LRU cache.
///
/// Reads stay on the file that was opened, even if a later build replaces it.
#[derive(Debug)]
pub struct PersistedDocumentStore {
    pool: Pool<Sqlite>,
    path: PathBuf,
    len: usize,
    cache: Mutex<LruCache<usize, ChunkRecord>>,
}

impl PersistedDocumentStore {
    #[inline]
    pub async fn open(path: &Path, cache_capacity: usize) -> Result<Self> {
        if !path.exists() {
            return Err(RagError::IndexNotBuilt(format!(
                "document store not found at {}",
                path.display()
            )));
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .journal_mode(SqliteJournalMode::Delete);

        // One connection held for the store's lifetime. A rebuild renames a new file over
        // `path`, and any later connection would read it against this store's length.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| corrupted(path, &e))?;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&pool)
            .await
            .map_err(|e| corrupted(path, &e))?;
        let len = usize::try_from(count).map_err(|e| corrupted(path, &e))?;

        debug!(
            "Opened document store {} with {} records",
            path.display(),
            len
        );

        Ok(Self {
            pool,
            path: path.to_path_buf(),
            len,
            cache: Mutex::new(LruCache::new(cache_capacity)),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fetch the record at `position`. Positions past the end are `Ok(None)`.
    #[inline]
    pub async fn get(&self, position: usize) -> Result<Option<ChunkRecord>> {
        if position >= self.len {
            return Ok(None);
        }

        let cached = self.lock_cache().get(&position).cloned();
        if cached.is_some() {
            return Ok(cached);
        }

        let row: Option<(String, String)> =
            sqlx::query_as("SELECT content, metadata FROM chunks WHERE faiss_id = ?")
                .bind(position as i64)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| database_error("Failed to read chunk", &e))?;

        let Some((content, metadata)) = row else {
            warn!(
                "Document store {} has no record at position {}",
                self.path.display(),
                position
            );
            return Ok(None);
        };

        let metadata: ChunkMetadata =
            serde_json::from_str(&metadata).map_err(|e| corrupted(&self.path, &e))?;
        let chunk = ChunkRecord {
            content,
            metadata,
            faiss_id: Some(position),
        };

        self.lock_cache().insert(position, chunk.clone());
        Ok(Some(chunk))
    }

    #[inline]
    pub fn cached_len(&self) -> usize {
        self.lock_cache().len()
    }

    #[inline]
    pub fn clear_cache(&self) {
        self.lock_cache().clear();
    }

    #[inline]
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, LruCache<usize, ChunkRecord>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn database_error(context: &str, error: &sqlx::Error) -> RagError {
    RagError::Database(format!("{}: {}", context, error))
}

fn corrupted(path: &Path, error: &dyn std::fmt::Display) -> RagError {
    RagError::IndexCorrupted(format!("{}: {}", path.display(), error))
}

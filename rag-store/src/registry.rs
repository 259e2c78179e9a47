//! Document registry: source documents, their indexing status and
//! knowledge-collection membership.
//!
//! The status column lives outside process memory ([`SqliteRegistry`]) so a
//! restart does not lose run outcomes. [`InMemoryRegistry`] backs tests and
//! throwaway deployments.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    future::Future,
    pin::Pin,
    str::FromStr,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{
    Row, SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow},
};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::errors::RagError;

pub type RegistryFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RagError>> + Send + 'a>>;

/// Lifecycle of a document's vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexingStatus {
    PendingIndex,
    Indexed,
    Error,
}

impl IndexingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            IndexingStatus::PendingIndex => "pending_index",
            IndexingStatus::Indexed => "indexed",
            IndexingStatus::Error => "error",
        }
    }
}

impl fmt::Display for IndexingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexingStatus {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_index" => Ok(IndexingStatus::PendingIndex),
            "indexed" => Ok(IndexingStatus::Indexed),
            "error" => Ok(IndexingStatus::Error),
            other => Err(RagError::Registry(format!("unknown indexing status '{other}'"))),
        }
    }
}

/// A document known to the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub file_id: String,
    pub file_name: String,
    pub file_type: String,
    /// Text produced by the upstream extractor; `None` when extraction failed.
    pub extracted_text: Option<String>,
    pub uploaded_by: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub indexing_status: IndexingStatus,
    /// Stage and message of the last failed run.
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl SourceDocument {
    /// New document in `pending_index`.
    pub fn new(
        file_id: impl Into<String>,
        file_name: impl Into<String>,
        file_type: impl Into<String>,
        extracted_text: Option<String>,
        uploaded_by: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            file_id: file_id.into(),
            file_name: file_name.into(),
            file_type: file_type.into(),
            extracted_text,
            uploaded_by,
            uploaded_at: now,
            indexing_status: IndexingStatus::PendingIndex,
            last_error: None,
            updated_at: now,
        }
    }
}

/// External collaborator owning documents. The pipeline only writes status.
pub trait DocumentRegistry: Send + Sync {
    /// Inserts or replaces a document by `file_id`.
    fn insert<'a>(&'a self, doc: SourceDocument) -> RegistryFuture<'a, ()>;

    fn get<'a>(&'a self, file_id: &'a str) -> RegistryFuture<'a, Option<SourceDocument>>;

    fn list<'a>(&'a self) -> RegistryFuture<'a, Vec<SourceDocument>>;

    fn list_by_status<'a>(
        &'a self,
        status: IndexingStatus,
    ) -> RegistryFuture<'a, Vec<SourceDocument>>;

    /// Writes `indexing_status`; `last_error` is replaced (cleared on `None`).
    fn set_status<'a>(
        &'a self,
        file_id: &'a str,
        status: IndexingStatus,
        last_error: Option<String>,
    ) -> RegistryFuture<'a, ()>;

    fn add_to_collection<'a>(
        &'a self,
        collection: &'a str,
        file_id: &'a str,
    ) -> RegistryFuture<'a, ()>;

    /// Returns `true` if the membership existed.
    fn remove_from_collection<'a>(
        &'a self,
        collection: &'a str,
        file_id: &'a str,
    ) -> RegistryFuture<'a, bool>;

    fn collection_files<'a>(&'a self, collection: &'a str) -> RegistryFuture<'a, Vec<String>>;

    fn collections_of<'a>(&'a self, file_id: &'a str) -> RegistryFuture<'a, Vec<String>>;
}

/* ------------------------------------------------------------------------- */
/* In-memory                                                                 */
/* ------------------------------------------------------------------------- */

#[derive(Default)]
struct MemState {
    docs: BTreeMap<String, SourceDocument>,
    /// collection -> file ids
    members: BTreeMap<String, BTreeSet<String>>,
}

#[derive(Default)]
pub struct InMemoryRegistry {
    state: RwLock<MemState>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentRegistry for InMemoryRegistry {
    fn insert<'a>(&'a self, doc: SourceDocument) -> RegistryFuture<'a, ()> {
        Box::pin(async move {
            self.state.write().await.docs.insert(doc.file_id.clone(), doc);
            Ok(())
        })
    }

    fn get<'a>(&'a self, file_id: &'a str) -> RegistryFuture<'a, Option<SourceDocument>> {
        Box::pin(async move { Ok(self.state.read().await.docs.get(file_id).cloned()) })
    }

    fn list<'a>(&'a self) -> RegistryFuture<'a, Vec<SourceDocument>> {
        Box::pin(async move { Ok(self.state.read().await.docs.values().cloned().collect()) })
    }

    fn list_by_status<'a>(
        &'a self,
        status: IndexingStatus,
    ) -> RegistryFuture<'a, Vec<SourceDocument>> {
        Box::pin(async move {
            Ok(self
                .state
                .read()
                .await
                .docs
                .values()
                .filter(|d| d.indexing_status == status)
                .cloned()
                .collect())
        })
    }

    fn set_status<'a>(
        &'a self,
        file_id: &'a str,
        status: IndexingStatus,
        last_error: Option<String>,
    ) -> RegistryFuture<'a, ()> {
        Box::pin(async move {
            let mut w = self.state.write().await;
            let doc = w
                .docs
                .get_mut(file_id)
                .ok_or_else(|| RagError::Registry(format!("unknown document '{file_id}'")))?;
            doc.indexing_status = status;
            doc.last_error = last_error;
            doc.updated_at = Utc::now();
            Ok(())
        })
    }

    fn add_to_collection<'a>(
        &'a self,
        collection: &'a str,
        file_id: &'a str,
    ) -> RegistryFuture<'a, ()> {
        Box::pin(async move {
            let mut w = self.state.write().await;
            if !w.docs.contains_key(file_id) {
                return Err(RagError::Registry(format!("unknown document '{file_id}'")));
            }
            w.members
                .entry(collection.to_string())
                .or_default()
                .insert(file_id.to_string());
            Ok(())
        })
    }

    fn remove_from_collection<'a>(
        &'a self,
        collection: &'a str,
        file_id: &'a str,
    ) -> RegistryFuture<'a, bool> {
        Box::pin(async move {
            let mut w = self.state.write().await;
            Ok(w.members
                .get_mut(collection)
                .map(|m| m.remove(file_id))
                .unwrap_or(false))
        })
    }

    fn collection_files<'a>(&'a self, collection: &'a str) -> RegistryFuture<'a, Vec<String>> {
        Box::pin(async move {
            Ok(self
                .state
                .read()
                .await
                .members
                .get(collection)
                .map(|m| m.iter().cloned().collect())
                .unwrap_or_default())
        })
    }

    fn collections_of<'a>(&'a self, file_id: &'a str) -> RegistryFuture<'a, Vec<String>> {
        Box::pin(async move {
            Ok(self
                .state
                .read()
                .await
                .members
                .iter()
                .filter(|(_, m)| m.contains(file_id))
                .map(|(c, _)| c.clone())
                .collect())
        })
    }
}

/* ------------------------------------------------------------------------- */
/* SQLite                                                                    */
/* ------------------------------------------------------------------------- */

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        file_id          TEXT PRIMARY KEY,
        file_name        TEXT NOT NULL,
        file_type        TEXT NOT NULL,
        extracted_text   TEXT,
        uploaded_by      TEXT,
        uploaded_at      TEXT NOT NULL,
        indexing_status  TEXT NOT NULL DEFAULT 'pending_index',
        last_error       TEXT,
        updated_at       TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS collection_files (
        collection  TEXT NOT NULL,
        file_id     TEXT NOT NULL REFERENCES documents(file_id) ON DELETE CASCADE,
        added_at    TEXT NOT NULL,
        PRIMARY KEY (collection, file_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(indexing_status)",
];

/// Registry persisted in SQLite with WAL journaling.
#[derive(Clone)]
pub struct SqliteRegistry {
    pool: SqlitePool,
}

impl SqliteRegistry {
    /// Opens (creating if missing) the database at `url` and applies the schema.
    ///
    /// Accepts `sqlite://path/to.db`, `sqlite:path`, or `sqlite::memory:`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, RagError> {
        if let Some(path) = file_path_of(url) {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| RagError::Registry(format!("create {parent:?}: {e}")))?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&pool).await?;
        }
        info!(url, "document registry ready");
        Ok(Self { pool })
    }

    /// Single-connection in-memory database.
    pub async fn in_memory() -> Result<Self, RagError> {
        Self::connect("sqlite::memory:", 1).await
    }
}

fn file_path_of(url: &str) -> Option<&str> {
    if url.contains(":memory:") {
        return None;
    }
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or(rest);
    (!path.is_empty()).then_some(path)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, RagError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| RagError::Registry(format!("bad timestamp '{s}': {e}")))
}

fn row_to_doc(row: &SqliteRow) -> Result<SourceDocument, RagError> {
    let status: String = row.try_get("indexing_status")?;
    let uploaded_at: String = row.try_get("uploaded_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    Ok(SourceDocument {
        file_id: row.try_get("file_id")?,
        file_name: row.try_get("file_name")?,
        file_type: row.try_get("file_type")?,
        extracted_text: row.try_get("extracted_text")?,
        uploaded_by: row.try_get("uploaded_by")?,
        uploaded_at: parse_ts(&uploaded_at)?,
        indexing_status: status.parse()?,
        last_error: row.try_get("last_error")?,
        updated_at: parse_ts(&updated_at)?,
    })
}

const SELECT_DOC: &str = "SELECT file_id, file_name, file_type, extracted_text, uploaded_by, \
     uploaded_at, indexing_status, last_error, updated_at FROM documents";

impl DocumentRegistry for SqliteRegistry {
    fn insert<'a>(&'a self, doc: SourceDocument) -> RegistryFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query(
                r#"
                INSERT INTO documents (file_id, file_name, file_type, extracted_text, uploaded_by,
                                       uploaded_at, indexing_status, last_error, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(file_id) DO UPDATE SET
                    file_name = excluded.file_name,
                    file_type = excluded.file_type,
                    extracted_text = excluded.extracted_text,
                    uploaded_by = excluded.uploaded_by,
                    uploaded_at = excluded.uploaded_at,
                    indexing_status = excluded.indexing_status,
                    last_error = excluded.last_error,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&doc.file_id)
            .bind(&doc.file_name)
            .bind(&doc.file_type)
            .bind(&doc.extracted_text)
            .bind(&doc.uploaded_by)
            .bind(doc.uploaded_at.to_rfc3339())
            .bind(doc.indexing_status.as_str())
            .bind(&doc.last_error)
            .bind(doc.updated_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
            debug!(file_id = %doc.file_id, "document stored");
            Ok(())
        })
    }

    fn get<'a>(&'a self, file_id: &'a str) -> RegistryFuture<'a, Option<SourceDocument>> {
        Box::pin(async move {
            let row = sqlx::query(&format!("{SELECT_DOC} WHERE file_id = ?"))
                .bind(file_id)
                .fetch_optional(&self.pool)
                .await?;
            row.as_ref().map(row_to_doc).transpose()
        })
    }

    fn list<'a>(&'a self) -> RegistryFuture<'a, Vec<SourceDocument>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!("{SELECT_DOC} ORDER BY file_id"))
                .fetch_all(&self.pool)
                .await?;
            rows.iter().map(row_to_doc).collect()
        })
    }

    fn list_by_status<'a>(
        &'a self,
        status: IndexingStatus,
    ) -> RegistryFuture<'a, Vec<SourceDocument>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "{SELECT_DOC} WHERE indexing_status = ? ORDER BY file_id"
            ))
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;
            rows.iter().map(row_to_doc).collect()
        })
    }

    fn set_status<'a>(
        &'a self,
        file_id: &'a str,
        status: IndexingStatus,
        last_error: Option<String>,
    ) -> RegistryFuture<'a, ()> {
        Box::pin(async move {
            let res = sqlx::query(
                "UPDATE documents SET indexing_status = ?, last_error = ?, updated_at = ? WHERE file_id = ?",
            )
            .bind(status.as_str())
            .bind(&last_error)
            .bind(Utc::now().to_rfc3339())
            .bind(file_id)
            .execute(&self.pool)
            .await?;
            if res.rows_affected() == 0 {
                return Err(RagError::Registry(format!("unknown document '{file_id}'")));
            }
            Ok(())
        })
    }

    fn add_to_collection<'a>(
        &'a self,
        collection: &'a str,
        file_id: &'a str,
    ) -> RegistryFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query(
                "INSERT OR IGNORE INTO collection_files (collection, file_id, added_at) VALUES (?, ?, ?)",
            )
            .bind(collection)
            .bind(file_id)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
            Ok(())
        })
    }

    fn remove_from_collection<'a>(
        &'a self,
        collection: &'a str,
        file_id: &'a str,
    ) -> RegistryFuture<'a, bool> {
        Box::pin(async move {
            let res = sqlx::query("DELETE FROM collection_files WHERE collection = ? AND file_id = ?")
                .bind(collection)
                .bind(file_id)
                .execute(&self.pool)
                .await?;
            Ok(res.rows_affected() > 0)
        })
    }

    fn collection_files<'a>(&'a self, collection: &'a str) -> RegistryFuture<'a, Vec<String>> {
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT file_id FROM collection_files WHERE collection = ? ORDER BY file_id",
            )
            .bind(collection)
            .fetch_all(&self.pool)
            .await?;
            rows.iter()
                .map(|r| r.try_get::<String, _>("file_id").map_err(RagError::from))
                .collect()
        })
    }

    fn collections_of<'a>(&'a self, file_id: &'a str) -> RegistryFuture<'a, Vec<String>> {
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT collection FROM collection_files WHERE file_id = ? ORDER BY collection",
            )
            .bind(file_id)
            .fetch_all(&self.pool)
            .await?;
            rows.iter()
                .map(|r| r.try_get::<String, _>("collection").map_err(RagError::from))
                .collect()
        })
    }
}

use std::future::Future;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::warn;

use crate::models::EventRecord;
use crate::utils;

const EVENTS_KEY: &str = "events";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("stored payload corrupt: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Uniform asynchronous persistence contract. The stored array is the full
/// authoritative source of truth and is fully replaced by each save; both
/// operations surface platform errors instead of swallowing them.
pub trait EventStore: Send + Sync {
    fn load(&self) -> impl Future<Output = Result<Vec<EventRecord>, StoreError>> + Send;
    fn save(&self, events: &[EventRecord]) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// In-process store; the fallback when no durable backend is usable, and the
/// test double.
#[derive(Default)]
pub struct MemoryStore {
    events: Mutex<Vec<EventRecord>>,
}

impl EventStore for MemoryStore {
    async fn load(&self) -> Result<Vec<EventRecord>, StoreError> {
        Ok(self.events.lock().await.clone())
    }

    async fn save(&self, events: &[EventRecord]) -> Result<(), StoreError> {
        *self.events.lock().await = events.to_vec();
        Ok(())
    }
}

/// Durable store: one key-value table, the record array as a JSON payload
/// column. Connection work runs off the async thread.
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        let path = path.to_path_buf();
        utils::ensure_parent(&path);
        let conn = Connection::open(&path)?;
        init_schema(&conn)?;
        Ok(Self { path })
    }

    pub fn open_default() -> rusqlite::Result<Self> {
        Self::open(&utils::database_path())
    }
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS kv(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_utc TEXT NOT NULL
        );",
    )
}

impl EventStore for SqliteStore {
    async fn load(&self) -> Result<Vec<EventRecord>, StoreError> {
        let path = self.path.clone();
        let payload = tokio::task::spawn_blocking(move || -> rusqlite::Result<Option<String>> {
            let conn = Connection::open(&path)?;
            init_schema(&conn)?;
            conn.query_row(
                "SELECT value FROM kv WHERE key = ?1",
                params![EVENTS_KEY],
                |row| row.get(0),
            )
            .optional()
        })
        .await
        .map_err(|err| StoreError::Backend(err.to_string()))?
        .map_err(|err| StoreError::Backend(err.to_string()))?;

        match payload {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    async fn save(&self, events: &[EventRecord]) -> Result<(), StoreError> {
        let payload = serde_json::to_string(events)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> rusqlite::Result<()> {
            let conn = Connection::open(&path)?;
            init_schema(&conn)?;
            let now = chrono::Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO kv (key, value, updated_utc) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                   value = excluded.value,
                   updated_utc = excluded.updated_utc",
                params![EVENTS_KEY, payload, now],
            )?;
            Ok(())
        })
        .await
        .map_err(|err| StoreError::Backend(err.to_string()))?
        .map_err(|err| StoreError::Backend(err.to_string()))
    }
}

/// The adapter the host receives: capability detection runs once at startup,
/// the selected backend is injected into the pipeline and never re-checked
/// per call.
pub enum StoreHandle {
    Sqlite(SqliteStore),
    Memory(MemoryStore),
}

impl StoreHandle {
    pub fn detect(path: &Path) -> Self {
        match SqliteStore::open(path) {
            Ok(store) => StoreHandle::Sqlite(store),
            Err(err) => {
                warn!(error = %err, "sqlite store unavailable, falling back to in-memory");
                StoreHandle::Memory(MemoryStore::default())
            }
        }
    }

    pub fn is_durable(&self) -> bool {
        matches!(self, StoreHandle::Sqlite(_))
    }
}

impl EventStore for StoreHandle {
    async fn load(&self) -> Result<Vec<EventRecord>, StoreError> {
        match self {
            StoreHandle::Sqlite(store) => store.load().await,
            StoreHandle::Memory(store) => store.load().await,
        }
    }

    async fn save(&self, events: &[EventRecord]) -> Result<(), StoreError> {
        match self {
            StoreHandle::Sqlite(store) => store.save(events).await,
            StoreHandle::Memory(store) => store.save(events).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str, start_ts: Option<i64>) -> EventRecord {
        EventRecord {
            id: id.to_string(),
            title: format!("event {id}"),
            url: format!("https://www.facebook.com/events/{id}"),
            date: String::new(),
            time: String::new(),
            time_text: String::new(),
            start_ts,
            location: String::new(),
            interested_count: 0,
            going_count: 0,
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn memory_store_roundtrip_replaces_previous_array() {
        let store = MemoryStore::default();
        store
            .save(&[sample("11111", Some(10))])
            .await
            .expect("first save");
        store
            .save(&[sample("22222", None), sample("33333", Some(5))])
            .await
            .expect("second save");

        let loaded = store.load().await.expect("load");
        assert_eq!(loaded.len(), 2, "save fully replaces, never merges");
        assert_eq!(loaded[0].id, "22222");
    }

    #[tokio::test]
    async fn sqlite_store_roundtrip() {
        let path = std::env::temp_dir().join(format!(
            "event-map-test-{}-{:?}.sqlite",
            std::process::id(),
            std::thread::current().id()
        ));
        let _ = std::fs::remove_file(&path);

        let store = SqliteStore::open(&path).expect("open sqlite store");
        assert!(store.load().await.expect("empty load").is_empty());

        store
            .save(&[sample("44444", Some(99)), sample("55555", None)])
            .await
            .expect("save");
        let loaded = store.load().await.expect("load");
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, "44444");
        assert_eq!(loaded[0].start_ts, Some(99));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn detect_falls_back_to_memory_for_unusable_path() {
        let handle = StoreHandle::detect(Path::new("/dev/null/not-a-directory/db.sqlite"));
        assert!(!handle.is_durable());
        assert!(handle.load().await.expect("memory load").is_empty());
    }
}

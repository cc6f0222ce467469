//! Local history of completed exchanges.
//!
//! Provides [`HistoryStore`], an append-only SQLite table of prompt/reply
//! pairs capped at [`RETENTION_CAP`] rows. Every mutation republishes the
//! full newest-first listing to all observers.
//!
//! The statements are kept under `sql/` and compiled in with `include_str!`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use futures::Stream;
use futures::stream;
use rusqlite::{Connection, Row, params};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::attachment::{AttachmentMeta, DEFAULT_MIME_TYPE};
use crate::error::{Error, Result};
use crate::observability::{HISTORY_INSERTS, HISTORY_STORAGE_ERRORS, HISTORY_TRIMMED_ROWS};
use crate::utils::time::now_epoch_ms;

const SQL_SCHEMA: &str = include_str!("../sql/schema.sql");
const SQL_DROP: &str = include_str!("../sql/drop.sql");
const SQL_INSERT: &str = include_str!("../sql/insert.sql");
const SQL_TRIM: &str = include_str!("../sql/trim.sql");
const SQL_SELECT_ALL: &str = include_str!("../sql/select_all.sql");
const SQL_DELETE_BY_ID: &str = include_str!("../sql/delete_by_id.sql");
const SQL_CLEAR: &str = include_str!("../sql/clear.sql");

/// Version stamped into `PRAGMA user_version`; any other value recreates the table.
pub const SCHEMA_VERSION: i64 = 1;

/// Maximum number of entries kept.
pub const RETENTION_CAP: usize = 100;

/// Title shown for entries that did not come from a scenario.
const UNTITLED: &str = "Chat";

/// Length of [`HistoryEntry::preview`] before truncation.
const PREVIEW_CHARS: usize = 160;

/// A persisted exchange. Entries are never modified after insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Row id, unique and ascending by insertion.
    pub id: i64,
    /// Title of the scenario the prompt came from, if any.
    pub scenario_title: Option<String>,
    /// Prompt as sent.
    pub prompt: String,
    /// Reply text as shown to the user.
    pub response: String,
    /// Creation time in milliseconds since the Unix epoch.
    pub created_at_epoch_ms: i64,
    /// Attachment descriptor, if a file was sent.
    pub attachment: Option<AttachmentMeta>,
}

impl HistoryEntry {
    /// The scenario title, or `Chat` when there is none.
    pub fn title(&self) -> &str {
        self.scenario_title
            .as_deref()
            .filter(|title| !title.trim().is_empty())
            .unwrap_or(UNTITLED)
    }

    /// The first 160 characters of the prompt, with `…` when cut.
    pub fn preview(&self) -> String {
        let mut chars = self.prompt.chars();
        let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
        if chars.next().is_some() {
            format!("{head}…")
        } else {
            head
        }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let attachment_name: Option<String> = row.get(5)?;
        let attachment_mime: Option<String> = row.get(6)?;
        let attachment_size: Option<i64> = row.get(7)?;
        let attachment = attachment_name.map(|name| AttachmentMeta {
            name,
            mime_type: attachment_mime.unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
            size_bytes: attachment_size.and_then(|size| u64::try_from(size).ok()),
        });
        Ok(Self {
            id: row.get(0)?,
            scenario_title: row.get(1)?,
            prompt: row.get(2)?,
            response: row.get(3)?,
            created_at_epoch_ms: row.get(4)?,
            attachment,
        })
    }
}

/// An exchange about to be recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHistoryEntry {
    /// Title of the scenario the prompt came from, if any.
    pub scenario_title: Option<String>,
    /// Prompt as sent.
    pub prompt: String,
    /// Reply text as shown to the user.
    pub response: String,
    /// Creation time in milliseconds since the Unix epoch.
    pub created_at_epoch_ms: i64,
    /// Attachment descriptor, if a file was sent.
    pub attachment: Option<AttachmentMeta>,
}

impl NewHistoryEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(prompt: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            scenario_title: None,
            prompt: prompt.into(),
            response: response.into(),
            created_at_epoch_ms: now_epoch_ms(),
            attachment: None,
        }
    }

    /// Sets the scenario title.
    pub fn with_scenario_title(mut self, title: Option<String>) -> Self {
        self.scenario_title = title;
        self
    }

    /// Sets the attachment descriptor.
    pub fn with_attachment(mut self, attachment: Option<AttachmentMeta>) -> Self {
        self.attachment = attachment;
        self
    }

    /// Overrides the creation timestamp.
    pub fn at(mut self, created_at_epoch_ms: i64) -> Self {
        self.created_at_epoch_ms = created_at_epoch_ms;
        self
    }
}

struct Inner {
    conn: Mutex<Connection>,
    entries: watch::Sender<Vec<HistoryEntry>>,
}

/// SQLite-backed history store.
///
/// Wraps a `rusqlite::Connection` in a `Mutex`; clones share the connection
/// and the observer channel. Writes run on the blocking pool.
#[derive(Clone)]
pub struct HistoryStore {
    inner: Arc<Inner>,
}

impl HistoryStore {
    /// Open or create a history database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Create an in-memory database (useful for testing).
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        let snapshot = select_all(&conn)?;
        let (entries, _) = watch::channel(snapshot);
        Ok(Self {
            inner: Arc::new(Inner {
                conn: Mutex::new(conn),
                entries,
            }),
        })
    }

    /// Record an exchange and trim the table to the newest [`RETENTION_CAP`]
    /// rows, atomically. Returns the new row id.
    pub async fn insert(&self, entry: NewHistoryEntry) -> Result<i64> {
        self.write(move |conn| {
            let tx = conn.transaction()?;
            let (attachment_name, attachment_mime, attachment_size) = match &entry.attachment {
                Some(meta) => (
                    Some(meta.name.as_str()),
                    Some(meta.mime_type.as_str()),
                    meta.size_bytes.and_then(|size| i64::try_from(size).ok()),
                ),
                None => (None, None, None),
            };
            tx.execute(
                SQL_INSERT,
                params![
                    entry.scenario_title,
                    entry.prompt,
                    entry.response,
                    entry.created_at_epoch_ms,
                    attachment_name,
                    attachment_mime,
                    attachment_size,
                ],
            )?;
            let id = tx.last_insert_rowid();
            let trimmed = tx.execute(SQL_TRIM, params![RETENTION_CAP as i64])?;
            tx.commit()?;

            HISTORY_INSERTS.click();
            if trimmed > 0 {
                HISTORY_TRIMMED_ROWS.count(trimmed as u64);
            }
            Ok(id)
        })
        .await
    }

    /// Delete one entry. Returns whether a row was removed.
    pub async fn delete_by_id(&self, id: i64) -> Result<bool> {
        self.write(move |conn| Ok(conn.execute(SQL_DELETE_BY_ID, params![id])? > 0))
            .await
    }

    /// Delete every entry. Returns the number of rows removed.
    pub async fn clear(&self) -> Result<usize> {
        self.write(|conn| Ok(conn.execute(SQL_CLEAR, [])?)).await
    }

    /// The current entries, newest first.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.inner.entries.borrow().clone()
    }

    /// The entry with `id`, if it is still stored.
    pub fn get(&self, id: i64) -> Option<HistoryEntry> {
        self.inner
            .entries
            .borrow()
            .iter()
            .find(|entry| entry.id == id)
            .cloned()
    }

    /// A receiver that always holds the newest-first listing.
    pub fn subscribe(&self) -> watch::Receiver<Vec<HistoryEntry>> {
        self.inner.entries.subscribe()
    }

    /// A stream that yields the current listing, then a fresh listing after
    /// every insert or delete. Ends when the store is dropped.
    pub fn observe_all(&self) -> impl Stream<Item = Vec<HistoryEntry>> + Send + 'static {
        let mut rx = self.subscribe();
        rx.mark_changed();
        stream::unfold(rx, |mut rx| async move {
            rx.changed().await.ok()?;
            let snapshot = rx.borrow_and_update().clone();
            Some((snapshot, rx))
        })
    }

    /// Run a mutation on the blocking pool, then publish the new listing
    /// while still holding the connection so observers see writes in order.
    async fn write<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = inner
                .conn
                .lock()
                .map_err(|_| Error::storage("history connection lock poisoned", None))?;
            let out = op(&mut conn)?;
            let snapshot = select_all(&conn)?;
            inner.entries.send_replace(snapshot);
            Ok(out)
        })
        .await
        .map_err(|err| {
            Error::storage(format!("history task failed: {err}"), Some(Box::new(err)))
        })
        .and_then(|result| result);
        if result.is_err() {
            HISTORY_STORAGE_ERRORS.click();
        }
        result
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version != SCHEMA_VERSION {
        if version != 0 {
            tracing::info!(
                found = version,
                expected = SCHEMA_VERSION,
                "history schema version mismatch; recreating"
            );
        }
        conn.execute_batch(SQL_DROP)?;
    }
    conn.execute_batch(SQL_SCHEMA)?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

fn select_all(conn: &Connection) -> Result<Vec<HistoryEntry>> {
    let mut stmt = conn.prepare_cached(SQL_SELECT_ALL)?;
    let rows = stmt.query_map([], HistoryEntry::from_row)?;
    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }
    Ok(entries)
}

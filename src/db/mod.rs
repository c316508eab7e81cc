mod external;
mod launches;
mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, Row};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::models::*;
use crate::query::{EntityKind, FetchSpec, LiveQuery, Subscriptions};

/// Handle to the launch store.
///
/// Cheap to clone; clones share one connection and one set of live subscriptions. All
/// writes go through the connection mutex, which serializes them.
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    subscriptions: Arc<Subscriptions>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        tracing::info!("Opened launch store at {}", path.display());
        Self::from_connection(conn)
    }

    pub fn open_default() -> Result<Self> {
        let config = Config::from_env()?;
        Self::open(config.database_path)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            subscriptions: Arc::new(Subscriptions::default()),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        schema::run_migrations(&conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Run `f` in one transaction and commit it, or roll everything back.
    ///
    /// SQLite errors raised inside `f` surface as `PersistenceWriteFailed`. Live queries
    /// over `changed` are invalidated after the commit and before this returns.
    fn write<T>(
        &self,
        operation: &'static str,
        changed: &[EntityKind],
        f: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(StoreError::write_failed(operation))?;

        let value = match f(&*tx) {
            Ok(value) => value,
            Err(e) => {
                let e = match e {
                    StoreError::Query(source) => StoreError::PersistenceWriteFailed { operation, source },
                    other => other,
                };
                tracing::warn!("Rolled back {}: {}", operation, e);
                return Err(e);
            }
        };

        tx.commit().map_err(|source| {
            tracing::warn!("Commit failed for {}: {}", operation, source);
            StoreError::PersistenceWriteFailed { operation, source }
        })?;
        drop(conn);

        for kind in changed {
            self.subscriptions.invalidate(*kind);
        }
        tracing::debug!("Committed {}", operation);
        Ok(value)
    }

    pub(crate) fn subscriptions(&self) -> &Subscriptions {
        &self.subscriptions
    }

    /// Bind `spec` to a live result sequence.
    pub fn live(&self, spec: FetchSpec) -> Result<LiveQuery> {
        LiveQuery::subscribe(self, spec)
    }

    /// Number of live sequences still held by a consumer.
    pub fn live_query_count(&self) -> usize {
        self.subscriptions.len()
    }

    // ============================================================
    // List operations
    // ============================================================

    pub fn create_list(&self, input: CreateListInput) -> Result<LaunchList> {
        if input.title.is_empty() {
            return Err(StoreError::InvalidInput("list title must not be empty".to_string()));
        }

        let title = input.title.clone();
        // A new list has no members yet.
        let result = self.write("list", &[], |conn| {
            let id = Uuid::new_v4();
            let now = Utc::now();
            conn.execute(
                "INSERT INTO lists (id, title, created_at) VALUES (?, ?, ?)",
                (id.to_string(), &input.title, now.to_rfc3339()),
            )?;
            Ok(LaunchList {
                id,
                title: input.title,
                created_at: now,
            })
        });

        match result {
            Err(StoreError::PersistenceWriteFailed { source, .. }) if is_unique_violation(&source) => {
                Err(StoreError::DuplicateListTitle(title))
            }
            other => other,
        }
    }

    pub fn get_all_lists(&self) -> Result<Vec<LaunchList>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, title, created_at FROM lists ORDER BY title")?;
        let lists = stmt
            .query_map([], list_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(lists)
    }

    pub fn get_list(&self, id: Uuid) -> Result<Option<LaunchList>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, title, created_at FROM lists WHERE id = ?")?;
        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(list_from_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn get_list_by_title(&self, title: &str) -> Result<Option<LaunchList>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, title, created_at FROM lists WHERE title = ?")?;
        let mut rows = stmt.query([title])?;
        match rows.next()? {
            Some(row) => Ok(Some(list_from_row(row)?)),
            None => Ok(None),
        }
    }

    // ============================================================
    // Tag operations
    // ============================================================

    /// Return the tag titled exactly `title`, creating it if none exists.
    ///
    /// The title is taken as-is; `"falcon"` and `" falcon"` are different tags.
    pub fn resolve_tag(&self, title: &str) -> Result<Tag> {
        // An unattached tag matches no launch.
        self.write("tag", &[], |conn| resolve_tag_in(conn, title))
    }

    pub fn get_tag_by_title(&self, title: &str) -> Result<Option<Tag>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, title FROM tags WHERE title = ?")?;
        let mut rows = stmt.query([title])?;
        match rows.next()? {
            Some(row) => Ok(Some(tag_from_row(row)?)),
            None => Ok(None),
        }
    }

    pub fn get_all_tags(&self) -> Result<Vec<Tag>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, title FROM tags ORDER BY title")?;
        let tags = stmt
            .query_map([], tag_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tags)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            subscriptions: self.subscriptions.clone(),
        }
    }
}

/// Fetch-or-create inside an open transaction.
///
/// The insert is a no-op when the title already exists, so two racing callers both end
/// up reading the single winning row.
fn resolve_tag_in(conn: &Connection, title: &str) -> Result<Tag> {
    if title.is_empty() {
        return Err(StoreError::InvalidInput("tag title must not be empty".to_string()));
    }

    let candidate = Uuid::new_v4();
    let inserted = conn.execute(
        "INSERT INTO tags (id, title) VALUES (?, ?) ON CONFLICT(title) DO NOTHING",
        (candidate.to_string(), title),
    )?;
    if inserted == 0 {
        tracing::debug!("Reusing existing tag {:?}", title);
    }

    let tag = conn.query_row("SELECT id, title FROM tags WHERE title = ?", [title], tag_from_row)?;
    Ok(tag)
}

fn is_unique_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::ConstraintViolation
    )
}

fn list_from_row(row: &Row<'_>) -> rusqlite::Result<LaunchList> {
    Ok(LaunchList {
        id: uuid_at(row, 0)?,
        title: row.get(1)?,
        created_at: datetime_at(row, 2)?,
    })
}

fn tag_from_row(row: &Row<'_>) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: uuid_at(row, 0)?,
        title: row.get(1)?,
    })
}

fn conversion_error<E>(idx: usize, error: E) -> rusqlite::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, error.into())
}

fn uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn datetime_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<chrono::DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    chrono::DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

//! Errors surfaced at the store boundary.

use thiserror::Error;

/// Store errors.
///
/// Write failures never leave partial state behind: every mutation runs in a single
/// transaction that is rolled back before the error is returned.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to persist {operation}: {source}")]
    PersistenceWriteFailed {
        operation: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("A list titled {0:?} already exists")]
    DuplicateListTitle(String),

    #[error("Query failed: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn write_failed(operation: &'static str) -> impl FnOnce(rusqlite::Error) -> Self {
        move |source| Self::PersistenceWriteFailed { operation, source }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

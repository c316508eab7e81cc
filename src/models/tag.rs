use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A deduplicated text label attachable to launches.
///
/// Tags are never created directly; [`crate::db::Database::resolve_tag`] returns the
/// existing tag for a title or creates it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    pub title: String,
}

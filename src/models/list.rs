use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user-named collection of launches.
///
/// Titles are unique across the store, so a title identifies at most one list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchList {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a new list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateListInput {
    pub title: String,
}

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::list::LaunchList;
use super::tag::Tag;

/// A rocket-launch event owned by the local store.
///
/// Launches are always created *into* a list. After creation only `is_viewed` and the
/// list/tag memberships change; name, notes, date and launchpad are fixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Launch {
    pub id: Uuid,
    pub name: Option<String>,
    pub notes: Option<String>,
    pub launch_date: Option<DateTime<Utc>>,
    pub launchpad: Option<String>,
    pub is_viewed: bool,
    /// Opaque image bytes. Empty when the launch was created without one.
    pub attachment: Attachment,
    pub created_at: DateTime<Utc>,
}

/// Opaque binary attachment, typically an encoded image.
///
/// "No attachment" is the empty blob, never an absent value.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attachment(Vec<u8>);

impl Attachment {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for Attachment {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<Option<Vec<u8>>> for Attachment {
    fn from(bytes: Option<Vec<u8>>) -> Self {
        bytes.map(Self).unwrap_or_default()
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Attachment({} bytes)", self.0.len())
    }
}

/// Input for creating a new launch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateLaunchInput {
    pub name: Option<String>,
    pub notes: Option<String>,
    pub launch_date: Option<DateTime<Utc>>,
    pub launchpad: Option<String>,
    /// Already-encoded attachment bytes. `None` is stored as an empty blob.
    #[serde(default)]
    pub attachment: Option<Vec<u8>>,
    /// Tag titles, resolved with fetch-or-create semantics.
    #[serde(default)]
    pub tag_titles: Vec<String>,
    /// The list the launch is created into.
    pub list_id: Uuid,
}

/// A launch together with its tags and list memberships.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchDetail {
    #[serde(flatten)]
    pub launch: Launch,
    /// Ordered by title.
    pub tags: Vec<Tag>,
    /// Ordered by title.
    pub lists: Vec<LaunchList>,
}

/// Split the creation form's comma-separated tag field into titles.
///
/// Empty pieces are dropped; pieces are kept untrimmed, so `"a, b"` yields `"a"` and `" b"`.
pub fn parse_tag_titles(input: &str) -> Vec<String> {
    input
        .split(',')
        .filter(|piece| !piece.is_empty())
        .map(str::to_string)
        .collect()
}

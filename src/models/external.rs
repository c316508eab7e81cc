use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::launch::Launch;

/// Discussion platforms shown on the detail screen, in display order.
pub const DISCUSSION_KINDS: [&str; 3] = ["launch", "campaign", "recovery"];

/// A launch record decoded from the external feed.
///
/// The store never writes to these. `is_viewed` is a local overlay: it is filled in from
/// the matching [`ExternalLaunchProxy`] when a fetched feed is overlaid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalLaunch {
    /// Stable identity across feed refreshes.
    pub flight_number: i64,
    pub name: Option<String>,
    #[serde(alias = "details")]
    pub notes: Option<String>,
    /// Preformatted launch date as delivered by the feed.
    #[serde(rename = "date_utc")]
    pub launch_date_utc: Option<String>,
    #[serde(default)]
    pub is_viewed: bool,
    #[serde(default)]
    pub links: Option<ExternalLinks>,
}

/// Media and discussion links of an external launch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalLinks {
    pub webcast: Option<String>,
    /// Mission patch image URLs keyed by size ("small", "large").
    #[serde(default)]
    pub patch: BTreeMap<String, Option<String>>,
    /// Discussion URLs keyed by platform ("launch", "campaign", "recovery", ...).
    #[serde(default)]
    pub reddit: BTreeMap<String, Option<String>>,
}

impl ExternalLaunch {
    pub fn webcast_url(&self) -> Option<&str> {
        self.links.as_ref()?.webcast.as_deref()
    }

    /// Patch image URL for the given size, e.g. `"small"`.
    pub fn patch_image(&self, size: &str) -> Option<&str> {
        self.links.as_ref()?.patch.get(size)?.as_deref()
    }

    /// Non-empty discussion links in display order.
    pub fn discussion_links(&self) -> Vec<(&'static str, &str)> {
        let Some(links) = self.links.as_ref() else {
            return Vec::new();
        };

        DISCUSSION_KINDS
            .iter()
            .filter_map(|kind| {
                links
                    .reddit
                    .get(*kind)
                    .and_then(|url| url.as_deref())
                    .filter(|url| !url.is_empty())
                    .map(|url| (*kind, url))
            })
            .collect()
    }
}

/// Durable local stand-in for an external launch.
///
/// Created the first time an external launch is favorited or marked viewed. It holds the
/// local overlay (viewed state, list membership) and a snapshot of the feed fields as of
/// the last fetch, so the list view survives the record dropping out of the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalLaunchProxy {
    pub flight_number: i64,
    pub name: Option<String>,
    pub notes: Option<String>,
    pub launch_date_utc: Option<String>,
    pub is_viewed: bool,
    pub links: Option<ExternalLinks>,
    pub first_seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExternalLaunchProxy {
    /// Rebuild the feed record from the stored snapshot, overlay included.
    pub fn to_external(&self) -> ExternalLaunch {
        ExternalLaunch {
            flight_number: self.flight_number,
            name: self.name.clone(),
            notes: self.notes.clone(),
            launch_date_utc: self.launch_date_utc.clone(),
            is_viewed: self.is_viewed,
            links: self.links.clone(),
        }
    }
}

/// What a "favorite" action points at.
#[derive(Debug, Clone, Copy)]
pub enum FavoriteTarget<'a> {
    Local(Uuid),
    External(&'a ExternalLaunch),
}

/// One row of a list's unified view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum FavoriteEntry {
    Local(Launch),
    External(ExternalLaunchProxy),
}

impl FavoriteEntry {
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Local(launch) => launch.name.as_deref(),
            Self::External(proxy) => proxy.name.as_deref(),
        }
    }

    pub fn is_viewed(&self) -> bool {
        match self {
            Self::Local(launch) => launch.is_viewed,
            Self::External(proxy) => proxy.is_viewed,
        }
    }

    /// External dates are parsed from the feed string; an unparsable one counts as absent.
    pub fn launch_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Local(launch) => launch.launch_date,
            Self::External(proxy) => proxy
                .launch_date_utc
                .as_deref()
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_record() -> ExternalLaunch {
        serde_json::from_str(
            r#"{
                "flight_number": 65,
                "name": "Starlink-1",
                "details": "First operational Starlink batch",
                "date_utc": "2019-11-11T14:56:00.000Z",
                "links": {
                    "webcast": "https://youtu.be/pIDuv0Ta0XQ",
                    "patch": { "small": "https://images2.imgbox.com/small.png", "large": null },
                    "reddit": {
                        "campaign": "https://reddit.com/r/spacex/campaign",
                        "launch": "https://reddit.com/r/spacex/launch",
                        "media": null,
                        "recovery": ""
                    }
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn decodes_feed_shape() {
        let launch = feed_record();
        assert_eq!(launch.flight_number, 65);
        assert_eq!(launch.notes.as_deref(), Some("First operational Starlink batch"));
        assert_eq!(launch.launch_date_utc.as_deref(), Some("2019-11-11T14:56:00.000Z"));
        assert!(!launch.is_viewed);
    }

    #[test]
    fn link_accessors() {
        let launch = feed_record();
        assert_eq!(launch.webcast_url(), Some("https://youtu.be/pIDuv0Ta0XQ"));
        assert_eq!(launch.patch_image("small"), Some("https://images2.imgbox.com/small.png"));
        assert_eq!(launch.patch_image("large"), None);
    }

    #[test]
    fn discussion_links_skip_empty_and_keep_order() {
        let launch = feed_record();
        assert_eq!(
            launch.discussion_links(),
            vec![
                ("launch", "https://reddit.com/r/spacex/launch"),
                ("campaign", "https://reddit.com/r/spacex/campaign"),
            ]
        );
    }

    #[test]
    fn record_without_links() {
        let launch: ExternalLaunch =
            serde_json::from_str(r#"{ "flight_number": 1, "name": null, "notes": null, "date_utc": null }"#)
                .unwrap();
        assert_eq!(launch.webcast_url(), None);
        assert!(launch.discussion_links().is_empty());
    }
}

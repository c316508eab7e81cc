use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row};
use uuid::Uuid;

use super::{datetime_at, list_from_row, resolve_tag_in, tag_from_row, uuid_at, Database};
use crate::error::{Result, StoreError};
use crate::models::*;
use crate::query::{EntityKind, FetchSpec, RankedLaunch};

const LAUNCH_COLUMNS: &str =
    "l.id, l.name, l.notes, l.launch_date, l.launchpad, l.is_viewed, l.attachment, l.created_at, l.rowid";

impl Database {
    // ============================================================
    // Launch mutations
    // ============================================================

    /// Create a launch into `input.list_id`, resolving its tags, in one transaction.
    ///
    /// Fails with `NotFound` if the list does not exist. On any failure nothing is
    /// written, tags included, and `input` can be resubmitted as-is.
    pub fn create_launch(&self, input: &CreateLaunchInput) -> Result<Launch> {
        let launch = self.write(
            "launch",
            &[EntityKind::Launch],
            |conn| {
                require_list(conn, input.list_id)?;

                let id = Uuid::new_v4();
                let now = Utc::now();
                // Stored at millisecond precision.
                let launch_date = input
                    .launch_date
                    .and_then(|d| DateTime::<Utc>::from_timestamp_millis(d.timestamp_millis()));
                let attachment = Attachment::from(input.attachment.clone());

                conn.execute(
                    "INSERT INTO launches (id, name, notes, launch_date, launchpad, is_viewed, attachment, created_at)
                     VALUES (?, ?, ?, ?, ?, 0, ?, ?)",
                    (
                        id.to_string(),
                        &input.name,
                        &input.notes,
                        launch_date.map(|d| d.timestamp_millis()),
                        &input.launchpad,
                        attachment.as_bytes(),
                        now.to_rfc3339(),
                    ),
                )?;

                conn.execute(
                    "INSERT INTO launch_lists (launch_id, list_id) VALUES (?, ?)",
                    (id.to_string(), input.list_id.to_string()),
                )?;

                for title in &input.tag_titles {
                    let tag = resolve_tag_in(conn, title)?;
                    conn.execute(
                        "INSERT INTO launch_tags (launch_id, tag_id) VALUES (?, ?)
                         ON CONFLICT(launch_id, tag_id) DO NOTHING",
                        (id.to_string(), tag.id.to_string()),
                    )?;
                }

                Ok(Launch {
                    id,
                    name: input.name.clone(),
                    notes: input.notes.clone(),
                    launch_date,
                    launchpad: input.launchpad.clone(),
                    is_viewed: false,
                    attachment,
                    created_at: now,
                })
            },
        )?;

        tracing::info!(launch_id = %launch.id, list_id = %input.list_id, "Created launch");
        Ok(launch)
    }

    /// Mark a launch as viewed. Calling it on an already-viewed launch writes nothing.
    pub fn mark_viewed(&self, id: Uuid) -> Result<Launch> {
        let existing = self
            .get_launch(id)?
            .ok_or_else(|| StoreError::not_found("Launch", id))?;

        if existing.is_viewed {
            tracing::debug!(launch_id = %id, "Launch already viewed");
            return Ok(existing);
        }

        self.write("viewed flag", &[EntityKind::Launch], |conn| {
            conn.execute(
                "UPDATE launches SET is_viewed = 1 WHERE id = ?",
                [id.to_string()],
            )?;
            Ok(())
        })?;

        Ok(Launch {
            is_viewed: true,
            ..existing
        })
    }

    /// Add a launch to a list. Returns `false` if it was already a member.
    pub fn add_to_list(&self, launch_id: Uuid, list_id: Uuid) -> Result<bool> {
        self.write("list membership", &[EntityKind::Launch], |conn| {
            require_launch(conn, launch_id)?;
            require_list(conn, list_id)?;
            let added = conn.execute(
                "INSERT INTO launch_lists (launch_id, list_id) VALUES (?, ?)
                 ON CONFLICT(launch_id, list_id) DO NOTHING",
                (launch_id.to_string(), list_id.to_string()),
            )?;
            Ok(added > 0)
        })
    }

    /// Tag a launch, resolving the tag by title. Tagging twice is a no-op.
    pub fn attach_tag(&self, launch_id: Uuid, title: &str) -> Result<Tag> {
        self.write(
            "tag membership",
            &[EntityKind::Launch],
            |conn| {
                require_launch(conn, launch_id)?;
                let tag = resolve_tag_in(conn, title)?;
                conn.execute(
                    "INSERT INTO launch_tags (launch_id, tag_id) VALUES (?, ?)
                     ON CONFLICT(launch_id, tag_id) DO NOTHING",
                    (launch_id.to_string(), tag.id.to_string()),
                )?;
                Ok(tag)
            },
        )
    }

    // ============================================================
    // Launch reads
    // ============================================================

    pub fn get_launch(&self, id: Uuid) -> Result<Option<Launch>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM launches l WHERE l.id = ?",
            LAUNCH_COLUMNS
        ))?;

        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(ranked_from_row(row)?.launch)),
            None => Ok(None),
        }
    }

    pub fn get_launch_detail(&self, id: Uuid) -> Result<Option<LaunchDetail>> {
        let Some(launch) = self.get_launch(id)? else {
            return Ok(None);
        };

        let tags = self.tags_for_launch(id)?;
        let lists = self.lists_for_launch(id)?;

        Ok(Some(LaunchDetail {
            launch,
            tags,
            lists,
        }))
    }

    /// Run `spec` once.
    pub fn fetch_launches(&self, spec: &FetchSpec) -> Result<Vec<Launch>> {
        Ok(self
            .fetch_ranked(spec)?
            .into_iter()
            .map(|row| row.launch)
            .collect())
    }

    pub(crate) fn fetch_ranked(&self, spec: &FetchSpec) -> Result<Vec<RankedLaunch>> {
        let conn = self.lock()?;
        fetch_ranked_in(&conn, spec)
    }

    /// Every member of a list, viewed or not, in insertion order.
    pub fn launches_in_list(&self, list_id: Uuid) -> Result<Vec<Launch>> {
        let mut spec = FetchSpec::all();
        spec.filter.list_id = Some(list_id);
        self.fetch_launches(&spec)
    }

    pub fn lists_for_launch(&self, launch_id: Uuid) -> Result<Vec<LaunchList>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT li.id, li.title, li.created_at
             FROM lists li JOIN launch_lists ll ON ll.list_id = li.id
             WHERE ll.launch_id = ? ORDER BY li.title",
        )?;

        let lists = stmt
            .query_map([launch_id.to_string()], list_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(lists)
    }

    pub fn tags_for_launch(&self, launch_id: Uuid) -> Result<Vec<Tag>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT t.id, t.title
             FROM tags t JOIN launch_tags lt ON lt.tag_id = t.id
             WHERE lt.launch_id = ? ORDER BY t.title",
        )?;

        let tags = stmt
            .query_map([launch_id.to_string()], tag_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(tags)
    }

    /// Union of the tags of every launch in a list.
    pub fn tags_in_list(&self, list_id: Uuid) -> Result<Vec<Tag>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT t.id, t.title
             FROM tags t
             JOIN launch_tags lt ON lt.tag_id = t.id
             JOIN launch_lists ll ON ll.launch_id = lt.launch_id
             WHERE ll.list_id = ? ORDER BY t.title",
        )?;

        let tags = stmt
            .query_map([list_id.to_string()], tag_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(tags)
    }
}

pub(super) fn fetch_ranked_in(conn: &Connection, spec: &FetchSpec) -> Result<Vec<RankedLaunch>> {
    let (clauses, params) = spec.to_sql();
    let sql = format!("SELECT {} FROM launches l{}", LAUNCH_COLUMNS, clauses);

    let mut stmt = conn.prepare(&sql)?;
    let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(params_ref.as_slice(), ranked_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

pub(super) fn require_list(conn: &Connection, list_id: Uuid) -> Result<()> {
    let count: i32 = conn.query_row(
        "SELECT COUNT(*) FROM lists WHERE id = ?",
        [list_id.to_string()],
        |row| row.get(0),
    )?;
    if count == 0 {
        return Err(StoreError::not_found("List", list_id));
    }
    Ok(())
}

fn require_launch(conn: &Connection, launch_id: Uuid) -> Result<()> {
    let count: i32 = conn.query_row(
        "SELECT COUNT(*) FROM launches WHERE id = ?",
        [launch_id.to_string()],
        |row| row.get(0),
    )?;
    if count == 0 {
        return Err(StoreError::not_found("Launch", launch_id));
    }
    Ok(())
}

fn ranked_from_row(row: &Row<'_>) -> rusqlite::Result<RankedLaunch> {
    Ok(RankedLaunch {
        launch: Launch {
            id: uuid_at(row, 0)?,
            name: row.get(1)?,
            notes: row.get(2)?,
            launch_date: row
                .get::<_, Option<i64>>(3)?
                .map(|millis| {
                    DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
                        rusqlite::Error::FromSqlConversionFailure(
                            3,
                            Type::Integer,
                            format!("launch date {} out of range", millis).into(),
                        )
                    })
                })
                .transpose()?,
            launchpad: row.get(4)?,
            is_viewed: row.get::<_, i32>(5)? != 0,
            attachment: Attachment::from(row.get::<_, Vec<u8>>(6)?),
            created_at: datetime_at(row, 7)?,
        },
        seq: row.get(8)?,
    })
}

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::launches::{fetch_ranked_in, require_list};
use super::{conversion_error, datetime_at, list_from_row, Database};
use crate::error::{Result, StoreError};
use crate::models::*;
use crate::query::{sort_favorites, EntityKind, FetchSpec, LiveFavorites, SortDescriptor, SortKey};

const PROXY_COLUMNS: &str =
    "e.flight_number, e.name, e.notes, e.launch_date_utc, e.is_viewed, e.links, e.first_seen_at, e.updated_at";

impl Database {
    // ============================================================
    // Favorites across local and external launches
    // ============================================================

    /// Add a local or external launch to a list. Returns `false` if it was already a member.
    ///
    /// External launches get a proxy keyed by flight number on first use; later calls
    /// for the same flight number reuse it and refresh its snapshot.
    pub fn list_launch(&self, list_id: Uuid, target: FavoriteTarget<'_>) -> Result<bool> {
        match target {
            FavoriteTarget::Local(launch_id) => self.add_to_list(launch_id, list_id),
            FavoriteTarget::External(record) => {
                let added = self.write("favorite", &[EntityKind::ExternalLaunch], |conn| {
                    require_list(conn, list_id)?;
                    upsert_proxy(conn, record, false)?;
                    let added = conn.execute(
                        "INSERT INTO external_launch_lists (flight_number, list_id) VALUES (?, ?)
                         ON CONFLICT(flight_number, list_id) DO NOTHING",
                        (record.flight_number, list_id.to_string()),
                    )?;
                    Ok(added > 0)
                })?;
                tracing::debug!(
                    flight_number = record.flight_number,
                    %list_id,
                    added,
                    "Favorited external launch"
                );
                Ok(added)
            }
        }
    }

    /// Record the local viewed overlay for an external launch.
    pub fn mark_external_viewed(&self, record: &ExternalLaunch) -> Result<ExternalLaunchProxy> {
        self.write("external viewed flag", &[EntityKind::ExternalLaunch], |conn| {
            upsert_proxy(conn, record, true)?;
            get_proxy_in(conn, record.flight_number)?
                .ok_or_else(|| StoreError::not_found("External launch", record.flight_number))
        })
    }

    pub fn get_external_proxy(&self, flight_number: i64) -> Result<Option<ExternalLaunchProxy>> {
        let conn = self.lock()?;
        get_proxy_in(&conn, flight_number)
    }

    /// Apply stored overlays to a freshly fetched feed.
    ///
    /// Records are matched to proxies by flight number. A matched record gets the stored
    /// viewed flag and its proxy snapshot is refreshed; unmatched records pass through
    /// and no proxy is created for them.
    pub fn overlay_feed(&self, records: Vec<ExternalLaunch>) -> Result<Vec<ExternalLaunch>> {
        self.write("feed overlay", &[EntityKind::ExternalLaunch], |conn| {
            let mut matched = 0;
            let overlaid = records
                .into_iter()
                .map(|mut record| -> Result<ExternalLaunch> {
                    if let Some(viewed) = stored_viewed(conn, record.flight_number)? {
                        upsert_proxy(conn, &record, false)?;
                        record.is_viewed = record.is_viewed || viewed;
                        matched += 1;
                    }
                    Ok(record)
                })
                .collect::<Result<Vec<_>>>()?;
            tracing::debug!("Overlaid feed of {} records, {} matched", overlaid.len(), matched);
            Ok(overlaid)
        })
    }

    /// Unified view of a list: local launches and favorited external launches, by name.
    ///
    /// Unnamed entries come first. Entries with the same name keep local launches
    /// ahead of external ones.
    pub fn favorites_in_list(&self, list_id: Uuid) -> Result<Vec<FavoriteEntry>> {
        let mut entries = self.fetch_favorites(list_id)?;
        sort_favorites(&[SortDescriptor::ascending(SortKey::Name)], &mut entries);
        Ok(entries)
    }

    /// Bind the unified view of a list to a live sequence, ordered by name.
    pub fn live_favorites(&self, list_id: Uuid) -> Result<LiveFavorites> {
        LiveFavorites::subscribe(self, list_id, vec![SortDescriptor::ascending(SortKey::Name)])
    }

    /// Members of a list in fetch order: local launches by insertion, then external
    /// launches by flight number. Both reads happen under one connection lock.
    pub(crate) fn fetch_favorites(&self, list_id: Uuid) -> Result<Vec<FavoriteEntry>> {
        let conn = self.lock()?;

        let mut spec = FetchSpec::all();
        spec.filter.list_id = Some(list_id);
        let mut entries: Vec<FavoriteEntry> = fetch_ranked_in(&conn, &spec)?
            .into_iter()
            .map(|row| FavoriteEntry::Local(row.launch))
            .collect();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM external_launches e
             JOIN external_launch_lists el ON el.flight_number = e.flight_number
             WHERE el.list_id = ? ORDER BY e.flight_number",
            PROXY_COLUMNS
        ))?;
        let proxies = stmt
            .query_map([list_id.to_string()], proxy_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        entries.extend(proxies.into_iter().map(FavoriteEntry::External));

        Ok(entries)
    }

    pub fn lists_for_external(&self, flight_number: i64) -> Result<Vec<LaunchList>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT li.id, li.title, li.created_at
             FROM lists li JOIN external_launch_lists el ON el.list_id = li.id
             WHERE el.flight_number = ? ORDER BY li.title",
        )?;

        let lists = stmt
            .query_map([flight_number], list_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(lists)
    }
}

/// Insert or refresh the proxy for `record`.
///
/// The viewed flag only ever goes from false to true; a refreshed feed record that
/// says "unviewed" does not clear it.
fn upsert_proxy(conn: &Connection, record: &ExternalLaunch, mark_viewed: bool) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let links = record
        .links
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    conn.execute(
        "INSERT INTO external_launches (flight_number, name, notes, launch_date_utc, is_viewed, links, first_seen_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(flight_number) DO UPDATE SET
             name = excluded.name,
             notes = excluded.notes,
             launch_date_utc = excluded.launch_date_utc,
             links = excluded.links,
             is_viewed = MAX(external_launches.is_viewed, excluded.is_viewed),
             updated_at = excluded.updated_at",
        (
            record.flight_number,
            &record.name,
            &record.notes,
            &record.launch_date_utc,
            if record.is_viewed || mark_viewed { 1 } else { 0 },
            links,
            &now,
            &now,
        ),
    )?;

    Ok(())
}

fn stored_viewed(conn: &Connection, flight_number: i64) -> Result<Option<bool>> {
    let viewed = conn
        .query_row(
            "SELECT is_viewed FROM external_launches WHERE flight_number = ?",
            [flight_number],
            |row| row.get::<_, i32>(0),
        )
        .optional()?;
    Ok(viewed.map(|v| v != 0))
}

fn get_proxy_in(conn: &Connection, flight_number: i64) -> Result<Option<ExternalLaunchProxy>> {
    let proxy = conn
        .query_row(
            &format!(
                "SELECT {} FROM external_launches e WHERE e.flight_number = ?",
                PROXY_COLUMNS
            ),
            [flight_number],
            proxy_from_row,
        )
        .optional()?;
    Ok(proxy)
}

fn proxy_from_row(row: &Row<'_>) -> rusqlite::Result<ExternalLaunchProxy> {
    let links = row
        .get::<_, Option<String>>(5)?
        .map(|json| serde_json::from_str(&json).map_err(|e| conversion_error(5, e)))
        .transpose()?;

    Ok(ExternalLaunchProxy {
        flight_number: row.get(0)?,
        name: row.get(1)?,
        notes: row.get(2)?,
        launch_date_utc: row.get(3)?,
        is_viewed: row.get::<_, i32>(4)? != 0,
        links,
        first_seen_at: datetime_at(row, 6)?,
        updated_at: datetime_at(row, 7)?,
    })
}

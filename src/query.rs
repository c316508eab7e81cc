//! Declarative fetch specifications and live result sequences.
//!
//! A [`FetchSpec`] describes *which* launches a view shows (filter) and *in what order*
//! (sort descriptors). It can be run once via [`Database::fetch_launches`] or bound to a
//! [`LiveQuery`], which stays current as the store changes. [`LiveFavorites`] does the
//! same for the unified view of a list, local and external launches together.
//!
//! # Ordering
//!
//! Absent values sort first in ascending order and last in descending order, matching
//! SQLite's NULL ordering, so a sequence re-sorted in memory lines up with a fresh fetch.
//! Launches that tie on every descriptor keep insertion order.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use rusqlite::ToSql;
use uuid::Uuid;

use crate::db::Database;
use crate::error::{Result, StoreError};
use crate::models::{FavoriteEntry, Launch, LaunchList};

/// Entity types a write can touch. A live sequence goes stale only on kinds in its scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// Launch rows, their list membership and their tags.
    Launch,
    /// External launch proxies and their list membership.
    ExternalLaunch,
}

const LAUNCH_SCOPE: &[EntityKind] = &[EntityKind::Launch];
const FAVORITES_SCOPE: &[EntityKind] = &[EntityKind::Launch, EntityKind::ExternalLaunch];

/// Fields a sort descriptor can order by.
pub trait SortFields {
    fn sort_name(&self) -> Option<&str>;
    fn sort_date(&self) -> Option<DateTime<Utc>>;
}

impl SortFields for Launch {
    fn sort_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn sort_date(&self) -> Option<DateTime<Utc>> {
        self.launch_date
    }
}

impl SortFields for FavoriteEntry {
    fn sort_name(&self) -> Option<&str> {
        self.name()
    }

    fn sort_date(&self) -> Option<DateTime<Utc>> {
        self.launch_date()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Name,
    LaunchDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortDescriptor {
    pub key: SortKey,
    pub ascending: bool,
}

impl SortDescriptor {
    pub fn ascending(key: SortKey) -> Self {
        Self {
            key,
            ascending: true,
        }
    }

    pub fn descending(key: SortKey) -> Self {
        Self {
            key,
            ascending: false,
        }
    }

    fn column(&self) -> &'static str {
        match self.key {
            SortKey::Name => "l.name",
            SortKey::LaunchDate => "l.launch_date",
        }
    }

    pub fn compare<T: SortFields>(&self, a: &T, b: &T) -> Ordering {
        let ordering = match self.key {
            SortKey::Name => a.sort_name().cmp(&b.sort_name()),
            SortKey::LaunchDate => a.sort_date().cmp(&b.sort_date()),
        };
        if self.ascending {
            ordering
        } else {
            ordering.reverse()
        }
    }
}

/// Filter predicate over launches. All set conditions must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchFilter {
    pub viewed: Option<bool>,
    /// Only launches that are members of this list.
    pub list_id: Option<Uuid>,
    /// Only launches carrying every one of these tag titles.
    pub tag_titles: Vec<String>,
}

/// A reusable filter + sort description over launches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchSpec {
    pub filter: LaunchFilter,
    pub sort: Vec<SortDescriptor>,
}

impl FetchSpec {
    /// Every launch, in insertion order.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn sorted_by_launch_date() -> Self {
        Self::all().with_sort(vec![SortDescriptor::ascending(SortKey::LaunchDate)])
    }

    pub fn sorted_by_name_and_launch_date() -> Self {
        Self::all().with_sort(vec![
            SortDescriptor::ascending(SortKey::Name),
            SortDescriptor::ascending(SortKey::LaunchDate),
        ])
    }

    /// Unviewed launches, newest first within a name.
    pub fn unviewed() -> Self {
        Self {
            filter: LaunchFilter {
                viewed: Some(false),
                ..LaunchFilter::default()
            },
            sort: vec![
                SortDescriptor::ascending(SortKey::Name),
                SortDescriptor::descending(SortKey::LaunchDate),
            ],
        }
    }

    /// Unviewed launches that are members of `list`.
    pub fn in_list(list: &LaunchList) -> Self {
        let mut spec = Self::unviewed();
        spec.filter.list_id = Some(list.id);
        spec
    }

    pub fn with_sort(mut self, sort: Vec<SortDescriptor>) -> Self {
        self.sort = sort;
        self
    }

    pub fn tagged_with<I, S>(mut self, titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter.tag_titles.extend(titles.into_iter().map(Into::into));
        self
    }

    pub fn compare(&self, a: &Launch, b: &Launch) -> Ordering {
        compare_by(&self.sort, a, b)
    }

    /// WHERE and ORDER BY clauses plus bound parameters, for a query over `launches l`.
    pub(crate) fn to_sql(&self) -> (String, Vec<Box<dyn ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(viewed) = self.filter.viewed {
            conditions.push("l.is_viewed = ?".to_string());
            params.push(Box::new(viewed));
        }
        if let Some(list_id) = self.filter.list_id {
            conditions.push(
                "EXISTS (SELECT 1 FROM launch_lists ll WHERE ll.launch_id = l.id AND ll.list_id = ?)"
                    .to_string(),
            );
            params.push(Box::new(list_id.to_string()));
        }
        for title in &self.filter.tag_titles {
            conditions.push(
                "EXISTS (SELECT 1 FROM launch_tags lt JOIN tags t ON t.id = lt.tag_id
                         WHERE lt.launch_id = l.id AND t.title = ?)"
                    .to_string(),
            );
            params.push(Box::new(title.clone()));
        }

        let mut sql = String::new();
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        let mut order: Vec<String> = self
            .sort
            .iter()
            .map(|d| format!("{} {}", d.column(), if d.ascending { "ASC" } else { "DESC" }))
            .collect();
        order.push("l.rowid ASC".to_string());
        sql.push_str(" ORDER BY ");
        sql.push_str(&order.join(", "));

        (sql, params)
    }
}

/// A launch with its insertion sequence, used as the final tie-break.
#[derive(Debug, Clone)]
pub(crate) struct RankedLaunch {
    pub seq: i64,
    pub launch: Launch,
}

fn compare_by<T: SortFields>(sort: &[SortDescriptor], a: &T, b: &T) -> Ordering {
    sort.iter()
        .map(|descriptor| descriptor.compare(a, b))
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

fn sort_ranked(spec: &FetchSpec, rows: &mut [RankedLaunch]) {
    rows.sort_by(|a, b| spec.compare(&a.launch, &b.launch).then(a.seq.cmp(&b.seq)));
}

/// Stable sort of favorites; entries that tie keep their incoming order.
pub(crate) fn sort_favorites(sort: &[SortDescriptor], entries: &mut [FavoriteEntry]) {
    entries.sort_by(|a, b| compare_by(sort, a, b));
}

/// Sort `(fetch position, entry)` pairs, falling back to fetch position on ties.
fn sort_positioned(sort: &[SortDescriptor], rows: &mut [(usize, FavoriteEntry)]) {
    rows.sort_by(|a, b| compare_by(sort, &a.1, &b.1).then(a.0.cmp(&b.0)));
}

/// Staleness and revision of one live sequence, shared with the registry.
pub(crate) struct Watch {
    scope: &'static [EntityKind],
    stale: AtomicBool,
    revision: AtomicU64,
}

impl Watch {
    /// Starts stale so the first read loads.
    fn new(scope: &'static [EntityKind]) -> Arc<Self> {
        Arc::new(Self {
            scope,
            stale: AtomicBool::new(true),
            revision: AtomicU64::new(0),
        })
    }

    fn is_stale(&self) -> bool {
        self.stale.load(AtomicOrdering::SeqCst)
    }

    /// Clears the flag and reports whether it was set.
    fn take_stale(&self) -> bool {
        self.stale.swap(false, AtomicOrdering::SeqCst)
    }

    fn mark_stale(&self) {
        self.stale.store(true, AtomicOrdering::SeqCst);
    }

    fn revision(&self) -> u64 {
        self.revision.load(AtomicOrdering::SeqCst)
    }

    fn bump(&self) {
        self.revision.fetch_add(1, AtomicOrdering::SeqCst);
    }
}

/// Registry of live sequences held by a [`Database`].
///
/// Holds weak references only; dropping the last clone of a live sequence unsubscribes it.
#[derive(Default)]
pub(crate) struct Subscriptions {
    live: Mutex<Vec<Weak<Watch>>>,
}

impl Subscriptions {
    fn register(&self, watch: &Arc<Watch>) -> Result<()> {
        let mut live = self.live.lock().map_err(|_| StoreError::LockPoisoned)?;
        live.push(Arc::downgrade(watch));
        Ok(())
    }

    /// Mark every live sequence whose scope covers `kind` stale. Called after each
    /// committed write.
    ///
    /// A poisoned registry is still walked.
    pub(crate) fn invalidate(&self, kind: EntityKind) {
        let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        live.retain(|weak| match weak.upgrade() {
            Some(watch) => {
                if watch.scope.contains(&kind) {
                    watch.mark_stale();
                }
                true
            }
            None => false,
        });
    }

    pub(crate) fn len(&self) -> usize {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }
}

struct LiveState {
    spec: FetchSpec,
    rows: Vec<RankedLaunch>,
}

struct LiveInner {
    watch: Arc<Watch>,
    state: Mutex<LiveState>,
}

impl LiveInner {
    fn lock(&self) -> Result<MutexGuard<'_, LiveState>> {
        self.state.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

/// An auto-updating result sequence bound to a [`FetchSpec`].
///
/// Clones share one subscription: a sort change made through any clone is observed by
/// all of them. Writes to the store mark the sequence stale; the next read re-queries.
#[derive(Clone)]
pub struct LiveQuery {
    db: Database,
    inner: Arc<LiveInner>,
}

impl LiveQuery {
    pub(crate) fn subscribe(db: &Database, spec: FetchSpec) -> Result<Self> {
        // Registered before the first fetch so a write racing it is not missed.
        let watch = Watch::new(LAUNCH_SCOPE);
        db.subscriptions().register(&watch)?;

        let query = Self {
            db: db.clone(),
            inner: Arc::new(LiveInner {
                watch,
                state: Mutex::new(LiveState {
                    spec,
                    rows: Vec::new(),
                }),
            }),
        };
        {
            let mut state = query.inner.lock()?;
            query.refresh_if_stale(&mut state)?;
        }
        Ok(query)
    }

    /// Current results, re-queried first if a write has landed since the last read.
    pub fn results(&self) -> Result<Vec<Launch>> {
        let mut state = self.inner.lock()?;
        self.refresh_if_stale(&mut state)?;
        Ok(state.rows.iter().map(|row| row.launch.clone()).collect())
    }

    /// Swap the sort order. The held results are re-ordered in place, without a new fetch.
    pub fn set_sort(&self, sort: Vec<SortDescriptor>) -> Result<()> {
        let mut state = self.inner.lock()?;
        state.spec.sort = sort;
        if !self.refresh_if_stale(&mut state)? {
            let LiveState { spec, rows } = &mut *state;
            sort_ranked(spec, rows);
            self.inner.watch.bump();
        }
        tracing::debug!(sort = ?state.spec.sort, "Live query re-sorted");
        Ok(())
    }

    pub fn spec(&self) -> Result<FetchSpec> {
        Ok(self.inner.lock()?.spec.clone())
    }

    /// Whether a write has landed since the results were last loaded.
    pub fn is_stale(&self) -> bool {
        self.inner.watch.is_stale()
    }

    /// Bumped every time the held results change (refetch or re-sort).
    pub fn revision(&self) -> u64 {
        self.inner.watch.revision()
    }

    fn refresh_if_stale(&self, state: &mut LiveState) -> Result<bool> {
        if !self.inner.watch.take_stale() {
            return Ok(false);
        }
        match self.db.fetch_ranked(&state.spec) {
            Ok(rows) => {
                state.rows = rows;
                self.inner.watch.bump();
                Ok(true)
            }
            Err(e) => {
                self.inner.watch.mark_stale();
                Err(e)
            }
        }
    }
}

struct FavoritesState {
    sort: Vec<SortDescriptor>,
    rows: Vec<(usize, FavoriteEntry)>,
}

struct FavoritesInner {
    list_id: Uuid,
    watch: Arc<Watch>,
    state: Mutex<FavoritesState>,
}

impl FavoritesInner {
    fn lock(&self) -> Result<MutexGuard<'_, FavoritesState>> {
        self.state.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

/// Auto-updating unified view of a list: local launches and favorited external launches.
///
/// Goes stale on writes to either kind. Shares the clone and re-sort behavior of
/// [`LiveQuery`]; entries that tie on every descriptor keep local launches (in insertion
/// order) ahead of external ones (by flight number).
#[derive(Clone)]
pub struct LiveFavorites {
    db: Database,
    inner: Arc<FavoritesInner>,
}

impl LiveFavorites {
    pub(crate) fn subscribe(db: &Database, list_id: Uuid, sort: Vec<SortDescriptor>) -> Result<Self> {
        let watch = Watch::new(FAVORITES_SCOPE);
        db.subscriptions().register(&watch)?;

        let live = Self {
            db: db.clone(),
            inner: Arc::new(FavoritesInner {
                list_id,
                watch,
                state: Mutex::new(FavoritesState {
                    sort,
                    rows: Vec::new(),
                }),
            }),
        };
        {
            let mut state = live.inner.lock()?;
            live.refresh_if_stale(&mut state)?;
        }
        Ok(live)
    }

    pub fn results(&self) -> Result<Vec<FavoriteEntry>> {
        let mut state = self.inner.lock()?;
        self.refresh_if_stale(&mut state)?;
        Ok(state.rows.iter().map(|(_, entry)| entry.clone()).collect())
    }

    /// Swap the sort order, re-ordering the held entries without a new fetch.
    pub fn set_sort(&self, sort: Vec<SortDescriptor>) -> Result<()> {
        let mut state = self.inner.lock()?;
        state.sort = sort;
        if !self.refresh_if_stale(&mut state)? {
            let FavoritesState { sort, rows } = &mut *state;
            sort_positioned(sort, rows);
            self.inner.watch.bump();
        }
        tracing::debug!(list_id = %self.inner.list_id, sort = ?state.sort, "Live favorites re-sorted");
        Ok(())
    }

    pub fn list_id(&self) -> Uuid {
        self.inner.list_id
    }

    pub fn sort(&self) -> Result<Vec<SortDescriptor>> {
        Ok(self.inner.lock()?.sort.clone())
    }

    pub fn is_stale(&self) -> bool {
        self.inner.watch.is_stale()
    }

    pub fn revision(&self) -> u64 {
        self.inner.watch.revision()
    }

    fn refresh_if_stale(&self, state: &mut FavoritesState) -> Result<bool> {
        if !self.inner.watch.take_stale() {
            return Ok(false);
        }
        match self.db.fetch_favorites(self.inner.list_id) {
            Ok(entries) => {
                let mut rows: Vec<(usize, FavoriteEntry)> = entries.into_iter().enumerate().collect();
                sort_positioned(&state.sort, &mut rows);
                state.rows = rows;
                self.inner.watch.bump();
                Ok(true)
            }
            Err(e) => {
                self.inner.watch.mark_stale();
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for LiveQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveQuery")
            .field("stale", &self.is_stale())
            .field("revision", &self.revision())
            .finish()
    }
}

impl std::fmt::Debug for LiveFavorites {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveFavorites")
            .field("list_id", &self.inner.list_id)
            .field("stale", &self.is_stale())
            .field("revision", &self.revision())
            .finish()
    }
}

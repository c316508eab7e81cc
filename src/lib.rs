//! Persistence and query layer for user-curated lists of rocket launches.
//!
//! - [`db::Database`] owns launches, lists and tags in SQLite and exposes the mutations
//!   (create launch, mark viewed, add to list, attach tag) as single transactions.
//! - [`query`] builds fetch specifications and live result sequences over launches and
//!   over the unified local-plus-external view of a list.
//! - External feed records are favorited into lists through durable proxies keyed by
//!   flight number; see [`db::Database::list_launch`].

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod query;

pub use error::{Result, StoreError};

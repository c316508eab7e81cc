//! Domain models for rocket-launches.
//!
//! # Core Concepts
//!
//! ## Owned Entities
//!
//! - [`Launch`]: A rocket-launch event recorded by the user. Always created into a list,
//!   optionally tagged, carrying an opaque [`Attachment`].
//! - [`LaunchList`]: A user-named collection of launches. Titles are unique.
//! - [`Tag`]: A deduplicated label. At most one tag exists per distinct title.
//!
//! ## External Records
//!
//! - [`ExternalLaunch`]: A read-only record from the launch feed. The store never writes
//!   to it; viewed state and list membership live on an [`ExternalLaunchProxy`] keyed by
//!   flight number.
//! - [`FavoriteEntry`]: One row of a list's unified view, either a local launch or a proxy.

mod external;
mod launch;
mod list;
mod tag;

pub use external::*;
pub use launch::*;
pub use list::*;
pub use tag::*;

//! Site database access for URL rewrites.
//!
//! A `SiteDatabase` exposes the handful of WordPress columns that carry absolute URLs,
//! scanned by substring and updated in a single all-or-nothing batch.
use serde::{Deserialize, Serialize};

use crate::types::errors::Result;
use crate::types::Site;

pub mod rewrite;
pub mod serialized;
pub mod sqlite;

pub use rewrite::{RewriteReport, RowChange, UrlRewriter};
pub use sqlite::{SqliteLocator, SqliteSiteDatabase};

/// A URL-bearing column, addressed by the table's primary key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    OptionValue,
    PostGuid,
    PostContent,
    PostMetaValue,
    UserMetaValue,
}

impl Location {
    pub const ALL: [Location; 5] = [
        Location::OptionValue,
        Location::PostGuid,
        Location::PostContent,
        Location::PostMetaValue,
        Location::UserMetaValue,
    ];

    /// Table name without the site's prefix.
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Location::OptionValue => "options",
            Location::PostGuid | Location::PostContent => "posts",
            Location::PostMetaValue => "postmeta",
            Location::UserMetaValue => "usermeta",
        }
    }

    #[must_use]
    pub const fn pk(self) -> &'static str {
        match self {
            Location::OptionValue => "option_id",
            Location::PostGuid | Location::PostContent => "ID",
            Location::PostMetaValue => "meta_id",
            Location::UserMetaValue => "umeta_id",
        }
    }

    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Location::OptionValue => "option_value",
            Location::PostGuid => "guid",
            Location::PostContent => "post_content",
            Location::PostMetaValue | Location::UserMetaValue => "meta_value",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Row {
    pub pk: i64,
    pub value: String,
}

/// Conditional update: applies only while the column still holds `expected`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowUpdate {
    pub location: Location,
    pub pk: i64,
    pub expected: String,
    pub value: String,
}

pub trait SiteDatabase: Send {
    /// Rows at `location` whose value contains `needle`, ordered by primary key.
    /// # Errors
    /// Returns `SwapError::DatabaseRewrite` on query failure.
    fn scan(&self, prefix: &str, location: Location, needle: &str) -> Result<Vec<Row>>;

    /// Apply every update or none of them.
    /// # Errors
    /// Returns `SwapError::DatabaseRewrite` if any row no longer holds its expected value,
    /// or on write failure; nothing is changed in either case.
    fn apply(&self, prefix: &str, updates: &[RowUpdate]) -> Result<()>;

    /// Value of a row in the options table.
    /// # Errors
    /// Returns `SwapError::DatabaseRewrite` on query failure.
    fn option(&self, prefix: &str, name: &str) -> Result<Option<String>>;
}

/// Resolves the database behind a site. `Ok(None)` means the site has none to rewrite.
pub trait DatabaseLocator: Send + Sync {
    /// # Errors
    /// Returns `SwapError::DatabaseRewrite` if the database exists but cannot be opened.
    fn open(&self, site: &Site) -> Result<Option<Box<dyn SiteDatabase>>>;
}

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};

use crate::config::EngineConfig;
use crate::fs::SiteLayout;
use crate::types::errors::{Result, SwapError};
use crate::types::Site;

use super::{DatabaseLocator, Location, Row, RowUpdate, SiteDatabase};

/// SQLite-backed WordPress database (the SQLite Database Integration layout).
pub struct SqliteSiteDatabase {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteSiteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSiteDatabase").field("path", &self.path).finish_non_exhaustive()
    }
}

fn ident(prefix: &str) -> Result<&str> {
    if prefix.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        Ok(prefix)
    } else {
        Err(SwapError::DatabaseRewrite(format!("invalid table prefix '{prefix}'")))
    }
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
fn like_pattern(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len() + 2);
    out.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

impl SqliteSiteDatabase {
    /// # Errors
    /// Returns `SwapError::DatabaseRewrite` if the file cannot be opened.
    pub fn open(path: &Path, busy_timeout_ms: u64) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
        Ok(Self {
            path: path.to_path_buf(),
            conn: Mutex::new(conn),
        })
    }

    /// # Errors
    /// Returns `SwapError::DatabaseRewrite` if SQLite cannot allocate the database.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    /// Create the URL-bearing subset of the WordPress schema.
    /// # Errors
    /// Returns `SwapError::DatabaseRewrite` on DDL failure.
    pub fn create_wordpress_schema(&self, prefix: &str) -> Result<()> {
        let p = ident(prefix)?;
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {p}options (
                option_id INTEGER PRIMARY KEY AUTOINCREMENT,
                option_name TEXT NOT NULL UNIQUE,
                option_value TEXT NOT NULL DEFAULT '',
                autoload TEXT NOT NULL DEFAULT 'yes');
             CREATE TABLE IF NOT EXISTS {p}posts (
                ID INTEGER PRIMARY KEY AUTOINCREMENT,
                post_title TEXT NOT NULL DEFAULT '',
                post_content TEXT NOT NULL DEFAULT '',
                guid TEXT NOT NULL DEFAULT '');
             CREATE TABLE IF NOT EXISTS {p}postmeta (
                meta_id INTEGER PRIMARY KEY AUTOINCREMENT,
                post_id INTEGER NOT NULL DEFAULT 0,
                meta_key TEXT,
                meta_value TEXT);
             CREATE TABLE IF NOT EXISTS {p}usermeta (
                umeta_id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL DEFAULT 0,
                meta_key TEXT,
                meta_value TEXT);"
        ))?;
        Ok(())
    }

    /// Run a statement directly; used to seed fixtures.
    /// # Errors
    /// Returns `SwapError::DatabaseRewrite` on SQL failure.
    pub fn execute(&self, sql: &str, values: &[&dyn rusqlite::ToSql]) -> Result<usize> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(conn.execute(sql, values)?)
    }

    /// Every value at `location`, ordered by primary key.
    /// # Errors
    /// Returns `SwapError::DatabaseRewrite` on query failure.
    pub fn dump(&self, prefix: &str, location: Location) -> Result<Vec<Row>> {
        let p = ident(prefix)?;
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let sql = format!(
            "SELECT {pk}, {col} FROM {p}{table} WHERE {col} IS NOT NULL ORDER BY {pk}",
            pk = location.pk(),
            col = location.column(),
            table = location.table(),
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |r| Ok(Row { pk: r.get(0)?, value: r.get(1)? }))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

impl SiteDatabase for SqliteSiteDatabase {
    fn scan(&self, prefix: &str, location: Location, needle: &str) -> Result<Vec<Row>> {
        let p = ident(prefix)?;
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let sql = format!(
            "SELECT {pk}, {col} FROM {p}{table} WHERE {col} LIKE ?1 ESCAPE '\\' ORDER BY {pk}",
            pk = location.pk(),
            col = location.column(),
            table = location.table(),
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![like_pattern(needle)], |r| {
                Ok(Row { pk: r.get(0)?, value: r.get(1)? })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        // LIKE is case-insensitive for ASCII; keep exact matches only.
        Ok(rows.into_iter().filter(|r| r.value.contains(needle)).collect())
    }

    fn apply(&self, prefix: &str, updates: &[RowUpdate]) -> Result<()> {
        let p = ident(prefix)?;
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = conn.transaction()?;
        for u in updates {
            let sql = format!(
                "UPDATE {p}{table} SET {col} = ?1 WHERE {pk} = ?2 AND {col} = ?3",
                pk = u.location.pk(),
                col = u.location.column(),
                table = u.location.table(),
            );
            let changed = tx.execute(&sql, params![u.value, u.pk, u.expected])?;
            if changed != 1 {
                // dropping `tx` rolls back
                return Err(SwapError::DatabaseRewrite(format!(
                    "{p}{}.{} row {} changed during rewrite",
                    u.location.table(),
                    u.location.column(),
                    u.pk
                )));
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn option(&self, prefix: &str, name: &str) -> Result<Option<String>> {
        let p = ident(prefix)?;
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let v: Option<String> = conn
            .query_row(
                &format!("SELECT option_value FROM {p}options WHERE option_name = ?1"),
                params![name],
                |r| r.get(0),
            )
            .optional()?;
        Ok(v)
    }
}

/// Opens `<root>/sites/<id>/wordpress.sqlite` when it exists.
#[derive(Clone, Debug)]
pub struct SqliteLocator {
    root: PathBuf,
    busy_timeout_ms: u64,
}

impl SqliteLocator {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            root: config.root.clone(),
            busy_timeout_ms: config.timeouts.db_ms,
        }
    }
}

impl DatabaseLocator for SqliteLocator {
    fn open(&self, site: &Site) -> Result<Option<Box<dyn SiteDatabase>>> {
        let path = SiteLayout::new(&self.root, &site.id).database();
        if !path.exists() {
            return Ok(None);
        }
        let db = SqliteSiteDatabase::open(&path, self.busy_timeout_ms)?;
        Ok(Some(Box::new(db)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> SqliteSiteDatabase {
        let db = SqliteSiteDatabase::open_in_memory().unwrap();
        db.create_wordpress_schema("wp_").unwrap();
        db.execute(
            "INSERT INTO wp_options (option_name, option_value) VALUES ('siteurl', 'http://blog.test'), ('blogname', '100%_done')",
            &[],
        )
        .unwrap();
        db
    }

    #[test]
    fn scan_escapes_like_wildcards() {
        let db = seeded();
        assert_eq!(db.scan("wp_", Location::OptionValue, "%_").unwrap().len(), 1);
        assert_eq!(db.scan("wp_", Location::OptionValue, "http://").unwrap().len(), 1);
        assert!(db.scan("wp_", Location::OptionValue, "HTTP://").unwrap().is_empty());
        assert_eq!(db.option("wp_", "siteurl").unwrap().as_deref(), Some("http://blog.test"));
        assert_eq!(db.option("wp_", "missing").unwrap(), None);
    }

    #[test]
    fn apply_is_all_or_nothing() {
        let db = seeded();
        let updates = vec![
            RowUpdate {
                location: Location::OptionValue,
                pk: 1,
                expected: "http://blog.test".into(),
                value: "https://blog.local".into(),
            },
            RowUpdate {
                location: Location::OptionValue,
                pk: 2,
                expected: "stale".into(),
                value: "x".into(),
            },
        ];
        assert!(matches!(db.apply("wp_", &updates), Err(SwapError::DatabaseRewrite(_))));
        assert_eq!(db.option("wp_", "siteurl").unwrap().as_deref(), Some("http://blog.test"));
        db.apply("wp_", &updates[..1]).unwrap();
        assert_eq!(db.option("wp_", "siteurl").unwrap().as_deref(), Some("https://blog.local"));
    }

    #[test]
    fn hostile_prefix_is_rejected() {
        let db = seeded();
        assert!(db.scan("wp_; DROP TABLE x; --", Location::PostGuid, "a").is_err());
    }
}

//! Scoped URL rewrite with a before-image for exact reversal.
use serde::{Deserialize, Serialize};

use crate::types::errors::{Result, SwapError};
use crate::types::options::validate_url;

use super::serialized::replace_url;
use super::{Location, RowUpdate, SiteDatabase};

/// One row the rewrite changed (or would change, in a dry run).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowChange {
    pub location: Location,
    pub pk: i64,
    pub before: String,
    pub after: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteReport {
    pub old_url: String,
    pub new_url: String,
    pub rows_scanned: usize,
    pub rows_changed: usize,
    pub dry_run: bool,
    /// Before-image of every changed row; `reverse` writes it back.
    pub changes: Vec<RowChange>,
}

#[derive(Clone, Debug)]
pub struct UrlRewriter {
    prefix: String,
}

fn normalize(url: &str) -> &str {
    url.trim_end_matches('/')
}

impl UrlRewriter {
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Replace `old_url` with `new_url` in every scoped location. A dry run computes the
    /// same report without writing.
    ///
    /// # Errors
    ///
    /// Returns `SwapError::Validation` for malformed URLs, or `SwapError::DatabaseRewrite`
    /// if the scan or the batched update fails. A failed update leaves the database unchanged.
    pub fn rewrite(
        &self,
        db: &dyn SiteDatabase,
        old_url: &str,
        new_url: &str,
        dry_run: bool,
    ) -> Result<RewriteReport> {
        validate_url(old_url)?;
        validate_url(new_url)?;
        let old = normalize(old_url);
        let new = normalize(new_url);
        let mut report = RewriteReport {
            old_url: old.to_string(),
            new_url: new.to_string(),
            dry_run,
            ..RewriteReport::default()
        };
        if old == new {
            return Ok(report);
        }

        // Scheme-less needle also catches JSON-escaped `http:\/\/` forms.
        let needle = old.split_once("://").map_or(old, |(_, rest)| rest);
        for location in Location::ALL {
            let rows = db.scan(&self.prefix, location, needle)?;
            report.rows_scanned += rows.len();
            for row in rows {
                let after = replace_url(&row.value, old, new);
                if after != row.value {
                    report.changes.push(RowChange {
                        location,
                        pk: row.pk,
                        before: row.value,
                        after,
                    });
                }
            }
        }
        report.rows_changed = report.changes.len();

        if !dry_run && !report.changes.is_empty() {
            let updates: Vec<RowUpdate> = report
                .changes
                .iter()
                .map(|c| RowUpdate {
                    location: c.location,
                    pk: c.pk,
                    expected: c.before.clone(),
                    value: c.after.clone(),
                })
                .collect();
            db.apply(&self.prefix, &updates)?;
            log::info!(
                target: "stackswap",
                "rewrote {} of {} rows from {old} to {new}",
                report.rows_changed,
                report.rows_scanned
            );
        }
        Ok(report)
    }

    /// Write the before-image of a committed rewrite back. No-op for dry runs.
    ///
    /// # Errors
    ///
    /// Returns `SwapError::DatabaseRewrite` if any row changed since the rewrite;
    /// nothing is reverted in that case.
    pub fn reverse(&self, db: &dyn SiteDatabase, report: &RewriteReport) -> Result<usize> {
        if report.dry_run || report.changes.is_empty() {
            return Ok(0);
        }
        let updates: Vec<RowUpdate> = report
            .changes
            .iter()
            .map(|c| RowUpdate {
                location: c.location,
                pk: c.pk,
                expected: c.after.clone(),
                value: c.before.clone(),
            })
            .collect();
        db.apply(&self.prefix, &updates).map_err(|e| match e {
            SwapError::DatabaseRewrite(msg) => {
                SwapError::DatabaseRewrite(format!("reverse of {} -> {}: {msg}", report.old_url, report.new_url))
            }
            other => other,
        })?;
        Ok(updates.len())
    }

    /// The site URL currently recorded in the options table.
    ///
    /// # Errors
    ///
    /// Returns `SwapError::DatabaseRewrite` on query failure.
    pub fn current_url(&self, db: &dyn SiteDatabase) -> Result<Option<String>> {
        db.option(&self.prefix, "siteurl")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteSiteDatabase;

    const OLD: &str = "http://blog.test";
    const NEW: &str = "https://blog.local/";

    fn seeded() -> SqliteSiteDatabase {
        let db = SqliteSiteDatabase::open_in_memory().unwrap();
        db.create_wordpress_schema("wp_").unwrap();
        db.execute(
            "INSERT INTO wp_options (option_name, option_value) VALUES
                ('siteurl', 'http://blog.test'),
                ('home', 'http://blog.test'),
                ('widget', 'a:1:{s:3:\"url\";s:21:\"http://blog.test/shop\";}'),
                ('blogname', 'Blog')",
            &[],
        )
        .unwrap();
        db.execute(
            "INSERT INTO wp_posts (post_title, post_content, guid) VALUES
                ('Hello', 'see <a href=\"http://blog.test/about\">about</a>', 'http://blog.test/?p=1'),
                ('Other', 'no links', 'http://elsewhere.test/?p=2')",
            &[],
        )
        .unwrap();
        db
    }

    fn snapshot(db: &SqliteSiteDatabase) -> Vec<Vec<crate::db::Row>> {
        Location::ALL.iter().map(|l| db.dump("wp_", *l).unwrap()).collect()
    }

    #[test]
    fn rewrite_then_reverse_is_byte_identical() {
        let db = seeded();
        let before = snapshot(&db);
        let rw = UrlRewriter::new("wp_");
        let report = rw.rewrite(&db, OLD, NEW, false).unwrap();
        assert_eq!(report.rows_changed, 5);
        assert_eq!(rw.current_url(&db).unwrap().as_deref(), Some("https://blog.local"));
        let widget = db.scan("wp_", Location::OptionValue, "shop").unwrap();
        assert_eq!(widget[0].value, "a:1:{s:3:\"url\";s:23:\"https://blog.local/shop\";}");

        assert_eq!(rw.reverse(&db, &report).unwrap(), 5);
        assert_eq!(snapshot(&db), before);
    }

    #[test]
    fn forward_rewrite_back_to_the_old_url_restores_data() {
        let db = seeded();
        let before = snapshot(&db);
        let rw = UrlRewriter::new("wp_");
        rw.rewrite(&db, OLD, NEW, false).unwrap();
        let back = rw.rewrite(&db, NEW, OLD, false).unwrap();
        assert_eq!(back.rows_changed, 5);
        assert_eq!(snapshot(&db), before);
    }

    #[test]
    fn dry_run_reports_the_same_changes_without_writing() {
        let db = seeded();
        let before = snapshot(&db);
        let rw = UrlRewriter::new("wp_");
        let dry = rw.rewrite(&db, OLD, NEW, true).unwrap();
        assert_eq!(snapshot(&db), before);
        assert_eq!(rw.reverse(&db, &dry).unwrap(), 0);

        let real = rw.rewrite(&db, OLD, NEW, false).unwrap();
        assert_eq!(dry.rows_changed, real.rows_changed);
        assert_eq!(dry.rows_scanned, real.rows_scanned);
        assert_eq!(dry.changes, real.changes);
    }

    #[test]
    fn reverse_refuses_rows_edited_since() {
        let db = seeded();
        let rw = UrlRewriter::new("wp_");
        let report = rw.rewrite(&db, OLD, NEW, false).unwrap();
        db.execute("UPDATE wp_options SET option_value = 'edited' WHERE option_name = 'home'", &[])
            .unwrap();
        assert!(matches!(rw.reverse(&db, &report), Err(SwapError::DatabaseRewrite(_))));
        assert_eq!(rw.current_url(&db).unwrap().as_deref(), Some("https://blog.local"));
    }

    #[test]
    fn malformed_urls_are_rejected() {
        let db = seeded();
        let rw = UrlRewriter::new("wp_");
        assert!(matches!(
            rw.rewrite(&db, "blog.test", NEW, false),
            Err(SwapError::Validation(_))
        ));
        let same = rw.rewrite(&db, OLD, "http://blog.test/", false).unwrap();
        assert_eq!(same.rows_changed, 0);
    }
}

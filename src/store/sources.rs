//! Enable flags and priorities of currency and silver scraping sources

use crate::models::{SourceKind, SourceSetting};
use crate::store::{Database, StoreResult};
use chrono::{DateTime, Utc};
use log::info;
use rusqlite::{params, OptionalExtension, Row};

fn row_to_source(row: &Row<'_>) -> rusqlite::Result<SourceSetting> {
    Ok(SourceSetting {
        id: row.get(0)?,
        source_name: row.get(1)?,
        display_name: row.get(2)?,
        is_enabled: row.get(3)?,
        priority: row.get(4)?,
        last_updated: row.get(5)?,
    })
}

const SOURCE_COLUMNS: &str = "id, source_name, display_name, is_enabled, priority, last_updated";

impl Database {
    /// Insert the default sources of `kind` when none exist. Returns the
    /// number of rows seeded.
    pub fn seed_sources(&self, kind: SourceKind, at: DateTime<Utc>) -> StoreResult<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let existing: i64 = tx.query_row(
            "SELECT COUNT(*) FROM source_settings WHERE kind = ?1",
            params![kind.as_str()],
            |row| row.get(0),
        )?;
        if existing > 0 {
            return Ok(0);
        }
        for (index, (name, display)) in kind.defaults().iter().enumerate() {
            tx.execute(
                "INSERT INTO source_settings (kind, source_name, display_name, is_enabled, priority, last_updated)
                 VALUES (?1, ?2, ?3, 1, ?4, ?5)",
                params![kind.as_str(), name, display, (index + 1) as i64, at],
            )?;
        }
        tx.commit()?;
        info!("Seeded {} default {} sources", kind.defaults().len(), kind.as_str());
        Ok(kind.defaults().len())
    }

    /// All sources of `kind` by priority, seeding defaults first if empty
    pub fn sources(&self, kind: SourceKind) -> StoreResult<Vec<SourceSetting>> {
        self.seed_sources(kind, Utc::now())?;
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM source_settings WHERE kind = ?1 ORDER BY priority, id",
            SOURCE_COLUMNS
        ))?;
        let rows = stmt.query_map(params![kind.as_str()], row_to_source)?;
        rows.collect()
    }

    /// Names of enabled sources of `kind` in priority order
    pub fn enabled_source_names(&self, kind: SourceKind) -> StoreResult<Vec<String>> {
        Ok(self
            .sources(kind)?
            .into_iter()
            .filter(|s| s.is_enabled)
            .map(|s| s.source_name)
            .collect())
    }

    /// Partially update a source. `None` when it does not exist.
    pub fn update_source(
        &self,
        kind: SourceKind,
        name: &str,
        is_enabled: Option<bool>,
        priority: Option<i64>,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<SourceSetting>> {
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE source_settings SET
                is_enabled = COALESCE(?1, is_enabled),
                priority = COALESCE(?2, priority),
                last_updated = ?3
             WHERE kind = ?4 AND source_name = ?5",
            params![is_enabled, priority, at, kind.as_str(), name],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        conn.query_row(
            &format!("SELECT {} FROM source_settings WHERE kind = ?1 AND source_name = ?2", SOURCE_COLUMNS),
            params![kind.as_str(), name],
            row_to_source,
        )
        .optional()
    }

    /// Assign priorities 1..n following `order`; unknown names are skipped
    pub fn reorder_sources(&self, kind: SourceKind, order: &[String], at: DateTime<Utc>) -> StoreResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        for (index, name) in order.iter().enumerate() {
            tx.execute(
                "UPDATE source_settings SET priority = ?1, last_updated = ?2 WHERE kind = ?3 AND source_name = ?4",
                params![(index + 1) as i64, at, kind.as_str(), name],
            )?;
        }
        tx.commit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_seeded_once() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.seed_sources(SourceKind::Currency, Utc::now()).unwrap(), 3);
        assert_eq!(db.seed_sources(SourceKind::Currency, Utc::now()).unwrap(), 0);

        let silver = db.sources(SourceKind::Silver).unwrap();
        let names: Vec<&str> = silver.iter().map(|s| s.source_name.as_str()).collect();
        assert_eq!(names, vec!["safehavenhub", "goldpricelive"]);
        assert_eq!(db.sources(SourceKind::Currency).unwrap().len(), 3);
    }

    #[test]
    fn test_update_and_reorder() {
        let db = Database::open_in_memory().unwrap();
        db.seed_sources(SourceKind::Currency, Utc::now()).unwrap();

        let updated = db
            .update_source(SourceKind::Currency, "ta3weem", Some(false), None, Utc::now())
            .unwrap()
            .unwrap();
        assert!(!updated.is_enabled);
        assert_eq!(updated.priority, 1);
        assert!(db
            .update_source(SourceKind::Currency, "nope", Some(true), None, Utc::now())
            .unwrap()
            .is_none());

        db.reorder_sources(
            SourceKind::Currency,
            &["banklive".to_string(), "ghost".to_string(), "egrates".to_string()],
            Utc::now(),
        )
        .unwrap();
        assert_eq!(
            db.enabled_source_names(SourceKind::Currency).unwrap(),
            vec!["banklive".to_string(), "egrates".to_string()]
        );
    }
}

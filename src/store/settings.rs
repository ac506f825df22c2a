//! Key/value site settings

use crate::store::{Database, StoreResult};
use rusqlite::{params, OptionalExtension};
use std::collections::BTreeMap;

/// Prefix of per-karat manual override keys
pub const MANUAL_PRICE_PREFIX: &str = "manual_price_";

impl Database {
    pub fn get_setting(&self, key: &str) -> StoreResult<Option<String>> {
        self.conn()
            .query_row("SELECT value FROM settings WHERE key = ?1", params![key], |row| row.get(0))
            .optional()
            .map(Option::flatten)
    }

    /// Setting parsed as an integer, `None` when missing or malformed
    pub fn get_setting_i64(&self, key: &str) -> StoreResult<Option<i64>> {
        Ok(self
            .get_setting(key)?
            .and_then(|v| v.trim().parse::<i64>().ok()))
    }

    pub fn set_setting(&self, key: &str, value: &str) -> StoreResult<()> {
        self.conn().execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Returns whether a row was removed
    pub fn delete_setting(&self, key: &str) -> StoreResult<bool> {
        let removed = self
            .conn()
            .execute("DELETE FROM settings WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }

    pub fn all_settings(&self) -> StoreResult<BTreeMap<String, String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT key, COALESCE(value, '') FROM settings ORDER BY key")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect()
    }

    /// Manual overrides keyed by karat
    pub fn manual_prices(&self) -> StoreResult<BTreeMap<String, String>> {
        Ok(self
            .all_settings()?
            .into_iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(MANUAL_PRICE_PREFIX)
                    .map(|karat| (karat.to_string(), v))
            })
            .collect())
    }
}

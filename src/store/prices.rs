//! Unified current prices and their history archive

use crate::models::{NewHistory, PriceHistory, PriceQuote, SourceStatus, UnifiedPrice};
use crate::store::{Database, StoreResult};
use chrono::{DateTime, Utc};
use log::debug;
use rusqlite::types::ToSql;
use rusqlite::{params, OptionalExtension, Row};

/// Types that hold Egyptian gold prices
pub const EGYPT_GOLD_TYPES: &[&str] = &["gold", "local"];

/// Types shown in per-country gold listings
pub const COUNTRY_GOLD_TYPES: &[&str] = &["gold", "international", "local"];

/// Outcome of a [`Database::save_prices`] batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSummary {
    pub inserted: usize,
    pub updated: usize,
    pub history_rows: usize,
}

const UNIFIED_COLUMNS: &str = "id, type, country, key, sell_price, buy_price, currency, \
     source_name, source_status, last_update, status";

const HISTORY_COLUMNS: &str =
    "id, price_id, type, country, key, sell_price, buy_price, source_name, timestamp";

fn row_to_unified(row: &Row<'_>) -> rusqlite::Result<UnifiedPrice> {
    Ok(UnifiedPrice {
        id: row.get(0)?,
        price_type: row.get(1)?,
        country: row.get(2)?,
        key: row.get(3)?,
        sell_price: row.get(4)?,
        buy_price: row.get(5)?,
        currency: row.get(6)?,
        source_name: row.get(7)?,
        source_status: row.get(8)?,
        last_update: row.get(9)?,
        status: row.get(10)?,
    })
}

fn row_to_history(row: &Row<'_>) -> rusqlite::Result<PriceHistory> {
    Ok(PriceHistory {
        id: row.get(0)?,
        price_id: row.get(1)?,
        price_type: row.get(2)?,
        country: row.get(3)?,
        key: row.get(4)?,
        sell_price: row.get(5)?,
        buy_price: row.get(6)?,
        source_name: row.get(7)?,
        timestamp: row.get(8)?,
    })
}

/// `?, ?, ?` for an IN clause
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

impl Database {
    /// Merge a batch of scraped quotes into `unified_prices`.
    ///
    /// Each quote upserts its `(type, country, key)` row. A history row is
    /// appended when the price is new or its sell/buy changed. The whole batch
    /// commits atomically.
    pub fn save_prices(&self, quotes: &[PriceQuote], at: DateTime<Utc>) -> StoreResult<SaveSummary> {
        let mut summary = SaveSummary::default();
        if quotes.is_empty() {
            return Ok(summary);
        }

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        for quote in quotes {
            let price_type = quote.price_type.to_lowercase();
            let country = quote.country.to_lowercase();
            if quote.key.trim().is_empty() {
                continue;
            }

            let existing: Option<(i64, f64, f64)> = tx
                .query_row(
                    "SELECT id, sell_price, buy_price FROM unified_prices
                     WHERE type = ?1 AND country = ?2 AND key = ?3",
                    params![price_type, country, quote.key],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;

            let (price_id, changed) = match existing {
                Some((id, sell, buy)) => {
                    tx.execute(
                        "UPDATE unified_prices SET sell_price = ?1, buy_price = ?2, currency = ?3,
                         source_name = ?4, source_status = ?5, last_update = ?6 WHERE id = ?7",
                        params![
                            quote.sell_price,
                            quote.buy_price,
                            quote.currency,
                            quote.source,
                            quote.source_status.as_str(),
                            at,
                            id
                        ],
                    )?;
                    summary.updated += 1;
                    (id, sell != quote.sell_price || buy != quote.buy_price)
                }
                None => {
                    tx.execute(
                        "INSERT INTO unified_prices
                         (type, country, key, sell_price, buy_price, currency, source_name, source_status, last_update, status)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'active')",
                        params![
                            price_type,
                            country,
                            quote.key,
                            quote.sell_price,
                            quote.buy_price,
                            quote.currency,
                            quote.source,
                            quote.source_status.as_str(),
                            at
                        ],
                    )?;
                    summary.inserted += 1;
                    (tx.last_insert_rowid(), true)
                }
            };

            if changed {
                tx.execute(
                    "INSERT INTO price_history (price_id, type, country, key, sell_price, buy_price, source_name, timestamp)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        price_id,
                        price_type,
                        country,
                        quote.key,
                        quote.sell_price,
                        quote.buy_price,
                        quote.source,
                        at
                    ],
                )?;
                summary.history_rows += 1;
            }
        }
        tx.commit()?;

        debug!(
            "Saved prices: {} inserted, {} updated, {} history rows",
            summary.inserted, summary.updated, summary.history_rows
        );
        Ok(summary)
    }

    /// Record a manual override: append a history row and pin the Egyptian
    /// gold row for `karat` (if it exists) to `price`.
    pub fn apply_manual_price(&self, karat: &str, price: f64, at: DateTime<Utc>) -> StoreResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO price_history (price_id, type, country, key, sell_price, buy_price, source_name, timestamp)
             VALUES (NULL, 'gold', 'egypt', ?1, ?2, ?2, 'Manual Override', ?3)",
            params![karat, price, at],
        )?;
        tx.execute(
            "UPDATE unified_prices SET sell_price = ?1, buy_price = ?1, source_name = 'Manual',
             source_status = ?2, last_update = ?3
             WHERE type IN ('gold', 'local') AND country = 'egypt' AND key = ?4",
            params![price, SourceStatus::Manual.as_str(), at, karat],
        )?;
        tx.commit()
    }

    /// Current rows whose type is one of `types`, optionally restricted to a
    /// country (case-insensitive)
    pub fn unified_prices(&self, types: &[&str], country: Option<&str>) -> StoreResult<Vec<UnifiedPrice>> {
        let mut sql = format!(
            "SELECT {} FROM unified_prices WHERE type IN ({})",
            UNIFIED_COLUMNS,
            placeholders(types.len())
        );
        let mut args: Vec<&dyn ToSql> = types.iter().map(|t| t as &dyn ToSql).collect();
        let lowered = country.map(str::to_lowercase);
        if let Some(country) = lowered.as_ref() {
            sql.push_str(" AND lower(country) = ?");
            args.push(country);
        }
        sql.push_str(" ORDER BY id");

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(args.as_slice(), row_to_unified)?;
        rows.collect()
    }

    pub fn all_unified_prices(&self) -> StoreResult<Vec<UnifiedPrice>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("SELECT {} FROM unified_prices ORDER BY id", UNIFIED_COLUMNS))?;
        let rows = stmt.query_map([], row_to_unified)?;
        rows.collect()
    }

    pub fn get_unified_price(&self, price_type: &str, country: &str, key: &str) -> StoreResult<Option<UnifiedPrice>> {
        self.conn()
            .query_row(
                &format!(
                    "SELECT {} FROM unified_prices WHERE type = ?1 AND country = ?2 AND key = ?3",
                    UNIFIED_COLUMNS
                ),
                params![price_type, country, key],
                row_to_unified,
            )
            .optional()
    }

    /// Most recently updated unified row
    pub fn latest_unified_price(&self) -> StoreResult<Option<UnifiedPrice>> {
        self.conn()
            .query_row(
                &format!(
                    "SELECT {} FROM unified_prices ORDER BY last_update DESC, id DESC LIMIT 1",
                    UNIFIED_COLUMNS
                ),
                [],
                row_to_unified,
            )
            .optional()
    }

    pub fn insert_history(&self, entry: &NewHistory) -> StoreResult<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO price_history (price_id, type, country, key, sell_price, buy_price, source_name, timestamp)
             VALUES (NULL, ?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.price_type,
                entry.country,
                entry.key,
                entry.sell_price,
                entry.buy_price,
                entry.source_name,
                entry.timestamp
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn history_exists(&self, price_type: &str, country: &str, key: &str, at: DateTime<Utc>) -> StoreResult<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM price_history
             WHERE type = ?1 AND country = ?2 AND key = ?3 AND timestamp = ?4",
            params![price_type, country, key, at],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// History rows of the given types and country at or after `since`,
    /// newest first. `key` narrows to one karat or currency.
    pub fn history_since(
        &self,
        types: &[&str],
        country: &str,
        key: Option<&str>,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<PriceHistory>> {
        let mut sql = format!(
            "SELECT {} FROM price_history WHERE type IN ({}) AND country = ? AND timestamp >= ?",
            HISTORY_COLUMNS,
            placeholders(types.len())
        );
        let mut args: Vec<&dyn ToSql> = types.iter().map(|t| t as &dyn ToSql).collect();
        args.push(&country);
        args.push(&since);
        if let Some(key) = key.as_ref() {
            sql.push_str(" AND key = ?");
            args.push(key);
        }
        sql.push_str(" ORDER BY timestamp DESC, id DESC");

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(args.as_slice(), row_to_history)?;
        rows.collect()
    }

    /// Latest `limit` history rows of the given types and country
    pub fn recent_history(&self, types: &[&str], country: &str, limit: usize) -> StoreResult<Vec<PriceHistory>> {
        let sql = format!(
            "SELECT {} FROM price_history WHERE type IN ({}) AND country = ?
             ORDER BY timestamp DESC, id DESC LIMIT ?",
            HISTORY_COLUMNS,
            placeholders(types.len())
        );
        let limit = limit as i64;
        let mut args: Vec<&dyn ToSql> = types.iter().map(|t| t as &dyn ToSql).collect();
        args.push(&country);
        args.push(&limit);

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(args.as_slice(), row_to_history)?;
        rows.collect()
    }

    pub fn history_count(&self) -> StoreResult<i64> {
        self.conn()
            .query_row("SELECT COUNT(*) FROM price_history", [], |row| row.get(0))
    }

    /// Number of distinct scrape instants in the archive
    pub fn history_snapshot_count(&self) -> StoreResult<i64> {
        self.conn()
            .query_row("SELECT COUNT(DISTINCT timestamp) FROM price_history", [], |row| row.get(0))
    }
}

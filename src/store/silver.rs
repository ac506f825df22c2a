//! Silver scrape records

use crate::models::{SilverPrice, SilverQuote, SilverReading};
use crate::store::{Database, StoreResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

const SILVER_COLUMNS: &str = "id, source_used, source_status, \
     silver_999_sell, silver_999_buy, silver_999_change, silver_999_change_percent, \
     silver_925_sell, silver_925_buy, silver_925_change, silver_925_change_percent, \
     silver_900_sell, silver_900_buy, silver_900_change, silver_900_change_percent, \
     silver_800_sell, silver_800_buy, silver_800_change, silver_800_change_percent, \
     ounce_usd_sell, ounce_usd_buy, ounce_usd_change, ounce_usd_change_percent, \
     silver_gram_price, silver_ounce_price, currency, scraped_at, source_update_time, raw_data, created_at";

fn quote_at(row: &Row<'_>, start: usize) -> rusqlite::Result<SilverQuote> {
    Ok(SilverQuote {
        sell: row.get(start)?,
        buy: row.get(start + 1)?,
        change: row.get(start + 2)?,
        change_percent: row.get(start + 3)?,
    })
}

fn row_to_silver(row: &Row<'_>) -> rusqlite::Result<SilverPrice> {
    let source_used: Option<String> = row.get(1)?;
    let source_status: Option<String> = row.get(2)?;
    Ok(SilverPrice {
        id: row.get(0)?,
        reading: SilverReading {
            source_used: source_used.unwrap_or_default(),
            source_status: source_status.unwrap_or_default(),
            silver_999: quote_at(row, 3)?,
            silver_925: quote_at(row, 7)?,
            silver_900: quote_at(row, 11)?,
            silver_800: quote_at(row, 15)?,
            ounce_usd: quote_at(row, 19)?,
            gram_price: row.get(23)?,
            ounce_price: row.get(24)?,
            currency: row.get(25)?,
            source_update_time: row.get(27)?,
            raw_data: row.get(28)?,
        },
        scraped_at: row.get(26)?,
        created_at: row.get(29)?,
    })
}

impl Database {
    /// Store one silver scrape and return the persisted row
    pub fn insert_silver(&self, reading: &SilverReading, at: DateTime<Utc>) -> StoreResult<SilverPrice> {
        let r = reading;
        let currency = if r.currency.is_empty() { "EGP" } else { r.currency.as_str() };
        let conn = self.conn();
        conn.execute(
            "INSERT INTO silver_prices (
                source_used, source_status,
                silver_999_sell, silver_999_buy, silver_999_change, silver_999_change_percent,
                silver_925_sell, silver_925_buy, silver_925_change, silver_925_change_percent,
                silver_900_sell, silver_900_buy, silver_900_change, silver_900_change_percent,
                silver_800_sell, silver_800_buy, silver_800_change, silver_800_change_percent,
                ounce_usd_sell, ounce_usd_buy, ounce_usd_change, ounce_usd_change_percent,
                silver_gram_price, silver_ounce_price, currency, scraped_at, source_update_time,
                raw_data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                     ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?26)",
            params![
                r.source_used,
                r.source_status,
                r.silver_999.sell,
                r.silver_999.buy,
                r.silver_999.change,
                r.silver_999.change_percent,
                r.silver_925.sell,
                r.silver_925.buy,
                r.silver_925.change,
                r.silver_925.change_percent,
                r.silver_900.sell,
                r.silver_900.buy,
                r.silver_900.change,
                r.silver_900.change_percent,
                r.silver_800.sell,
                r.silver_800.buy,
                r.silver_800.change,
                r.silver_800.change_percent,
                r.ounce_usd.sell,
                r.ounce_usd.buy,
                r.ounce_usd.change,
                r.ounce_usd.change_percent,
                r.gram_price,
                r.ounce_price,
                currency,
                at,
                r.source_update_time,
                r.raw_data
            ],
        )?;
        let id = conn.last_insert_rowid();
        let mut reading = reading.clone();
        reading.currency = currency.to_string();
        Ok(SilverPrice { id, reading, scraped_at: at, created_at: at })
    }

    pub fn latest_silver(&self) -> StoreResult<Option<SilverPrice>> {
        self.conn()
            .query_row(
                &format!("SELECT {} FROM silver_prices ORDER BY created_at DESC, id DESC LIMIT 1", SILVER_COLUMNS),
                [],
                row_to_silver,
            )
            .optional()
    }

    /// Newest first, paged
    pub fn silver_page(&self, limit: usize, offset: usize) -> StoreResult<Vec<SilverPrice>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM silver_prices ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2",
            SILVER_COLUMNS
        ))?;
        let rows = stmt.query_map(params![limit as i64, offset as i64], row_to_silver)?;
        rows.collect()
    }

    pub fn silver_count(&self) -> StoreResult<i64> {
        self.conn()
            .query_row("SELECT COUNT(*) FROM silver_prices", [], |row| row.get(0))
    }

    /// Rows created in `[start, end)`, newest first
    pub fn silver_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> StoreResult<Vec<SilverPrice>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM silver_prices WHERE created_at >= ?1 AND created_at < ?2
             ORDER BY created_at DESC, id DESC",
            SILVER_COLUMNS
        ))?;
        let rows = stmt.query_map(params![start, end], row_to_silver)?;
        rows.collect()
    }

    /// Rows created at or after `start`, oldest first
    pub fn silver_since(&self, start: DateTime<Utc>) -> StoreResult<Vec<SilverPrice>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM silver_prices WHERE created_at >= ?1 ORDER BY created_at ASC, id ASC",
            SILVER_COLUMNS
        ))?;
        let rows = stmt.query_map(params![start], row_to_silver)?;
        rows.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn reading(gram: f64, status: &str) -> SilverReading {
        SilverReading {
            source_used: "safehavenhub".to_string(),
            source_status: status.to_string(),
            silver_999: SilverQuote { sell: Some(gram), buy: Some(gram - 1.0), change: Some(0.5), change_percent: None },
            gram_price: Some(gram),
            ounce_price: Some(gram * 31.1035),
            currency: String::new(),
            ..Default::default()
        }
    }

    #[test]
    fn test_insert_and_read_back_latest() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.latest_silver().unwrap().is_none());

        let now = Utc::now();
        db.insert_silver(&reading(60.0, "Primary"), now - Duration::minutes(5)).unwrap();
        let stored = db.insert_silver(&reading(61.0, "Fallback"), now).unwrap();
        assert_eq!(stored.reading.currency, "EGP");

        let latest = db.latest_silver().unwrap().unwrap();
        assert_eq!(latest.id, stored.id);
        assert_eq!(latest.reading.silver_999.sell, Some(61.0));
        assert_eq!(latest.reading.silver_999.change, Some(0.5));
        assert_eq!(latest.reading.silver_925.sell, None);
        assert_eq!(latest.reading.source_status, "Fallback");
        assert_eq!(db.silver_count().unwrap(), 2);
    }

    #[test]
    fn test_paging_and_ranges() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        for i in 0..5 {
            db.insert_silver(&reading(50.0 + i as f64, "Primary"), now - Duration::days(i)).unwrap();
        }

        let page = db.silver_page(2, 1).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].reading.gram_price, Some(51.0));

        let window = db.silver_between(now - Duration::days(2), now - Duration::days(1)).unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].reading.gram_price, Some(52.0));

        let since = db.silver_since(now - Duration::hours(36)).unwrap();
        assert_eq!(since.len(), 2);
        assert_eq!(since[0].reading.gram_price, Some(51.0));
    }
}

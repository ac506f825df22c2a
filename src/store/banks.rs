//! Per-bank exchange rate snapshot and bank display settings

use crate::models::{BankDisplaySetting, BankRate};
use crate::store::{Database, StoreResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

/// Display order given to banks the admin has not positioned yet
pub const UNORDERED_BANK: i64 = 999;

const RATE_COLUMNS: &str = "bank_id, bank_name, bank_url, bank_logo, currency, to_currency, \
     buy_price, sell_price, source, timestamp";

fn row_to_rate(row: &Row<'_>) -> rusqlite::Result<BankRate> {
    Ok(BankRate {
        bank_id: row.get(0)?,
        bank_name: row.get(1)?,
        bank_url: row.get(2)?,
        bank_logo: row.get(3)?,
        currency: row.get(4)?,
        to_currency: row.get(5)?,
        buy_price: row.get(6)?,
        sell_price: row.get(7)?,
        source: row.get(8)?,
        timestamp: row.get(9)?,
    })
}

fn row_to_display(row: &Row<'_>) -> rusqlite::Result<BankDisplaySetting> {
    Ok(BankDisplaySetting {
        bank_id: row.get(0)?,
        bank_name: row.get(1)?,
        is_enabled: row.get(2)?,
        display_order: row.get(3)?,
    })
}

impl Database {
    /// Replace the whole rate snapshot and register display settings for
    /// banks seen for the first time. Returns the number of rates stored.
    pub fn replace_bank_rates(&self, rates: &[BankRate], at: DateTime<Utc>) -> StoreResult<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM bank_rates", [])?;
        for rate in rates {
            tx.execute(
                "INSERT INTO bank_rates (bank_id, bank_name, bank_url, bank_logo, currency, to_currency,
                 buy_price, sell_price, source, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    rate.bank_id,
                    rate.bank_name,
                    rate.bank_url,
                    rate.bank_logo,
                    rate.currency,
                    rate.to_currency,
                    rate.buy_price,
                    rate.sell_price,
                    rate.source,
                    rate.timestamp
                ],
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO bank_display_settings
                 (bank_id, bank_name, is_enabled, display_order, created_at, updated_at)
                 VALUES (?1, ?2, 1, ?3, ?4, ?4)",
                params![rate.bank_id, rate.bank_name, UNORDERED_BANK, at],
            )?;
        }
        tx.commit()?;
        Ok(rates.len())
    }

    /// Whole snapshot in insertion order
    pub fn bank_rates(&self) -> StoreResult<Vec<BankRate>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("SELECT {} FROM bank_rates ORDER BY id", RATE_COLUMNS))?;
        let rows = stmt.query_map([], row_to_rate)?;
        rows.collect()
    }

    /// Rates for one pair; codes are matched upper-cased
    pub fn bank_rates_for_pair(&self, from: &str, to: &str) -> StoreResult<Vec<BankRate>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM bank_rates WHERE currency = ?1 AND to_currency = ?2 ORDER BY id",
            RATE_COLUMNS
        ))?;
        let rows = stmt.query_map(params![from.to_uppercase(), to.to_uppercase()], row_to_rate)?;
        rows.collect()
    }

    /// Rates whose bank name contains `fragment` (case-insensitive), newest first
    pub fn bank_rates_by_name(&self, fragment: &str, limit: usize) -> StoreResult<Vec<BankRate>> {
        let pattern = format!("%{}%", fragment.trim());
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM bank_rates WHERE bank_name LIKE ?1 ORDER BY timestamp DESC, id LIMIT ?2",
            RATE_COLUMNS
        ))?;
        let rows = stmt.query_map(params![pattern, limit as i64], row_to_rate)?;
        rows.collect()
    }

    /// Distinct (from, to) pairs present in the snapshot
    pub fn currency_pairs(&self) -> StoreResult<Vec<(String, String)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT currency, to_currency FROM bank_rates ORDER BY currency, to_currency",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect()
    }

    /// Distinct (bank_id, name, logo, url) in the snapshot
    pub fn distinct_banks(&self) -> StoreResult<Vec<(String, String, String, String)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT bank_id, bank_name, MAX(bank_logo), MAX(bank_url) FROM bank_rates
             GROUP BY bank_id, bank_name ORDER BY MIN(id)",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))?;
        rows.collect()
    }

    pub fn bank_display_settings(&self) -> StoreResult<Vec<BankDisplaySetting>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT bank_id, bank_name, is_enabled, display_order FROM bank_display_settings
             ORDER BY display_order, id",
        )?;
        let rows = stmt.query_map([], row_to_display)?;
        rows.collect()
    }

    /// Enabled banks in display order
    pub fn enabled_banks(&self) -> StoreResult<Vec<BankDisplaySetting>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT bank_id, bank_name, is_enabled, display_order FROM bank_display_settings
             WHERE is_enabled = 1 ORDER BY display_order, id",
        )?;
        let rows = stmt.query_map([], row_to_display)?;
        rows.collect()
    }

    /// Update an existing display setting, or create one for a bank present
    /// in the snapshot. Returns false when the bank is unknown.
    pub fn update_bank_display(
        &self,
        bank_id: &str,
        is_enabled: bool,
        display_order: i64,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE bank_display_settings SET is_enabled = ?1, display_order = ?2, updated_at = ?3
             WHERE bank_id = ?4",
            params![is_enabled, display_order, at, bank_id],
        )?;
        if updated > 0 {
            return Ok(true);
        }
        let inserted = conn.execute(
            "INSERT INTO bank_display_settings (bank_id, bank_name, is_enabled, display_order, created_at, updated_at)
             SELECT bank_id, bank_name, ?1, ?2, ?3, ?3 FROM bank_rates WHERE bank_id = ?4 LIMIT 1",
            params![is_enabled, display_order, at, bank_id],
        )?;
        Ok(inserted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate(bank_id: &str, name: &str, currency: &str, sell: f64) -> BankRate {
        BankRate {
            bank_id: bank_id.to_string(),
            bank_name: name.to_string(),
            bank_url: format!("https://ta3weem.com/ar/banks/{}", bank_id),
            bank_logo: String::new(),
            currency: currency.to_string(),
            to_currency: "EGP".to_string(),
            buy_price: sell - 0.1,
            sell_price: sell,
            source: "Ta3weem_AllBanks".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_replace_snapshot_registers_new_banks() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        db.replace_bank_rates(
            &[rate("nbe", "National Bank of Egypt", "USD", 48.0), rate("cib", "CIB", "USD", 48.1)],
            now,
        )
        .unwrap();
        db.replace_bank_rates(&[rate("nbe", "National Bank of Egypt", "EUR", 52.0)], now).unwrap();

        let rates = db.bank_rates().unwrap();
        assert_eq!(rates.len(), 1);
        assert_eq!(rates[0].currency, "EUR");

        // Display settings survive snapshot replacement
        let settings = db.bank_display_settings().unwrap();
        assert_eq!(settings.len(), 2);
        assert!(settings.iter().all(|s| s.display_order == UNORDERED_BANK && s.is_enabled));
    }

    #[test]
    fn test_update_display_and_enabled_order() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        db.replace_bank_rates(
            &[rate("nbe", "NBE", "USD", 48.0), rate("cib", "CIB", "USD", 48.1), rate("qnb", "QNB", "USD", 48.2)],
            now,
        )
        .unwrap();

        assert!(db.update_bank_display("cib", true, 1, now).unwrap());
        assert!(db.update_bank_display("nbe", false, 2, now).unwrap());
        assert!(!db.update_bank_display("unknown", true, 3, now).unwrap());

        let enabled: Vec<String> = db.enabled_banks().unwrap().into_iter().map(|b| b.bank_id).collect();
        assert_eq!(enabled, vec!["cib".to_string(), "qnb".to_string()]);
    }

    #[test]
    fn test_pair_and_name_lookups() {
        let db = Database::open_in_memory().unwrap();
        db.replace_bank_rates(
            &[rate("nbe", "National Bank", "USD", 48.0), rate("nbe", "National Bank", "EUR", 52.0)],
            Utc::now(),
        )
        .unwrap();

        assert_eq!(db.bank_rates_for_pair("usd", "egp").unwrap().len(), 1);
        assert_eq!(db.bank_rates_by_name("national", 20).unwrap().len(), 2);
        assert_eq!(db.currency_pairs().unwrap().len(), 2);
        assert_eq!(db.distinct_banks().unwrap().len(), 1);
    }
}

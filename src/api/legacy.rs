//! Response shapes kept for older site widgets

use actix_web::{web, HttpResponse};
use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use super::gold::all_countries_latest;
use super::prices::cached_snapshot;
use crate::app_state::AppState;
use crate::error::ApiError;
use crate::models::{round2, PriceHistory, GRAMS_PER_OUNCE, GRAMS_PER_POUND};
use crate::store::prices::EGYPT_GOLD_TYPES;

const HISTORY_DAYS: i64 = 30;

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/gold-live-prices", web::get().to(live_prices))
        .route("/gold-live-products", web::get().to(live_products))
        .route("/gold-live-history", web::get().to(live_history))
        .route("/all-countries", web::get().to(all_countries));
}

fn snapshot_gold(state: &AppState) -> Result<Value, ApiError> {
    let mut snapshot = cached_snapshot(state)?;
    Ok(snapshot["gold_egypt"]["prices"].take())
}

fn sell_of(prices: &Value, karat: &str) -> f64 {
    prices[karat]["sell"].as_f64().unwrap_or(0.0)
}

pub async fn live_prices(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let prices = snapshot_gold(&state)?;
    let body: Vec<Value> = prices
        .as_object()
        .map(|map| {
            map.iter()
                .map(|(karat, side)| json!({"name": format!("عيار {}", karat), "buy": side["buy"], "sell": side["sell"]}))
                .collect()
        })
        .unwrap_or_default();
    Ok(HttpResponse::Ok().json(body))
}

/// Gold pound (8g of 21K) and ounce (of 24K)
pub async fn live_products(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let prices = snapshot_gold(&state)?;
    Ok(HttpResponse::Ok().json(json!([
        {"name": "الجنيه الذهب", "weight": "8 جرام", "price": sell_of(&prices, "21") * GRAMS_PER_POUND},
        {"name": "أوقية الذهب", "weight": "31.10 جرام", "price": sell_of(&prices, "24") * GRAMS_PER_OUNCE},
    ])))
}

/// One day of the legacy history table
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistoryDay {
    pub date: String,
    pub karat_24: f64,
    pub karat_22: f64,
    pub karat_21: f64,
    pub karat_18: f64,
    pub karat_14: f64,
    pub ounce: f64,
    pub pound: f64,
}

impl HistoryDay {
    /// Fill missing karats from 21K, or from 24K when 21K is missing too
    fn derive_missing(&mut self) {
        let (base, base_karat) = if self.karat_21 > 0.0 {
            (self.karat_21, 21.0)
        } else if self.karat_24 > 0.0 {
            (self.karat_24, 24.0)
        } else {
            return;
        };
        let from_base = |karat: f64| round2(base * karat / base_karat);
        for (slot, karat) in [
            (&mut self.karat_24, 24.0),
            (&mut self.karat_22, 22.0),
            (&mut self.karat_21, 21.0),
            (&mut self.karat_18, 18.0),
            (&mut self.karat_14, 14.0),
        ] {
            if *slot == 0.0 {
                *slot = from_base(karat);
            }
        }
        if self.pound == 0.0 {
            self.pound = round2(self.karat_21 * GRAMS_PER_POUND);
        }
        if self.ounce == 0.0 {
            self.ounce = round2(self.karat_24 * GRAMS_PER_OUNCE);
        }
    }
}

/// Group newest-first history rows by day. Later rows overwrite earlier
/// ones, so the day's first recorded price of a karat is the one shown.
pub fn history_table(rows: &[PriceHistory]) -> Vec<HistoryDay> {
    let mut days: BTreeMap<String, HistoryDay> = BTreeMap::new();
    for h in rows {
        let date = h.timestamp.format("%Y-%m-%d").to_string();
        let day = days.entry(date.clone()).or_insert_with(|| HistoryDay { date, ..Default::default() });
        let slot = match h.key.as_str() {
            "24" => &mut day.karat_24,
            "22" => &mut day.karat_22,
            "21" => &mut day.karat_21,
            "18" => &mut day.karat_18,
            "14" => &mut day.karat_14,
            _ => continue,
        };
        *slot = h.sell_price;
    }
    let mut table: Vec<HistoryDay> = days.into_values().rev().collect();
    for day in table.iter_mut() {
        day.derive_missing();
    }
    table.truncate(HISTORY_DAYS as usize);
    table
}

pub async fn live_history(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let since = Utc::now() - Duration::days(HISTORY_DAYS);
    let rows = state.db.history_since(EGYPT_GOLD_TYPES, "egypt", None, since)?;
    Ok(HttpResponse::Ok().json(history_table(&rows)))
}

pub async fn all_countries(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(all_countries_latest(&state.db)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(key: &str, sell: f64, day: u32, hour: u32) -> PriceHistory {
        PriceHistory {
            id: 0,
            price_id: None,
            price_type: "gold".to_string(),
            country: "egypt".to_string(),
            key: key.to_string(),
            sell_price: sell,
            buy_price: sell,
            source_name: None,
            timestamp: Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_history_table_keeps_first_price_of_day() {
        let rows = vec![row("21", 4200.0, 2, 12), row("21", 4100.0, 2, 9), row("24", 4700.0, 1, 10)];
        let table = history_table(&rows);
        assert_eq!(table.len(), 2);

        let newest = &table[0];
        assert_eq!(newest.date, "2025-03-02");
        assert_eq!(newest.karat_21, 4100.0);
        assert_eq!(newest.karat_24, round2(4100.0 * 24.0 / 21.0));
        assert_eq!(newest.pound, 32800.0);
        assert_eq!(newest.ounce, round2(newest.karat_24 * GRAMS_PER_OUNCE));

        let older = &table[1];
        assert_eq!(older.karat_24, 4700.0);
        assert_eq!(older.karat_21, round2(4700.0 * 21.0 / 24.0));
    }
}

//! Egyptian gold prices and per-country listings

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use super::{date_of, time_of};
use crate::app_state::AppState;
use crate::error::ApiError;
use crate::models::{PriceHistory, SourceStatus, UnifiedPrice};
use crate::store::prices::{COUNTRY_GOLD_TYPES, EGYPT_GOLD_TYPES};
use crate::store::{Database, StoreResult};

/// Setting holding a flat amount added to every gold price on read
pub const PRICE_OFFSET_SETTING: &str = "price_offset";

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/prices", web::get().to(prices))
        .route("/history", web::get().to(history))
        .route("/all-countries", web::get().to(all_countries))
        .route("/country/{slug}", web::get().to(country));
}

/// One gold price as served to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoldPriceView {
    pub id: i64,
    pub karat: String,
    pub sell_price: f64,
    pub buy_price: f64,
    pub currency: String,
    pub country: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub date: String,
    pub time: String,
    pub source: Option<String>,
    pub source_status: Option<String>,
    #[serde(rename = "type")]
    pub price_type: String,
}

impl GoldPriceView {
    fn from_history(h: &PriceHistory) -> Self {
        Self {
            id: h.id,
            karat: h.key.clone(),
            sell_price: h.sell_price,
            buy_price: h.buy_price,
            currency: "EGP".to_string(),
            country: h.country.clone(),
            timestamp: h.timestamp,
            date: date_of(&h.timestamp),
            time: time_of(&h.timestamp),
            source: h.source_name.clone(),
            source_status: Some(SourceStatus::Historical.as_str().to_string()),
            price_type: h.price_type.clone(),
        }
    }
}

/// Current Egyptian gold prices. A parseable manual override replaces both
/// sides of its karat; every other karat gets the configured offset added.
pub fn current_gold_prices(db: &Database) -> StoreResult<Vec<GoldPriceView>> {
    let rows = db.unified_prices(EGYPT_GOLD_TYPES, Some("egypt"))?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let offset = db
        .get_setting(PRICE_OFFSET_SETTING)?
        .and_then(|v| v.trim().parse::<f64>().ok())
        .unwrap_or(0.0);
    let manual = db.manual_prices()?;

    Ok(rows
        .into_iter()
        .map(|p| {
            let override_price = manual
                .get(&p.key)
                .and_then(|v| v.trim().parse::<f64>().ok());
            let (sell, buy, status) = match override_price {
                Some(price) => (price, price, Some(SourceStatus::Manual.as_str().to_string())),
                None => (p.sell_price + offset, p.buy_price + offset, p.source_status.clone()),
            };
            GoldPriceView {
                id: p.id,
                karat: p.key.clone(),
                sell_price: sell,
                buy_price: buy,
                currency: if p.currency.is_empty() { "EGP".to_string() } else { p.currency.clone() },
                country: p.country.clone(),
                timestamp: p.last_update,
                date: date_of(&p.last_update),
                time: time_of(&p.last_update),
                source: p.source_name.clone(),
                source_status: status,
                price_type: p.price_type,
            }
        })
        .collect())
}

/// Latest gold prices of every country keyed by lowercase slug. The first
/// row seen for a country supplies its timestamp and source.
pub fn countries_map(prices: &[UnifiedPrice]) -> Map<String, Value> {
    let mut result: BTreeMap<String, Value> = BTreeMap::new();
    for p in prices {
        let entry = result.entry(p.country.to_lowercase()).or_insert_with(|| {
            json!({
                "current_prices": {},
                "timestamp": p.last_update,
                "last_update": p.last_update.format("%Y-%m-%d %H:%M:%S").to_string(),
                "source": p.source_name,
            })
        });
        entry["current_prices"][p.key.as_str()] = json!({
            "sell": p.sell_price,
            "buy": p.buy_price,
            "currency": p.currency,
        });
    }
    result.into_iter().collect()
}

pub fn all_countries_latest(db: &Database) -> StoreResult<Map<String, Value>> {
    Ok(countries_map(&db.unified_prices(COUNTRY_GOLD_TYPES, None)?))
}

pub async fn prices(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(current_gold_prices(&state.db)?))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    100
}

pub async fn history(
    state: web::Data<AppState>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, ApiError> {
    let rows = state.db.recent_history(EGYPT_GOLD_TYPES, "egypt", query.limit)?;
    let views: Vec<GoldPriceView> = rows.iter().map(GoldPriceView::from_history).collect();
    Ok(HttpResponse::Ok().json(views))
}

pub async fn all_countries(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(all_countries_latest(&state.db)?))
}

pub async fn country(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let slug = path.into_inner();
    let prices = state.db.unified_prices(COUNTRY_GOLD_TYPES, Some(slug.as_str()))?;
    let mut map = countries_map(&prices);
    let body = match map.remove(&slug.to_lowercase()) {
        Some(entry) => entry,
        None => json!({"current_prices": {}, "timestamp": null, "source": null}),
    };
    Ok(HttpResponse::Ok().json(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PriceQuote;
    use crate::store::settings::MANUAL_PRICE_PREFIX;
    use chrono::Utc;

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        let mut uae = PriceQuote::local_gold("24", 320.0, 318.0, "GoldPriceToday");
        uae.price_type = "international".to_string();
        uae.country = "uae".to_string();
        uae.currency = "AED".to_string();
        db.save_prices(
            &[
                PriceQuote::local_gold("21", 3500.0, 3475.0, "GoldEra"),
                PriceQuote::local_gold("24", 4000.0, 3970.0, "GoldEra"),
                uae,
            ],
            Utc::now(),
        )
        .unwrap();
        db
    }

    #[test]
    fn test_manual_override_beats_offset() {
        let db = seeded();
        db.set_setting(PRICE_OFFSET_SETTING, "10").unwrap();
        db.set_setting(&format!("{}21", MANUAL_PRICE_PREFIX), "3600").unwrap();

        let prices = current_gold_prices(&db).unwrap();
        let k21 = prices.iter().find(|p| p.karat == "21").unwrap();
        assert_eq!((k21.sell_price, k21.buy_price), (3600.0, 3600.0));
        assert_eq!(k21.source_status.as_deref(), Some("Manual"));

        let k24 = prices.iter().find(|p| p.karat == "24").unwrap();
        assert_eq!((k24.sell_price, k24.buy_price), (4010.0, 3980.0));
    }

    #[test]
    fn test_unparseable_override_falls_back_to_offset() {
        let db = seeded();
        db.set_setting(&format!("{}21", MANUAL_PRICE_PREFIX), "soon").unwrap();
        let prices = current_gold_prices(&db).unwrap();
        let k21 = prices.iter().find(|p| p.karat == "21").unwrap();
        assert_eq!(k21.sell_price, 3500.0);
        assert_ne!(k21.source_status.as_deref(), Some("Manual"));
    }

    #[test]
    fn test_countries_map_groups_by_slug() {
        let db = seeded();
        let map = all_countries_latest(&db).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["uae"]["current_prices"]["24"]["currency"], "AED");
        assert_eq!(map["egypt"]["current_prices"]["21"]["sell"], 3500.0);
        assert!(map["egypt"]["last_update"].is_string());
    }
}

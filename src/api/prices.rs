//! Unified market endpoints under `/v1`
//!
//! The snapshot bundles everything the web and mobile clients render on
//! their home screens in one payload and is cached for a minute.

use actix_web::{web, HttpResponse};
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::days_before;
use super::gold::countries_map;
use crate::app_state::AppState;
use crate::cache::{SNAPSHOT_KEY, SNAPSHOT_TTL};
use crate::error::ApiError;
use crate::models::round2;
use crate::store::prices::EGYPT_GOLD_TYPES;

pub const API_VERSION: &str = "1.4.0";

/// Items of each list the snapshot carries
const SNAPSHOT_NEWS: usize = 10;
const SNAPSHOT_QA: usize = 1000;
const PREVIEW_DAYS: i64 = 7;

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/snapshot", web::get().to(snapshot))
        .route("/gold/history-range", web::get().to(history_range))
        .route("/gold/today", web::get().to(gold_today))
        .route("/currency/today", web::get().to(currency_today));
}

/// Build the market snapshot from the database
pub fn build_snapshot(state: &AppState) -> Result<Value, ApiError> {
    let db = &state.db;
    let now = Utc::now();

    let mut gold = json!({"prices": {}, "source": null, "last_update": null});
    let mut currencies = json!({"rates": {}, "source": null, "last_update": null});
    for p in db.all_unified_prices()? {
        let price_type = p.price_type.to_lowercase();
        let side = json!({"sell": p.sell_price, "buy": p.buy_price});
        let section = if EGYPT_GOLD_TYPES.contains(&price_type.as_str()) && p.country.eq_ignore_ascii_case("egypt") {
            gold["prices"][p.key.as_str()] = side;
            &mut gold
        } else if price_type == "currency" {
            currencies["rates"][p.key.as_str()] = side;
            &mut currencies
        } else {
            continue;
        };
        section["source"] = json!(p.source_name);
        section["last_update"] = json!(p.last_update);
    }

    let countries = countries_map(&db.unified_prices(&["international"], None)?);

    let silver = db.latest_silver()?;
    let silver_section = match &silver {
        Some(s) => {
            let r = &s.reading;
            json!({
                "gram": r.silver_999.sell,
                "sell_price": r.silver_999.sell,
                "buy_price": r.silver_999.buy,
                "ounce": r.ounce_price,
                "ounce_usd": r.ounce_usd.sell,
                "purities": {
                    "999": r.silver_999.sell,
                    "925": r.silver_925.sell,
                    "900": r.silver_900.sell,
                    "800": r.silver_800.sell,
                },
                "last_update": s.created_at,
            })
        }
        None => json!({
            "gram": null, "sell_price": null, "buy_price": null, "ounce": null, "ounce_usd": null,
            "purities": {"999": null, "925": null, "900": null, "800": null},
            "last_update": null,
        }),
    };

    let news: Vec<Value> = db
        .latest_articles(SNAPSHOT_NEWS)?
        .into_iter()
        .map(|a| json!({"title": a.title, "slug": a.slug, "featured_image": a.featured_image, "created_at": a.created_at}))
        .collect();

    let qa: Vec<Value> = db
        .qa_items(None, true, 0, SNAPSHOT_QA)?
        .into_iter()
        .map(|q| json!({"id": q.id, "page_key": q.page_key, "question": q.question, "answer": q.answer}))
        .collect();

    let mut preview = db.history_since(EGYPT_GOLD_TYPES, "egypt", Some("21"), now - Duration::days(PREVIEW_DAYS))?;
    preview.reverse();
    let preview: Vec<Value> = preview
        .into_iter()
        .map(|h| json!({"date": h.timestamp.format("%m-%d").to_string(), "price": h.sell_price}))
        .collect();

    let settings: Map<String, Value> = db
        .all_settings()?
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();

    Ok(json!({
        "metadata": {"timestamp": now, "api_version": API_VERSION},
        "settings": settings,
        "gold_egypt": gold,
        "currencies": currencies,
        "countries": countries,
        "silver": silver_section,
        "news": news,
        "qa": qa,
        "gold_history_preview": preview,
    }))
}

/// Cached snapshot, rebuilt when missing or expired
pub fn cached_snapshot(state: &AppState) -> Result<Value, ApiError> {
    if let Some(snapshot) = state.cache.get(SNAPSHOT_KEY) {
        return Ok(snapshot);
    }
    let snapshot = build_snapshot(state)?;
    state.cache.set(SNAPSHOT_KEY, snapshot.clone(), SNAPSHOT_TTL);
    Ok(snapshot)
}

pub async fn snapshot(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(cached_snapshot(&state)?))
}

pub async fn gold_today(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let mut snapshot = cached_snapshot(&state)?;
    Ok(HttpResponse::Ok().json(snapshot["gold_egypt"].take()))
}

pub async fn currency_today(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let mut snapshot = cached_snapshot(&state)?;
    Ok(HttpResponse::Ok().json(snapshot["currencies"].take()))
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    #[serde(default = "default_days")]
    pub days: i64,
    #[serde(default = "default_karat")]
    pub karat: String,
}

fn default_days() -> i64 {
    7
}

fn default_karat() -> String {
    "21".to_string()
}

/// History of one karat, newest first, each row compared with the next
/// older one. Chart arrays run oldest first.
pub async fn history_range(
    state: web::Data<AppState>,
    query: web::Query<RangeQuery>,
) -> Result<HttpResponse, ApiError> {
    let since = days_before(Utc::now(), query.days.max(0))?;
    let history = state.db.history_since(EGYPT_GOLD_TYPES, "egypt", Some(query.karat.as_str()), since)?;

    let data: Vec<Value> = history
        .iter()
        .enumerate()
        .map(|(i, current)| {
            let older = history.get(i + 1);
            let change = older.map(|o| current.sell_price - o.sell_price).unwrap_or(0.0);
            let change_percent = match older {
                Some(o) if o.sell_price > 0.0 => round2(change / o.sell_price * 100.0),
                _ => 0.0,
            };
            json!({
                "date": current.timestamp.format("%Y-%m-%d").to_string(),
                "timestamp": current.timestamp,
                "sell": current.sell_price,
                "buy": current.buy_price,
                "change": round2(change),
                "change_percent": change_percent,
            })
        })
        .collect();

    let chart_labels: Vec<Value> = data.iter().rev().map(|row| row["date"].clone()).collect();
    let chart_data: Vec<Value> = data.iter().rev().map(|row| row["sell"].clone()).collect();

    Ok(HttpResponse::Ok().json(json!({
        "days": query.days,
        "karat": query.karat,
        "data": data,
        "chart_labels": chart_labels,
        "chart_data": chart_data,
    })))
}

//! Read-only silver price endpoints

use actix_web::{web, HttpResponse};
use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::days_before;
use crate::app_state::AppState;
use crate::error::ApiError;
use crate::models::{SilverPrice, SilverQuote, SourceStatus};

const MAX_HISTORY_LIMIT: usize = 1000;
const MAX_STATS_DAYS: i64 = 365;
const RECENT_SCRAPES: usize = 20;

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/latest", web::get().to(latest))
        .route("/history", web::get().to(history))
        .route("/by-date", web::get().to(by_date))
        .route("/stats", web::get().to(stats))
        .route("/source-status", web::get().to(source_status));
}

fn change_of(record: &SilverPrice) -> Value {
    let q = &record.reading.silver_999;
    json!({"absolute": q.change, "percent": q.change_percent})
}

/// Condensed row used by the list endpoints
fn record_json(record: &SilverPrice) -> Value {
    let r = &record.reading;
    json!({
        "id": record.id,
        "source_used": r.source_used,
        "source_status": r.source_status,
        "prices": {
            "gram": r.gram_price,
            "ounce": r.ounce_price,
            "silver_999": r.silver_999.sell,
            "silver_925": r.silver_925.sell,
            "buy": r.silver_999.buy,
            "sell": r.silver_999.sell,
        },
        "change": change_of(record),
        "currency": r.currency,
        "scraped_at": record.scraped_at,
        "created_at": record.created_at,
    })
}

fn insert_quote(prices: &mut Value, prefix: &str, quote: &SilverQuote) {
    prices[format!("{}_sell", prefix)] = json!(quote.sell);
    prices[format!("{}_buy", prefix)] = json!(quote.buy);
    prices[format!("{}_change", prefix)] = json!(quote.change);
    prices[format!("{}_change_percent", prefix)] = json!(quote.change_percent);
}

pub async fn latest(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let record = state
        .db
        .latest_silver()?
        .ok_or_else(|| ApiError::NotFound("No silver price data available".to_string()))?;
    let r = &record.reading;

    let mut prices = json!({
        "gram": r.gram_price,
        "ounce": r.ounce_price,
        "silver_999": r.silver_999.sell,
        "silver_925": r.silver_925.sell,
        "buy": r.silver_999.buy,
        "sell": r.silver_999.sell,
    });
    for (prefix, quote) in [
        ("silver_999", &r.silver_999),
        ("silver_925", &r.silver_925),
        ("silver_900", &r.silver_900),
        ("silver_800", &r.silver_800),
        ("ounce_usd", &r.ounce_usd),
    ] {
        insert_quote(&mut prices, prefix, quote);
    }

    Ok(HttpResponse::Ok().json(json!({
        "id": record.id,
        "source_used": r.source_used,
        "source_status": r.source_status,
        "prices": prices,
        "change": change_of(&record),
        "currency": r.currency,
        "scraped_at": record.scraped_at,
        "source_update_time": r.source_update_time,
        "created_at": record.created_at,
    })))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    100
}

pub async fn history(
    state: web::Data<AppState>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, ApiError> {
    if query.limit > MAX_HISTORY_LIMIT {
        return Err(ApiError::BadRequest(format!("limit must not exceed {}", MAX_HISTORY_LIMIT)));
    }
    let total = state.db.silver_count()?;
    let data: Vec<Value> = state
        .db
        .silver_page(query.limit, query.offset)?
        .iter()
        .map(record_json)
        .collect();
    Ok(HttpResponse::Ok().json(json!({
        "total": total,
        "limit": query.limit,
        "offset": query.offset,
        "data": data,
    })))
}

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: String,
}

pub async fn by_date(
    state: web::Data<AppState>,
    query: web::Query<DateQuery>,
) -> Result<HttpResponse, ApiError> {
    let day = NaiveDate::parse_from_str(&query.date, "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest("Invalid date format. Use YYYY-MM-DD".to_string()))?;
    let start = day.and_time(chrono::NaiveTime::MIN).and_utc();
    let records = state.db.silver_between(start, start + Duration::days(1))?;
    if records.is_empty() {
        return Err(ApiError::NotFound(format!("No silver price data found for date {}", query.date)));
    }
    let data: Vec<Value> = records.iter().map(record_json).collect();
    Ok(HttpResponse::Ok().json(json!({
        "date": query.date,
        "count": data.len(),
        "data": data,
    })))
}

/// current/min/max/avg of a series, all null when empty
fn series_stats(values: &[f64]) -> Value {
    if values.is_empty() {
        return json!({"current": null, "min": null, "max": null, "avg": null});
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let avg = values.iter().sum::<f64>() / values.len() as f64;
    json!({"current": values.last(), "min": min, "max": max, "avg": avg})
}

fn count_status(records: &[SilverPrice], status: SourceStatus) -> usize {
    records
        .iter()
        .filter(|r| r.reading.source_status == status.as_str())
        .count()
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    #[serde(default = "default_days")]
    pub days: i64,
}

fn default_days() -> i64 {
    7
}

pub async fn stats(
    state: web::Data<AppState>,
    query: web::Query<StatsQuery>,
) -> Result<HttpResponse, ApiError> {
    if !(1..=MAX_STATS_DAYS).contains(&query.days) {
        return Err(ApiError::BadRequest(format!("days must be between 1 and {}", MAX_STATS_DAYS)));
    }
    let end = Utc::now();
    let start = days_before(end, query.days)?;
    let records = state.db.silver_since(start)?;
    if records.is_empty() {
        return Err(ApiError::NotFound(format!("No data available for the last {} days", query.days)));
    }

    let grams: Vec<f64> = records
        .iter()
        .filter_map(|r| r.reading.gram_price)
        .filter(|p| *p != 0.0)
        .collect();
    let ounces: Vec<f64> = records
        .iter()
        .filter_map(|r| r.reading.ounce_price)
        .filter(|p| *p != 0.0)
        .collect();

    Ok(HttpResponse::Ok().json(json!({
        "period": {"days": query.days, "start": start, "end": end},
        "total_records": records.len(),
        "gram_price": series_stats(&grams),
        "ounce_price": series_stats(&ounces),
        "sources_used": {
            "primary": count_status(&records, SourceStatus::Primary),
            "fallback": count_status(&records, SourceStatus::Fallback),
        },
    })))
}

fn rate(count: usize, total: usize) -> String {
    format!("{:.1}%", count as f64 / total as f64 * 100.0)
}

pub async fn source_status(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let recent = state.db.silver_page(RECENT_SCRAPES, 0)?;
    let Some(latest) = recent.first() else {
        return Err(ApiError::NotFound("No data available".to_string()));
    };
    let scrapes: Vec<Value> = recent
        .iter()
        .map(|r| {
            json!({
                "source": r.reading.source_used,
                "status": r.reading.source_status,
                "timestamp": r.created_at,
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(json!({
        "latest_source": latest.reading.source_used,
        "latest_status": latest.reading.source_status,
        "latest_scrape": latest.created_at,
        "recent_scrapes": scrapes,
        "source_reliability": {
            "primary_success_rate": rate(count_status(&recent, SourceStatus::Primary), recent.len()),
            "fallback_usage_rate": rate(count_status(&recent, SourceStatus::Fallback), recent.len()),
        },
    })))
}

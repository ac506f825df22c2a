//! Dashboard operations: settings, manual scrapes, source management,
//! manual price overrides and archive seeding. Every route requires a
//! logged-in user.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use log::{info, warn};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::gold::{all_countries_latest, current_gold_prices};
use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::error::{ApiError, ScrapeError};
use crate::models::SourceKind;
use crate::scraper::{currency, gold, history, silver};
use crate::store::prices::EGYPT_GOLD_TYPES;
use crate::store::settings::MANUAL_PRICE_PREFIX;
use crate::worker;

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/settings", web::get().to(settings))
        .route("/settings", web::post().to(update_setting))
        .route("/scrape", web::post().to(scrape_gold))
        .route("/test-gold-source/{name}", web::post().to(test_gold_source))
        .route("/scrape/currency", web::post().to(scrape_currency))
        .route("/currency-sources", web::get().to(currency_sources))
        .route("/currency-sources/reorder", web::post().to(reorder_currency_sources))
        .route("/currency-sources/{name}", web::post().to(update_currency_source))
        .route("/test-currency-source/{name}", web::post().to(test_currency_source))
        .route("/silver-sources", web::get().to(silver_sources))
        .route("/silver-sources/reorder", web::post().to(reorder_silver_sources))
        .route("/silver-sources/{name}", web::post().to(update_silver_source))
        .route("/test-silver-source/{name}", web::post().to(test_silver_source))
        .route("/stats", web::get().to(stats))
        .route("/manual-prices", web::get().to(manual_prices))
        .route("/manual-price", web::post().to(update_manual_price))
        .route("/raw-cache", web::get().to(raw_cache))
        .route("/seed-archive", web::post().to(seed_archive));
}

#[derive(Debug, Deserialize)]
pub struct SettingInput {
    pub key: String,
    pub value: String,
}

pub async fn settings(state: web::Data<AppState>, _user: AuthUser) -> Result<HttpResponse, ApiError> {
    let body: Vec<Value> = state
        .db
        .all_settings()?
        .into_iter()
        .map(|(key, value)| json!({"key": key, "value": value}))
        .collect();
    Ok(HttpResponse::Ok().json(body))
}

pub async fn update_setting(
    state: web::Data<AppState>,
    user: AuthUser,
    body: web::Json<SettingInput>,
) -> Result<HttpResponse, ApiError> {
    state.db.set_setting(&body.key, &body.value)?;
    state.invalidate_prices();
    info!("{} set {} = {}", user.0.username, body.key, body.value);
    Ok(HttpResponse::Ok().json(json!({"key": body.key, "value": body.value})))
}

pub async fn scrape_gold(state: web::Data<AppState>, user: AuthUser) -> Result<HttpResponse, ApiError> {
    info!("{} triggered a gold scrape", user.0.username);
    let run = worker::scrape_gold(&state).await?;
    if run.count == 0 {
        return Ok(HttpResponse::Ok().json(json!({"status": "failed", "message": "No prices fetched"})));
    }
    Ok(HttpResponse::Ok().json(json!({"status": "success", "count": run.count, "source": run.source})))
}

pub async fn test_gold_source(
    state: web::Data<AppState>,
    _user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let probe = gold::probe(state.fetcher.as_ref(), &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(probe))
}

pub async fn scrape_currency(state: web::Data<AppState>, user: AuthUser) -> Result<HttpResponse, ApiError> {
    info!("{} triggered a currency scrape", user.0.username);
    let count = worker::scrape_currency(&state).await?;
    if count == 0 {
        return Ok(HttpResponse::Ok().json(json!({"status": "failed", "message": "No rates fetched"})));
    }
    Ok(HttpResponse::Ok().json(json!({"status": "success", "count": count})))
}

#[derive(Debug, Deserialize)]
pub struct SourceChange {
    pub is_enabled: Option<bool>,
    pub priority: Option<i64>,
}

fn list_sources(state: &AppState, kind: SourceKind) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(state.db.sources(kind)?))
}

fn change_source(state: &AppState, kind: SourceKind, name: &str, change: &SourceChange) -> Result<HttpResponse, ApiError> {
    state.db.seed_sources(kind, Utc::now())?;
    let source = state
        .db
        .update_source(kind, name, change.is_enabled, change.priority, Utc::now())?
        .ok_or_else(|| ApiError::NotFound("Source not found".to_string()))?;
    info!("Updated {} source {}: enabled={}, priority={}", kind.as_str(), name, source.is_enabled, source.priority);
    Ok(HttpResponse::Ok().json(source))
}

fn reorder(state: &AppState, kind: SourceKind, order: &[String]) -> Result<HttpResponse, ApiError> {
    state.db.seed_sources(kind, Utc::now())?;
    state.db.reorder_sources(kind, order, Utc::now())?;
    info!("Reordered {} sources: {}", kind.as_str(), order.join(", "));
    Ok(HttpResponse::Ok().json(json!({"status": "success"})))
}

pub async fn currency_sources(state: web::Data<AppState>, _user: AuthUser) -> Result<HttpResponse, ApiError> {
    list_sources(&state, SourceKind::Currency)
}

pub async fn update_currency_source(
    state: web::Data<AppState>,
    _user: AuthUser,
    path: web::Path<String>,
    body: web::Json<SourceChange>,
) -> Result<HttpResponse, ApiError> {
    change_source(&state, SourceKind::Currency, &path.into_inner(), &body)
}

pub async fn reorder_currency_sources(
    state: web::Data<AppState>,
    _user: AuthUser,
    body: web::Json<Vec<String>>,
) -> Result<HttpResponse, ApiError> {
    reorder(&state, SourceKind::Currency, &body)
}

pub async fn test_currency_source(
    state: web::Data<AppState>,
    _user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let probe = currency::probe(state.fetcher.as_ref(), &path.into_inner())
        .await
        .map_err(|e| match e {
            ScrapeError::UnknownSource(_) => ApiError::NotFound("Source or test bank not found".to_string()),
            other => other.into(),
        })?;
    Ok(HttpResponse::Ok().json(probe))
}

pub async fn silver_sources(state: web::Data<AppState>, _user: AuthUser) -> Result<HttpResponse, ApiError> {
    list_sources(&state, SourceKind::Silver)
}

pub async fn update_silver_source(
    state: web::Data<AppState>,
    _user: AuthUser,
    path: web::Path<String>,
    body: web::Json<SourceChange>,
) -> Result<HttpResponse, ApiError> {
    change_source(&state, SourceKind::Silver, &path.into_inner(), &body)
}

pub async fn reorder_silver_sources(
    state: web::Data<AppState>,
    _user: AuthUser,
    body: web::Json<Vec<String>>,
) -> Result<HttpResponse, ApiError> {
    reorder(&state, SourceKind::Silver, &body)
}

pub async fn test_silver_source(
    state: web::Data<AppState>,
    _user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let probe = silver::probe(state.fetcher.as_ref(), &path.into_inner(), Utc::now())
        .await
        .map_err(|e| match e {
            ScrapeError::UnknownSource(_) => ApiError::NotFound("Source not found".to_string()),
            other => other.into(),
        })?;
    Ok(HttpResponse::Ok().json(probe))
}

/// Egyptian gold prices keyed both by bare karat and by its Arabic label
fn karat_map(state: &AppState) -> Result<Map<String, Value>, ApiError> {
    let mut map = Map::new();
    for p in state.db.unified_prices(EGYPT_GOLD_TYPES, Some("egypt"))? {
        let side = json!({"sell": p.sell_price, "buy": p.buy_price});
        map.insert(format!("عيار {}", p.key), side.clone());
        map.insert(p.key, side);
    }
    Ok(map)
}

pub async fn stats(state: web::Data<AppState>, _user: AuthUser) -> Result<HttpResponse, ApiError> {
    let db = &state.db;
    let articles = db.article_count()?;
    let latest = db.latest_unified_price()?;
    Ok(HttpResponse::Ok().json(json!({
        "total_prices": db.history_count()?,
        "total_articles": articles,
        "last_update": latest.as_ref().map(|p| p.last_update),
        "active_source": latest.as_ref().and_then(|p| p.source_name.clone()).unwrap_or_else(|| "Unknown".to_string()),
        "db_snapshots_count": db.history_snapshot_count()?,
        "cache_last_updated": latest.as_ref().map(|p| p.last_update).unwrap_or_else(Utc::now),
        "scraper_status": {},
        "prices": karat_map(&state)?,
        "news_stats": {"total": articles},
    })))
}

pub async fn manual_prices(state: web::Data<AppState>, _user: AuthUser) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(state.db.manual_prices()?))
}

#[derive(Debug, Deserialize)]
pub struct ManualPriceInput {
    pub karat: String,
    #[serde(default)]
    pub price: Value,
}

/// Override text of a manual price body; `None` clears the override
fn override_text(price: &Value) -> Result<Option<String>, ApiError> {
    match price {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => Ok(Some(s.trim().to_string())),
        Value::Number(n) => Ok(Some(n.to_string())),
        _ => Err(ApiError::BadRequest("price must be a number, a string or null".to_string())),
    }
}

pub async fn update_manual_price(
    state: web::Data<AppState>,
    user: AuthUser,
    body: web::Json<ManualPriceInput>,
) -> Result<HttpResponse, ApiError> {
    let key = format!("{}{}", MANUAL_PRICE_PREFIX, body.karat);
    match override_text(&body.price)? {
        None => {
            state.db.delete_setting(&key)?;
            info!("{} cleared the manual price of karat {}", user.0.username, body.karat);
        }
        Some(text) => {
            let price = text
                .parse::<f64>()
                .map_err(|_| ApiError::BadRequest(format!("Invalid price: {}", text)))?;
            state.db.set_setting(&key, &text)?;
            state.db.apply_manual_price(&body.karat, price, Utc::now())?;
            info!("{} pinned karat {} to {}", user.0.username, body.karat, price);
        }
    }
    state.invalidate_prices();
    Ok(HttpResponse::Ok().json(json!({"status": "success"})))
}

/// What the dashboard shows, read straight from the database
pub async fn raw_cache(state: web::Data<AppState>, _user: AuthUser) -> Result<HttpResponse, ApiError> {
    let prices: Map<String, Value> = current_gold_prices(&state.db)?
        .into_iter()
        .map(|p| (format!("عيار {}", p.karat), json!({"sell": p.sell_price, "buy": p.buy_price})))
        .collect();
    Ok(HttpResponse::Ok().json(json!({
        "prices": prices,
        "countries": all_countries_latest(&state.db)?,
        "timestamp": Utc::now(),
    })))
}

pub async fn seed_archive(state: web::Data<AppState>, user: AuthUser) -> Result<HttpResponse, ApiError> {
    info!("{} started seeding the price archive", user.0.username);
    let count = history::seed_archive(&state.db, state.fetcher.as_ref(), Utc::now().date_naive()).await;
    if count == 0 {
        warn!("Archive seeding stored no records");
    }
    state.invalidate_prices();
    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": format!("Seeded database with {} historical records.", count),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_text() {
        assert_eq!(override_text(&json!(null)).unwrap(), None);
        assert_eq!(override_text(&json!("  ")).unwrap(), None);
        assert_eq!(override_text(&json!("3600")).unwrap().as_deref(), Some("3600"));
        assert_eq!(override_text(&json!(3600.5)).unwrap().as_deref(), Some("3600.5"));
        assert!(override_text(&json!([1])).is_err());
    }
}

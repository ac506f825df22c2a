//! Per-bank exchange rates: the public board under `/v1/banks` and the
//! display controls under `/admin/banks`

use actix_web::{rt, web, HttpResponse};
use chrono::Utc;
use log::{error, info};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::models::{BankRate, SourceKind};
use crate::store::banks::UNORDERED_BANK;
use crate::store::{Database, StoreResult};
use crate::worker;

pub fn public_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/rates/all", web::get().to(all_rates))
        .route("/rates/{currency}", web::get().to(rates_for_currency));
}

pub fn admin_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/all", web::get().to(all_banks))
        .route("/settings/update", web::post().to(update_settings))
        .route("/enabled", web::get().to(enabled))
        .route("/scrape-all", web::post().to(scrape_all))
        .route("/sources/all", web::get().to(sources))
        .route("/sources/update", web::post().to(update_sources));
}

/// Position of each enabled bank in the admin's display order
fn enabled_positions(db: &Database) -> StoreResult<HashMap<String, usize>> {
    Ok(db
        .enabled_banks()?
        .into_iter()
        .enumerate()
        .map(|(i, s)| (s.bank_id, i))
        .collect())
}

fn rate_json(rate: &BankRate) -> Value {
    json!({
        "bank_id": rate.bank_id,
        "bank_name": rate.bank_name,
        "currency": rate.currency,
        "buy_price": rate.buy_price,
        "sell_price": rate.sell_price,
        "last_update": rate.timestamp,
    })
}

/// Enabled banks' rates grouped by currency, each list in display order
pub fn enabled_rates_by_currency(db: &Database) -> StoreResult<BTreeMap<String, Vec<BankRate>>> {
    let positions = enabled_positions(db)?;
    let mut by_currency: BTreeMap<String, Vec<BankRate>> = BTreeMap::new();
    for rate in db.bank_rates()? {
        if positions.contains_key(&rate.bank_id) {
            by_currency.entry(rate.currency.clone()).or_default().push(rate);
        }
    }
    for rates in by_currency.values_mut() {
        rates.sort_by_key(|r| positions.get(&r.bank_id).copied().unwrap_or(usize::MAX));
    }
    Ok(by_currency)
}

pub async fn rates_for_currency(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let currency = path.into_inner().to_uppercase();
    let mut by_currency = enabled_rates_by_currency(&state.db)?;
    let mut banks: Vec<BankRate> = by_currency.remove(&currency).unwrap_or_default();
    banks.dedup_by(|a, b| a.bank_id == b.bank_id);
    let banks: Vec<Value> = banks.iter().map(rate_json).collect();
    Ok(HttpResponse::Ok().json(json!({
        "currency": currency,
        "total": banks.len(),
        "banks": banks,
    })))
}

pub async fn all_rates(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let body: BTreeMap<String, Vec<Value>> = enabled_rates_by_currency(&state.db)?
        .into_iter()
        .map(|(currency, rates)| (currency, rates.iter().map(rate_json).collect()))
        .collect();
    Ok(HttpResponse::Ok().json(body))
}

/// Every bank in the snapshot with its display setting
pub async fn all_banks(state: web::Data<AppState>, _user: AuthUser) -> Result<HttpResponse, ApiError> {
    let settings: HashMap<String, (bool, i64)> = state
        .db
        .bank_display_settings()?
        .into_iter()
        .map(|s| (s.bank_id, (s.is_enabled, s.display_order)))
        .collect();

    let mut banks: Vec<(String, String, bool, i64)> = state
        .db
        .distinct_banks()?
        .into_iter()
        .map(|(id, name, _, _)| {
            let (enabled, order) = settings.get(&id).copied().unwrap_or((true, UNORDERED_BANK));
            (id, name, enabled, order)
        })
        .collect();
    banks.sort_by_key(|b| b.3);

    let body: Vec<Value> = banks
        .into_iter()
        .map(|(id, name, enabled, order)| {
            json!({"bank_id": id, "bank_name": name, "is_enabled": enabled, "display_order": order})
        })
        .collect();
    Ok(HttpResponse::Ok().json(body))
}

#[derive(Debug, Deserialize)]
pub struct BankDisplayUpdate {
    pub bank_id: String,
    pub is_enabled: bool,
    pub display_order: i64,
}

pub async fn update_settings(
    state: web::Data<AppState>,
    user: AuthUser,
    body: web::Json<Vec<BankDisplayUpdate>>,
) -> Result<HttpResponse, ApiError> {
    let now = Utc::now();
    for update in body.iter() {
        if !state.db.update_bank_display(&update.bank_id, update.is_enabled, update.display_order, now)? {
            info!("Ignoring display update for unknown bank {}", update.bank_id);
        }
    }
    info!("{} updated display settings of {} banks", user.0.username, body.len());
    Ok(HttpResponse::Ok().json(json!({"status": "success", "updated": body.len()})))
}

pub async fn enabled(state: web::Data<AppState>, _user: AuthUser) -> Result<HttpResponse, ApiError> {
    let body: Vec<Value> = state
        .db
        .enabled_banks()?
        .into_iter()
        .map(|s| json!({"bank_id": s.bank_id, "bank_name": s.bank_name, "display_order": s.display_order}))
        .collect();
    Ok(HttpResponse::Ok().json(body))
}

/// Start a full bank scrape and answer at once
pub async fn scrape_all(state: web::Data<AppState>, user: AuthUser) -> Result<HttpResponse, ApiError> {
    info!("{} triggered a full bank scrape", user.0.username);
    let state = state.get_ref().clone();
    rt::spawn(async move {
        match worker::scrape_banks(&state).await {
            Ok(count) => info!("Background bank scrape stored {} rates", count),
            Err(e) => error!("Background bank scrape failed: {}", e),
        }
    });
    Ok(HttpResponse::Ok().json(json!({
        "status": "accepted",
        "message": "Scraping started in background",
        "timestamp": Utc::now(),
    })))
}

/// Currency scraping sites as seen by the bank board
pub async fn sources(state: web::Data<AppState>, _user: AuthUser) -> Result<HttpResponse, ApiError> {
    let body: Vec<Value> = state
        .db
        .sources(SourceKind::Currency)?
        .into_iter()
        .map(|s| {
            json!({
                "source_id": s.source_name,
                "source_name": s.display_name,
                "source_type": "all_banks",
                "is_enabled": s.is_enabled,
                "priority": s.priority,
            })
        })
        .collect();
    Ok(HttpResponse::Ok().json(body))
}

#[derive(Debug, Deserialize)]
pub struct SourceUpdate {
    pub source_id: String,
    pub is_enabled: bool,
    pub priority: i64,
}

pub async fn update_sources(
    state: web::Data<AppState>,
    _user: AuthUser,
    body: web::Json<Vec<SourceUpdate>>,
) -> Result<HttpResponse, ApiError> {
    let now = Utc::now();
    for update in body.iter() {
        let updated = state.db.update_source(
            SourceKind::Currency,
            &update.source_id,
            Some(update.is_enabled),
            Some(update.priority),
            now,
        )?;
        if updated.is_none() {
            info!("Ignoring update for unknown currency source {}", update.source_id);
        }
    }
    Ok(HttpResponse::Ok().json(json!({"status": "success", "updated": body.len()})))
}

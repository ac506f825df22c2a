//! Exchange rates: unified bank prices and the per-bank board

use actix_web::{web, HttpResponse};
use chrono::Utc;
use log::info;
use serde_json::{json, Value};

use super::{date_of, time_of};
use crate::app_state::AppState;
use crate::error::ApiError;
use crate::models::BankRate;
use crate::worker;

/// Rows returned by a bank name search
const BANK_SEARCH_LIMIT: usize = 20;

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/prices", web::get().to(prices))
        .route("/sarf-currencies", web::get().to(prices))
        .route("/rates/{from}/{to}", web::get().to(pair_rates))
        .route("/db/rates/latest", web::get().to(latest_rates))
        .route("/available-currencies", web::get().to(available_currencies))
        .route("/banks", web::get().to(banks))
        .route("/bank/{name}", web::get().to(bank))
        .route("/summary/{from}/{to}", web::get().to(summary))
        .route("/trigger-scrape", web::post().to(trigger_scrape));
}

pub async fn prices(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let body: Vec<Value> = state
        .db
        .unified_prices(&["currency"], None)?
        .into_iter()
        .map(|p| {
            json!({
                "id": p.id,
                "currency": p.key,
                "sell_price": p.sell_price,
                "buy_price": p.buy_price,
                "symbol": null,
                "timestamp": p.last_update,
                "date": date_of(&p.last_update),
                "time": time_of(&p.last_update),
                "source": p.source_name,
            })
        })
        .collect();
    Ok(HttpResponse::Ok().json(body))
}

/// Positive buy and sell prices of a rate list
fn sides(rates: &[BankRate]) -> (Vec<f64>, Vec<f64>) {
    let buys = rates.iter().map(|r| r.buy_price).filter(|p| *p > 0.0).collect();
    let sells = rates.iter().map(|r| r.sell_price).filter(|p| *p > 0.0).collect();
    (buys, sells)
}

fn max_of(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

fn min_of(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}

fn mean_of(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn pair_path(path: web::Path<(String, String)>) -> (String, String) {
    let (from, to) = path.into_inner();
    (from.to_uppercase(), to.to_uppercase())
}

/// Every bank quoting a pair, with best and average figures
pub async fn pair_rates(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (from, to) = pair_path(path);
    let rates = state.db.bank_rates_for_pair(&from, &to)?;
    let latest = rates
        .iter()
        .map(|r| r.timestamp)
        .max()
        .ok_or_else(|| ApiError::NotFound("No data found in database for this currency pair".to_string()))?;

    let (buys, sells) = sides(&rates);
    let banks: Vec<Value> = rates
        .iter()
        .map(|r| {
            json!({
                "name": r.bank_name,
                "url": r.bank_url,
                "logo": r.bank_logo,
                "buy_price": r.buy_price,
                "sell_price": r.sell_price,
                "buy_change": 0.0,
                "sell_change": 0.0,
                "last_update_time": r.timestamp.format("%I:%M %p").to_string(),
                "last_update_date": r.timestamp.format("%d/%m/%Y").to_string(),
                "currency_flag": null,
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(json!({
        "currency_pair": format!("{}/{}", from, to),
        "from_currency": from,
        "to_currency": to,
        "timestamp": latest,
        "summary": {
            "highest_buy": max_of(&buys),
            "lowest_sell": min_of(&sells),
            "average_buy": mean_of(&buys),
            "average_sell": mean_of(&sells),
        },
        "total_banks": banks.len(),
        "banks": banks,
    })))
}

pub async fn latest_rates(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let rates = state.db.bank_rates()?;
    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "timestamp": rates.first().map(|r| r.timestamp),
        "data": rates,
    })))
}

pub async fn available_currencies(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let pairs: Vec<Value> = state
        .db
        .currency_pairs()?
        .into_iter()
        .map(|(from, to)| json!({"pair": format!("{}/{}", from, to), "from": from, "to": to}))
        .collect();
    Ok(HttpResponse::Ok().json(json!({ "currency_pairs": pairs })))
}

pub async fn banks(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let body: Vec<Value> = state
        .db
        .distinct_banks()?
        .into_iter()
        .map(|(_, name, logo, url)| json!({"name": name, "logo": logo, "url": url}))
        .collect();
    Ok(HttpResponse::Ok().json(body))
}

pub async fn bank(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let name = path.into_inner();
    let rates = state.db.bank_rates_by_name(&name, BANK_SEARCH_LIMIT)?;
    if rates.is_empty() {
        return Err(ApiError::NotFound("Bank not found in database".to_string()));
    }
    Ok(HttpResponse::Ok().json(json!({"bank_name": name, "rates": rates})))
}

/// Whether a bank row is the central bank's
fn is_central_bank(name: &str) -> bool {
    name.contains("مركز") || name.to_uppercase().contains("CBE")
}

/// Market summary computed from the current snapshot
pub async fn summary(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (from, to) = pair_path(path);
    let rates = state.db.bank_rates_for_pair(&from, &to)?;
    if rates.is_empty() {
        return Err(ApiError::NotFound("No data found for this currency pair".to_string()));
    }
    let (buys, sells) = sides(&rates);
    let central = rates.iter().find(|r| is_central_bank(&r.bank_name));

    Ok(HttpResponse::Ok().json(json!({
        "from_currency": from,
        "to_currency": to,
        "highest_buy": max_of(&buys),
        "highest_buy_change": 0.0,
        "lowest_sell": min_of(&sells),
        "lowest_sell_change": 0.0,
        "average": mean_of(&sells),
        "average_change": 0.0,
        "central_bank_buy": central.map(|r| r.buy_price),
        "central_bank_sell": central.map(|r| r.sell_price),
        "timestamp": Utc::now(),
    })))
}

/// Scrape every bank for every tracked currency now
pub async fn trigger_scrape(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let saved = worker::scrape_banks(&state).await?;
    info!("Manual bank scrape saved {} rates", saved);
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "rates_saved": saved,
        "timestamp": Utc::now(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregates() {
        let values = [50.5, 50.9, 50.7];
        assert_eq!(max_of(&values), Some(50.9));
        assert_eq!(min_of(&values), Some(50.5));
        assert!((mean_of(&values).unwrap() - 50.7).abs() < 1e-9);
        assert_eq!(max_of(&[]), None);
        assert_eq!(mean_of(&[]), None);
    }

    #[test]
    fn test_is_central_bank() {
        assert!(is_central_bank("البنك المركزي المصري"));
        assert!(is_central_bank("cbe"));
        assert!(!is_central_bank("بنك مصر"));
    }
}

//! HTTP API
//!
//! Everything except `/health` is served under `/api`. Scopes are matched in
//! registration order and a matched prefix never falls through to a later
//! scope, so `/v1/news` and `/admin/banks` are registered ahead of `/v1` and
//! `/admin`. The gold and currency routes are also mounted at the `/api`
//! root for older clients; gold wins where both define a path.

pub mod admin;
pub mod auth;
pub mod banks;
pub mod currency;
pub mod gold;
pub mod health;
pub mod legacy;
pub mod news;
pub mod prices;
pub mod qa;
pub mod silver;

use actix_cors::Cors;
use actix_web::{error, web, HttpRequest, ResponseError};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;

use crate::error::ApiError;

/// Register every route on an `App`
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .app_data(query_config())
        .app_data(path_config())
        .route("/health", web::get().to(health::health))
        .service(
            web::scope("/api")
                .configure(legacy::routes)
                .service(web::scope("/v1/news").configure(news::routes))
                .service(web::scope("/v1/banks").configure(banks::public_routes))
                .service(web::scope("/v1").configure(prices::routes))
                .service(web::scope("/admin/banks").configure(banks::admin_routes))
                .service(web::scope("/admin").configure(admin::routes))
                .service(web::scope("/gold").configure(gold::routes))
                .service(web::scope("/currency").configure(currency::routes))
                .service(web::scope("/silver").configure(silver::routes))
                .service(web::scope("/qa").configure(qa::routes))
                .service(web::scope("/auth").configure(auth::routes))
                .configure(gold::routes)
                .configure(currency::routes),
        );
}

/// Any origin, method and header
pub fn cors() -> Cors {
    Cors::permissive()
}

/// Extractor failures are rendered like every other API error
fn rejected<E>(err: E, api: ApiError) -> actix_web::Error
where
    E: std::fmt::Debug + std::fmt::Display + 'static,
{
    error::InternalError::from_response(err, api.error_response()).into()
}

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req: &HttpRequest| {
        let message = err.to_string();
        rejected(err, ApiError::BadRequest(message))
    })
}

fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err, _req: &HttpRequest| {
        let message = err.to_string();
        rejected(err, ApiError::BadRequest(message))
    })
}

fn path_config() -> web::PathConfig {
    web::PathConfig::default().error_handler(|err, _req: &HttpRequest| {
        let message = err.to_string();
        rejected(err, ApiError::NotFound(message))
    })
}

/// `skip`/`limit` paging parameters
#[derive(Debug, Deserialize)]
pub struct Paging {
    #[serde(default)]
    pub skip: usize,
    pub limit: Option<usize>,
}

impl Paging {
    pub fn limit_or(&self, default: usize) -> usize {
        self.limit.unwrap_or(default)
    }
}

/// `HH:MM:SS` part of a timestamp
pub(crate) fn time_of(at: &DateTime<Utc>) -> String {
    at.format("%H:%M:%S").to_string()
}

/// `YYYY-MM-DD` part of a timestamp
pub(crate) fn date_of(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

/// The instant `days` days before `now`, rejecting windows chrono cannot represent
pub(crate) fn days_before(now: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>, ApiError> {
    TimeDelta::try_days(days)
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or_else(|| ApiError::BadRequest(format!("days out of range: {}", days)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_days_before_rejects_huge_windows() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        assert_eq!(days_before(now, 7).unwrap(), Utc.with_ymd_and_hms(2025, 3, 3, 12, 0, 0).unwrap());
        assert!(matches!(days_before(now, i64::MAX), Err(ApiError::BadRequest(_))));
        assert!(matches!(days_before(now, i64::MIN), Err(ApiError::BadRequest(_))));
        assert!(matches!(days_before(now, 100_000_000), Err(ApiError::BadRequest(_))));
    }
}

//! Liveness probe

use actix_web::HttpResponse;
use chrono::Utc;
use serde_json::json;

pub const SERVICE_NAME: &str = "Gold Service Backend";

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": Utc::now(),
        "service": SERVICE_NAME,
    }))
}

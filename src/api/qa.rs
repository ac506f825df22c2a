//! Page Q&A items

use actix_web::{web, HttpResponse};
use chrono::Utc;
use log::info;
use serde::Deserialize;
use serde_json::json;

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::models::QaInput;

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("", web::get().to(list))
        .route("/", web::get().to(list))
        .route("", web::post().to(create))
        .route("/", web::post().to(create))
        .route("/{id}", web::put().to(update))
        .route("/{id}", web::delete().to(delete));
}

#[derive(Debug, Deserialize)]
pub struct QaQuery {
    pub page_key: Option<String>,
    #[serde(default)]
    pub skip: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_active_only")]
    pub active_only: bool,
}

fn default_limit() -> usize {
    100
}

fn default_active_only() -> bool {
    true
}

fn not_found() -> ApiError {
    ApiError::NotFound("QA Item not found".to_string())
}

/// Items for a page plus those shared by every page
pub async fn list(
    state: web::Data<AppState>,
    query: web::Query<QaQuery>,
) -> Result<HttpResponse, ApiError> {
    let page_key = query.page_key.as_deref().filter(|k| !k.is_empty());
    let items = state.db.qa_items(page_key, query.active_only, query.skip, query.limit)?;
    Ok(HttpResponse::Ok().json(items))
}

pub async fn create(
    state: web::Data<AppState>,
    user: AuthUser,
    body: web::Json<QaInput>,
) -> Result<HttpResponse, ApiError> {
    let item = state.db.insert_qa(&body, Utc::now())?;
    state.invalidate_prices();
    info!("{} added Q&A item {} on {}", user.0.username, item.id, item.page_key);
    Ok(HttpResponse::Ok().json(item))
}

pub async fn update(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<i64>,
    body: web::Json<QaInput>,
) -> Result<HttpResponse, ApiError> {
    let item = state
        .db
        .update_qa(path.into_inner(), &body, Utc::now())?
        .ok_or_else(not_found)?;
    state.invalidate_prices();
    info!("{} updated Q&A item {}", user.0.username, item.id);
    Ok(HttpResponse::Ok().json(item))
}

pub async fn delete(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    if !state.db.delete_qa(id)? {
        return Err(not_found());
    }
    state.invalidate_prices();
    info!("{} deleted Q&A item {}", user.0.username, id);
    Ok(HttpResponse::Ok().json(json!({"message": "Deleted successfully"})))
}

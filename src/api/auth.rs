//! Login, own account and super admin user management

use actix_web::{web, HttpResponse};
use chrono::Utc;
use log::{info, warn};
use serde::Deserialize;
use serde_json::json;

use crate::app_state::AppState;
use crate::auth::{authenticate, hash_password, verify_password, AuthUser, SuperAdmin};
use crate::error::ApiError;
use crate::models::Role;
use crate::store::users::UserChanges;

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/login", web::post().to(login))
        .route("/me", web::get().to(me))
        .route("/users", web::post().to(create_user))
        .route("/users", web::get().to(list_users))
        .route("/users/{id}", web::put().to(update_user))
        .route("/users/{id}", web::delete().to(delete_user))
        .route("/change-password", web::put().to(change_password));
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub async fn login(
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let user = match authenticate(&state.db, &body.username, &body.password)? {
        Some(user) if user.is_active => user,
        _ => {
            warn!("Failed login for {}", body.username);
            return Err(ApiError::Unauthorized("Incorrect username or password".to_string()));
        }
    };
    let token = state.tokens.issue(user.id)?;
    info!("{} logged in", user.username);
    Ok(HttpResponse::Ok().json(json!({
        "access_token": token,
        "token_type": "bearer",
        "user": user,
    })))
}

pub async fn me(user: AuthUser) -> HttpResponse {
    HttpResponse::Ok().json(user.0)
}

#[derive(Debug, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Admin
}

pub async fn create_user(
    state: web::Data<AppState>,
    admin: SuperAdmin,
    body: web::Json<NewUser>,
) -> Result<HttpResponse, ApiError> {
    if state.db.username_taken(&body.username, None)? {
        return Err(ApiError::BadRequest("Username already exists".to_string()));
    }
    let hashed = hash_password(&body.password)?;
    let user = state
        .db
        .insert_user(&body.username, &hashed, body.role, Some(admin.0.id), Utc::now())?;
    info!("Super admin {} created user {}", admin.0.username, user.username);
    Ok(HttpResponse::Ok().json(user))
}

pub async fn list_users(state: web::Data<AppState>, _admin: SuperAdmin) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(state.db.users()?))
}

#[derive(Debug, Default, Deserialize)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

/// Validate an update against the acting super admin and turn it into
/// store changes. Empty username or password fields are ignored.
fn user_changes(
    state: &AppState,
    acting_id: i64,
    target_id: i64,
    update: &UserUpdate,
) -> Result<UserChanges, ApiError> {
    let own = acting_id == target_id;
    if own && update.role.is_some_and(|role| role != Role::SuperAdmin) {
        return Err(ApiError::BadRequest("Cannot change your own role".to_string()));
    }

    let mut changes = UserChanges { role: update.role, ..Default::default() };
    if let Some(username) = update.username.as_deref().filter(|u| !u.is_empty()) {
        if state.db.username_taken(username, Some(target_id))? {
            return Err(ApiError::BadRequest("Username already exists".to_string()));
        }
        changes.username = Some(username.to_string());
    }
    if let Some(password) = update.password.as_deref().filter(|p| !p.is_empty()) {
        changes.hashed_password = Some(hash_password(password)?);
    }
    if let Some(active) = update.is_active {
        if own && !active {
            return Err(ApiError::BadRequest("Cannot deactivate your own account".to_string()));
        }
        changes.is_active = Some(active);
    }
    Ok(changes)
}

fn user_not_found() -> ApiError {
    ApiError::NotFound("User not found".to_string())
}

pub async fn update_user(
    state: web::Data<AppState>,
    admin: SuperAdmin,
    path: web::Path<i64>,
    body: web::Json<UserUpdate>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    if state.db.user_by_id(id)?.is_none() {
        return Err(user_not_found());
    }
    let changes = user_changes(&state, admin.0.id, id, &body)?;
    let user = state.db.update_user(id, &changes, Utc::now())?.ok_or_else(user_not_found)?;
    info!("Super admin {} updated user {}", admin.0.username, user.username);
    Ok(HttpResponse::Ok().json(user))
}

pub async fn delete_user(
    state: web::Data<AppState>,
    admin: SuperAdmin,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let user = state.db.user_by_id(id)?.ok_or_else(user_not_found)?;
    if user.id == admin.0.id {
        return Err(ApiError::BadRequest("Cannot delete your own account".to_string()));
    }
    state.db.delete_user(id)?;
    info!("Super admin {} deleted user {}", admin.0.username, user.username);
    Ok(HttpResponse::Ok().json(json!({"message": "User deleted successfully"})))
}

#[derive(Debug, Deserialize)]
pub struct PasswordChange {
    pub old_password: String,
    pub new_password: String,
}

pub async fn change_password(
    state: web::Data<AppState>,
    user: AuthUser,
    query: web::Query<PasswordChange>,
) -> Result<HttpResponse, ApiError> {
    let user = user.0;
    if !verify_password(&query.old_password, &user.hashed_password) {
        return Err(ApiError::BadRequest("Incorrect current password".to_string()));
    }
    let changes = UserChanges {
        hashed_password: Some(hash_password(&query.new_password)?),
        ..Default::default()
    };
    let updated = state
        .db
        .update_user(user.id, &changes, Utc::now())?
        .ok_or_else(user_not_found)?;
    info!("{} changed their password", updated.username);
    Ok(HttpResponse::Ok().json(updated))
}

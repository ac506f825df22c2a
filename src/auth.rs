//! Dashboard authentication
//!
//! Passwords are stored as argon2 PHC strings. Sessions are stateless HS256
//! bearer tokens whose `sub` claim is the user id. Handlers opt in by taking
//! an [`AuthUser`] or [`SuperAdmin`] argument.

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration, Utc};
use futures::future::{ready, Ready};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::config::AuthConfig;
use crate::error::ApiError;
use crate::models::{Role, User};
use crate::store::{Database, StoreResult};

const CREDENTIALS_ERROR: &str = "Could not validate credentials";

/// JWT payload
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

/// Issues and verifies access tokens
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expire_minutes: i64,
}

impl TokenSigner {
    pub fn new(secret: &str, expire_minutes: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            expire_minutes,
        }
    }

    /// Use the configured secret, or a random one that lives until restart
    pub fn from_config(config: &AuthConfig) -> Self {
        match config.secret_key.as_deref().filter(|s| !s.is_empty()) {
            Some(secret) => Self::new(secret, config.token_expire_minutes),
            None => {
                warn!("No secret key configured; generated a random one, tokens will not survive a restart");
                let secret = format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple());
                Self::new(&secret, config.token_expire_minutes)
            }
        }
    }

    pub fn expire_minutes(&self) -> i64 {
        self.expire_minutes
    }

    pub fn issue(&self, user_id: i64) -> Result<String, ApiError> {
        let exp = Utc::now() + Duration::minutes(self.expire_minutes);
        let claims = Claims {
            sub: user_id.to_string(),
            exp: exp.timestamp().max(0) as usize,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ApiError::Internal(format!("Failed to sign token: {}", e)))
    }

    /// User id carried by a valid, unexpired token
    pub fn verify(&self, token: &str) -> Result<i64, ApiError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256)).map_err(|e| {
            debug!("Token rejected: {}", e);
            ApiError::Unauthorized(CREDENTIALS_ERROR.to_string())
        })?;
        data.claims
            .sub
            .parse::<i64>()
            .map_err(|_| ApiError::Unauthorized(CREDENTIALS_ERROR.to_string()))
    }
}

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("Failed to hash password: {}", e)))
}

pub fn verify_password(password: &str, hashed: &str) -> bool {
    match PasswordHash::new(hashed) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// User matching the credentials, if any
pub fn authenticate(db: &Database, username: &str, password: &str) -> StoreResult<Option<User>> {
    Ok(db
        .user_by_username(username)?
        .filter(|user| verify_password(password, &user.hashed_password)))
}

/// Clear the MDC user at the start of a request. Worker threads are reused,
/// so a previous request's user would otherwise stick.
pub fn reset_log_user() {
    log_mdc::insert("user", "-");
}

/// Pull the token out of an `Authorization: Bearer <token>` header
pub fn bearer_token(req: &HttpRequest) -> Option<&str> {
    let value = req.headers().get(actix_web::http::header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
        Some(token.trim())
    } else {
        None
    }
}

fn resolve_user(req: &HttpRequest) -> Result<User, ApiError> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| ApiError::Internal("Application state missing".to_string()))?;

    let token = bearer_token(req).ok_or_else(|| {
        warn!("Missing bearer token for {}", req.path());
        ApiError::Unauthorized("Not authenticated".to_string())
    })?;
    let user_id = state.tokens.verify(token)?;

    match state.db.user_by_id(user_id)? {
        Some(user) if user.is_active => {
            log_mdc::insert("user", user.username.as_str());
            Ok(user)
        }
        _ => {
            warn!("Token for missing or inactive user {}", user_id);
            Err(ApiError::Unauthorized(CREDENTIALS_ERROR.to_string()))
        }
    }
}

/// Any active, authenticated user
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(resolve_user(req).map(AuthUser))
    }
}

/// Authenticated user holding the super admin role
#[derive(Debug, Clone)]
pub struct SuperAdmin(pub User);

impl FromRequest for SuperAdmin {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(resolve_user(req).and_then(|user| {
            if user.role == Role::SuperAdmin {
                Ok(SuperAdmin(user))
            } else {
                Err(ApiError::Forbidden("Only super admin can perform this action".to_string()))
            }
        }))
    }
}

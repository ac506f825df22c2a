//! Error types for the gold service.
//!
//! `ScrapeError` covers fetching and parsing remote pages, `JobError` a whole
//! scrape-and-store cycle. `ApiError` is what HTTP handlers return and
//! renders as a `{"detail": ...}` JSON body.

use actix_web::http::{header, StatusCode};
use actix_web::{HttpResponse, ResponseError};
use log::error;
use serde_json::json;
use thiserror::Error;

/// Errors raised while scraping a source
#[derive(Error, Debug)]
pub enum ScrapeError {
    /// Transport failure (DNS, TLS, timeout, ...)
    #[error("Request to {url} failed: {message}")]
    Http { url: String, message: String },

    /// Remote answered with a non-success status
    #[error("{url} responded with status {status}")]
    Status { url: String, status: u16 },

    /// Page fetched but its layout did not match
    #[error("Failed to parse {source_name}: {message}")]
    Parse { source_name: String, message: String },

    /// Page parsed but yielded nothing usable
    #[error("{0} returned no data")]
    NoData(String),

    /// Requested source is not registered
    #[error("Unknown source: {0}")]
    UnknownSource(String),
}

/// Errors raised by one scrape-and-store cycle
#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    Scrape(#[from] ScrapeError),

    #[error("Database error: {0}")]
    Store(#[from] rusqlite::Error),
}

/// Errors returned by HTTP handlers
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status_code());
        if let ApiError::Unauthorized(_) = self {
            builder.insert_header((header::WWW_AUTHENTICATE, "Bearer"));
        }
        builder.json(json!({ "detail": self.to_string() }))
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(e: rusqlite::Error) -> Self {
        error!("Database error: {}", e);
        ApiError::Internal("Internal server error".to_string())
    }
}

impl From<ScrapeError> for ApiError {
    fn from(e: ScrapeError) -> Self {
        match e {
            ScrapeError::UnknownSource(name) => ApiError::NotFound(format!("Source '{}' not found", name)),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<JobError> for ApiError {
    fn from(e: JobError) -> Self {
        match e {
            JobError::Scrape(e) => e.into(),
            JobError::Store(e) => e.into(),
        }
    }
}

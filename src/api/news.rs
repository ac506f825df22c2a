//! News articles under `/v1/news`

use actix_web::{web, HttpResponse};
use chrono::Utc;
use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;
use serde_json::json;

use super::Paging;
use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::models::{Article, ArticleInput};
use crate::store::{Database, StoreResult};

/// Longest generated meta description before the ellipsis
const META_DESCRIPTION_CHARS: usize = 155;

lazy_static! {
    static ref TAG: Regex = Regex::new(r"<[^<]+?>").expect("valid regex");
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("", web::get().to(list))
        .route("/", web::get().to(list))
        .route("", web::post().to(create))
        .route("/", web::post().to(create))
        .route("/{slug}", web::get().to(read))
        .route("/{slug}", web::put().to(update))
        .route("/{slug}", web::delete().to(delete));
}

/// URL slug of a title. The text is transliterated to ASCII first, so
/// Arabic titles produce Latin slugs; ASCII letters and digits are kept
/// lowercased and every other run of characters becomes a single dash.
pub fn slugify(text: &str) -> String {
    let ascii = deunicode::deunicode(text);
    let mut slug = String::with_capacity(ascii.len());
    for c in ascii.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Percent-decode a slug taken from a URL
pub fn decode_slug(slug: &str) -> String {
    let escaped = slug.replace('+', "%2B").replace('&', "%26");
    url::form_urlencoded::parse(format!("slug={}", escaped).as_bytes())
        .next()
        .map(|(_, value)| value.into_owned())
        .unwrap_or_else(|| slug.to_string())
}

/// Plain-text summary of HTML content
pub fn meta_description(content: &str) -> String {
    let text = TAG.replace_all(content, "");
    let text = text.trim();
    if text.chars().count() > META_DESCRIPTION_CHARS {
        let cut: String = text.chars().take(META_DESCRIPTION_CHARS).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

/// `base`, or `base-1`, `base-2`, ... whichever is free first
fn unique_slug(db: &Database, base: &str) -> StoreResult<String> {
    let mut candidate = base.to_string();
    let mut counter = 1;
    while db.slug_exists(&candidate)? {
        candidate = format!("{}-{}", base, counter);
        counter += 1;
    }
    Ok(candidate)
}

/// Exact slug first, then numeric id
fn find_article(db: &Database, slug: &str) -> StoreResult<Option<Article>> {
    if let Some(article) = db.article_by_slug(slug)? {
        return Ok(Some(article));
    }
    match slug.parse::<i64>() {
        Ok(id) if slug.chars().all(|c| c.is_ascii_digit()) => db.article_by_id(id),
        _ => Ok(None),
    }
}

fn not_found() -> ApiError {
    ApiError::NotFound("Article not found".to_string())
}

pub async fn list(
    state: web::Data<AppState>,
    query: web::Query<Paging>,
) -> Result<HttpResponse, ApiError> {
    let articles = state.db.published_articles(query.skip, query.limit_or(10))?;
    Ok(HttpResponse::Ok().json(articles))
}

/// Look up by slug, by URL-decoded slug, then by id. Counts a view.
pub async fn read(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let slug = path.into_inner();
    let db = &state.db;

    let mut article = db.article_by_slug(&slug)?;
    if article.is_none() {
        let decoded = decode_slug(&slug);
        if decoded != slug {
            article = db.article_by_slug(&decoded)?;
        }
    }
    if article.is_none() {
        article = find_article(db, &slug)?;
    }

    let Some(mut article) = article else {
        warn!("Article not found with slug: {}", slug);
        return Err(not_found());
    };
    db.increment_article_views(article.id)?;
    article.views += 1;
    Ok(HttpResponse::Ok().json(article))
}

pub async fn create(
    state: web::Data<AppState>,
    user: AuthUser,
    body: web::Json<ArticleInput>,
) -> Result<HttpResponse, ApiError> {
    let mut input = body.into_inner();
    if input.title.trim().is_empty() {
        return Err(ApiError::BadRequest("Title is mandatory".to_string()));
    }
    if input.content.trim().is_empty() {
        return Err(ApiError::BadRequest("Content is mandatory".to_string()));
    }

    let base = match input.slug.trim() {
        "" => {
            let generated = slugify(&input.title);
            if generated.is_empty() { "news".to_string() } else { generated }
        }
        provided => provided.to_string(),
    };
    input.slug = unique_slug(&state.db, &base)?;
    if input.status.is_none() {
        input.status = Some("published".to_string());
    }
    if is_blank(&input.meta_title) {
        input.meta_title = Some(input.title.clone());
    }
    if is_blank(&input.meta_description) {
        input.meta_description = Some(meta_description(&input.content));
    }

    let article = state.db.insert_article(&input, Utc::now())?;
    info!("{} created article {}", user.0.username, article.slug);
    Ok(HttpResponse::Ok().json(article))
}

/// Replace an article's fields. A new slug already taken by another article
/// gets a random four digit suffix; an empty slug keeps the current one.
pub async fn update(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
    body: web::Json<ArticleInput>,
) -> Result<HttpResponse, ApiError> {
    let existing = find_article(&state.db, &path.into_inner())?.ok_or_else(not_found)?;
    let mut input = body.into_inner();
    if input.title.trim().is_empty() {
        return Err(ApiError::BadRequest("Title is mandatory".to_string()));
    }

    let requested = input.slug.trim().to_string();
    input.slug = if requested.is_empty() || requested == existing.slug {
        existing.slug.clone()
    } else if state.db.slug_exists(&requested)? {
        let suffix = uuid::Uuid::new_v4().as_u128() % 9000 + 1000;
        format!("{}-{}", requested, suffix)
    } else {
        requested
    };

    let article = state
        .db
        .update_article(existing.id, &input, Utc::now())?
        .ok_or_else(not_found)?;
    info!("{} updated article {}", user.0.username, article.slug);
    Ok(HttpResponse::Ok().json(article))
}

pub async fn delete(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let article = find_article(&state.db, &path.into_inner())?.ok_or_else(not_found)?;
    state.db.delete_article(article.id)?;
    info!("{} deleted article {}", user.0.username, article.slug);
    Ok(HttpResponse::Ok().json(json!({"status": "success", "message": "Article deleted"})))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Gold Prices Rise 5%!"), "gold-prices-rise-5");
        assert_eq!(slugify("Café Crème"), "cafe-creme");

        let arabic = slugify("  سعر الذهب اليوم  ");
        assert!(!arabic.is_empty());
        assert!(arabic.is_ascii());
        assert!(!arabic.starts_with('-') && !arabic.ends_with('-'));
        assert!(!arabic.contains("--"));
        assert_eq!(slugify("???"), "");
    }

    #[test]
    fn test_decode_slug() {
        assert_eq!(decode_slug("%D8%B3%D8%B9%D8%B1-gold"), "سعر-gold");
        assert_eq!(decode_slug("a+b&c"), "a+b&c");
        assert_eq!(decode_slug("plain"), "plain");
    }

    #[test]
    fn test_meta_description() {
        assert_eq!(meta_description("<p>Short <b>body</b></p>"), "Short body");
        let long = format!("<div>{}</div>", "x".repeat(200));
        let meta = meta_description(&long);
        assert_eq!(meta.len(), 158);
        assert!(meta.ends_with("..."));
    }

    #[test]
    fn test_unique_slug_counts_up() {
        let db = Database::open_in_memory().unwrap();
        let mut input: ArticleInput = serde_json::from_str(r#"{"title": "t", "content": "c"}"#).unwrap();
        assert_eq!(unique_slug(&db, "gold").unwrap(), "gold");
        input.slug = "gold".to_string();
        db.insert_article(&input, Utc::now()).unwrap();
        input.slug = "gold-1".to_string();
        db.insert_article(&input, Utc::now()).unwrap();
        assert_eq!(unique_slug(&db, "gold").unwrap(), "gold-2");
    }

    #[test]
    fn test_find_article_by_id() {
        let db = Database::open_in_memory().unwrap();
        let mut input: ArticleInput = serde_json::from_str(r#"{"title": "t", "content": "c"}"#).unwrap();
        input.slug = "first".to_string();
        let stored = db.insert_article(&input, Utc::now()).unwrap();
        let found = find_article(&db, &stored.id.to_string()).unwrap().unwrap();
        assert_eq!(found.slug, "first");
        assert!(find_article(&db, "-1").unwrap().is_none());
    }
}

//! Price scraping
//!
//! Every source is split in two: a URL and a pure parser from HTML text to
//! records. Pages are pulled through a [`PageFetcher`], so parsers can be
//! tested against inline fixtures and the whole pipeline against a
//! [`StaticFetcher`].

pub mod banks;
pub mod country;
pub mod currency;
pub mod gold;
pub mod history;
pub mod silver;

use async_trait::async_trait;
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Client;
use scraper::{ElementRef, Selector};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};
use url::Url;

use crate::config::ScraperConfig;
use crate::error::ScrapeError;

/// Retrieves the body of a page
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, ScrapeError>;
}

/// reqwest-backed fetcher shared by all sources
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &ScraperConfig) -> Result<Self, ScrapeError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9,ar;q=0.8"));

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ScrapeError::Http {
                url: String::new(),
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, ScrapeError> {
        debug!("GET {}", url);
        let response = self.client.get(url).send().await.map_err(|e| ScrapeError::Http {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| ScrapeError::Http {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

/// Serves canned pages by URL. Unknown URLs answer 404.
#[derive(Default)]
pub struct StaticFetcher {
    pages: RwLock<HashMap<String, String>>,
    requested: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, html: &str) -> Self {
        self.insert(url, html);
        self
    }

    pub fn insert(&self, url: &str, html: &str) {
        self.pages
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(url.to_string(), html.to_string());
    }

    /// URLs fetched so far, in order
    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<String, ScrapeError> {
        self.requested
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(url.to_string());
        self.pages
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(url)
            .cloned()
            .ok_or_else(|| ScrapeError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}

/// Outcome of a manual source test from the dashboard
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SourceProbe {
    /// success, failed or error
    pub status: &'static str,
    pub count: usize,
    /// Seconds spent fetching and parsing
    pub duration: f64,
    pub sample: Option<String>,
    pub error: Option<String>,
}

impl SourceProbe {
    /// Build a probe from a fetch result. `describe` renders the sample line.
    pub fn from_result<T>(
        started: Instant,
        result: Result<Vec<T>, ScrapeError>,
        describe: impl Fn(&[T]) -> Option<String>,
    ) -> Self {
        let duration = started.elapsed().as_secs_f64();
        match result {
            Ok(items) if !items.is_empty() => SourceProbe {
                status: "success",
                count: items.len(),
                duration,
                sample: describe(&items),
                error: None,
            },
            Ok(_) => SourceProbe {
                status: "failed",
                count: 0,
                duration,
                sample: None,
                error: Some("No prices found. Possible layout change or bot protection.".to_string()),
            },
            Err(e) => SourceProbe {
                status: "error",
                count: 0,
                duration,
                sample: None,
                error: Some(e.to_string()),
            },
        }
    }
}

lazy_static! {
    static ref DIGITS: Regex = Regex::new(r"\d+").expect("valid regex");
    static ref FIRST_NUMBER: Regex = Regex::new(r"\d+\.?\d*").expect("valid regex");
    static ref DECIMAL: Regex = Regex::new(r"\d+(?:\.\d+)?").expect("valid regex");
    static ref LOOSE_NUMBER: Regex = Regex::new(r"[\d.]+").expect("valid regex");
    static ref SIGNED_NUMBER: Regex = Regex::new(r"-?[\d.]+").expect("valid regex");
    static ref STANDARD_KARAT_PATTERNS: Vec<(&'static str, Regex)> = STANDARD_KARATS
        .iter()
        .map(|k| (*k, Regex::new(&format!(r"\b{}\b", k)).expect("valid regex")))
        .collect();
}

/// Karats recognised ahead of any other number in a label
pub const STANDARD_KARATS: [&str; 6] = ["24", "22", "21", "18", "14", "12"];

/// Compile a CSS selector
pub(crate) fn selector(css: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(css).map_err(|e| ScrapeError::Parse {
        source_name: "selector".to_string(),
        message: format!("{}: {:?}", css, e),
    })
}

/// Visible text of an element, whitespace-trimmed pieces joined by a space
pub(crate) fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text of the first `inner` match inside `cell`, or of the whole cell
pub(crate) fn inner_text_or_cell(cell: ElementRef<'_>, inner: &Selector) -> String {
    cell.select(inner).next().map(text_of).unwrap_or_else(|| text_of(cell))
}

/// Map Arabic-Indic and Persian digits to ASCII
pub fn normalize_digits(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{0660}'..='\u{0669}' => char::from(b'0' + (c as u32 - 0x0660) as u8),
            '\u{06F0}'..='\u{06F9}' => char::from(b'0' + (c as u32 - 0x06F0) as u8),
            _ => c,
        })
        .collect()
}

/// Price cell to number: everything but digits and dots is dropped.
/// Unparseable text is 0.
pub fn clean_price(text: &str) -> f64 {
    let cleaned: String = normalize_digits(text)
        .replace("ج.م", "")
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    cleaned.parse().unwrap_or(0.0)
}

/// Karat label to its number, e.g. "عيار 21" -> "21". Empty when the label
/// holds no plausible karat.
pub fn clean_karat(text: &str) -> String {
    let text = normalize_digits(text);

    for (karat, pattern) in STANDARD_KARAT_PATTERNS.iter() {
        if pattern.is_match(&text) || text.contains(&format!("عيار {}", karat)) || text.trim() == *karat {
            return karat.to_string();
        }
    }

    let Some(found) = DIGITS.find(&text) else {
        return String::new();
    };
    let digits = found.as_str();
    let trailing_zero = digits.len() == 3 && digits.ends_with('0');
    if digits.len() > 2 && !trailing_zero {
        return String::new();
    }
    // "240" comes from "24.0"
    if trailing_zero && STANDARD_KARATS.contains(&&digits[..2]) {
        return digits[..2].to_string();
    }
    digits.to_string()
}

/// First run of digits, if any
pub fn first_digits(text: &str) -> Option<String> {
    DIGITS
        .find(&normalize_digits(text))
        .map(|m| m.as_str().to_string())
}

/// First number in the text, 0 when there is none
pub fn extract_first_number(text: &str) -> f64 {
    FIRST_NUMBER
        .find(&normalize_digits(text))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0.0)
}

/// Every decimal number in the text
pub fn all_numbers(text: &str) -> Vec<f64> {
    DECIMAL
        .find_iter(&normalize_digits(text))
        .filter_map(|m| m.as_str().parse().ok())
        .collect()
}

/// Price with currency decorations stripped; `None` when nothing parses
pub fn parse_price(text: &str) -> Option<f64> {
    let cleaned = normalize_digits(text)
        .replace(',', "")
        .replace("EGP", "")
        .replace("ج.م", "")
        .replace('$', "")
        .replace("USD", "")
        .replace(' ', "");
    LOOSE_NUMBER.find(&cleaned)?.as_str().parse().ok()
}

/// Signed absolute change such as "-0.25" or "+1.5 ج.م"
pub fn parse_change(text: &str) -> Option<f64> {
    let cleaned = normalize_digits(text)
        .replace(['+', '%'], "")
        .replace("ج.م", "");
    SIGNED_NUMBER.find(cleaned.trim())?.as_str().parse().ok()
}

/// Signed percentage; the text must carry a `%`
pub fn parse_change_percent(text: &str) -> Option<f64> {
    if !text.contains('%') {
        return None;
    }
    let cleaned = normalize_digits(text).replace(['+', '%'], "");
    SIGNED_NUMBER.find(cleaned.trim())?.as_str().parse().ok()
}

/// Resolve `link` against `origin`. Unparseable input is returned as is.
pub(crate) fn absolute_url(origin: &str, link: &str) -> String {
    if link.is_empty() {
        return String::new();
    }
    Url::parse(origin)
        .and_then(|base| base.join(link))
        .map(String::from)
        .unwrap_or_else(|_| link.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_digits() {
        assert_eq!(normalize_digits("عيار ٢١"), "عيار 21");
        assert_eq!(normalize_digits("۱۸"), "18");
    }

    #[test]
    fn test_clean_price() {
        assert_eq!(clean_price("3,450.50 ج.م"), 3450.5);
        assert_eq!(clean_price("EGP 1200"), 1200.0);
        assert_eq!(clean_price("--"), 0.0);
        assert_eq!(clean_price("٣٤٠٠"), 3400.0);
    }

    #[test]
    fn test_clean_karat() {
        assert_eq!(clean_karat("عيار 21"), "21");
        assert_eq!(clean_karat("عيار ٢٤"), "24");
        assert_eq!(clean_karat("18"), "18");
        assert_eq!(clean_karat("gold 24.0"), "24");
        assert_eq!(clean_karat("240"), "24");
        assert_eq!(clean_karat("9"), "9");
        assert_eq!(clean_karat("3450"), "");
        assert_eq!(clean_karat("الجنيه الذهب"), "");
    }

    #[test]
    fn test_number_helpers() {
        assert_eq!(extract_first_number("50.85 +0.10%"), 50.85);
        assert_eq!(extract_first_number("n/a"), 0.0);
        assert_eq!(all_numbers("8 جرام 3400 3350.5"), vec![8.0, 3400.0, 3350.5]);
        assert_eq!(first_digits("عيار ١٨ جرام"), Some("18".to_string()));
    }

    #[test]
    fn test_change_parsing() {
        assert_eq!(parse_price("$ 31.25 USD"), Some(31.25));
        assert_eq!(parse_price("-"), None);
        assert_eq!(parse_change("-0.75 ج.م"), Some(-0.75));
        assert_eq!(parse_change("+1.5"), Some(1.5));
        assert_eq!(parse_change_percent("%0.69"), Some(0.69));
        assert_eq!(parse_change_percent("-1.2%"), Some(-1.2));
        assert_eq!(parse_change_percent("0.69"), None);
    }

    #[test]
    fn test_absolute_url() {
        assert_eq!(absolute_url("https://a.com", "/x.png"), "https://a.com/x.png");
        assert_eq!(absolute_url("https://a.com", "x.png"), "https://a.com/x.png");
        assert_eq!(absolute_url("https://a.com", "//cdn.b.com/y"), "https://cdn.b.com/y");
        assert_eq!(absolute_url("https://a.com", "https://c.com/z"), "https://c.com/z");
        assert_eq!(absolute_url("https://a.com", ""), "");
    }

    #[tokio::test]
    async fn test_static_fetcher() {
        let fetcher = StaticFetcher::new().with_page("https://a.com/", "<p>hi</p>");
        assert_eq!(fetcher.fetch("https://a.com/").await.unwrap(), "<p>hi</p>");
        assert!(matches!(
            fetcher.fetch("https://b.com/").await,
            Err(ScrapeError::Status { status: 404, .. })
        ));
        assert_eq!(fetcher.requested().len(), 2);
    }
}
